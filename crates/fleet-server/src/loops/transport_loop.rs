//! Broker session bootstrap.
//!
//! Retries the initial connect with a capped doubling delay, then subscribes
//! to the location, geofence and alert filters. After that the transport
//! keeps the session (and the subscriptions) alive on its own.

use std::time::Duration;

use fleet_core::MessageKind;
use fleet_transport::{subscription_filter, SubscribeOptions, TransportClient, TransportError};
use tokio_util::sync::CancellationToken;

const CONNECT_RETRY_BASE: Duration = Duration::from_secs(1);
const CONNECT_RETRY_MAX: Duration = Duration::from_secs(30);

pub async fn run_transport_loop(
    transport: TransportClient,
    topic_prefix: String,
    subscribe: SubscribeOptions,
    shutdown: CancellationToken,
) {
    let mut delay = CONNECT_RETRY_BASE;

    loop {
        let attempt = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = connect_and_subscribe(&transport, &topic_prefix, subscribe) => result,
        };

        match attempt {
            Ok(()) => {
                tracing::info!(prefix = %topic_prefix, "live telemetry subscriptions active");
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, retry_in = ?delay, "broker not ready");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = delay.saturating_mul(2).min(CONNECT_RETRY_MAX);
            }
        }
    }
}

async fn connect_and_subscribe(
    transport: &TransportClient,
    topic_prefix: &str,
    subscribe: SubscribeOptions,
) -> Result<(), TransportError> {
    transport.connect().await?;
    for kind in MessageKind::ALL {
        transport
            .subscribe(&subscription_filter(topic_prefix, kind), subscribe)
            .await?;
    }
    Ok(())
}
