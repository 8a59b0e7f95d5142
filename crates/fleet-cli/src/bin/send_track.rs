//! CLI tool to publish simulated vehicle telemetry to the broker.
//!
//! Flies one vehicle in a circle, optionally crossing a circular geofence,
//! and raises a low battery alert when the simulated battery runs down.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use fleet_cli::sim::{CircularFence, CircularPath, SimulatedVehicle};
use fleet_core::MessageKind;
use fleet_transport::{topic_for, QosLevel, TransportClient, TransportOptions};
use std::time::Duration;
use tokio::time;

/// Publish simulated telemetry for one vehicle on a circular track
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Broker URL
    #[arg(long, env = "FLEET_BROKER_URL", default_value = "mqtt://localhost:1883")]
    broker: String,

    /// Topic prefix
    #[arg(long, default_value = "fleet")]
    prefix: String,

    /// Vehicle identifier
    #[arg(long, default_value = "DRONE-001")]
    vehicle_id: String,

    /// Center latitude
    #[arg(long, default_value_t = 33.6846)]
    lat: f64,

    /// Center longitude
    #[arg(long, default_value_t = -117.8265)]
    lon: f64,

    /// Circle radius in meters
    #[arg(long, default_value_t = 200.0)]
    radius: f64,

    /// Altitude in meters
    #[arg(long, default_value_t = 50.0)]
    altitude: f64,

    /// Ground speed in m/s
    #[arg(long, default_value_t = 10.0)]
    speed: f64,

    /// Duration in seconds
    #[arg(long, default_value_t = 60)]
    duration: u64,

    /// Update rate in Hz
    #[arg(long, default_value_t = 1.0)]
    rate: f64,

    /// Radius in meters of a geofence on the track's northern edge (0 disables)
    #[arg(long, default_value_t = 0.0)]
    fence_radius: f64,

    /// Starting battery percentage
    #[arg(long, default_value_t = 100.0)]
    battery: f64,

    /// Battery drain in percent per second
    #[arg(long, default_value_t = 0.05)]
    drain: f64,

    /// QoS level for published messages (0, 1 or 2)
    #[arg(long, default_value_t = 1)]
    qos: u8,
}

impl Args {
    /// Time between published samples.
    fn publish_period(&self) -> anyhow::Result<Duration> {
        anyhow::ensure!(
            self.rate.is_finite() && self.rate > 0.0,
            "--rate must be a positive, finite number"
        );
        let period = Duration::try_from_secs_f64(1.0 / self.rate).context("--rate is out of range")?;
        anyhow::ensure!(!period.is_zero(), "--rate is too high");
        Ok(period)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let period = args.publish_period()?;
    let qos = QosLevel::from_level(args.qos).context("--qos must be 0, 1 or 2")?;

    let client_id = format!("send-track-{}", args.vehicle_id);
    let options = TransportOptions::from_url(&args.broker, client_id)?;
    let client = TransportClient::new(options);

    println!("Connecting to broker at {}...", args.broker);
    client.connect().await.context("broker connect failed")?;

    let path = CircularPath::new(
        args.lat,
        args.lon,
        args.radius,
        args.altitude,
        args.speed,
        0.0,  // start due north of center
        true, // clockwise
    );
    let mut vehicle =
        SimulatedVehicle::new(args.vehicle_id.clone(), path).with_battery(args.battery, args.drain, 20.0);
    if args.fence_radius > 0.0 {
        let (fence_lat, fence_lon) = fleet_core::spatial::offset_by_bearing(args.lat, args.lon, args.radius, 0.0);
        vehicle = vehicle.with_fence(CircularFence {
            name: format!("{}-gate", args.vehicle_id),
            center_lat: fence_lat,
            center_lon: fence_lon,
            radius_m: args.fence_radius,
        });
    }

    println!("Starting circular track for {}", args.vehicle_id);
    println!("  Center: ({}, {})", args.lat, args.lon);
    println!("  Radius: {}m, Altitude: {}m", args.radius, args.altitude);
    println!("  Duration: {}s, Update rate: {}Hz", args.duration, args.rate);
    println!();

    let location_topic = topic_for(&args.prefix, &args.vehicle_id, MessageKind::Location);
    let geoevent_topic = topic_for(&args.prefix, &args.vehicle_id, MessageKind::GeoEvent);
    let alert_topic = topic_for(&args.prefix, &args.vehicle_id, MessageKind::Alert);

    let start = time::Instant::now();
    let mut update_count = 0u32;
    let mut interval = time::interval(period);

    loop {
        interval.tick().await;

        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > args.duration as f64 {
            break;
        }

        let step = vehicle.step(elapsed, Utc::now());
        match client.publish_json(&location_topic, &step.location, qos).await {
            Ok(()) => {
                update_count += 1;
                println!(
                    "[{:3}] ({:.6}, {:.6}) battery {:.1}%",
                    update_count, step.location.latitude, step.location.longitude, step.location.battery_level
                );
            }
            Err(e) => eprintln!("Error publishing location: {}", e),
        }

        if let Some(event) = step.geoevent {
            println!("      {:?} {}", event.event_type, event.geofence_name);
            if let Err(e) = client.publish_json(&geoevent_topic, &event, qos).await {
                eprintln!("Error publishing geofence event: {}", e);
            }
        }
        if let Some(alert) = step.alert {
            println!("      ALERT {}: {}", alert.alert_type, alert.message);
            if let Err(e) = client.publish_json(&alert_topic, &alert, qos).await {
                eprintln!("Error publishing alert: {}", e);
            }
        }
    }

    client.disconnect().await?;
    println!("\nSimulation complete. Sent {} location updates.", update_count);
    Ok(())
}
