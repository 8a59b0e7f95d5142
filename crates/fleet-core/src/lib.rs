pub mod align;
pub mod fleet;
pub mod geoevents;
pub mod models;
pub mod playback;
pub mod records;
pub mod rules;
pub mod smoothing;
pub mod spatial;
pub mod timestamp;

pub use align::{closest_sample_index, TelemetryTrack};
pub use fleet::{is_live, FleetEntry, FleetSnapshotEntry, FleetStore};
pub use geoevents::{GeofenceCounters, GeofenceEventLog};
pub use models::{
    AlertMessage, GeoEvent, GeoEventType, LatLng, LocationSample, MessageKind, TelemetryPoint,
};
pub use playback::{
    LoadState, PlaybackError, PlaybackSession, PlaybackView, PlaybackWindow, SourceError,
    TelemetryRangeSource,
};
pub use records::{normalize_records, RecordLocation, RecordMetrics, TelemetryRecord};
pub use smoothing::{
    ease_out_cubic, interpolate, MarkerAnimator, MarkerFrame, MarkerLayer, MarkerPhase,
};
pub use spatial::{haversine_distance, planar_distance_deg};
pub use timestamp::{parse_utc_timestamp, TimestampError};
