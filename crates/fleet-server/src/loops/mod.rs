//! Background loops for continuous processing.

pub mod playback_prune_loop;
pub mod range_cache_loop;
pub mod smoothing_loop;
pub mod transport_loop;
