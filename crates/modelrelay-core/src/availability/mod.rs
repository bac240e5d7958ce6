//! Model availability tracking

mod tracker;

pub use tracker::{
    AvailabilityRecord, AvailabilityState, AvailabilityStats, AvailabilityTracker,
    DEFAULT_COOLDOWN,
};
