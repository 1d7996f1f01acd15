//! Open-event tracking: the read-flip-write cycle behind the pixel.

pub mod updater;

pub use updater::{TrackError, TrackOutcome, TrackingUpdater};
