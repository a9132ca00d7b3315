mod manual_clock;
mod tokio_clock;

pub use manual_clock::*;
pub use tokio_clock::*;

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// `at + delay`, saturating instead of panicking on overflow.
pub(crate) fn shift(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
