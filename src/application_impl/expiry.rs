//! Pure expiry arithmetic. An absent session counts as already expired.

use crate::domain_model::Session;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub fn time_until_expiry(session: Option<&Session>, now: DateTime<Utc>) -> Duration {
    session
        .and_then(|s| (s.expires_at - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

pub fn needs_refresh(session: Option<&Session>, now: DateTime<Utc>, buffer: Duration) -> bool {
    time_until_expiry(session, now) < buffer
}

pub fn is_expired(session: Option<&Session>, now: DateTime<Utc>) -> bool {
    time_until_expiry(session, now).is_zero()
}
