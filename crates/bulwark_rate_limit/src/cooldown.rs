//! Shared "blocked until" state set by server rate-limit responses.

use crate::Cooldown;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Instant before which the provider has asked for no calls.
///
/// Each detection overwrites the previous value, even when the new instant is
/// earlier. A value in the past means "not blocked".
#[derive(Debug, Default)]
pub struct ServerCooldown {
    until: RwLock<Option<DateTime<Utc>>>,
}

impl ServerCooldown {
    /// Create an unblocked cooldown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a detected cooldown.
    pub fn apply(&self, cooldown: Cooldown) {
        self.set(cooldown.until);
    }

    /// Overwrite the blocked-until instant.
    pub fn set(&self, until: DateTime<Utc>) {
        debug!(%until, "Server cooldown updated");
        *self.until.write() = Some(until);
    }

    /// Clear any cooldown.
    pub fn clear(&self) {
        *self.until.write() = None;
    }

    /// Current blocked-until instant, if one was ever recorded.
    pub fn until(&self) -> Option<DateTime<Utc>> {
        *self.until.read()
    }

    /// Time left before calls may resume, or `None` when not blocked at `now`.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until = (*self.until.read())?;
        if until > now {
            (until - now).to_std().ok()
        } else {
            None
        }
    }

    /// Time left at `now` if still blocked; otherwise clear the expired value.
    ///
    /// Check and clear happen under one write guard, so a cooldown applied
    /// concurrently is never erased by a caller that saw the old one expire.
    pub fn check_and_clear(&self, now: DateTime<Utc>) -> Option<Duration> {
        let mut until = self.until.write();
        match *until {
            Some(at) if at > now => (at - now).to_std().ok(),
            Some(_) => {
                *until = None;
                None
            }
            None => None,
        }
    }

    /// Time left before calls may resume, using the wall clock.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_at(Utc::now())
    }
}
