//! Rolling per-client request statistics and optional persistence.

use async_trait::async_trait;
use bulwark_core::ClientStats;
use bulwark_error::BulwarkResult;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::RwLock;

/// Destination for statistics snapshots, keyed by client name.
#[async_trait]
pub trait StatsSink: Send + Sync + fmt::Debug {
    /// Insert or replace the row for `stats.client_name` in `table`.
    async fn upsert(&self, table: &str, stats: &ClientStats) -> BulwarkResult<()>;
}

/// Sink that keeps the latest snapshot per table and client in memory.
#[derive(Debug, Default)]
pub struct InMemoryStatsSink {
    rows: RwLock<HashMap<(String, String), ClientStats>>,
}

impl InMemoryStatsSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest row for `client` in `table`.
    pub async fn get(&self, table: &str, client: &str) -> Option<ClientStats> {
        self.rows
            .read()
            .await
            .get(&(table.to_string(), client.to_string()))
            .cloned()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// True when nothing has been written.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl StatsSink for InMemoryStatsSink {
    async fn upsert(&self, table: &str, stats: &ClientStats) -> BulwarkResult<()> {
        self.rows
            .write()
            .await
            .insert((table.to_string(), stats.client_name.clone()), stats.clone());
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    stats: ClientStats,
    timestamps: VecDeque<DateTime<Utc>>,
}

/// Counters owned by one client. Readers get a snapshot copy.
#[derive(Debug)]
pub struct StatsTracker {
    inner: Mutex<Inner>,
}

impl StatsTracker {
    /// Create zeroed statistics for `client`.
    pub fn new(client: impl Into<String>) -> Self {
        let stats = ClientStats {
            client_name: client.into(),
            circuit_breaker_state: "closed".to_string(),
            ..Default::default()
        };
        Self {
            inner: Mutex::new(Inner {
                stats,
                timestamps: VecDeque::new(),
            }),
        }
    }

    /// Count a successful call and its latency.
    pub fn record_success(&self, elapsed: std::time::Duration) {
        self.record_success_at(elapsed, Utc::now());
    }

    /// Count a successful call at `now`.
    pub fn record_success_at(&self, elapsed: std::time::Duration, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.stats.success_count += 1;
        Self::add_latency(&mut inner.stats, Some(elapsed));
        Self::count_request(&mut inner, now);
    }

    /// Count a failed call, with latency when a response arrived.
    pub fn record_failure(&self, elapsed: Option<std::time::Duration>, error: &str) {
        self.record_failure_at(elapsed, error, Utc::now());
    }

    /// Count a failed call at `now`.
    pub fn record_failure_at(
        &self,
        elapsed: Option<std::time::Duration>,
        error: &str,
        now: DateTime<Utc>,
    ) {
        let mut inner = self.inner.lock();
        inner.stats.failure_count += 1;
        inner.stats.last_error = Some(error.to_string());
        inner.stats.last_error_at = Some(now);
        Self::add_latency(&mut inner.stats, elapsed);
        Self::count_request(&mut inner, now);
    }

    /// Count a call that is neither success nor failure (rate-limited).
    pub fn record_request_only(&self) {
        self.record_request_only_at(Utc::now());
    }

    /// Count a rate-limited call at `now`.
    pub fn record_request_only_at(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        Self::count_request(&mut inner, now);
    }

    /// Remember an error without changing the success/failure buckets.
    pub fn note_error(&self, error: &str) {
        let mut inner = self.inner.lock();
        inner.stats.last_error = Some(error.to_string());
        inner.stats.last_error_at = Some(Utc::now());
    }

    /// Mirror the next instant at which calls may resume.
    pub fn set_next_available(&self, at: Option<DateTime<Utc>>) {
        self.inner.lock().stats.next_available_at = at;
    }

    /// Mirror the breaker state name.
    pub fn set_breaker_state(&self, state: &str) {
        let mut inner = self.inner.lock();
        if inner.stats.circuit_breaker_state != state {
            inner.stats.circuit_breaker_state = state.to_string();
        }
    }

    /// Drop request timestamps older than 24 hours before `now`.
    pub fn prune(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        Self::prune_locked(&mut inner, now);
    }

    /// Copy of the current statistics with rolling windows computed.
    pub fn snapshot(&self) -> ClientStats {
        self.snapshot_at(Utc::now())
    }

    /// Copy of the statistics as seen at `now`.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> ClientStats {
        let mut inner = self.inner.lock();
        Self::prune_locked(&mut inner, now);
        let hour_ago = now - Duration::hours(1);
        let mut stats = inner.stats.clone();
        stats.requests_24h = inner.timestamps.len() as u64;
        stats.requests_1h = inner.timestamps.iter().filter(|t| **t > hour_ago).count() as u64;
        stats
    }

    fn add_latency(stats: &mut ClientStats, elapsed: Option<std::time::Duration>) {
        if let Some(elapsed) = elapsed {
            stats.total_response_time_ms += elapsed.as_millis() as u64;
            stats.response_count += 1;
        }
    }

    fn count_request(inner: &mut Inner, now: DateTime<Utc>) {
        inner.stats.requests_total += 1;
        inner.timestamps.push_back(now);
        Self::prune_locked(inner, now);
    }

    fn prune_locked(inner: &mut Inner, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(24);
        while inner.timestamps.front().is_some_and(|t| *t <= cutoff) {
            inner.timestamps.pop_front();
        }
    }
}
