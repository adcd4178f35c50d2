//! Ordered local rate-limit admission with bounded grace waiting.

use bulwark_core::ClientConfig;
use bulwark_error::ClientErrorKind;
use bulwark_rate_limit::{DAILY_WINDOW, LifetimeCounter, LimiterFactory, SlidingWindow};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Grace period of the standard request path.
pub const STANDARD_GRACE: Duration = Duration::from_secs(30);

/// Grace period of the priority (download) request path.
pub const PRIORITY_GRACE: Duration = Duration::from_secs(120);

/// Interval between re-checks while waiting out a grace period.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a call is willing to wait for a rate-limit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracePolicy {
    /// Re-check once per second for up to the given duration.
    Wait(Duration),
    /// Never sleep: reject at once when any window projects a wait. Never
    /// counts against the lifetime ceiling.
    NonBlocking,
}

impl GracePolicy {
    /// Standard 30 second grace.
    pub const STANDARD: GracePolicy = GracePolicy::Wait(STANDARD_GRACE);

    /// Priority 120 second grace.
    pub const PRIORITY: GracePolicy = GracePolicy::Wait(PRIORITY_GRACE);

    /// Longest time the call may spend waiting for a slot.
    pub fn grace(&self) -> Duration {
        match self {
            GracePolicy::Wait(grace) => *grace,
            GracePolicy::NonBlocking => Duration::ZERO,
        }
    }

    /// Whether an admitted call increments the lifetime counter.
    pub fn counts_lifetime(&self) -> bool {
        matches!(self, GracePolicy::Wait(_))
    }
}

/// Result of evaluating one admission step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Slot available.
    Allow,
    /// Slot frees up after the given wait.
    Wait(Duration),
    /// Hard rejection; waiting will not help.
    Reject(ClientErrorKind),
}

/// One check in the admission chain.
#[derive(Debug, Clone)]
pub enum AdmissionStep {
    /// A sliding window, named for error messages.
    Window {
        /// Window name (`primary`, `daily`).
        name: String,
        /// Limiter instance.
        limiter: Arc<dyn SlidingWindow>,
    },
    /// Lifetime ceiling.
    Lifetime(Arc<LifetimeCounter>),
}

impl AdmissionStep {
    /// Peek at the step without consuming budget.
    pub fn evaluate(&self) -> Verdict {
        match self {
            AdmissionStep::Window { limiter, .. } => match limiter.check() {
                Ok(()) => Verdict::Allow,
                Err(wait) => Verdict::Wait(wait),
            },
            AdmissionStep::Lifetime(counter) if counter.would_exceed() => {
                Verdict::Reject(ClientErrorKind::LifetimeCapReached {
                    cap: counter.ceiling(),
                })
            }
            AdmissionStep::Lifetime(_) => Verdict::Allow,
        }
    }

    fn name(&self) -> &str {
        match self {
            AdmissionStep::Window { name, .. } => name,
            AdmissionStep::Lifetime(_) => "lifetime",
        }
    }
}

/// Local admission checks evaluated in order: primary window, daily window,
/// lifetime ceiling. The first denial wins.
#[derive(Debug, Clone, Default)]
pub struct AdmissionChain {
    steps: Vec<AdmissionStep>,
    primary_interval: Duration,
}

impl AdmissionChain {
    /// Create a chain from explicit steps.
    pub fn new(steps: Vec<AdmissionStep>) -> Self {
        let primary_interval = steps
            .iter()
            .find_map(|step| match step {
                AdmissionStep::Window { limiter, .. } => Some(limiter.interval()),
                AdmissionStep::Lifetime(_) => None,
            })
            .unwrap_or(Duration::ZERO);
        Self {
            steps,
            primary_interval,
        }
    }

    /// Build the chain a client configuration asks for.
    pub fn from_config(config: &ClientConfig, factory: &dyn LimiterFactory) -> Self {
        let mut steps = Vec::new();
        if let Some((calls, window)) = config.primary_window() {
            steps.push(AdmissionStep::Window {
                name: "primary".to_string(),
                limiter: factory.create(window, calls),
            });
        }
        if let Some(calls) = config.daily_window() {
            steps.push(AdmissionStep::Window {
                name: "daily".to_string(),
                limiter: factory.create(DAILY_WINDOW, calls),
            });
        }
        if *config.rate_limit_per_total() > 0 {
            steps.push(AdmissionStep::Lifetime(Arc::new(LifetimeCounter::new(
                *config.rate_limit_per_total(),
            ))));
        }
        Self::new(steps)
    }

    /// Configured steps in evaluation order.
    pub fn steps(&self) -> &[AdmissionStep] {
        &self.steps
    }

    /// Interval of the first window, or zero without one.
    pub fn primary_interval(&self) -> Duration {
        self.primary_interval
    }

    /// Lifetime counter, when a ceiling is configured.
    pub fn lifetime(&self) -> Option<&LifetimeCounter> {
        self.steps.iter().find_map(|step| match step {
            AdmissionStep::Lifetime(counter) => Some(counter.as_ref()),
            AdmissionStep::Window { .. } => None,
        })
    }

    /// Wait until every step admits the call, or fail.
    ///
    /// A window whose wait exceeds the grace period fails at once, as does any
    /// wait under [`GracePolicy::NonBlocking`]. Otherwise the window is
    /// re-checked every [`POLL_INTERVAL`] until it admits or the grace
    /// deadline passes. Dropping the future abandons the wait.
    #[instrument(skip(self))]
    pub async fn admit(&self, policy: GracePolicy) -> Result<(), ClientErrorKind> {
        let grace = policy.grace();

        for step in &self.steps {
            match step.evaluate() {
                Verdict::Allow => {}
                Verdict::Reject(kind) => return Err(kind),
                Verdict::Wait(wait) if wait > grace || policy == GracePolicy::NonBlocking => {
                    debug!(window = step.name(), ?wait, ?grace, "Wait exceeds grace period");
                    return Err(ClientErrorKind::RateLimited {
                        window: step.name().to_string(),
                        wait,
                    });
                }
                Verdict::Wait(wait) => Self::wait_out(step, wait, grace).await?,
            }
        }
        Ok(())
    }

    /// Consume one slot from every window, and the lifetime counter if asked.
    pub fn consume(&self, count_lifetime: bool) {
        for step in &self.steps {
            match step {
                AdmissionStep::Window { limiter, .. } => limiter.allow_force(),
                AdmissionStep::Lifetime(counter) if count_lifetime => {
                    counter.increment();
                }
                AdmissionStep::Lifetime(_) => {}
            }
        }
    }

    async fn wait_out(
        step: &AdmissionStep,
        mut wait: Duration,
        grace: Duration,
    ) -> Result<(), ClientErrorKind> {
        debug!(window = step.name(), ?wait, ?grace, "Waiting for rate-limit slot");
        let deadline = Instant::now() + grace;
        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!(window = step.name(), ?wait, ?grace, "Grace period exhausted");
                return Err(ClientErrorKind::GraceExhausted {
                    window: step.name().to_string(),
                    wait,
                    grace,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
            match step.evaluate() {
                Verdict::Allow => return Ok(()),
                Verdict::Wait(next) => wait = next,
                Verdict::Reject(kind) => return Err(kind),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_rate_limit::{WindowLog, WindowLogFactory};
    use parking_lot::Mutex;

    /// Window that reports a fixed wait until released.
    #[derive(Debug)]
    struct ScriptedWindow {
        wait: Mutex<Option<Duration>>,
        checks: Mutex<u32>,
    }

    impl ScriptedWindow {
        fn blocked(wait: Duration) -> Arc<Self> {
            Arc::new(Self {
                wait: Mutex::new(Some(wait)),
                checks: Mutex::new(0),
            })
        }
    }

    impl SlidingWindow for ScriptedWindow {
        fn check(&self) -> Result<(), Duration> {
            *self.checks.lock() += 1;
            match *self.wait.lock() {
                Some(wait) => Err(wait),
                None => Ok(()),
            }
        }

        fn allow_force(&self) {}

        fn interval(&self) -> Duration {
            Duration::from_secs(60)
        }
    }

    fn chain_of(window: Arc<ScriptedWindow>) -> AdmissionChain {
        AdmissionChain::new(vec![AdmissionStep::Window {
            name: "primary".to_string(),
            limiter: window,
        }])
    }

    #[tokio::test(start_paused = true)]
    async fn wait_just_over_grace_rejects_without_sleeping() {
        let grace = Duration::from_secs(30);
        let window = ScriptedWindow::blocked(grace + Duration::from_nanos(1));
        let chain = chain_of(window.clone());

        let start = Instant::now();
        let err = chain.admit(GracePolicy::Wait(grace)).await.unwrap_err();
        assert!(matches!(err, ClientErrorKind::RateLimited { .. }));
        assert_eq!(Instant::now(), start);
        assert_eq!(*window.checks.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_just_under_grace_polls_every_second_until_deadline() {
        let grace = Duration::from_secs(30);
        let window = ScriptedWindow::blocked(grace - Duration::from_nanos(1));
        let chain = chain_of(window.clone());

        let start = Instant::now();
        let err = chain.admit(GracePolicy::Wait(grace)).await.unwrap_err();
        assert!(matches!(err, ClientErrorKind::GraceExhausted { .. }));
        assert_eq!(Instant::now() - start, grace);
        // Initial check plus one per second of grace.
        assert_eq!(*window.checks.lock(), 31);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_once_slot_frees() {
        let window = ScriptedWindow::blocked(Duration::from_secs(5));
        let chain = chain_of(window.clone());

        let releaser = {
            let window = window.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(4500)).await;
                *window.wait.lock() = None;
            })
        };

        let start = Instant::now();
        chain.admit(GracePolicy::STANDARD).await.unwrap();
        assert_eq!(Instant::now() - start, Duration::from_secs(5));
        releaser.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn non_blocking_rejects_long_waits_up_front() {
        let window = ScriptedWindow::blocked(Duration::from_secs(32));
        let err = chain_of(window)
            .admit(GracePolicy::NonBlocking)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientErrorKind::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn non_blocking_never_sleeps_on_a_full_window() {
        let window = Arc::new(WindowLog::new(Duration::from_secs(10), 1));
        window.allow_force();
        let chain = AdmissionChain::new(vec![AdmissionStep::Window {
            name: "primary".into(),
            limiter: window,
        }]);

        let start = Instant::now();
        let err = chain.admit(GracePolicy::NonBlocking).await.unwrap_err();
        assert_eq!(Instant::now(), start);
        match err {
            ClientErrorKind::RateLimited { window, wait } => {
                assert_eq!(window, "primary");
                assert!(wait <= Duration::from_secs(10));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_blocking_admits_when_window_has_room() {
        let window = Arc::new(WindowLog::new(Duration::from_secs(10), 2));
        window.allow_force();
        let chain = AdmissionChain::new(vec![AdmissionStep::Window {
            name: "primary".into(),
            limiter: window,
        }]);

        let start = Instant::now();
        chain.admit(GracePolicy::NonBlocking).await.unwrap();
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn lifetime_ceiling_is_hard_and_only_counted_when_asked() {
        let counter = Arc::new(LifetimeCounter::new(1));
        let chain = AdmissionChain::new(vec![AdmissionStep::Lifetime(counter.clone())]);

        chain.admit(GracePolicy::NonBlocking).await.unwrap();
        chain.consume(GracePolicy::NonBlocking.counts_lifetime());
        assert_eq!(counter.count(), 0);

        chain.admit(GracePolicy::STANDARD).await.unwrap();
        chain.consume(GracePolicy::STANDARD.counts_lifetime());
        assert_eq!(counter.count(), 1);

        let err = chain.admit(GracePolicy::PRIORITY).await.unwrap_err();
        assert_eq!(err, ClientErrorKind::LifetimeCapReached { cap: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn primary_window_is_checked_before_daily() {
        let primary = Arc::new(WindowLog::new(Duration::from_secs(10), 1));
        let daily = Arc::new(WindowLog::new(DAILY_WINDOW, 1));
        primary.allow_force();
        daily.allow_force();
        let chain = AdmissionChain::new(vec![
            AdmissionStep::Window {
                name: "primary".into(),
                limiter: primary,
            },
            AdmissionStep::Window {
                name: "daily".into(),
                limiter: daily,
            },
        ]);

        // Primary frees within grace, then daily rejects outright.
        let err = chain.admit(GracePolicy::STANDARD).await.unwrap_err();
        match err {
            ClientErrorKind::RateLimited { window, .. } => assert_eq!(window, "daily"),
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(chain.primary_interval(), Duration::from_secs(10));
    }

    #[test]
    fn config_without_limits_builds_empty_chain() {
        let chain = AdmissionChain::from_config(&ClientConfig::default(), &WindowLogFactory);
        assert!(chain.steps().is_empty());
        assert_eq!(chain.primary_interval(), Duration::ZERO);
        assert!(chain.lifetime().is_none());
    }
}
