//! Breaker state names.

/// Breaker state.
///
/// The string form (`closed`, `open`, `half-open`) is what statistics mirror.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum BreakerState {
    /// Calls flow normally.
    #[default]
    Closed,
    /// Calls are rejected.
    Open,
    /// A limited number of probe calls are allowed.
    HalfOpen,
}
