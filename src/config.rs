//! Runtime configuration.
//!
//! # Example
//!
//! ```rust
//! use railyard::config::{PathSettings, RuntimeConfig, SpeedProfile};
//!
//! // Use defaults
//! let config = RuntimeConfig::default();
//!
//! // Or customize
//! let config = RuntimeConfig::default()
//!     .with_strict_feedback(true)
//!     .with_path(PathSettings::default().with_overflow_limit(32))
//!     .with_speed(SpeedProfile::default().with_braking_kph(20));
//! ```

// ============================================================================
// Path finder settings
// ============================================================================

/// Settings of the path finder.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathSettings {
    /// Abort the search when a candidate path exceeds this many block steps.
    pub overflow_limit: usize,
    /// Shuffle branch order to diversify automatic routes.
    pub randomize: bool,
    /// RNG seed used when `randomize` is on; supplied externally so tests
    /// are reproducible.
    pub seed: u64,
    /// Log every accepted and rejected candidate.
    pub verbose: bool,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            overflow_limit: 64,
            randomize: false,
            seed: 0,
            verbose: false,
        }
    }
}

impl PathSettings {
    /// Sets the overflow limit.
    pub fn with_overflow_limit(mut self, limit: usize) -> Self {
        self.overflow_limit = limit;
        self
    }

    /// Enables or disables branch-order randomization.
    pub fn with_randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables verbose candidate logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

// ============================================================================
// Speed profile
// ============================================================================

/// Speeds the controller commands in each phase of a run.
///
/// These are layout-wide defaults in km/h; per-train calibration curves are
/// a concern of the command station, not of this runtime.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeedProfile {
    /// Cruise speed commanded when a train starts, unless the train
    /// requests otherwise.
    pub default_running_kph: u16,
    /// Speed commanded between the brake and stop feedbacks.
    pub braking_kph: u16,
    /// Speed cap while crossing a turnout in a branching state.
    pub turnout_branch_kph: u16,
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self {
            default_running_kph: 80,
            braking_kph: 30,
            turnout_branch_kph: 40,
        }
    }
}

impl SpeedProfile {
    /// Sets the default running speed.
    pub fn with_default_running_kph(mut self, kph: u16) -> Self {
        self.default_running_kph = kph;
        self
    }

    /// Sets the braking speed.
    pub fn with_braking_kph(mut self, kph: u16) -> Self {
        self.braking_kph = kph;
        self
    }

    /// Sets the branching turnout speed cap.
    pub fn with_turnout_branch_kph(mut self, kph: u16) -> Self {
        self.turnout_branch_kph = kph;
        self
    }
}

// ============================================================================
// Runtime config
// ============================================================================

/// Complete runtime configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeConfig {
    /// Strict feedback mode: only the feedback directly ahead of a train's
    /// position advances it. Lenient mode (the default) jumps the position
    /// to any detected feedback ahead, tolerating dead sensors.
    pub strict_feedback: bool,
    /// Station waiting time when neither the route step nor the block
    /// declares one, in milliseconds.
    pub default_waiting_time_ms: u64,
    /// Path finder settings.
    pub path: PathSettings,
    /// Commanded speeds.
    pub speed: SpeedProfile,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            strict_feedback: false,
            default_waiting_time_ms: 10_000,
            path: PathSettings::default(),
            speed: SpeedProfile::default(),
        }
    }
}

impl RuntimeConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets strict feedback mode.
    pub fn with_strict_feedback(mut self, strict: bool) -> Self {
        self.strict_feedback = strict;
        self
    }

    /// Sets the fallback station waiting time.
    pub fn with_default_waiting_time_ms(mut self, ms: u64) -> Self {
        self.default_waiting_time_ms = ms;
        self
    }

    /// Sets the path finder settings.
    pub fn with_path(mut self, path: PathSettings) -> Self {
        self.path = path;
        self
    }

    /// Sets the speed profile.
    pub fn with_speed(mut self, speed: SpeedProfile) -> Self {
        self.speed = speed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::new();
        assert!(!config.strict_feedback);
        assert_eq!(config.default_waiting_time_ms, 10_000);
        assert_eq!(config.path.overflow_limit, 64);
        assert_eq!(config.speed.default_running_kph, 80);
    }

    #[test]
    fn builder_pattern() {
        let config = RuntimeConfig::new()
            .with_strict_feedback(true)
            .with_default_waiting_time_ms(5_000)
            .with_path(PathSettings::default().with_overflow_limit(16).with_seed(42))
            .with_speed(SpeedProfile::default().with_turnout_branch_kph(25));

        assert!(config.strict_feedback);
        assert_eq!(config.default_waiting_time_ms, 5_000);
        assert_eq!(config.path.overflow_limit, 16);
        assert_eq!(config.path.seed, 42);
        assert_eq!(config.speed.turnout_branch_kph, 25);
    }
}
