//! Tuning constants for the hybrid scorer. All of these are heuristics
//! carried over from production tuning; keep them overridable.

/// Weight of whole-profile similarity in the combined score.
pub const DEFAULT_OVERALL_WEIGHT: f32 = 0.4;
/// Weight of aggregated duty-level similarity in the combined score.
/// Duty specificity is intentionally weighted above profile similarity.
pub const DEFAULT_DUTY_WEIGHT: f32 = 0.6;
/// Duties scoring at or below this are treated as unmatched and excluded
/// from the explanation, not scored as zero.
pub const DEFAULT_DUTY_THRESHOLD: f32 = 0.3;
/// How many of an entity's best duty matches are averaged into its duty
/// score.
pub const DEFAULT_TOP_DUTIES: usize = 5;
/// Result count when the caller does not ask for a specific one.
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub overall_weight: f32,
    pub duty_weight: f32,
    pub duty_threshold: f32,
    pub top_duties: usize,
    pub default_top_k: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            overall_weight: DEFAULT_OVERALL_WEIGHT,
            duty_weight: DEFAULT_DUTY_WEIGHT,
            duty_threshold: DEFAULT_DUTY_THRESHOLD,
            top_duties: DEFAULT_TOP_DUTIES,
            default_top_k: DEFAULT_TOP_K,
        }
    }
}

impl ScoringConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            overall_weight: env_parse("NOC_OVERALL_WEIGHT").unwrap_or(defaults.overall_weight),
            duty_weight: env_parse("NOC_DUTY_WEIGHT").unwrap_or(defaults.duty_weight),
            duty_threshold: env_parse("NOC_DUTY_THRESHOLD").unwrap_or(defaults.duty_threshold),
            top_duties: env_parse("NOC_TOP_DUTIES").unwrap_or(defaults.top_duties),
            default_top_k: env_parse("NOC_DEFAULT_TOP_K").unwrap_or(defaults.default_top_k),
        }
    }

    pub fn weight_sum(&self) -> f32 {
        self.overall_weight + self.duty_weight
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}
