pub mod config;
pub mod duty_match;
pub mod pipeline;

pub use config::ScoringConfig;
pub use duty_match::{match_duties_to_segments, DutyMatch};
pub use pipeline::{MatchEngine, MatchError, MatchOutcome, RankedEntity};
