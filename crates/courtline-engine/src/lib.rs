// Analytical engine: factor calculators, context resolution, probability
// composition, confidence, set-score modelling and stake sizing.

pub mod analyzer;
pub mod composer;
pub mod confidence;
pub mod context;
pub mod elo;
pub mod factors;
pub mod rating;
pub mod set_score;
pub mod staking;

pub use analyzer::{AnalysisError, AnalysisRequest, AnalysisResult, MatchAnalyzer};
pub use set_score::{set_score_distribution, BestOf, SetScoreDistribution};
pub use staking::{evaluate_stake, StakeContext, StakeDecision, StakingEngine, StakingError};
