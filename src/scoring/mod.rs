//! Lead scoring and stage transitions.
//!
//! Consumes chat messages and lead attributes, emits a score in `[0, 100]`,
//! the funnel stage derived from it, and stage-specific recommendations.

pub mod engine;
pub mod recommend;
pub mod stage;

pub use engine::{
    EngagementSignals, LeadSignals, ScoreOutcome, ScoringEngine, conversion_probability,
    lead_score, session_score,
};
pub use recommend::{Priority, Recommendation, RecommendationKind, recommendations};
pub use stage::{Experience, LeadSource, LeadStage, StageDistribution};
