//! Next-step recommendations per funnel stage.

use serde::{Deserialize, Serialize};

use super::stage::LeadStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Content,
    Registration,
    Upsell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A suggested next step for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

impl Recommendation {
    fn high(kind: RecommendationKind, title: &str, description: &str) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
            priority: Priority::High,
        }
    }
}

/// Recommendations for a lead at `stage`.
pub fn recommendations(stage: LeadStage) -> Vec<Recommendation> {
    let rec = match stage {
        LeadStage::Cold => Recommendation::high(
            RecommendationKind::Content,
            "Data Engineering Fundamentals",
            "Start with our beginner-friendly introduction",
        ),
        LeadStage::Warm => Recommendation::high(
            RecommendationKind::Registration,
            "Free Masterclass Registration",
            "Join our upcoming live session",
        ),
        LeadStage::Hot => Recommendation::high(
            RecommendationKind::Upsell,
            "Premium Data Engineering Course",
            "Take your skills to the next level",
        ),
    };
    vec![rec]
}
