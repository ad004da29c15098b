//! Lead stages and the attributes that feed the scorer.

use serde::{Deserialize, Serialize};

/// Score at or above which a lead is warm.
pub const WARM_THRESHOLD: u32 = 40;
/// Score at or above which a lead is hot.
pub const HOT_THRESHOLD: u32 = 70;
/// Scores never exceed this.
pub const MAX_SCORE: u32 = 100;

/// Funnel stage, derived from the lead score.
///
/// Progresses Cold → Warm → Hot as the score rises. The stage is never set
/// directly; it is always recomputed from the current score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    Cold,
    Warm,
    Hot,
}

impl LeadStage {
    /// Stage for a score: `>= 70` hot, `>= 40` warm, otherwise cold.
    pub fn from_score(score: u32) -> Self {
        if score >= HOT_THRESHOLD {
            Self::Hot
        } else if score >= WARM_THRESHOLD {
            Self::Warm
        } else {
            Self::Cold
        }
    }

    /// All stages in funnel order.
    pub fn all() -> [LeadStage; 3] {
        [Self::Cold, Self::Warm, Self::Hot]
    }

    /// Whether moving from `self` to `other` goes further down the funnel.
    pub fn is_promotion_to(&self, other: LeadStage) -> bool {
        other.rank() > self.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Cold => 0,
            Self::Warm => 1,
            Self::Hot => 2,
        }
    }
}

impl Default for LeadStage {
    fn default() -> Self {
        Self::Cold
    }
}

impl std::fmt::Display for LeadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Hot => "hot",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LeadStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cold" => Ok(Self::Cold),
            "warm" => Ok(Self::Warm),
            "hot" => Ok(Self::Hot),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Count of leads per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageDistribution {
    pub cold: usize,
    pub warm: usize,
    pub hot: usize,
}

impl StageDistribution {
    pub fn record(&mut self, stage: LeadStage) {
        match stage {
            LeadStage::Cold => self.cold += 1,
            LeadStage::Warm => self.warm += 1,
            LeadStage::Hot => self.hot += 1,
        }
    }

    pub fn count(&self, stage: LeadStage) -> usize {
        match stage {
            LeadStage::Cold => self.cold,
            LeadStage::Warm => self.warm,
            LeadStage::Hot => self.hot,
        }
    }
}

/// Self-reported technical experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Experience {
    Beginner,
    Intermediate,
    Advanced,
}

impl Experience {
    /// Points contributed to a lead score. Intermediate outranks advanced.
    pub fn points(&self) -> u32 {
        match self {
            Self::Beginner => 10,
            Self::Intermediate => 20,
            Self::Advanced => 15,
        }
    }
}

impl Default for Experience {
    fn default() -> Self {
        Self::Beginner
    }
}

/// Where a lead came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LeadSource {
    Chatbot,
    Website,
    Social,
    Other(String),
}

impl LeadSource {
    /// Points contributed to a lead score.
    pub fn points(&self) -> u32 {
        match self {
            Self::Chatbot => 15,
            Self::Website => 10,
            Self::Social => 8,
            Self::Other(_) => 0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Chatbot => "chatbot",
            Self::Website => "website",
            Self::Social => "social",
            Self::Other(s) => s,
        }
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        Self::Chatbot
    }
}

impl From<String> for LeadSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "chatbot" => Self::Chatbot,
            "website" => Self::Website,
            "social" => Self::Social,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for LeadSource {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<LeadSource> for String {
    fn from(source: LeadSource) -> Self {
        source.as_str().to_string()
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_thresholds() {
        assert_eq!(LeadStage::from_score(0), LeadStage::Cold);
        assert_eq!(LeadStage::from_score(39), LeadStage::Cold);
        assert_eq!(LeadStage::from_score(40), LeadStage::Warm);
        assert_eq!(LeadStage::from_score(69), LeadStage::Warm);
        assert_eq!(LeadStage::from_score(70), LeadStage::Hot);
        assert_eq!(LeadStage::from_score(100), LeadStage::Hot);
    }

    #[test]
    fn promotion_ordering() {
        assert!(LeadStage::Cold.is_promotion_to(LeadStage::Warm));
        assert!(LeadStage::Warm.is_promotion_to(LeadStage::Hot));
        assert!(!LeadStage::Hot.is_promotion_to(LeadStage::Cold));
        assert!(!LeadStage::Warm.is_promotion_to(LeadStage::Warm));
    }

    #[test]
    fn stage_round_trips_through_str() {
        for stage in LeadStage::all() {
            assert_eq!(stage.to_string().parse::<LeadStage>().unwrap(), stage);
        }
        assert!("lukewarm".parse::<LeadStage>().is_err());
    }

    #[test]
    fn unknown_source_is_kept_verbatim() {
        let source: LeadSource = serde_json::from_str("\"podcast\"").unwrap();
        assert_eq!(source, LeadSource::Other("podcast".into()));
        assert_eq!(source.points(), 0);
        assert_eq!(serde_json::to_string(&source).unwrap(), "\"podcast\"");
    }

    #[test]
    fn known_sources_parse() {
        let source: LeadSource = serde_json::from_str("\"website\"").unwrap();
        assert_eq!(source, LeadSource::Website);
        assert_eq!(source.points(), 10);
    }
}
