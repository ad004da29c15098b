//! Additive lead scoring.
//!
//! Two scoring paths feed the same stage function:
//! - per-message increments while a chat is in progress (`apply_message`)
//! - full recomputation from lead attributes (`session_score`, `lead_score`)
//!
//! Both cap at [`MAX_SCORE`] and derive the stage from the capped score.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::stage::{Experience, LeadSource, LeadStage, MAX_SCORE};

/// Points every chat message earns regardless of content.
pub const BASE_MESSAGE_POINTS: u32 = 2;

/// A keyword group that adds points when a message mentions it.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    /// Short label used in logs.
    pub name: String,
    pub regex: Regex,
    pub points: u32,
}

/// Score and stage after a scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreOutcome {
    pub score: u32,
    pub stage: LeadStage,
    pub previous_stage: LeadStage,
}

impl ScoreOutcome {
    pub fn stage_changed(&self) -> bool {
        self.stage != self.previous_stage
    }
}

/// Engagement signals gathered from a chat session.
#[derive(Debug, Clone, Default)]
pub struct EngagementSignals {
    pub message_count: usize,
    pub experience: Option<Experience>,
    pub goal_count: usize,
    pub interest_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Attributes of a registered lead.
#[derive(Debug, Clone)]
pub struct LeadSignals<'a> {
    pub note_count: usize,
    pub experience: Experience,
    pub goal_count: usize,
    pub interest_count: usize,
    pub source: &'a LeadSource,
}

/// Keyword-driven scorer for chat messages.
pub struct ScoringEngine {
    rules: Vec<KeywordRule>,
}

impl ScoringEngine {
    /// Create an engine with the default keyword weights.
    pub fn default_rules() -> Self {
        let rules = vec![
            keyword_rule("pricing", r"(?i)\b(price|cost)", 5),
            keyword_rule("enrollment", r"(?i)\b(enroll|register)", 10),
            keyword_rule("curriculum", r"(?i)\b(curriculum|syllabus)", 3),
            keyword_rule("career", r"(?i)\b(job|career)", 5),
            keyword_rule("timing", r"(?i)\b(when|start)", 4),
        ];
        Self { rules }
    }

    /// Create an engine that only awards the base points (for testing).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a custom keyword group.
    pub fn add_rule(&mut self, name: &str, pattern: &str, points: u32) -> Result<(), regex::Error> {
        self.rules.push(KeywordRule {
            name: name.into(),
            regex: Regex::new(pattern)?,
            points,
        });
        Ok(())
    }

    /// Points a single message adds: the base plus every matching group once.
    pub fn message_score_delta(&self, message: &str) -> u32 {
        let mut delta = BASE_MESSAGE_POINTS;
        for rule in &self.rules {
            if rule.regex.is_match(message) {
                debug!(rule = %rule.name, points = rule.points, "Message matched scoring keyword");
                delta += rule.points;
            }
        }
        delta
    }

    /// Add a message's points to `score`, capping at 100.
    pub fn apply_message(&self, score: u32, message: &str) -> ScoreOutcome {
        let previous_stage = LeadStage::from_score(score);
        let score = (score + self.message_score_delta(message)).min(MAX_SCORE);
        ScoreOutcome {
            score,
            stage: LeadStage::from_score(score),
            previous_stage,
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::default_rules()
    }
}

fn keyword_rule(name: &str, pattern: &str, points: u32) -> KeywordRule {
    KeywordRule {
        name: name.into(),
        regex: Regex::new(pattern).expect("built-in keyword pattern must compile"),
        points,
    }
}

/// Full engagement score for a chat session as of `now`.
///
/// messages×2 + experience + goals×5 + interests×3 + recency
/// (active within the hour +10, within the day +5), capped at 100.
pub fn session_score(signals: &EngagementSignals, now: DateTime<Utc>) -> u32 {
    let mut score = signals.message_count as u32 * BASE_MESSAGE_POINTS;
    score += signals.experience.map(|e| e.points()).unwrap_or(0);
    score += signals.goal_count as u32 * 5;
    score += signals.interest_count as u32 * 3;

    if let Some(last) = signals.last_activity {
        let idle = now.signed_duration_since(last);
        if idle < chrono::Duration::hours(1) {
            score += 10;
        } else if idle < chrono::Duration::hours(24) {
            score += 5;
        }
    }

    score.min(MAX_SCORE)
}

/// Score for a registered lead.
///
/// notes×3 + experience + goals×5 + interests×3 + source, capped at 100.
pub fn lead_score(signals: &LeadSignals<'_>) -> u32 {
    let score = signals.note_count as u32 * 3
        + signals.experience.points()
        + signals.goal_count as u32 * 5
        + signals.interest_count as u32 * 3
        + signals.source.points();
    score.min(MAX_SCORE)
}

/// Estimated probability that a lead converts, in `[0.1, 0.9]`.
pub fn conversion_probability(stage: LeadStage, note_count: usize, experience: Experience) -> f64 {
    let mut probability = 0.1;

    probability += match stage {
        LeadStage::Hot => 0.4,
        LeadStage::Warm => 0.2,
        LeadStage::Cold => 0.0,
    };

    probability += (note_count as f64 * 0.05).min(0.2);

    if experience == Experience::Intermediate {
        probability += 0.1;
    }

    // Round away float noise so 0.1 + 0.2 reads as 0.3 in JSON.
    ((probability.min(0.9)) * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_earns_base_points() {
        let engine = ScoringEngine::default_rules();
        assert_eq!(engine.message_score_delta("Hello there"), 2);
    }

    #[test]
    fn keyword_groups_are_additive() {
        let engine = ScoringEngine::default_rules();
        // pricing (5) + enrollment (10) + base (2)
        assert_eq!(engine.message_score_delta("What does it cost to register?"), 17);
        // every group at once
        assert_eq!(
            engine.message_score_delta("price, enroll, syllabus, career, when?"),
            2 + 5 + 10 + 3 + 5 + 4
        );
    }

    #[test]
    fn each_group_counts_once() {
        let engine = ScoringEngine::default_rules();
        assert_eq!(engine.message_score_delta("price price cost pricing"), 7);
    }

    #[test]
    fn only_listed_keywords_score() {
        let engine = ScoringEngine::default_rules();
        assert_eq!(engine.message_score_delta("pricing?"), 2);
        assert_eq!(engine.message_score_delta("registration"), 2);
        assert_eq!(engine.message_score_delta("enrolment"), 2);
        // inflections that start with a listed word still count
        assert_eq!(engine.message_score_delta("prices"), 7);
        assert_eq!(engine.message_score_delta("enrollment"), 12);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let engine = ScoringEngine::default_rules();
        assert_eq!(engine.message_score_delta("JOB prospects?"), 7);
    }

    #[test]
    fn keywords_need_a_word_start() {
        let engine = ScoringEngine::default_rules();
        // "restart" contains "start" mid-word
        assert_eq!(engine.message_score_delta("I had to restart my laptop"), 2);
    }

    #[test]
    fn apply_message_caps_and_restages() {
        let engine = ScoringEngine::default_rules();
        let outcome = engine.apply_message(95, "I want to register");
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.stage, LeadStage::Hot);
        assert_eq!(outcome.previous_stage, LeadStage::Hot);
        assert!(!outcome.stage_changed());
    }

    #[test]
    fn apply_message_reports_stage_change() {
        let engine = ScoringEngine::default_rules();
        let outcome = engine.apply_message(35, "how do I enroll?");
        assert_eq!(outcome.score, 47);
        assert_eq!(outcome.previous_stage, LeadStage::Cold);
        assert_eq!(outcome.stage, LeadStage::Warm);
        assert!(outcome.stage_changed());
    }

    #[test]
    fn custom_rule_adds_points() {
        let mut engine = ScoringEngine::empty();
        engine.add_rule("spark", r"(?i)\bspark\b", 7).unwrap();
        assert_eq!(engine.message_score_delta("Do you teach Spark?"), 9);
        assert_eq!(engine.message_score_delta("price"), 2);
    }

    #[test]
    fn session_score_components() {
        let now = Utc::now();
        let signals = EngagementSignals {
            message_count: 4,
            experience: Some(Experience::Intermediate),
            goal_count: 2,
            interest_count: 3,
            last_activity: Some(now - chrono::Duration::minutes(5)),
        };
        // 8 + 20 + 10 + 9 + 10
        assert_eq!(session_score(&signals, now), 57);
    }

    #[test]
    fn session_recency_bonus_decays() {
        let now = Utc::now();
        let mut signals = EngagementSignals {
            last_activity: Some(now - chrono::Duration::hours(3)),
            ..Default::default()
        };
        assert_eq!(session_score(&signals, now), 5);

        signals.last_activity = Some(now - chrono::Duration::hours(30));
        assert_eq!(session_score(&signals, now), 0);

        signals.last_activity = None;
        assert_eq!(session_score(&signals, now), 0);
    }

    #[test]
    fn session_score_is_capped() {
        let now = Utc::now();
        let signals = EngagementSignals {
            message_count: 200,
            ..Default::default()
        };
        assert_eq!(session_score(&signals, now), 100);
    }

    #[test]
    fn lead_score_components() {
        let source = LeadSource::Chatbot;
        let signals = LeadSignals {
            note_count: 2,
            experience: Experience::Advanced,
            goal_count: 1,
            interest_count: 2,
            source: &source,
        };
        // 6 + 15 + 5 + 6 + 15
        assert_eq!(lead_score(&signals), 47);
    }

    #[test]
    fn lead_score_unknown_source_earns_nothing() {
        let source = LeadSource::Other("billboard".into());
        let signals = LeadSignals {
            note_count: 0,
            experience: Experience::Beginner,
            goal_count: 0,
            interest_count: 0,
            source: &source,
        };
        assert_eq!(lead_score(&signals), 10);
    }

    #[test]
    fn conversion_probability_bounds() {
        assert_eq!(conversion_probability(LeadStage::Cold, 0, Experience::Beginner), 0.1);
        assert_eq!(conversion_probability(LeadStage::Warm, 0, Experience::Beginner), 0.3);
        assert_eq!(
            conversion_probability(LeadStage::Hot, 2, Experience::Intermediate),
            0.7
        );
        // notes contribution caps at 0.2, total caps at 0.9
        assert_eq!(
            conversion_probability(LeadStage::Hot, 50, Experience::Intermediate),
            0.8
        );
    }
}
