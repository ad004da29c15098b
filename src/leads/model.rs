//! Lead data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::{self, Experience, LeadSignals, LeadSource, LeadStage};

/// Sales status of a lead, independent of its scored stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

/// A note attached to a lead by the sales team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

/// Request metadata captured when a lead is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub referrer: Option<String>,
}

/// A registered lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub experience: Experience,
    pub goals: Vec<String>,
    pub interests: Vec<String>,
    pub source: LeadSource,
    pub session_id: Option<String>,
    pub status: LeadStatus,
    pub stage: LeadStage,
    pub lead_score: u32,
    pub created_at: DateTime<Utc>,
    pub last_contact: DateTime<Utc>,
    pub next_follow_up: DateTime<Utc>,
    pub tags: Vec<String>,
    pub notes: Vec<Note>,
    pub conversion_probability: f64,
    pub metadata: LeadMetadata,
}

impl Lead {
    /// Recompute score, stage, and conversion probability from attributes.
    pub fn rescore(&mut self) {
        self.lead_score = scoring::lead_score(&LeadSignals {
            note_count: self.notes.len(),
            experience: self.experience,
            goal_count: self.goals.len(),
            interest_count: self.interests.len(),
            source: &self.source,
        });
        self.stage = LeadStage::from_score(self.lead_score);
        self.conversion_probability =
            scoring::conversion_probability(self.stage, self.notes.len(), self.experience);
    }

    /// Short form returned on creation.
    pub fn brief(&self) -> LeadBrief {
        LeadBrief {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            stage: self.stage,
            lead_score: self.lead_score,
            created_at: self.created_at,
        }
    }

    /// Whether the lead passes every filter that is set.
    pub fn matches(&self, filter: &LeadFilter) -> bool {
        filter.stage.is_none_or(|s| self.stage == s)
            && filter.status.is_none_or(|s| self.status == s)
            && filter.source.as_ref().is_none_or(|s| &self.source == s)
    }

    /// Case-insensitive substring match on name or email.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle) || self.email.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadBrief {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub stage: LeadStage,
    pub lead_score: u32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a lead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLead {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub experience: Option<Experience>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub source: Option<LeadSource>,
    pub session_id: Option<String>,
}

/// Partial update for a lead. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Experience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LeadSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_follow_up: Option<DateTime<Utc>>,
}

/// Equality filters for listing leads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadFilter {
    pub stage: Option<LeadStage>,
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
}

/// Pagination block returned with a page of leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_leads: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// A page of leads.
#[derive(Debug, Clone, Serialize)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub pagination: Pagination,
}

/// An audit entry for lead changes.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub action: String,
    pub lead_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
}

/// Aggregates over all leads.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSummary {
    pub total: usize,
    pub by_stage: scoring::StageDistribution,
    pub by_source: std::collections::BTreeMap<String, usize>,
    pub average_score: f64,
    /// Percentage of leads that reached the hot stage.
    pub conversion_rate: f64,
}
