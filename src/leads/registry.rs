//! In-memory lead registry with an audit history.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{
    HistoryEntry, Lead, LeadFilter, LeadMetadata, LeadPage, LeadPatch, LeadStatus, LeadSummary,
    NewLead, Note, Pagination,
};
use crate::error::LeadError;
use crate::scoring::{LeadStage, StageDistribution};

/// Page size used when none is requested.
pub const DEFAULT_PAGE_SIZE: usize = 10;
/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const DEFAULT_NOTE_KIND: &str = "general";

#[derive(Default)]
struct LeadBook {
    leads: HashMap<Uuid, Lead>,
    history: Vec<HistoryEntry>,
}

/// Owns every lead captured by the funnel.
pub struct LeadRegistry {
    book: RwLock<LeadBook>,
    retention: chrono::Duration,
    email_pattern: Regex,
}

impl LeadRegistry {
    /// Create a registry that keeps history entries for `retention`.
    pub fn new(retention: std::time::Duration) -> Arc<Self> {
        // Spans beyond chrono's range keep history forever.
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::TimeDelta::MAX);
        Arc::new(Self {
            book: RwLock::new(LeadBook::default()),
            retention,
            email_pattern: Regex::new(EMAIL_PATTERN).expect("built-in email pattern must compile"),
        })
    }

    /// Register a lead. Name and a well-formed, unused email are required.
    pub async fn create(&self, input: NewLead, metadata: LeadMetadata) -> Result<Lead, LeadError> {
        let name = input.name.as_deref().map(str::trim).unwrap_or_default();
        let email = input.email.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() || email.is_empty() {
            return Err(LeadError::MissingFields);
        }
        if !self.email_pattern.is_match(email) {
            return Err(LeadError::InvalidEmail);
        }
        let email = email.to_lowercase();

        let now = Utc::now();
        let mut lead = Lead {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            phone: input
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            experience: input.experience.unwrap_or_default(),
            goals: input.goals,
            interests: input.interests,
            source: input.source.unwrap_or_default(),
            session_id: input.session_id,
            status: LeadStatus::New,
            stage: LeadStage::Cold,
            lead_score: 0,
            created_at: now,
            last_contact: now,
            next_follow_up: now + chrono::Duration::days(1),
            tags: Vec::new(),
            notes: Vec::new(),
            conversion_probability: 0.0,
            metadata,
        };
        lead.rescore();

        {
            let mut book = self.book.write().await;
            if book.leads.values().any(|l| l.email == lead.email) {
                return Err(LeadError::DuplicateEmail);
            }
            book.history.push(HistoryEntry {
                action: "lead_created".into(),
                lead_id: lead.id,
                timestamp: now,
                details: serde_json::json!({
                    "source": lead.source,
                    "experience": lead.experience,
                    "email": lead.email,
                }),
            });
            book.leads.insert(lead.id, lead.clone());
            self.prune_history(&mut book, now);
        }

        info!(
            lead_id = %lead.id,
            source = %lead.source,
            lead_score = lead.lead_score,
            "Lead created"
        );
        Ok(lead)
    }

    /// Leads passing `filter`, highest score first.
    pub async fn list(&self, filter: &LeadFilter) -> Vec<Lead> {
        let book = self.book.read().await;
        let mut leads: Vec<Lead> = book
            .leads
            .values()
            .filter(|l| l.matches(filter))
            .cloned()
            .collect();
        sort_by_score(&mut leads);
        leads
    }

    /// A page of filtered leads, optionally narrowed by a name/email search.
    ///
    /// `page` is 1-based; zero is treated as 1. `limit` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub async fn page(
        &self,
        filter: &LeadFilter,
        search: Option<&str>,
        page: usize,
        limit: usize,
    ) -> LeadPage {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let mut matching = self.list(filter).await;
        if let Some(needle) = search {
            matching.retain(|l| l.matches_search(needle));
        }

        let total = matching.len();
        let start = (page - 1).saturating_mul(limit);
        let end = start.saturating_add(limit);
        let leads = matching.into_iter().skip(start).take(limit).collect();

        LeadPage {
            leads,
            pagination: Pagination {
                current_page: page,
                total_pages: total.div_ceil(limit),
                total_leads: total,
                has_next_page: end < total,
                has_prev_page: page > 1,
            },
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Lead, LeadError> {
        self.book
            .read()
            .await
            .leads
            .get(&id)
            .cloned()
            .ok_or(LeadError::NotFound { id })
    }

    /// Apply a partial update, touch last contact, and rescore.
    pub async fn update(&self, id: Uuid, patch: LeadPatch) -> Result<Lead, LeadError> {
        let details = serde_json::to_value(&patch).unwrap_or_default();

        if let Some(email) = patch.email.as_deref() {
            if !self.email_pattern.is_match(email.trim()) {
                return Err(LeadError::InvalidEmail);
            }
        }

        let mut book = self.book.write().await;
        if let Some(email) = patch.email.as_deref() {
            let email = email.trim().to_lowercase();
            if book.leads.values().any(|l| l.id != id && l.email == email) {
                return Err(LeadError::DuplicateEmail);
            }
        }

        let now = Utc::now();
        let lead = book.leads.get_mut(&id).ok_or(LeadError::NotFound { id })?;
        apply_patch(lead, patch);
        lead.last_contact = now;
        lead.rescore();
        let updated = lead.clone();

        book.history.push(HistoryEntry {
            action: "lead_updated".into(),
            lead_id: id,
            timestamp: now,
            details,
        });
        drop(book);

        info!(
            lead_id = %id,
            lead_score = updated.lead_score,
            stage = %updated.stage,
            "Lead updated"
        );
        Ok(updated)
    }

    /// Attach a note. Notes count toward the score, so the lead is rescored.
    pub async fn add_note(
        &self,
        id: Uuid,
        content: &str,
        kind: Option<&str>,
    ) -> Result<Note, LeadError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(LeadError::EmptyNote);
        }

        let note = Note {
            id: Uuid::new_v4(),
            content: content.to_string(),
            kind: kind
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .unwrap_or(DEFAULT_NOTE_KIND)
                .to_string(),
            timestamp: Utc::now(),
        };

        let mut book = self.book.write().await;
        let lead = book.leads.get_mut(&id).ok_or(LeadError::NotFound { id })?;
        lead.notes.push(note.clone());
        lead.rescore();
        debug!(lead_id = %id, notes = lead.notes.len(), "Note added");
        Ok(note)
    }

    /// Aggregate counts and averages over every lead.
    pub async fn summary(&self) -> LeadSummary {
        let book = self.book.read().await;
        let total = book.leads.len();
        let mut by_stage = StageDistribution::default();
        let mut by_source = BTreeMap::new();
        let mut score_sum = 0u64;

        for lead in book.leads.values() {
            by_stage.record(lead.stage);
            *by_source.entry(lead.source.to_string()).or_insert(0) += 1;
            score_sum += u64::from(lead.lead_score);
        }

        let (average_score, conversion_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                score_sum as f64 / total as f64,
                by_stage.hot as f64 / total as f64 * 100.0,
            )
        };

        LeadSummary {
            total,
            by_stage,
            by_source,
            average_score,
            conversion_rate,
        }
    }

    /// History entries, oldest first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.book.read().await.history.clone()
    }

    fn prune_history(&self, book: &mut LeadBook, now: DateTime<Utc>) {
        let before = book.history.len();
        book.history
            .retain(|entry| now.signed_duration_since(entry.timestamp) <= self.retention);
        let pruned = before - book.history.len();
        if pruned > 0 {
            debug!(count = pruned, "Pruned lead history");
        }
    }
}

fn sort_by_score(leads: &mut [Lead]) {
    leads.sort_by(|a, b| {
        b.lead_score
            .cmp(&a.lead_score)
            .then(a.created_at.cmp(&b.created_at))
    });
}

fn apply_patch(lead: &mut Lead, patch: LeadPatch) {
    if let Some(name) = patch.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        lead.name = name;
    }
    if let Some(email) = patch.email {
        lead.email = email.trim().to_lowercase();
    }
    if let Some(phone) = patch.phone {
        let phone = phone.trim().to_string();
        lead.phone = (!phone.is_empty()).then_some(phone);
    }
    if let Some(experience) = patch.experience {
        lead.experience = experience;
    }
    if let Some(goals) = patch.goals {
        lead.goals = goals;
    }
    if let Some(interests) = patch.interests {
        lead.interests = interests;
    }
    if let Some(source) = patch.source {
        lead.source = source;
    }
    if let Some(status) = patch.status {
        lead.status = status;
    }
    if let Some(tags) = patch.tags {
        lead.tags = tags;
    }
    if let Some(next) = patch.next_follow_up {
        lead.next_follow_up = next;
    }
}
