//! Chat session data model and broadcast event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::{EngagementSignals, Experience, LeadStage, Recommendation, StageDistribution};

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Ai,
}

/// Lifecycle status of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting messages.
    Active,
    /// Closed by the visitor; kept for stats until purged.
    Ended,
}

/// A single message in a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }
}

/// A chat session and the lead attributes collected during it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub lead_score: u32,
    pub stage: LeadStage,
    pub interests: Vec<String>,
    pub experience: Option<Experience>,
    pub goals: Vec<String>,
    /// Free-form visitor details supplied by the front end.
    pub user_info: serde_json::Map<String, serde_json::Value>,
    pub status: SessionStatus,
}

impl ChatSession {
    /// Create a new active, cold session.
    pub fn new(
        user_id: impl Into<String>,
        user_info: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            start_time: now,
            last_activity: now,
            messages: Vec::new(),
            lead_score: 0,
            stage: LeadStage::Cold,
            interests: Vec::new(),
            experience: None,
            goals: Vec::new(),
            user_info,
            status: SessionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether the session started more than `max_age` before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.start_time) > max_age
    }

    /// Signals for full engagement rescoring.
    pub fn engagement(&self) -> EngagementSignals {
        EngagementSignals {
            message_count: self.messages.len(),
            experience: self.experience,
            goal_count: self.goals.len(),
            interest_count: self.interests.len(),
            last_activity: Some(self.last_activity),
        }
    }

    /// Short form returned when a session is started.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            user_id: self.user_id.clone(),
            start_time: self.start_time,
            stage: self.stage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub stage: LeadStage,
}

/// Lead attributes merged into a session. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadAttributes {
    #[serde(default)]
    pub experience: Option<Experience>,
    #[serde(default)]
    pub goals: Option<Vec<String>>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
    /// Merged key by key into the session's `user_info`.
    #[serde(default)]
    pub user_info: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub status: Option<SessionStatus>,
}

/// Result of posting a message to a session.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReply {
    pub session_id: Uuid,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub lead_score: u32,
    pub stage: LeadStage,
    pub stage_changed: bool,
}

/// Aggregate counters over all sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_leads: usize,
    pub stage_distribution: StageDistribution,
}

/// Events fanned out to WebSocket clients subscribed to a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The bot answered a visitor message.
    AiResponse {
        session_id: Uuid,
        message: String,
        original_message: String,
        timestamp: DateTime<Utc>,
        lead_score: u32,
        stage: LeadStage,
    },
    /// The lead moved to a different funnel stage.
    StageChanged {
        session_id: Uuid,
        from: LeadStage,
        to: LeadStage,
        recommendations: Vec<Recommendation>,
    },
    /// Someone in the session is typing.
    UserTyping {
        session_id: Uuid,
        user_id: Option<String>,
        /// Connection that emitted the event; it is not echoed back there.
        #[serde(skip_serializing)]
        origin: Option<Uuid>,
    },
    SessionEnded {
        session_id: Uuid,
    },
}

impl SessionEvent {
    /// Get the session ID from any variant.
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::AiResponse { session_id, .. }
            | Self::StageChanged { session_id, .. }
            | Self::UserTyping { session_id, .. }
            | Self::SessionEnded { session_id } => *session_id,
        }
    }

    /// Connection that caused the event, if it should not be echoed to it.
    pub fn origin(&self) -> Option<Uuid> {
        match self {
            Self::UserTyping { origin, .. } => *origin,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_cold_and_active() {
        let session = ChatSession::new("user_1", serde_json::Map::new());
        assert_eq!(session.stage, LeadStage::Cold);
        assert_eq!(session.lead_score, 0);
        assert!(session.is_active());
        assert!(session.messages.is_empty());
    }

    #[test]
    fn expiry_measured_from_start() {
        let session = ChatSession::new("user_1", serde_json::Map::new());
        let max_age = chrono::Duration::hours(24);
        assert!(!session.is_expired(session.start_time + chrono::Duration::hours(23), max_age));
        assert!(session.is_expired(session.start_time + chrono::Duration::hours(25), max_age));
    }

    #[test]
    fn typing_event_hides_origin() {
        let event = SessionEvent::UserTyping {
            session_id: Uuid::new_v4(),
            user_id: Some("u".into()),
            origin: Some(Uuid::new_v4()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_typing");
        assert!(json.get("origin").is_none());
        assert!(event.origin().is_some());
    }
}
