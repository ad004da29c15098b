//! Session manager: in-memory chat sessions with broadcast to WebSocket clients.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{
    ChatMessage, ChatSession, LeadAttributes, MessageReply, Sender, SessionEvent, SessionStats,
    SessionStatus,
};
use super::responder::Responder;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::scoring::{self, LeadStage, Recommendation, ScoringEngine};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Request to open a new chat session.
#[derive(Debug, Clone, Default)]
pub struct StartSession {
    pub user_id: Option<String>,
    pub user_info: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<Uuid, ChatSession>,
    /// Latest session per user id.
    users: HashMap<String, Uuid>,
}

/// Owns every chat session and drives scoring as messages arrive.
pub struct SessionManager {
    table: RwLock<SessionTable>,
    scoring: ScoringEngine,
    responder: Responder,
    max_age: chrono::Duration,
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager with the default scoring and responder rules.
    pub fn new(config: &SessionConfig) -> Arc<Self> {
        Self::with_rules(
            config,
            ScoringEngine::default_rules(),
            Responder::default_rules(),
        )
    }

    /// Create a manager with custom rules.
    pub fn with_rules(
        config: &SessionConfig,
        scoring: ScoringEngine,
        responder: Responder,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        // Spans beyond chrono's range never expire.
        let max_age =
            chrono::Duration::from_std(config.max_age).unwrap_or(chrono::TimeDelta::MAX);
        Arc::new(Self {
            table: RwLock::new(SessionTable::default()),
            scoring,
            responder,
            max_age,
            tx,
        })
    }

    /// Subscribe to session events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Open a new session. Requires a user id or user info.
    ///
    /// Missing user ids are generated. Expired sessions are purged as a side
    /// effect.
    pub async fn start(&self, request: StartSession) -> Result<ChatSession, SessionError> {
        let user_id = request.user_id.filter(|id| !id.trim().is_empty());
        if user_id.is_none() && request.user_info.is_none() {
            return Err(SessionError::MissingUser);
        }

        let user_id = user_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = ChatSession::new(user_id, request.user_info.unwrap_or_default());

        {
            let mut table = self.table.write().await;
            table
                .users
                .insert(session.user_id.clone(), session.session_id);
            table.sessions.insert(session.session_id, session.clone());
        }

        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            "Chat session started"
        );

        self.cleanup_expired_at(Utc::now()).await;
        Ok(session)
    }

    /// Get a snapshot of a session.
    pub async fn get(&self, session_id: Uuid) -> Result<ChatSession, SessionError> {
        self.table
            .read()
            .await
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::NotFound { id: session_id })
    }

    /// Whether a session exists.
    pub async fn contains(&self, session_id: Uuid) -> bool {
        self.table.read().await.sessions.contains_key(&session_id)
    }

    /// Record a visitor message, answer it, and rescore the lead.
    ///
    /// The score moves by the message's keyword increment, not a full
    /// recomputation.
    pub async fn post_message(
        &self,
        session_id: Uuid,
        text: &str,
    ) -> Result<MessageReply, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let (reply, outcome) = {
            let mut table = self.table.write().await;
            let session = table
                .sessions
                .get_mut(&session_id)
                .ok_or(SessionError::NotFound { id: session_id })?;

            if !session.is_active() {
                warn!(session_id = %session_id, "Message rejected for ended session");
                return Err(SessionError::Ended { id: session_id });
            }

            session.last_activity = Utc::now();
            session.messages.push(ChatMessage::new(text, Sender::User));

            let reply = ChatMessage::new(self.responder.respond(text), Sender::Ai);
            session.messages.push(reply.clone());

            let outcome = self.scoring.apply_message(session.lead_score, text);
            session.lead_score = outcome.score;
            session.stage = outcome.stage;

            (reply, outcome)
        };

        debug!(
            session_id = %session_id,
            lead_score = outcome.score,
            stage = %outcome.stage,
            "Message scored"
        );

        // Ok if no receivers are listening yet
        let _ = self.tx.send(SessionEvent::AiResponse {
            session_id,
            message: reply.text.clone(),
            original_message: text.to_string(),
            timestamp: reply.timestamp,
            lead_score: outcome.score,
            stage: outcome.stage,
        });

        if outcome.stage_changed() {
            self.announce_stage_change(session_id, outcome.previous_stage, outcome.stage);
        }

        Ok(MessageReply {
            session_id,
            message: reply.text,
            timestamp: reply.timestamp,
            lead_score: outcome.score,
            stage: outcome.stage,
            stage_changed: outcome.stage_changed(),
        })
    }

    /// Merge lead attributes into a session and recompute its full score.
    pub async fn update_lead(
        &self,
        session_id: Uuid,
        attributes: LeadAttributes,
    ) -> Result<ChatSession, SessionError> {
        let (updated, previous_stage) = {
            let mut table = self.table.write().await;
            let session = table
                .sessions
                .get_mut(&session_id)
                .ok_or(SessionError::NotFound { id: session_id })?;

            if let Some(experience) = attributes.experience {
                session.experience = Some(experience);
            }
            if let Some(goals) = attributes.goals {
                session.goals = goals;
            }
            if let Some(interests) = attributes.interests {
                session.interests = interests;
            }
            if let Some(info) = attributes.user_info {
                session.user_info.extend(info);
            }
            if let Some(status) = attributes.status {
                session.status = status;
            }

            let previous_stage = session.stage;
            session.lead_score = scoring::session_score(&session.engagement(), Utc::now());
            session.stage = LeadStage::from_score(session.lead_score);

            (session.clone(), previous_stage)
        };

        info!(
            session_id = %session_id,
            lead_score = updated.lead_score,
            stage = %updated.stage,
            "Lead information updated"
        );

        if updated.stage != previous_stage {
            self.announce_stage_change(session_id, previous_stage, updated.stage);
        }

        Ok(updated)
    }

    /// Recommendations for the session's current stage.
    pub async fn recommendations(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Recommendation>, SessionError> {
        let session = self.get(session_id).await?;
        Ok(scoring::recommendations(session.stage))
    }

    /// Mark a session as ended. Ending twice is a no-op.
    pub async fn end(&self, session_id: Uuid) -> Result<ChatSession, SessionError> {
        let ended = {
            let mut table = self.table.write().await;
            let session = table
                .sessions
                .get_mut(&session_id)
                .ok_or(SessionError::NotFound { id: session_id })?;
            if !session.is_active() {
                return Ok(session.clone());
            }
            session.status = SessionStatus::Ended;
            session.clone()
        };

        info!(session_id = %session_id, "Chat session ended");
        let _ = self.tx.send(SessionEvent::SessionEnded { session_id });
        Ok(ended)
    }

    /// Relay a typing indicator to the other clients in a session.
    pub async fn notify_typing(
        &self,
        session_id: Uuid,
        user_id: Option<String>,
        origin: Option<Uuid>,
    ) -> Result<(), SessionError> {
        if !self.contains(session_id).await {
            return Err(SessionError::NotFound { id: session_id });
        }
        let _ = self.tx.send(SessionEvent::UserTyping {
            session_id,
            user_id,
            origin,
        });
        Ok(())
    }

    /// Counters over all sessions.
    pub async fn stats(&self) -> SessionStats {
        let table = self.table.read().await;
        let mut stats = SessionStats {
            total_sessions: table.sessions.len(),
            total_leads: table.users.len(),
            ..Default::default()
        };
        for session in table.sessions.values() {
            if session.is_active() {
                stats.active_sessions += 1;
            }
            stats.stage_distribution.record(session.stage);
        }
        stats
    }

    /// Purge sessions that started more than the max age before `now`.
    /// Returns the number of sessions removed.
    pub async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut table = self.table.write().await;
        let expired: Vec<(Uuid, String)> = table
            .sessions
            .values()
            .filter(|s| s.is_expired(now, self.max_age))
            .map(|s| (s.session_id, s.user_id.clone()))
            .collect();

        for (session_id, user_id) in &expired {
            table.sessions.remove(session_id);
            // Only drop the user index if it still points at this session
            if table.users.get(user_id) == Some(session_id) {
                table.users.remove(user_id);
            }
            debug!(session_id = %session_id, "Session expired");
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Purged expired chat sessions");
        }

        expired.len()
    }

    fn announce_stage_change(&self, session_id: Uuid, from: LeadStage, to: LeadStage) {
        info!(session_id = %session_id, from = %from, to = %to, "Lead stage changed");
        let _ = self.tx.send(SessionEvent::StageChanged {
            session_id,
            from,
            to,
            recommendations: scoring::recommendations(to),
        });
    }
}

/// Spawn a background task that periodically purges expired sessions.
pub fn spawn_sweeper(
    manager: Arc<SessionManager>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            manager.cleanup_expired_at(Utc::now()).await;
        }
    })
}
