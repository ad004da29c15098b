//! Chat session lifecycle.
//!
//! Every visitor message, whether it arrives over REST or the WebSocket,
//! flows through `SessionManager::post_message`:
//! 1. record the message and bump last activity
//! 2. `Responder` picks a canned reply (keyword rules, no NLU)
//! 3. `ScoringEngine` adds the message's points and restages the lead
//! 4. subscribers of the session receive `ai_response` / `stage_changed`

pub mod manager;
pub mod model;
pub mod responder;
pub mod routes;
pub mod ws;

pub use manager::{SessionManager, StartSession, spawn_sweeper};
pub use model::{
    ChatMessage, ChatSession, LeadAttributes, MessageReply, Sender, SessionEvent, SessionStats,
    SessionStatus,
};
pub use responder::{Intent, Responder};
pub use routes::chat_routes;
pub use ws::chat_ws_routes;
