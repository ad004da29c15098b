//! Lead funnel backend: rule-based chatbot sessions, lead scoring, canned
//! email, and funnel analytics, all held in memory.

pub mod analytics;
pub mod chat;
pub mod config;
pub mod email;
pub mod error;
pub mod leads;
pub mod scoring;
pub mod server;
