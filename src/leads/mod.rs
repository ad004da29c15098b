//! Lead registry: captured leads, their notes, and an audit trail.

pub mod model;
pub mod registry;
pub mod routes;

pub use model::{
    HistoryEntry, Lead, LeadFilter, LeadMetadata, LeadPage, LeadPatch, LeadStatus, LeadSummary,
    NewLead, Note, Pagination,
};
pub use registry::LeadRegistry;
pub use routes::lead_routes;
