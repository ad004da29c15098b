//! Canned email templates, campaigns, and a simulated outbox.

pub mod outbox;
pub mod routes;
pub mod templates;

pub use outbox::{
    Campaign, CampaignStatus, EmailAnalytics, EmailPriority, EmailStatus, NewCampaign, Outbox,
    OutboundEmail, SendRequest,
};
pub use routes::email_routes;
pub use templates::{EmailTemplate, NewTemplate, RenderedEmail, TemplateStore};
