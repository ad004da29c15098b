//! Funnel analytics: visitor, lead, and conversion tracking.

pub mod routes;
pub mod tracker;

pub use routes::analytics_routes;
pub use tracker::{
    AbTestResults, Conversion, ConversionEvent, Counts, DateRange, FunnelReport, FunnelTracker,
    Insight, InsightKind, InsightsReport, LeadEvent, RealtimeMetrics, TrackedLead, Visitor,
    VisitorEvent, ab_tests,
};
