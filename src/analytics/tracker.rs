//! Funnel event tracking: visitors, leads, and conversions.
//!
//! Reports are plain counts and ratios over the recorded events.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::scoring::{LeadStage, Priority};

/// Range used by `funnel` when no start date is given.
pub const DEFAULT_RANGE_DAYS: u64 = 30;
/// Longest range a funnel report may cover.
pub const MAX_RANGE_DAYS: i64 = 366;
/// Visitor-to-lead rate (percent) below which an optimization insight is raised.
pub const LOW_CONVERSION_PERCENT: f64 = 5.0;

const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, Serialize)]
pub struct Visitor {
    pub id: String,
    pub source: Option<String>,
    pub page: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Set once the visitor becomes a lead.
    pub lead_id: Option<String>,
}

impl Visitor {
    fn source_key(&self) -> &str {
        self.source.as_deref().unwrap_or(UNKNOWN_SOURCE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedLead {
    pub lead_id: String,
    pub visitor_id: Option<String>,
    pub stage: Option<LeadStage>,
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub id: String,
    pub lead_id: Option<String>,
    pub event_type: Option<String>,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitorEvent {
    pub source: Option<String>,
    pub page: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadEvent {
    pub visitor_id: Option<String>,
    pub lead_id: Option<String>,
    pub stage: Option<LeadStage>,
    pub source: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionEvent {
    pub lead_id: Option<String>,
    pub event_type: Option<String>,
    pub value: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Visitor/lead/conversion counts for some slice of time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub visitors: usize,
    pub leads: usize,
    pub conversions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelMetrics {
    pub visitors: usize,
    pub leads: usize,
    pub conversions: usize,
    pub visitor_to_lead_rate: f64,
    pub lead_to_conversion_rate: f64,
    pub overall_conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Resolve optional `YYYY-MM-DD` or RFC 3339 bounds against `today`.
    ///
    /// Missing end is today; missing start is thirty days before the end.
    pub fn resolve(
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self, AnalyticsError> {
        let end = match end {
            Some(raw) => parse_date(raw)?,
            None => today,
        };
        let start = match start {
            Some(raw) => parse_date(raw)?,
            None => end
                .checked_sub_days(Days::new(DEFAULT_RANGE_DAYS))
                .ok_or_else(|| AnalyticsError::InvalidDate {
                    value: end.to_string(),
                })?,
        };
        if start > end {
            return Err(AnalyticsError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_RANGE_DAYS {
            return Err(AnalyticsError::RangeTooLong {
                days,
                max: MAX_RANGE_DAYS,
            });
        }
        Ok(Self { start, end })
    }

    /// Whether `ts` falls on a day inside the range, bounds included.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let day = ts.date_naive();
        day >= self.start && day <= self.end
    }

    fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take_while({
            let end = self.end;
            move |d| *d <= end
        })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, AnalyticsError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| AnalyticsError::InvalidDate {
            value: raw.to_string(),
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelReport {
    pub funnel: FunnelMetrics,
    pub source_breakdown: BTreeMap<String, usize>,
    /// Keyed by `YYYY-MM-DD`; every day in the range is present.
    pub daily_trends: BTreeMap<String, Counts>,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMetrics {
    pub current_hour: Counts,
    pub last_24_hours: Counts,
    /// Visitors seen in the last 30 minutes.
    pub active_sessions: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Performance,
    Timing,
    Optimization,
}

#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePerformance {
    pub visitors: usize,
    pub leads: usize,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightsReport {
    pub insights: Vec<Insight>,
    pub source_performance: BTreeMap<String, SourcePerformance>,
    /// Visitors per UTC hour, hours without visitors omitted.
    pub hourly_performance: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    pub visitors: u32,
    pub leads: u32,
    pub conversion_rate: f64,
}

impl Variant {
    fn new(visitors: u32, leads: u32) -> Self {
        let rate = f64::from(leads) / f64::from(visitors) * 100.0;
        Self {
            visitors,
            leads,
            conversion_rate: (rate * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AbTest {
    pub variant_a: Variant,
    pub variant_b: Variant,
    pub winner: &'static str,
    pub confidence: f64,
}

impl AbTest {
    fn new(variant_a: Variant, variant_b: Variant, confidence: f64) -> Self {
        let winner = if variant_b.conversion_rate > variant_a.conversion_rate {
            "B"
        } else {
            "A"
        };
        Self {
            variant_a,
            variant_b,
            winner,
            confidence,
        }
    }
}

/// Sample experiment results shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct AbTestResults {
    pub landing_page: AbTest,
    pub chatbot: AbTest,
}

/// Fixed sample results; no experiments are actually run.
pub fn ab_tests() -> AbTestResults {
    AbTestResults {
        landing_page: AbTest::new(Variant::new(150, 12), Variant::new(145, 18), 95.2),
        chatbot: AbTest::new(Variant::new(200, 25), Variant::new(195, 32), 98.7),
    }
}

#[derive(Default)]
struct FunnelData {
    visitors: Vec<Visitor>,
    leads: Vec<TrackedLead>,
    conversions: Vec<Conversion>,
}

/// Records funnel events and answers reporting queries over them.
#[derive(Default)]
pub struct FunnelTracker {
    data: RwLock<FunnelData>,
}

impl FunnelTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn track_visitor(&self, event: VisitorEvent) -> Visitor {
        let visitor = Visitor {
            id: format!("visitor_{}", Uuid::new_v4().simple()),
            source: event.source,
            page: event.page,
            user_agent: event.user_agent,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            lead_id: None,
        };
        self.data.write().await.visitors.push(visitor.clone());
        debug!(visitor_id = %visitor.id, source = visitor.source_key(), "Visitor tracked");
        visitor
    }

    /// Record a lead and link it to its visitor when the visitor is known.
    pub async fn track_lead(&self, event: LeadEvent) -> TrackedLead {
        let lead = TrackedLead {
            lead_id: event
                .lead_id
                .unwrap_or_else(|| format!("lead_{}", Uuid::new_v4().simple())),
            visitor_id: event.visitor_id,
            stage: event.stage,
            source: event.source,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
        };

        let mut data = self.data.write().await;
        if let Some(visitor_id) = lead.visitor_id.as_deref() {
            if let Some(visitor) = data.visitors.iter_mut().find(|v| v.id == visitor_id) {
                visitor.lead_id = Some(lead.lead_id.clone());
            }
        }
        data.leads.push(lead.clone());
        debug!(lead_id = %lead.lead_id, "Lead tracked");
        lead
    }

    pub async fn track_conversion(&self, event: ConversionEvent) -> Conversion {
        let conversion = Conversion {
            id: format!("conv_{}", Uuid::new_v4().simple()),
            lead_id: event.lead_id,
            event_type: event.event_type,
            value: event.value,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
        };
        self.data.write().await.conversions.push(conversion.clone());
        debug!(conversion_id = %conversion.id, "Conversion tracked");
        conversion
    }

    /// Funnel counts, rates, sources, and per-day trends within `range`.
    pub async fn funnel(&self, range: DateRange) -> FunnelReport {
        let data = self.data.read().await;
        let visitors: Vec<&Visitor> =
            data.visitors.iter().filter(|v| range.contains(v.timestamp)).collect();
        let leads: Vec<&TrackedLead> =
            data.leads.iter().filter(|l| range.contains(l.timestamp)).collect();
        let conversions: Vec<&Conversion> = data
            .conversions
            .iter()
            .filter(|c| range.contains(c.timestamp))
            .collect();

        let mut source_breakdown = BTreeMap::new();
        for visitor in &visitors {
            *source_breakdown
                .entry(visitor.source_key().to_string())
                .or_insert(0) += 1;
        }

        let mut daily_trends: BTreeMap<String, Counts> = range
            .days()
            .map(|d| (d.format("%Y-%m-%d").to_string(), Counts::default()))
            .collect();
        let day_key = |ts: DateTime<Utc>| ts.date_naive().format("%Y-%m-%d").to_string();
        for v in &visitors {
            if let Some(c) = daily_trends.get_mut(&day_key(v.timestamp)) {
                c.visitors += 1;
            }
        }
        for l in &leads {
            if let Some(c) = daily_trends.get_mut(&day_key(l.timestamp)) {
                c.leads += 1;
            }
        }
        for conv in &conversions {
            if let Some(c) = daily_trends.get_mut(&day_key(conv.timestamp)) {
                c.conversions += 1;
            }
        }

        FunnelReport {
            funnel: FunnelMetrics {
                visitors: visitors.len(),
                leads: leads.len(),
                conversions: conversions.len(),
                visitor_to_lead_rate: percent(leads.len(), visitors.len()),
                lead_to_conversion_rate: percent(conversions.len(), leads.len()),
                overall_conversion_rate: percent(conversions.len(), visitors.len()),
            },
            source_breakdown,
            daily_trends,
            date_range: range,
        }
    }

    /// Activity in the hour and day before `now`.
    pub async fn realtime(&self, now: DateTime<Utc>) -> RealtimeMetrics {
        let data = self.data.read().await;
        let since = |cutoff: DateTime<Utc>| Counts {
            visitors: data.visitors.iter().filter(|v| v.timestamp > cutoff).count(),
            leads: data.leads.iter().filter(|l| l.timestamp > cutoff).count(),
            conversions: data
                .conversions
                .iter()
                .filter(|c| c.timestamp > cutoff)
                .count(),
        };

        RealtimeMetrics {
            current_hour: since(now - Duration::hours(1)),
            last_24_hours: since(now - Duration::hours(24)),
            active_sessions: since(now - Duration::minutes(30)).visitors,
            timestamp: now,
        }
    }

    /// Best source, peak hour, and a low-conversion warning over all events.
    pub async fn insights(&self) -> InsightsReport {
        let data = self.data.read().await;
        let mut insights = Vec::new();

        let mut source_performance: BTreeMap<String, SourcePerformance> = BTreeMap::new();
        for visitor in &data.visitors {
            let entry = source_performance
                .entry(visitor.source_key().to_string())
                .or_insert(SourcePerformance {
                    visitors: 0,
                    leads: 0,
                    conversion_rate: 0.0,
                });
            entry.visitors += 1;
        }
        for lead in &data.leads {
            let source = lead.visitor_id.as_deref().and_then(|id| {
                data.visitors
                    .iter()
                    .find(|v| v.id == id)
                    .map(Visitor::source_key)
            });
            if let Some(perf) = source.and_then(|s| source_performance.get_mut(s)) {
                perf.leads += 1;
            }
        }
        for perf in source_performance.values_mut() {
            perf.conversion_rate = percent(perf.leads, perf.visitors);
        }

        let best = source_performance.iter().fold(
            None::<(&String, &SourcePerformance)>,
            |best, (source, perf)| match best {
                Some((_, b)) if b.conversion_rate >= perf.conversion_rate => best,
                _ => Some((source, perf)),
            },
        );
        if let Some((source, perf)) = best {
            insights.push(Insight {
                kind: InsightKind::Performance,
                title: "Best Performing Source".into(),
                description: format!(
                    "{source} has the highest conversion rate at {:.1}%",
                    perf.conversion_rate
                ),
                priority: Priority::High,
            });
        }

        let mut hourly_performance: BTreeMap<u32, usize> = BTreeMap::new();
        for visitor in &data.visitors {
            *hourly_performance.entry(visitor.timestamp.hour()).or_insert(0) += 1;
        }
        let peak = hourly_performance
            .iter()
            .fold(None::<(u32, usize)>, |peak, (&hour, &count)| match peak {
                Some((_, best)) if best >= count => peak,
                _ => Some((hour, count)),
            });
        if let Some((hour, count)) = peak {
            insights.push(Insight {
                kind: InsightKind::Timing,
                title: "Peak Traffic Hour".into(),
                description: format!("Hour {hour}:00 sees the most visitors ({count} visitors)"),
                priority: Priority::Medium,
            });
        }

        if !data.visitors.is_empty() {
            let rate = percent(data.leads.len(), data.visitors.len());
            if rate < LOW_CONVERSION_PERCENT {
                insights.push(Insight {
                    kind: InsightKind::Optimization,
                    title: "Low Lead Conversion".into(),
                    description: format!(
                        "Only {rate:.1}% of visitors become leads. Consider improving your \
                         landing page or chatbot engagement."
                    ),
                    priority: Priority::High,
                });
            }
        }

        InsightsReport {
            insights,
            source_performance,
            hourly_performance,
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn visitor(source: &str, ts: DateTime<Utc>) -> VisitorEvent {
        VisitorEvent {
            source: Some(source.into()),
            timestamp: Some(ts),
            ..Default::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn range_defaults_to_last_thirty_days() {
        let range = DateRange::resolve(None, None, date("2026-03-31")).unwrap();
        assert_eq!(range.start, date("2026-03-01"));
        assert_eq!(range.end, date("2026-03-31"));
        assert_eq!(range.days().count(), 31);
    }

    #[test]
    fn range_near_calendar_limits_is_an_error() {
        let earliest = NaiveDate::MIN.format("%Y-%m-%d").to_string();
        assert!(matches!(
            DateRange::resolve(None, Some(&earliest), date("2026-03-31")),
            Err(AnalyticsError::InvalidDate { .. })
        ));
        // explicit bounds at the edges resolve without overflowing
        let range = DateRange::resolve(Some(&earliest), Some(&earliest), date("2026-03-31")).unwrap();
        assert_eq!(range.days().count(), 1);
    }

    #[test]
    fn range_accepts_rfc3339_and_rejects_garbage() {
        let range = DateRange::resolve(
            Some("2026-01-05T23:30:00Z"),
            Some("2026-01-07"),
            date("2026-03-31"),
        )
        .unwrap();
        assert_eq!(range.start, date("2026-01-05"));

        assert!(matches!(
            DateRange::resolve(Some("yesterday"), None, date("2026-03-31")),
            Err(AnalyticsError::InvalidDate { .. })
        ));
        assert!(matches!(
            DateRange::resolve(Some("2026-02-01"), Some("2026-01-01"), date("2026-03-31")),
            Err(AnalyticsError::InvalidRange { .. })
        ));
        assert!(matches!(
            DateRange::resolve(Some("2020-01-01"), Some("2026-01-01"), date("2026-03-31")),
            Err(AnalyticsError::RangeTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn funnel_counts_within_inclusive_days() {
        let tracker = FunnelTracker::new();
        let v1 = tracker.track_visitor(visitor("google", at(2026, 1, 1, 0))).await;
        tracker.track_visitor(visitor("google", at(2026, 1, 3, 23))).await;
        tracker.track_visitor(visitor("facebook", at(2026, 1, 2, 12))).await;
        tracker.track_visitor(visitor("google", at(2026, 1, 4, 0))).await;
        tracker
            .track_lead(LeadEvent {
                visitor_id: Some(v1.id.clone()),
                lead_id: Some("lead-1".into()),
                timestamp: Some(at(2026, 1, 2, 9)),
                ..Default::default()
            })
            .await;
        tracker
            .track_conversion(ConversionEvent {
                lead_id: Some("lead-1".into()),
                event_type: Some("registration".into()),
                timestamp: Some(at(2026, 1, 3, 9)),
                ..Default::default()
            })
            .await;

        let range = DateRange::resolve(Some("2026-01-01"), Some("2026-01-03"), date("2026-03-31"))
            .unwrap();
        let report = tracker.funnel(range).await;

        assert_eq!(report.funnel.visitors, 3);
        assert_eq!(report.funnel.leads, 1);
        assert_eq!(report.funnel.conversions, 1);
        assert!((report.funnel.visitor_to_lead_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.funnel.lead_to_conversion_rate, 100.0);
        assert_eq!(report.source_breakdown["google"], 2);
        assert_eq!(report.source_breakdown["facebook"], 1);

        assert_eq!(report.daily_trends.len(), 3);
        assert_eq!(
            report.daily_trends["2026-01-02"],
            Counts {
                visitors: 1,
                leads: 1,
                conversions: 0,
            }
        );
        assert_eq!(report.daily_trends["2026-01-03"].conversions, 1);
    }

    #[tokio::test]
    async fn empty_funnel_has_zero_rates() {
        let tracker = FunnelTracker::new();
        let range = DateRange::resolve(None, None, Utc::now().date_naive()).unwrap();
        let report = tracker.funnel(range).await;
        assert_eq!(report.funnel.visitor_to_lead_rate, 0.0);
        assert_eq!(report.funnel.overall_conversion_rate, 0.0);
        assert!(report.daily_trends.values().all(|c| *c == Counts::default()));
    }

    #[tokio::test]
    async fn track_lead_links_visitor() {
        let tracker = FunnelTracker::new();
        let v = tracker.track_visitor(VisitorEvent::default()).await;
        assert!(v.id.starts_with("visitor_"));
        tracker
            .track_lead(LeadEvent {
                visitor_id: Some(v.id.clone()),
                lead_id: Some("lead-9".into()),
                ..Default::default()
            })
            .await;
        let data = tracker.data.read().await;
        assert_eq!(data.visitors[0].lead_id.as_deref(), Some("lead-9"));
    }

    #[tokio::test]
    async fn realtime_windows() {
        let tracker = FunnelTracker::new();
        let now = at(2026, 5, 10, 12);
        tracker.track_visitor(visitor("a", now - Duration::minutes(10))).await;
        tracker.track_visitor(visitor("a", now - Duration::minutes(45))).await;
        tracker.track_visitor(visitor("a", now - Duration::hours(5))).await;
        tracker.track_visitor(visitor("a", now - Duration::hours(30))).await;
        tracker
            .track_conversion(ConversionEvent {
                timestamp: Some(now - Duration::hours(2)),
                ..Default::default()
            })
            .await;

        let rt = tracker.realtime(now).await;
        assert_eq!(rt.current_hour.visitors, 2);
        assert_eq!(rt.current_hour.conversions, 0);
        assert_eq!(rt.last_24_hours.visitors, 3);
        assert_eq!(rt.last_24_hours.conversions, 1);
        assert_eq!(rt.active_sessions, 1);
    }

    #[tokio::test]
    async fn insights_pick_best_source_and_peak_hour() {
        let tracker = FunnelTracker::new();
        let mut search_ids = Vec::new();
        for _ in 0..2 {
            search_ids.push(tracker.track_visitor(visitor("search", at(2026, 1, 1, 9))).await.id);
        }
        tracker.track_visitor(visitor("social", at(2026, 1, 1, 14))).await;
        tracker.track_visitor(visitor("social", at(2026, 1, 2, 9))).await;
        tracker
            .track_lead(LeadEvent {
                visitor_id: Some(search_ids[0].clone()),
                ..Default::default()
            })
            .await;

        let report = tracker.insights().await;
        assert_eq!(report.source_performance["search"].conversion_rate, 50.0);
        assert_eq!(report.source_performance["social"].leads, 0);
        assert_eq!(report.hourly_performance[&9], 3);

        assert_eq!(report.insights[0].kind, InsightKind::Performance);
        assert_eq!(
            report.insights[0].description,
            "search has the highest conversion rate at 50.0%"
        );
        assert_eq!(report.insights[1].kind, InsightKind::Timing);
        assert!(report.insights[1].description.starts_with("Hour 9:00"));
        // 1 lead / 4 visitors is healthy
        assert_eq!(report.insights.len(), 2);
    }

    #[tokio::test]
    async fn insights_warn_on_low_conversion() {
        let tracker = FunnelTracker::new();
        for _ in 0..25 {
            tracker.track_visitor(visitor("ads", at(2026, 1, 1, 8))).await;
        }
        tracker.track_lead(LeadEvent::default()).await;

        let report = tracker.insights().await;
        let warning = report.insights.last().unwrap();
        assert_eq!(warning.kind, InsightKind::Optimization);
        assert!(warning.description.starts_with("Only 4.0% of visitors"));
    }

    #[tokio::test]
    async fn no_insights_without_traffic() {
        let tracker = FunnelTracker::new();
        assert!(tracker.insights().await.insights.is_empty());
    }

    #[test]
    fn ab_test_rates_and_winners() {
        let results = ab_tests();
        assert_eq!(results.landing_page.variant_a.conversion_rate, 8.0);
        assert_eq!(results.landing_page.variant_b.conversion_rate, 12.4);
        assert_eq!(results.landing_page.winner, "B");
        assert_eq!(results.chatbot.variant_b.conversion_rate, 16.4);
        assert_eq!(results.chatbot.confidence, 98.7);
    }
}
