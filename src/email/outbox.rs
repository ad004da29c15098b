//! Campaigns and the simulated outbox.
//!
//! Mail is composed as a real RFC 5322 message but never handed to a
//! transport. Queued mail is marked sent immediately; opens and clicks are
//! recorded through explicit tracking calls.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::{Address, Message};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::templates::{EmailTemplate, NewTemplate, TemplateStore};
use crate::error::{ConfigError, EmailError, Result};
use crate::leads::LeadRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Sent,
    Opened,
    Clicked,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
        }
    }

    fn is_delivered(&self) -> bool {
        !matches!(self, Self::Queued)
    }
}

/// Queue priority. Higher priorities are processed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailPriority {
    Low,
    Normal,
    High,
}

impl Default for EmailPriority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Completed,
}

/// An email campaign and its engagement counters.
#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: Option<String>,
    pub template_id: Option<String>,
    pub target_audience: Option<serde_json::Value>,
    pub schedule: Option<serde_json::Value>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub sent_count: u64,
    pub open_count: u64,
    pub click_count: u64,
    pub conversion_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCampaign {
    pub name: Option<String>,
    pub template_id: Option<String>,
    pub target_audience: Option<serde_json::Value>,
    pub schedule: Option<serde_json::Value>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// Request to email a single lead.
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub lead_id: Uuid,
    pub template_id: String,
    #[serde(default)]
    pub custom_data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub priority: EmailPriority,
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
}

/// A composed message and its delivery state.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub template_id: String,
    pub recipient: String,
    pub subject: String,
    pub custom_data: serde_json::Map<String, serde_json::Value>,
    pub priority: EmailPriority,
    pub status: EmailStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    /// Full RFC 5322 rendering of the message.
    #[serde(skip)]
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub sent: usize,
    pub opened: usize,
    pub clicked: usize,
}

/// Outbox-wide engagement numbers. Rates are percentages of delivered mail.
#[derive(Debug, Clone, Serialize)]
pub struct EmailAnalytics {
    pub total_campaigns: usize,
    pub total_emails: usize,
    /// Mail that left the queue, whatever happened after.
    pub sent_emails: usize,
    pub open_rate: f64,
    pub click_rate: f64,
    pub by_status: StatusCounts,
}

#[derive(Default)]
struct OutboxState {
    campaigns: HashMap<Uuid, Campaign>,
    emails: Vec<OutboundEmail>,
}

/// Templates, campaigns, and every email composed by the funnel.
pub struct Outbox {
    templates: RwLock<TemplateStore>,
    state: RwLock<OutboxState>,
    leads: Arc<LeadRegistry>,
    from: Mailbox,
}

impl Outbox {
    /// Create an outbox sending as `from` to leads in `leads`.
    pub fn new(from: &str, leads: Arc<LeadRegistry>) -> std::result::Result<Arc<Self>, ConfigError> {
        let from: Mailbox = from.parse().map_err(|e| ConfigError::InvalidValue {
            key: "FUNNEL_EMAIL_FROM".into(),
            message: format!("{e}"),
        })?;
        Ok(Arc::new(Self {
            templates: RwLock::new(TemplateStore::with_defaults()),
            state: RwLock::new(OutboxState::default()),
            leads,
            from,
        }))
    }

    pub async fn templates(&self) -> Vec<EmailTemplate> {
        self.templates.read().await.list()
    }

    pub async fn add_template(
        &self,
        input: NewTemplate,
    ) -> std::result::Result<EmailTemplate, EmailError> {
        let template = self.templates.write().await.add(input)?;
        info!(template_id = %template.id, name = %template.name, "Email template created");
        Ok(template)
    }

    /// Create a campaign in draft status with zeroed counters.
    pub async fn create_campaign(&self, input: NewCampaign) -> Campaign {
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: input.name,
            template_id: input.template_id,
            target_audience: input.target_audience,
            schedule: input.schedule,
            subject: input.subject,
            body: input.body,
            status: CampaignStatus::Draft,
            created_at: Utc::now(),
            sent_count: 0,
            open_count: 0,
            click_count: 0,
            conversion_count: 0,
        };
        self.state
            .write()
            .await
            .campaigns
            .insert(campaign.id, campaign.clone());
        info!(campaign_id = %campaign.id, "Email campaign created");
        campaign
    }

    /// Campaigns, oldest first.
    pub async fn campaigns(&self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> =
            self.state.read().await.campaigns.values().cloned().collect();
        campaigns.sort_by_key(|c| c.created_at);
        campaigns
    }

    /// Render a template for a lead, compose it, queue it, and flush the queue.
    ///
    /// The lead's name is available to templates as `name` unless
    /// `custom_data` overrides it.
    pub async fn send(&self, request: SendRequest) -> Result<OutboundEmail> {
        let template = self.templates.read().await.get(&request.template_id)?.clone();
        let lead = self.leads.get(request.lead_id).await?;

        let mut data = serde_json::Map::new();
        data.insert("name".into(), serde_json::Value::String(lead.name.clone()));
        data.insert("email".into(), serde_json::Value::String(lead.email.clone()));
        data.extend(request.custom_data.clone());
        let rendered = template.render(&data);

        let address: Address = lead
            .email
            .parse()
            .map_err(|e| EmailError::Compose(format!("invalid recipient: {e}")))?;
        let to = Mailbox::new(Some(lead.name.clone()), address);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(rendered.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(rendered.body)
            .map_err(|e| EmailError::Compose(e.to_string()))?;

        let now = Utc::now();
        let email = OutboundEmail {
            id: Uuid::new_v4(),
            lead_id: lead.id,
            campaign_id: request.campaign_id,
            template_id: template.id,
            recipient: to.to_string(),
            subject: rendered.subject,
            custom_data: request.custom_data,
            priority: request.priority,
            status: EmailStatus::Queued,
            created_at: now,
            scheduled_for: now,
            sent_at: None,
            opened_at: None,
            clicked_at: None,
            raw: String::from_utf8_lossy(&message.formatted()).into_owned(),
        };

        let mut state = self.state.write().await;
        if let Some(campaign_id) = email.campaign_id {
            if !state.campaigns.contains_key(&campaign_id) {
                return Err(EmailError::CampaignNotFound { id: campaign_id }.into());
            }
        }
        let email_id = email.id;
        state.emails.push(email);
        process_queue(&mut state, now);

        let sent = state
            .emails
            .iter()
            .find(|e| e.id == email_id)
            .cloned()
            .ok_or(EmailError::NotFound { id: email_id })?;
        info!(
            email_id = %sent.id,
            lead_id = %sent.lead_id,
            template_id = %sent.template_id,
            "Email sent"
        );
        Ok(sent)
    }

    /// Record that a delivered email was opened.
    pub async fn record_open(&self, email_id: Uuid) -> std::result::Result<OutboundEmail, EmailError> {
        self.track(email_id, EmailStatus::Opened).await
    }

    /// Record a link click. A click implies an open.
    pub async fn record_click(&self, email_id: Uuid) -> std::result::Result<OutboundEmail, EmailError> {
        self.track(email_id, EmailStatus::Clicked).await
    }

    pub async fn get(&self, email_id: Uuid) -> std::result::Result<OutboundEmail, EmailError> {
        self.state
            .read()
            .await
            .emails
            .iter()
            .find(|e| e.id == email_id)
            .cloned()
            .ok_or(EmailError::NotFound { id: email_id })
    }

    pub async fn analytics(&self) -> EmailAnalytics {
        let state = self.state.read().await;
        let mut by_status = StatusCounts::default();
        for email in &state.emails {
            match email.status {
                EmailStatus::Queued => by_status.queued += 1,
                EmailStatus::Sent => by_status.sent += 1,
                EmailStatus::Opened => by_status.opened += 1,
                EmailStatus::Clicked => by_status.clicked += 1,
            }
        }

        let delivered = by_status.sent + by_status.opened + by_status.clicked;
        let rate = |n: usize| {
            if delivered == 0 {
                0.0
            } else {
                n as f64 / delivered as f64 * 100.0
            }
        };

        EmailAnalytics {
            total_campaigns: state.campaigns.len(),
            total_emails: state.emails.len(),
            sent_emails: delivered,
            open_rate: rate(by_status.opened + by_status.clicked),
            click_rate: rate(by_status.clicked),
            by_status,
        }
    }

    async fn track(
        &self,
        email_id: Uuid,
        target: EmailStatus,
    ) -> std::result::Result<OutboundEmail, EmailError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let email = state
            .emails
            .iter_mut()
            .find(|e| e.id == email_id)
            .ok_or(EmailError::NotFound { id: email_id })?;

        if !email.status.is_delivered() {
            return Err(EmailError::InvalidTransition {
                id: email_id,
                status: email.status.as_str().into(),
                target: target.as_str().into(),
            });
        }

        let mut newly_opened = false;
        let mut newly_clicked = false;
        if email.opened_at.is_none() {
            email.opened_at = Some(now);
            newly_opened = true;
        }
        if target == EmailStatus::Clicked && email.clicked_at.is_none() {
            email.clicked_at = Some(now);
            newly_clicked = true;
        }
        if email.clicked_at.is_some() {
            email.status = EmailStatus::Clicked;
        } else {
            email.status = EmailStatus::Opened;
        }

        let updated = email.clone();
        if let Some(campaign) = updated
            .campaign_id
            .and_then(|id| state.campaigns.get_mut(&id))
        {
            campaign.open_count += u64::from(newly_opened);
            campaign.click_count += u64::from(newly_clicked);
        }

        debug!(email_id = %email_id, status = updated.status.as_str(), "Email engagement recorded");
        Ok(updated)
    }
}

/// Mark every queued email sent, highest priority first.
fn process_queue(state: &mut OutboxState, now: DateTime<Utc>) -> usize {
    let mut queued: Vec<usize> = state
        .emails
        .iter()
        .enumerate()
        .filter(|(_, e)| e.status == EmailStatus::Queued)
        .map(|(i, _)| i)
        .collect();
    queued.sort_by_key(|&i| std::cmp::Reverse(state.emails[i].priority));

    for &i in &queued {
        let email = &mut state.emails[i];
        email.status = EmailStatus::Sent;
        email.sent_at = Some(now);
        if let Some(campaign) = email
            .campaign_id
            .and_then(|id| state.campaigns.get_mut(&id))
        {
            campaign.sent_count += 1;
        }
    }

    if !queued.is_empty() {
        debug!(count = queued.len(), "Processed email queue");
    }
    queued.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::leads::{LeadMetadata, NewLead};

    async fn outbox_with_lead() -> (Arc<Outbox>, Uuid) {
        let leads = LeadRegistry::new(std::time::Duration::from_secs(3600));
        let lead = leads
            .create(
                NewLead {
                    name: Some("Ada Lovelace".into()),
                    email: Some("ada@example.com".into()),
                    ..Default::default()
                },
                LeadMetadata::default(),
            )
            .await
            .unwrap();
        let outbox = Outbox::new("Funnel <team@example.com>", leads).unwrap();
        (outbox, lead.id)
    }

    fn send_request(lead_id: Uuid, template_id: &str) -> SendRequest {
        SendRequest {
            lead_id,
            template_id: template_id.into(),
            custom_data: serde_json::Map::new(),
            priority: EmailPriority::Normal,
            campaign_id: None,
        }
    }

    #[test]
    fn invalid_sender_is_a_config_error() {
        let leads = LeadRegistry::new(std::time::Duration::from_secs(60));
        assert!(matches!(
            Outbox::new("not a mailbox", leads),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn send_composes_and_marks_sent() {
        let (outbox, lead_id) = outbox_with_lead().await;
        let mut request = send_request(lead_id, "reminder");
        request
            .custom_data
            .insert("hoursLeft".into(), serde_json::json!(3));

        let email = outbox.send(request).await.unwrap();
        assert_eq!(email.status, EmailStatus::Sent);
        assert!(email.sent_at.is_some());
        assert_eq!(
            email.subject,
            "Your Data Engineering Masterclass Starts in 3 Hours!"
        );
        assert!(email.recipient.contains("ada@example.com"));
        assert!(email.raw.contains("team@example.com"));
        assert!(email.raw.contains("Content-Type: text/html"));
    }

    #[tokio::test]
    async fn send_requires_known_template_and_lead() {
        let (outbox, lead_id) = outbox_with_lead().await;
        let err = outbox
            .send(send_request(lead_id, "newsletter"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Email(EmailError::TemplateNotFound { .. })
        ));

        let err = outbox
            .send(send_request(Uuid::new_v4(), "welcome"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lead(_)));
        assert_eq!(outbox.analytics().await.total_emails, 0);
    }

    #[tokio::test]
    async fn open_then_click() {
        let (outbox, lead_id) = outbox_with_lead().await;
        let email = outbox.send(send_request(lead_id, "welcome")).await.unwrap();

        let opened = outbox.record_open(email.id).await.unwrap();
        assert_eq!(opened.status, EmailStatus::Opened);
        let clicked = outbox.record_click(email.id).await.unwrap();
        assert_eq!(clicked.status, EmailStatus::Clicked);
        assert_eq!(clicked.opened_at, opened.opened_at);

        // a late open does not demote a click
        let again = outbox.record_open(email.id).await.unwrap();
        assert_eq!(again.status, EmailStatus::Clicked);
    }

    #[tokio::test]
    async fn click_implies_open() {
        let (outbox, lead_id) = outbox_with_lead().await;
        let email = outbox.send(send_request(lead_id, "followUp")).await.unwrap();
        let clicked = outbox.record_click(email.id).await.unwrap();
        assert!(clicked.opened_at.is_some());
        assert!(clicked.clicked_at.is_some());
    }

    #[tokio::test]
    async fn tracking_unknown_email() {
        let (outbox, _) = outbox_with_lead().await;
        assert!(matches!(
            outbox.record_open(Uuid::new_v4()).await,
            Err(EmailError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn queued_email_cannot_be_opened() {
        let (outbox, lead_id) = outbox_with_lead().await;
        let email = outbox.send(send_request(lead_id, "welcome")).await.unwrap();
        {
            let mut state = outbox.state.write().await;
            state.emails[0].status = EmailStatus::Queued;
        }
        assert!(matches!(
            outbox.record_open(email.id).await,
            Err(EmailError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn campaign_counters_follow_engagement() {
        let (outbox, lead_id) = outbox_with_lead().await;
        let campaign = outbox
            .create_campaign(NewCampaign {
                name: Some("Spring cohort".into()),
                template_id: Some("welcome".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.sent_count, 0);

        let mut request = send_request(lead_id, "welcome");
        request.campaign_id = Some(campaign.id);
        let email = outbox.send(request).await.unwrap();
        outbox.record_click(email.id).await.unwrap();
        outbox.record_click(email.id).await.unwrap();

        let stored = &outbox.campaigns().await[0];
        assert_eq!(stored.sent_count, 1);
        assert_eq!(stored.open_count, 1);
        assert_eq!(stored.click_count, 1);

        let mut request = send_request(lead_id, "welcome");
        request.campaign_id = Some(Uuid::new_v4());
        assert!(matches!(
            outbox.send(request).await,
            Err(Error::Email(EmailError::CampaignNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn analytics_rates_over_delivered_mail() {
        let (outbox, lead_id) = outbox_with_lead().await;
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(outbox.send(send_request(lead_id, "welcome")).await.unwrap().id);
        }
        outbox.record_open(ids[0]).await.unwrap();
        outbox.record_click(ids[1]).await.unwrap();

        let analytics = outbox.analytics().await;
        assert_eq!(analytics.total_emails, 4);
        assert_eq!(analytics.sent_emails, 4);
        assert_eq!(
            analytics.by_status,
            StatusCounts {
                queued: 0,
                sent: 2,
                opened: 1,
                clicked: 1,
            }
        );
        assert_eq!(analytics.open_rate, 50.0);
        assert_eq!(analytics.click_rate, 25.0);
    }

    #[tokio::test]
    async fn queue_is_processed_by_priority() {
        let mut state = OutboxState::default();
        let now = Utc::now();
        let template = |priority| OutboundEmail {
            id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            campaign_id: None,
            template_id: "welcome".into(),
            recipient: "a@example.com".into(),
            subject: "s".into(),
            custom_data: serde_json::Map::new(),
            priority,
            status: EmailStatus::Queued,
            created_at: now,
            scheduled_for: now,
            sent_at: None,
            opened_at: None,
            clicked_at: None,
            raw: String::new(),
        };
        state.emails.push(template(EmailPriority::Low));
        state.emails.push(template(EmailPriority::High));
        assert_eq!(process_queue(&mut state, now), 2);
        assert!(state.emails.iter().all(|e| e.status == EmailStatus::Sent));
        assert_eq!(process_queue(&mut state, now), 0);
    }
}
