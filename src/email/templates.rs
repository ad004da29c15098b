//! Email templates with `{{variable}}` placeholders.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EmailError;

/// A subject/body pair with declared placeholder variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_custom: bool,
}

/// Input for a custom template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTemplate {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// A template rendered against concrete data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

impl EmailTemplate {
    /// Substitute declared variables present in `data`.
    ///
    /// Placeholders that are undeclared or missing from `data` are left as
    /// written.
    pub fn render(&self, data: &serde_json::Map<String, serde_json::Value>) -> RenderedEmail {
        RenderedEmail {
            subject: substitute(&self.subject, &self.variables, data),
            body: substitute(&self.body, &self.variables, data),
        }
    }
}

fn placeholder() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("built-in placeholder pattern must compile")
    })
}

fn substitute(
    text: &str,
    declared: &[String],
    data: &serde_json::Map<String, serde_json::Value>,
) -> String {
    placeholder()
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            if !declared.iter().any(|v| v == name) {
                return caps[0].to_string();
            }
            match data.get(name) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => caps[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Registry of built-in and custom templates.
pub struct TemplateStore {
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateStore {
    /// Store seeded with the `welcome`, `reminder`, and `followUp` templates.
    pub fn with_defaults() -> Self {
        let templates = default_templates()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Self { templates }
    }

    pub fn get(&self, id: &str) -> Result<&EmailTemplate, EmailError> {
        self.templates
            .get(id)
            .ok_or_else(|| EmailError::TemplateNotFound { id: id.to_string() })
    }

    /// All templates, built-ins first, then custom ones by creation time.
    pub fn list(&self) -> Vec<EmailTemplate> {
        let mut all: Vec<EmailTemplate> = self.templates.values().cloned().collect();
        all.sort_by(|a, b| {
            a.is_custom
                .cmp(&b.is_custom)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        all
    }

    /// Add a custom template under a fresh id.
    pub fn add(&mut self, input: NewTemplate) -> Result<EmailTemplate, EmailError> {
        let non_empty = |field: Option<String>, what: &str| {
            field
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| EmailError::InvalidTemplate(format!("{what} is required")))
        };
        let template = EmailTemplate {
            id: Uuid::new_v4().to_string(),
            name: non_empty(input.name, "name")?,
            subject: non_empty(input.subject, "subject")?,
            body: non_empty(input.body, "body")?,
            variables: input.variables,
            created_at: Some(Utc::now()),
            is_custom: true,
        };
        self.templates.insert(template.id.clone(), template.clone());
        Ok(template)
    }
}

fn builtin(id: &str, name: &str, subject: &str, body: &str, variables: &[&str]) -> EmailTemplate {
    EmailTemplate {
        id: id.to_string(),
        name: name.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        variables: variables.iter().map(|v| v.to_string()).collect(),
        created_at: None,
        is_custom: false,
    }
}

fn default_templates() -> Vec<EmailTemplate> {
    vec![
        builtin(
            "welcome",
            "Welcome to Scaler",
            "Welcome to Scaler - Your Data Engineering Journey Starts Here!",
            r#"<h2>Hi {{name}},</h2>
<p>Welcome to Scaler! We're excited to have you join our community of aspiring Data Engineers.</p>
<p>Here's what you can expect from our free masterclass:</p>
<ul>
  <li>Clear roadmap to Data Engineering</li>
  <li>Industry insights from experts</li>
  <li>Hands-on learning opportunities</li>
  <li>Free resources to get started</li>
</ul>
<p><strong>Your masterclass is scheduled for: {{sessionDate}} at {{sessionTime}}</strong></p>
<p>We'll send you a calendar invite shortly. In the meantime, check out our <a href="{{resourceLink}}">pre-session materials</a>.</p>
<p>Best regards,<br>The Scaler Team</p>"#,
            &["name", "sessionDate", "sessionTime", "resourceLink"],
        ),
        builtin(
            "reminder",
            "Session Reminder",
            "Your Data Engineering Masterclass Starts in {{hoursLeft}} Hours!",
            r#"<h2>Hi {{name}},</h2>
<p>Just a friendly reminder that your Data Engineering masterclass starts in <strong>{{hoursLeft}} hours</strong>!</p>
<p><strong>Date:</strong> {{sessionDate}}<br>
<strong>Time:</strong> {{sessionTime}}<br>
<strong>Link:</strong> <a href="{{sessionLink}}">Join Session</a></p>
<p>Don't forget to:</p>
<ul>
  <li>Test your internet connection</li>
  <li>Have questions ready</li>
  <li>Join 10 minutes early</li>
</ul>
<p>Can't make it? <a href="{{rescheduleLink}}">Reschedule here</a></p>
<p>See you soon!<br>The Scaler Team</p>"#,
            &[
                "name",
                "hoursLeft",
                "sessionDate",
                "sessionTime",
                "sessionLink",
                "rescheduleLink",
            ],
        ),
        builtin(
            "followUp",
            "Post-Session Follow-up",
            "How was your Data Engineering Masterclass?",
            r#"<h2>Hi {{name}},</h2>
<p>We hope you enjoyed your Data Engineering masterclass yesterday!</p>
<p><strong>Next Steps:</strong></p>
<ul>
  <li>Review the session recording</li>
  <li>Complete the practice exercises</li>
  <li>Join our community forum</li>
  <li>Explore our premium courses</li>
</ul>
<p>We'd love to hear your feedback! <a href="{{feedbackLink}}">Share your thoughts here</a>.</p>
<p>Ready to take the next step? Check out our <a href="{{courseLink}}">premium Data Engineering program</a>.</p>
<p>Best regards,<br>The Scaler Team</p>"#,
            &["name", "feedbackLink", "courseLink"],
        ),
    ]
}
