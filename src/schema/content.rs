use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Normalised content of a ticket, one variant per source channel. The `type`
/// discriminator is the serde tag and round-trips through the wire form;
/// unknown tags fail deserialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TicketContent {
    Email {
        sender_email: String,
        recipient_email: String,
        subject: String,
        body: String,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        thread_id: Option<String>,
        #[serde(default)]
        attachments: Vec<Value>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Discord {
        channel_id: String,
        user_id: String,
        message_id: String,
        message_text: String,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        guild_id: Option<String>,
        #[serde(default)]
        attachments: Vec<Value>,
    },
    Github {
        repo: String,
        issue_number: i64,
        author: String,
        issue_title: String,
        issue_body: String,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(default)]
        url: Option<String>,
    },
    Form {
        form_fields: serde_json::Map<String, Value>,
        submission_time: DateTime<Utc>,
        #[serde(default)]
        form_id: Option<String>,
        #[serde(default)]
        submitter_email: Option<String>,
        #[serde(default)]
        submitter_name: Option<String>,
    },
    Sms {
        sender_phone_number: String,
        recipient_phone_number: String,
        message_body: String,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        message_sid: Option<String>,
    },
}

impl TicketContent {
    /// Full text of the report as it arrived, before any extraction.
    pub fn raw_content(&self) -> String {
        match self {
            Self::Email { subject, body, .. } => format!("Subject: {subject}\n\n{body}"),
            Self::Discord { message_text, .. } => message_text.clone(),
            Self::Github {
                issue_title,
                issue_body,
                ..
            } => format!("{issue_title}\n\n{issue_body}"),
            Self::Form { form_fields, .. } => form_fields
                .iter()
                .map(|(k, v)| format!("{k}: {}", render_field(v)))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Sms { message_body, .. } => message_body.clone(),
        }
    }

    pub fn sender(&self) -> String {
        match self {
            Self::Email { sender_email, .. } => sender_email.clone(),
            Self::Discord {
                username, user_id, ..
            } => username.clone().unwrap_or_else(|| user_id.clone()),
            Self::Github { author, .. } => author.clone(),
            Self::Form {
                submitter_email,
                submitter_name,
                ..
            } => submitter_email
                .clone()
                .or_else(|| submitter_name.clone())
                .unwrap_or_else(|| "anonymous".to_string()),
            Self::Sms {
                sender_phone_number,
                ..
            } => sender_phone_number.clone(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Email { timestamp, .. }
            | Self::Discord { timestamp, .. }
            | Self::Github { timestamp, .. }
            | Self::Sms { timestamp, .. } => *timestamp,
            Self::Form {
                submission_time, ..
            } => *submission_time,
        }
    }

    /// Channel-specific identifiers that are not part of the message body.
    pub fn metadata(&self) -> Value {
        match self {
            Self::Email {
                recipient_email,
                subject,
                thread_id,
                headers,
                ..
            } => json!({
                "recipient_email": recipient_email,
                "subject": subject,
                "thread_id": thread_id,
                "headers": headers,
            }),
            Self::Discord {
                channel_id,
                user_id,
                message_id,
                guild_id,
                ..
            } => json!({
                "channel_id": channel_id,
                "user_id": user_id,
                "message_id": message_id,
                "guild_id": guild_id,
            }),
            Self::Github {
                repo,
                issue_number,
                labels,
                url,
                ..
            } => json!({
                "repo": repo,
                "issue_number": issue_number,
                "labels": labels,
                "url": url,
            }),
            Self::Form {
                form_id,
                submitter_email,
                submitter_name,
                ..
            } => json!({
                "form_id": form_id,
                "submitter_email": submitter_email,
                "submitter_name": submitter_name,
            }),
            Self::Sms {
                recipient_phone_number,
                message_sid,
                ..
            } => json!({
                "recipient_phone_number": recipient_phone_number,
                "message_sid": message_sid,
            }),
        }
    }

    pub fn extract_body(&self) -> String {
        match self {
            Self::Email { body, .. } => body.clone(),
            Self::Discord { message_text, .. } => message_text.clone(),
            Self::Github { issue_body, .. } => issue_body.clone(),
            Self::Form { form_fields, .. } => {
                // prefer an explicit message-ish field over the rendered dump
                for key in ["message", "body", "description", "content", "text"] {
                    if let Some(value) = form_fields.get(key) {
                        return render_field(value);
                    }
                }
                self.raw_content()
            }
            Self::Sms { message_body, .. } => message_body.clone(),
        }
    }

    pub fn extract_attachments(&self) -> Vec<Value> {
        match self {
            Self::Email { attachments, .. } | Self::Discord { attachments, .. } => {
                attachments.clone()
            }
            Self::Github { .. } | Self::Form { .. } | Self::Sms { .. } => Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("content serialization is infallible")
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

fn render_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
