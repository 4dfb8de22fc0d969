use serde_json::{Value, json};

use crate::schema::{ResolveAction, Ticket, TicketContent};

const WEBHOOK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Outbound workflow collaborators: the resolution responder and the coding
/// agent. Both are best-effort; an unreachable engine never fails the local
/// operation.
pub struct WorkflowWebhooks {
    client: reqwest::Client,
    resolution_url: Option<String>,
    coding_url: Option<String>,
}

impl WorkflowWebhooks {
    pub fn new(resolution_url: Option<String>, coding_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            resolution_url,
            coding_url,
        }
    }

    /// Notify the workflow engine that a ticket was resolved so the response
    /// can be routed back through the originating channel.
    pub async fn send_resolution(&self, ticket: &Ticket, resolution_message: Option<&str>) {
        let Some(url) = &self.resolution_url else {
            tracing::warn!("resolution webhook not configured, skipping notification");
            return;
        };

        let payload = build_resolution_payload(ticket, resolution_message);
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(ticket_id = %ticket.id(), "sent resolution webhook");
            }
            Ok(response) => {
                tracing::error!(
                    ticket_id = %ticket.id(),
                    status = %response.status(),
                    "resolution webhook rejected"
                );
            }
            Err(e) => {
                tracing::error!(ticket_id = %ticket.id(), error = %e, "resolution webhook failed");
            }
        }
    }

    /// Dispatch a coding-tagged ticket to the coding agent.
    pub async fn send_coding_dispatch(&self, ticket: &Ticket) {
        let Some(url) = &self.coding_url else {
            tracing::warn!("coding agent webhook not configured, skipping dispatch");
            return;
        };

        let payload = build_coding_payload(ticket);
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(ticket_id = %ticket.id(), "dispatched to coding agent");
            }
            Ok(response) => {
                tracing::error!(
                    ticket_id = %ticket.id(),
                    status = %response.status(),
                    "coding agent webhook rejected"
                );
            }
            Err(e) => {
                tracing::error!(ticket_id = %ticket.id(), error = %e, "coding agent webhook failed");
            }
        }
    }
}

fn build_resolution_payload(ticket: &Ticket, resolution_message: Option<&str>) -> Value {
    let mut resolution = json!({
        "message": resolution_message
            .map(str::to_string)
            .unwrap_or_else(|| default_resolution_message(ticket)),
        "action": ticket.resolution_action(),
        "resolved_at": ticket.updated_at(),
        "assignee": ticket.assignee(),
    });
    if let Some(response) = ticket.ai_reasoning().get("auto_response") {
        resolution["ai_response"] = response.clone();
    }
    if let Some(docs) = ticket.ai_reasoning().get("source_docs") {
        resolution["source_docs"] = docs.clone();
    }

    json!({
        "event": "ticket.resolved",
        "ticket_id": ticket.id(),
        "source": ticket.source(),
        "source_data": source_data(ticket),
        "resolution": resolution,
        "ticket_summary": {
            "title": ticket.title(),
            "description": ticket.description(),
            "category": ticket.category(),
            "priority": ticket.priority(),
            "status": ticket.status(),
            "created_at": ticket.created_at(),
        },
    })
}

/// Channel identifiers sufficient to deliver the response back through the
/// source the report arrived on.
fn source_data(ticket: &Ticket) -> Value {
    let mut data = json!({
        "type": ticket.source(),
        "sender": ticket.content().sender(),
    });
    let extra = match ticket.content() {
        TicketContent::Email {
            sender_email,
            recipient_email,
            subject,
            thread_id,
            ..
        } => json!({
            "sender_email": sender_email,
            "recipient_email": recipient_email,
            "subject": subject,
            "thread_id": thread_id,
        }),
        TicketContent::Discord {
            channel_id,
            user_id,
            username,
            ..
        } => json!({
            "channel_id": channel_id,
            "user_id": user_id,
            "username": username,
        }),
        TicketContent::Github {
            issue_number,
            author,
            url,
            ..
        } => json!({
            "issue_number": issue_number,
            "author": author,
            "url": url,
        }),
        TicketContent::Form {
            form_id,
            submitter_email,
            submitter_name,
            form_fields,
            ..
        } => json!({
            "form_id": form_id,
            "submitter_email": submitter_email,
            "submitter_name": submitter_name,
            "form_fields": form_fields,
        }),
        TicketContent::Sms {
            sender_phone_number,
            recipient_phone_number,
            message_sid,
            ..
        } => json!({
            "sender_phone_number": sender_phone_number,
            "recipient_phone_number": recipient_phone_number,
            "message_sid": message_sid,
        }),
    };
    if let (Value::Object(data), Value::Object(extra)) = (&mut data, extra) {
        data.extend(extra);
    }
    data
}

fn default_resolution_message(ticket: &Ticket) -> String {
    match ticket.resolution_action() {
        ResolveAction::FaqLink => {
            "Your issue has been resolved. Please check the provided documentation links."
                .to_string()
        }
        ResolveAction::AutoResponse => {
            "Your issue has been automatically resolved. See the response below.".to_string()
        }
        _ => match ticket.assignee() {
            Some(assignee) => format!("Your ticket has been resolved by {assignee}."),
            None => "Your ticket has been resolved.".to_string(),
        },
    }
}

fn build_coding_payload(ticket: &Ticket) -> Value {
    json!({
        "ticket_id": ticket.id(),
        "tags": ticket.tags(),
        "priority": ticket.priority(),
        "source": ticket.source(),
        "content": {
            "subject": ticket.title(),
            "body": ticket.content().extract_body(),
            "sender": ticket.content().sender(),
        },
    })
}
