use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::queues::QueueManager;
use crate::schema::{
    QueueType, ResolveAction, Ticket, TicketCategory, TicketContent, TicketPriority, TicketSource,
    TicketStatus,
};
use crate::state::AppState;
use crate::storage::TicketFilter;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub source: TicketSource,
    pub content_type: String,
    pub payload: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ticket_id: String,
    pub status: TicketStatus,
    pub queue: QueueType,
    pub position_in_queue: usize,
    pub estimated_time_to_triage: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TriageCompleteRequest {
    pub category: TicketCategory,
    pub priority: TicketPriority,
    #[serde(default)]
    pub suggested_assignee: Option<String>,
    #[serde(default)]
    pub ai_reasoning: Option<Value>,
    #[serde(default)]
    pub auto_resolve: bool,
    #[serde(default)]
    pub resolution_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TicketUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    pub tags: Option<Vec<String>>,
    pub assignee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveTicketRequest {
    #[serde(default)]
    pub resolution_message: Option<String>,
    #[serde(default)]
    pub resolution_action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub queue: Option<QueueType>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    pub assignee: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Webhook ingestion: normalise the payload, park the ticket in INBOX and let
/// the triage fan-out take it from there.
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let content = content_from_payload(&request.content_type, &request.payload)
        .map_err(|e| ApiError::Validation(format!("Invalid payload: {e}")))?;

    let mut priority = TicketPriority::default();
    let mut category = None;
    let mut tags = Vec::new();
    if let Some(Value::Object(meta)) = &request.metadata {
        // hint fields are best-effort; unknown enum strings are ignored
        if let Some(p) = meta
            .get("priority")
            .and_then(Value::as_str)
            .and_then(TicketPriority::parse)
        {
            priority = p;
        }
        if let Some(c) = meta
            .get("category")
            .and_then(Value::as_str)
            .and_then(TicketCategory::parse)
        {
            category = Some(c);
        }
        if let Some(Value::Array(list)) = meta.get("tags") {
            tags = list
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
    }

    let mut ticket = Ticket::create(request.source, content, priority, tags);
    if let Some(category) = category {
        ticket.set_category(category);
    }
    // flag as awaiting triage for immediate dashboard feedback; the ticket
    // still physically sits in the INBOX queue
    ticket.set_status(TicketStatus::TriagePending)?;

    if let Some(title) = title_candidate(&request.metadata, &request.payload) {
        ticket.update_title(title);
    }
    if let Some(description) = description_candidate(&request.metadata, &request.payload) {
        ticket.update_description(description);
    }

    state.repository.save(ticket.clone());
    let position = state
        .queues
        .enqueue(&ticket, QueueType::Inbox, "ingested from webhook", None);

    let wait_seconds = QueueManager::estimate_wait_time(QueueType::Inbox, position);
    let wait_minutes = ((wait_seconds / 60.0) as i64).max(1);

    state.publisher.publish_ticket_created(&ticket);

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            ticket_id: ticket.id().to_string(),
            status: ticket.status(),
            queue: ticket.current_queue(),
            position_in_queue: position,
            estimated_time_to_triage: format!("{wait_minutes} minutes"),
            created_at: ticket.created_at(),
        }),
    ))
}

/// Callback for a human (or external workflow) triage decision on a ticket
/// sitting in the TRIAGE queue.
pub async fn triage_complete(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(request): Json<TriageCompleteRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut ticket = state
        .repository
        .get(&ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    if ticket.current_queue() != QueueType::Triage {
        return Err(ApiError::Validation(format!(
            "Ticket is not in TRIAGE queue (currently in {})",
            ticket.current_queue()
        )));
    }

    ticket.set_category(request.category);
    ticket.update_priority(request.priority);
    if let Some(Value::Object(reasoning)) = request.ai_reasoning {
        ticket.log_reasoning(reasoning);
    }
    if let Some(assignee) = &request.suggested_assignee {
        ticket.set_suggested_assignee(assignee);
    }

    let old_queue = ticket.current_queue();
    if request.auto_resolve {
        // auto-resolution bypasses the ACTIVE queue entirely
        let action = if request.resolution_reason.is_some() {
            ResolveAction::FaqLink
        } else {
            ResolveAction::None
        };
        ticket.mark_resolved(action)?;
        state.queues.move_ticket(
            &ticket_id,
            QueueType::Triage,
            QueueType::Resolution,
            &ticket,
            &format!(
                "auto-resolved: {}",
                request.resolution_reason.as_deref().unwrap_or("AI decision")
            ),
            None,
        );
    } else {
        ticket.move_to_queue(QueueType::Assignment)?;
        state.queues.move_ticket(
            &ticket_id,
            QueueType::Triage,
            QueueType::Assignment,
            &ticket,
            "triage complete",
            None,
        );
    }

    state.repository.save(ticket.clone());
    state
        .publisher
        .publish_ticket_moved(&ticket, old_queue, ticket.current_queue());

    Ok(Json(json!({
        "ticket_id": ticket_id,
        "status": ticket.status(),
        "queue": ticket.current_queue(),
        "category": ticket.category(),
        "priority": ticket.priority(),
        "suggested_assignee": ticket.suggested_assignee(),
    })))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ticket = state
        .repository
        .get(&ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    let mut wire = ticket.to_value();
    if let Some((_, position)) = state.queues.get_queue_position(&ticket_id) {
        wire["queue_position"] = json!(position);
    }
    Ok(Json(json!({ "ticket": wire })))
}

/// Partial update. A transition into RESOLVED routes through the resolution
/// path (queue move + resolution event); other status writes only touch the
/// ticket.
pub async fn update_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(request): Json<TicketUpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut ticket = state
        .repository
        .get(&ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    let mut changes = serde_json::Map::new();
    let mut is_being_resolved = false;
    let old_status = ticket.status();

    if let Some(title) = request.title {
        ticket.update_title(title.clone());
        changes.insert("title".into(), json!(title));
    }
    if let Some(description) = request.description {
        ticket.update_description(description.clone());
        changes.insert("description".into(), json!(description));
    }

    if let Some(status) = request.status {
        if status == TicketStatus::Resolved && old_status != TicketStatus::Resolved {
            is_being_resolved = true;
            ticket.mark_resolved(ResolveAction::Manual)?;

            let from = state
                .queues
                .get_ticket_queue(&ticket_id)
                .unwrap_or(QueueType::Inbox);
            if from != QueueType::Resolution {
                state.queues.move_ticket(
                    &ticket_id,
                    from,
                    QueueType::Resolution,
                    &ticket,
                    "manually resolved via status update",
                    None,
                );
            }
        } else {
            ticket.set_status(status)?;
        }
        changes.insert("status".into(), json!(status));
    }

    if let Some(priority) = request.priority {
        ticket.update_priority(priority);
        changes.insert("priority".into(), json!(priority));
    }
    if let Some(category) = request.category {
        ticket.set_category(category);
        changes.insert("category".into(), json!(category));
    }
    if let Some(tags) = request.tags {
        for tag in &tags {
            ticket.add_tag(tag);
        }
        changes.insert("tags".into(), json!(ticket.tags()));
    }

    let mut assigned_to = None;
    if let Some(assignee) = request.assignee {
        let previous = ticket.assignee().map(str::to_string);
        ticket.assign(&assignee);
        changes.insert("assignee".into(), json!(assignee));
        assigned_to = Some((assignee, previous));
    }

    state.repository.save(ticket.clone());

    if let Some((assignee, previous)) = assigned_to {
        state
            .publisher
            .publish_ticket_assigned(&ticket, Some(&assignee), previous.as_deref());
    }
    if is_being_resolved {
        state
            .publisher
            .publish_ticket_resolved(&ticket, Some("Ticket resolved manually by agent"));
    } else if !changes.is_empty() {
        state
            .publisher
            .publish_ticket_updated(&ticket, Value::Object(changes));
    }

    Ok(Json(json!({ "ticket": ticket.to_value() })))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketListQuery>,
) -> Json<Value> {
    let filter = TicketFilter {
        status: query.status,
        queue: query.queue,
        priority: query.priority,
        category: query.category,
        assignee: query.assignee,
    };
    let tickets = state.repository.find(&filter, query.limit, query.offset);
    let total = state.repository.count();

    tracing::info!(
        returned = tickets.len(),
        total,
        "listing tickets"
    );

    Json(json!({
        "tickets": tickets.iter().map(Ticket::to_value).collect::<Vec<_>>(),
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
    }))
}

/// Resolve and notify the workflow engine so the answer reaches the reporter
/// on the channel the ticket came from.
pub async fn resolve_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(request): Json<ResolveTicketRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut ticket = state
        .repository
        .get(&ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    let action = request
        .resolution_action
        .as_deref()
        .and_then(ResolveAction::parse)
        .unwrap_or(ResolveAction::Manual);

    let old_queue = state
        .queues
        .get_ticket_queue(&ticket_id)
        .unwrap_or(ticket.current_queue());
    ticket.mark_resolved(action)?;

    if old_queue != QueueType::Resolution {
        state.queues.move_ticket(
            &ticket_id,
            old_queue,
            QueueType::Resolution,
            &ticket,
            "manually resolved",
            None,
        );
    }

    state.repository.save(ticket.clone());
    state
        .publisher
        .publish_ticket_resolved(&ticket, request.resolution_message.as_deref());

    Ok(Json(json!({
        "ticket_id": ticket_id,
        "status": ticket.status(),
        "queue": ticket.current_queue(),
        "resolution_action": action,
        "message": "Ticket resolved. Notification will be sent to user via original channel.",
    })))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.repository.exists(&ticket_id) {
        return Err(ApiError::NotFound("Ticket not found".into()));
    }

    if let Some((queue, _)) = state.queues.get_queue_position(&ticket_id) {
        state.queues.remove_from_queue(&ticket_id, queue);
    }
    if !state.repository.delete(&ticket_id) {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "Failed to delete ticket"
        )));
    }

    Ok(Json(json!({
        "success": true,
        "ticket_id": ticket_id,
        "message": "Ticket deleted successfully",
    })))
}

/// Build the normalised content for a channel payload. Sources send a
/// unified field set, so every lookup carries the channel-specific aliases.
fn content_from_payload(content_type: &str, payload: &Value) -> Result<TicketContent, String> {
    match content_type.to_ascii_lowercase().as_str() {
        "email" => Ok(TicketContent::Email {
            sender_email: str_of(payload, &["from", "sender_email", "user"])
                .unwrap_or_else(|| "unknown@unknown.com".into()),
            recipient_email: str_of(payload, &["to", "recipient_email"])
                .unwrap_or_else(|| "support@intake.local".into()),
            subject: str_of(payload, &["subject"]).unwrap_or_else(|| "No Subject".into()),
            body: str_of(payload, &["body"]).unwrap_or_default(),
            timestamp: parse_timestamp(payload.get("timestamp")),
            thread_id: str_of(payload, &["thread_id", "id"]),
            attachments: array_of(payload, "attachments"),
            headers: Default::default(),
        }),
        "discord" => Ok(TicketContent::Discord {
            channel_id: str_of(payload, &["channel_id"]).unwrap_or_else(|| "unknown".into()),
            user_id: str_of(payload, &["user_id", "user"]).unwrap_or_else(|| "unknown".into()),
            message_id: str_of(payload, &["message_id", "id"]).unwrap_or_default(),
            message_text: str_of(payload, &["message_text", "body"]).unwrap_or_default(),
            timestamp: parse_timestamp(payload.get("timestamp")),
            username: str_of(payload, &["username", "user"]),
            guild_id: str_of(payload, &["guild_id"]),
            attachments: array_of(payload, "attachments"),
        }),
        "github" => Ok(TicketContent::Github {
            repo: github_repo_slug(payload),
            issue_number: payload
                .get("issue_number")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            author: str_of(payload, &["author", "user"]).unwrap_or_else(|| "unknown".into()),
            issue_title: str_of(payload, &["title", "issue_title", "subject"])
                .unwrap_or_default(),
            issue_body: str_of(payload, &["body", "issue_body"]).unwrap_or_default(),
            timestamp: parse_timestamp(payload.get("timestamp")),
            labels: payload
                .get("labels")
                .and_then(Value::as_array)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            url: str_of(payload, &["url", "issue_url"]),
        }),
        "form" => Ok(TicketContent::Form {
            form_fields: payload
                .get("fields")
                .or_else(|| payload.get("form_fields"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            submission_time: parse_timestamp(
                payload
                    .get("submission_time")
                    .or_else(|| payload.get("timestamp")),
            ),
            form_id: str_of(payload, &["form_id", "id"]),
            submitter_email: str_of(payload, &["submitter_email"]),
            submitter_name: str_of(payload, &["submitter_name", "user"]),
        }),
        "sms" => Ok(TicketContent::Sms {
            sender_phone_number: str_of(payload, &["from", "sender_phone_number"])
                .unwrap_or_else(|| "unknown".into()),
            recipient_phone_number: str_of(payload, &["to", "recipient_phone_number"])
                .unwrap_or_else(|| "unknown".into()),
            message_body: str_of(payload, &["body", "message_body"]).unwrap_or_default(),
            timestamp: parse_timestamp(payload.get("timestamp")),
            message_sid: str_of(payload, &["message_sid", "id"]),
        }),
        other => Err(format!("Unknown content type: {other}")),
    }
}

fn str_of(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn array_of(payload: &Value, key: &str) -> Vec<Value> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn github_repo_slug(payload: &Value) -> String {
    let repo =
        str_of(payload, &["repo", "repo_url"]).unwrap_or_else(|| "unknown/unknown".into());
    if repo == "null" {
        return "unknown/unknown".into();
    }
    if repo.contains("github.com") {
        let parts: Vec<&str> = repo.trim_end_matches('/').split('/').collect();
        if parts.len() >= 2 {
            return format!("{}/{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        }
    }
    repo
}

fn payload_fields<'a>(payload: &'a Value) -> Option<&'a serde_json::Map<String, Value>> {
    payload
        .get("fields")
        .or_else(|| payload.get("form_fields"))
        .and_then(Value::as_object)
}

fn title_candidate(metadata: &Option<Value>, payload: &Value) -> Option<String> {
    if let Some(title) = metadata
        .as_ref()
        .and_then(|m| m.get("title"))
        .and_then(Value::as_str)
    {
        return Some(title.to_string());
    }
    let fields = payload_fields(payload)?;
    ["subject", "title", "message"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn description_candidate(metadata: &Option<Value>, payload: &Value) -> Option<String> {
    if let Some(description) = metadata
        .as_ref()
        .and_then(|m| m.get("description"))
        .and_then(Value::as_str)
    {
        return Some(description.to_string());
    }
    let fields = payload_fields(payload)?;
    ["description", "content", "body", "message"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_payload_accepts_unified_aliases() {
        let payload = json!({
            "from": "a@x.test",
            "to": "support@x.test",
            "subject": "reset password",
            "body": "help",
            "timestamp": "2026-03-01T12:00:00Z",
            "id": "msg-1",
        });
        let content = content_from_payload("email", &payload).unwrap();
        let TicketContent::Email {
            sender_email,
            thread_id,
            ..
        } = content
        else {
            panic!("expected email content");
        };
        assert_eq!(sender_email, "a@x.test");
        // `id` doubles as the thread id in the unified payload
        assert_eq!(thread_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn github_repo_url_is_reduced_to_a_slug() {
        let payload = json!({
            "repo_url": "https://github.com/acme/widgets/",
            "issue_number": 7,
            "user": "casey",
            "title": "panic on start",
            "body": "boom",
        });
        let content = content_from_payload("github", &payload).unwrap();
        let TicketContent::Github { repo, author, .. } = content else {
            panic!("expected github content");
        };
        assert_eq!(repo, "acme/widgets");
        assert_eq!(author, "casey");
    }

    #[test]
    fn github_null_repo_becomes_unknown() {
        let payload = json!({"repo": "null", "body": "x"});
        let TicketContent::Github { repo, .. } =
            content_from_payload("github", &payload).unwrap()
        else {
            panic!("expected github content");
        };
        assert_eq!(repo, "unknown/unknown");
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let err = content_from_payload("telegram", &json!({})).unwrap_err();
        assert!(err.contains("telegram"));
    }

    #[test]
    fn missing_email_fields_get_defaults() {
        let TicketContent::Email {
            sender_email,
            subject,
            body,
            ..
        } = content_from_payload("email", &json!({})).unwrap()
        else {
            panic!("expected email content");
        };
        assert_eq!(sender_email, "unknown@unknown.com");
        assert_eq!(subject, "No Subject");
        assert_eq!(body, "");
    }

    #[test]
    fn title_prefers_metadata_over_form_fields() {
        let metadata = Some(json!({"title": "from metadata"}));
        let payload = json!({"fields": {"subject": "from fields"}});
        assert_eq!(
            title_candidate(&metadata, &payload).as_deref(),
            Some("from metadata")
        );
        assert_eq!(
            title_candidate(&None, &payload).as_deref(),
            Some("from fields")
        );
        assert_eq!(title_candidate(&None, &json!({})), None);
    }

    #[test]
    fn description_probes_form_fields_in_order() {
        let payload = json!({"form_fields": {"body": "b", "description": "d"}});
        assert_eq!(
            description_candidate(&None, &payload).as_deref(),
            Some("d")
        );
    }

    #[test]
    fn timestamps_fall_back_to_now_on_garbage() {
        let parsed = parse_timestamp(Some(&json!("2026-03-01T12:00:00+00:00")));
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T12:00:00+00:00");

        let fallback = parse_timestamp(Some(&json!("not-a-date")));
        assert!((Utc::now() - fallback).num_seconds() < 5);
    }
}
