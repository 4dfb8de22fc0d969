use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::schema::{QueueType, Ticket, TicketPriority, TicketStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub agent_id: String,
    #[serde(default)]
    pub preferred_categories: Option<Vec<String>>,
    #[serde(default)]
    pub max_priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub ticket_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub ticket_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    /// Send back to INBOX for a fresh AI triage pass.
    #[serde(default)]
    pub retriage: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub ticket_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    #[serde(default = "default_available_limit")]
    pub limit: usize,
    pub category: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MyTicketsQuery {
    pub agent_id: String,
}

fn default_available_limit() -> usize {
    50
}

/// Claim the most urgent matching ticket from the ASSIGNMENT queue.
pub async fn claim_ticket(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<Value>, ApiError> {
    let max_priority = match request.max_priority.as_deref() {
        Some(raw) => Some(
            TicketPriority::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("Unknown priority: {raw}")))?,
        ),
        None => None,
    };

    let candidates = state.queues.peek_queue(QueueType::Assignment, 20, true);
    if candidates.is_empty() {
        return Ok(Json(json!({
            "success": false,
            "ticket_id": null,
            "ticket": null,
            "message": "No tickets available for claiming",
        })));
    }

    let mut claimed: Option<Ticket> = None;
    for ticket_id in candidates {
        let Some(ticket) = state.repository.get(&ticket_id) else {
            continue;
        };
        if ticket.assignee().is_some() {
            continue;
        }
        if !matches_claim_filters(&ticket, request.preferred_categories.as_deref(), max_priority) {
            continue;
        }
        claimed = Some(ticket);
        break;
    }

    let Some(mut ticket) = claimed else {
        return Ok(Json(json!({
            "success": false,
            "ticket_id": null,
            "ticket": null,
            "message": "No matching tickets available",
        })));
    };

    let old_queue = ticket.current_queue();
    ticket.assign(&request.agent_id);
    ticket.move_to_queue(QueueType::Active)?;

    state.queues.move_ticket(
        ticket.id(),
        QueueType::Assignment,
        QueueType::Active,
        &ticket,
        &format!("claimed by agent {}", request.agent_id),
        Some(&request.agent_id),
    );
    state.assignments.assign(&request.agent_id, ticket.id());
    state.repository.save(ticket.clone());

    state
        .publisher
        .publish_ticket_assigned(&ticket, Some(&request.agent_id), None);
    state
        .publisher
        .publish_ticket_moved(&ticket, old_queue, QueueType::Active);

    Ok(Json(json!({
        "success": true,
        "ticket_id": ticket.id(),
        "ticket": ticket.to_value(),
        "message": "Ticket claimed successfully",
    })))
}

/// Assign a specific ticket to a specific agent.
pub async fn assign_ticket(
    State(state): State<AppState>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut ticket = state
        .repository
        .get(&request.ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    let old_assignee = ticket.assignee().map(str::to_string);
    let old_queue = ticket.current_queue();

    ticket.assign(&request.agent_id);

    if old_queue != ticket.current_queue() {
        state.queues.move_ticket(
            &request.ticket_id,
            old_queue,
            ticket.current_queue(),
            &ticket,
            request
                .reason
                .as_deref()
                .unwrap_or(&format!("assigned to {}", request.agent_id)),
            Some(&request.agent_id),
        );
    }

    state.assignments.assign(&request.agent_id, ticket.id());
    state.repository.save(ticket.clone());

    state.publisher.publish_ticket_assigned(
        &ticket,
        Some(&request.agent_id),
        old_assignee.as_deref(),
    );
    if old_queue != ticket.current_queue() {
        state
            .publisher
            .publish_ticket_moved(&ticket, old_queue, ticket.current_queue());
    }

    Ok(Json(json!({
        "success": true,
        "ticket_id": ticket.id(),
        "agent_id": request.agent_id,
        "status": ticket.status(),
        "queue": ticket.current_queue(),
        "message": "Ticket assigned successfully",
    })))
}

/// Release a ticket back to the pipeline; with `retriage` the AI state is
/// wiped and the ticket re-enters INBOX, firing a fresh triage pass.
pub async fn release_ticket(
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut ticket = state
        .repository
        .get(&request.ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    if ticket.assignee() != Some(request.agent_id.as_str()) {
        return Err(ApiError::Forbidden(
            "You can only release tickets assigned to you".into(),
        ));
    }

    let old_queue = ticket.current_queue();
    let old_assignee = ticket.assignee().map(str::to_string);

    ticket.unassign();

    let target_queue;
    let reason = request.reason.clone().unwrap_or_else(|| {
        if request.retriage {
            "re-triage requested".to_string()
        } else {
            "released by agent".to_string()
        }
    });

    if request.retriage {
        ticket.set_status(TicketStatus::TriagePending)?;
        ticket.clear_ai_data();
        target_queue = QueueType::Inbox;

        // drop the stale entry and re-enqueue so the INBOX arrival schedules
        // a fresh triage pass
        if let Some(queue) = state.queues.get_ticket_queue(&request.ticket_id) {
            state.queues.remove_from_queue(&request.ticket_id, queue);
        }
        state
            .queues
            .enqueue(&ticket, QueueType::Inbox, &reason, Some(&request.agent_id));
    } else {
        target_queue = ticket.current_queue();
        if old_queue == QueueType::Active {
            state.queues.move_ticket(
                &request.ticket_id,
                QueueType::Active,
                target_queue,
                &ticket,
                &reason,
                Some(&request.agent_id),
            );
        } else {
            state
                .queues
                .enqueue(&ticket, target_queue, &reason, Some(&request.agent_id));
        }
    }

    state.assignments.unassign(&request.agent_id, ticket.id());
    state.repository.save(ticket.clone());

    state
        .publisher
        .publish_ticket_moved(&ticket, old_queue, target_queue);
    if request.retriage {
        state
            .publisher
            .publish_ticket_assigned(&ticket, None, old_assignee.as_deref());
    }

    Ok(Json(json!({
        "success": true,
        "ticket_id": ticket.id(),
        "agent_id": request.agent_id,
        "status": ticket.status(),
        "queue": target_queue,
        "message": if request.retriage {
            "Ticket released for re-triage"
        } else {
            "Ticket released successfully"
        },
    })))
}

pub async fn transfer_ticket(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut ticket = state
        .repository
        .get(&request.ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    if ticket.assignee() != Some(request.from_agent_id.as_str()) {
        return Err(ApiError::Forbidden(
            "You can only transfer tickets assigned to you".into(),
        ));
    }

    let old_assignee = ticket.assignee().map(str::to_string);
    ticket.assign(&request.to_agent_id);

    state
        .assignments
        .unassign(&request.from_agent_id, ticket.id());
    state.assignments.assign(&request.to_agent_id, ticket.id());
    state.repository.save(ticket.clone());

    state.publisher.publish_ticket_assigned(
        &ticket,
        Some(&request.to_agent_id),
        old_assignee.as_deref(),
    );

    Ok(Json(json!({
        "success": true,
        "ticket_id": ticket.id(),
        "agent_id": request.to_agent_id,
        "status": ticket.status(),
        "queue": ticket.current_queue(),
        "message": format!(
            "Ticket transferred from {} to {}",
            request.from_agent_id, request.to_agent_id
        ),
    })))
}

pub async fn available_tickets(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> Json<Value> {
    // over-fetch to survive the post-filters
    let candidates = state
        .queues
        .peek_queue(QueueType::Assignment, query.limit * 2, true);

    let mut tickets = Vec::new();
    for ticket_id in candidates {
        let Some(ticket) = state.repository.get(&ticket_id) else {
            continue;
        };
        if ticket.assignee().is_some() {
            continue;
        }
        if let (Some(wanted), Some(category)) = (&query.category, ticket.category()) {
            if !wanted.eq_ignore_ascii_case(category.as_str()) {
                continue;
            }
        }
        if let Some(wanted) = &query.priority {
            if !wanted.eq_ignore_ascii_case(ticket.priority().as_str()) {
                continue;
            }
        }

        let mut wire = ticket.to_value();
        if let Some((_, position)) = state.queues.get_queue_position(&ticket_id) {
            wire["queue_position"] = json!(position);
        }
        tickets.push(wire);

        if tickets.len() >= query.limit {
            break;
        }
    }

    Json(json!({
        "count": tickets.len(),
        "tickets": tickets,
    }))
}

pub async fn my_tickets(
    State(state): State<AppState>,
    Query(query): Query<MyTicketsQuery>,
) -> Json<Value> {
    let mut tickets: Vec<Ticket> = state
        .assignments
        .get_agent_tickets(&query.agent_id)
        .iter()
        .filter_map(|id| state.repository.get(id))
        .collect();

    // most urgent first, then oldest
    tickets.sort_by_key(|t| (-t.priority().weight(), t.created_at()));

    Json(json!({
        "agent_id": query.agent_id,
        "count": tickets.len(),
        "tickets": tickets.iter().map(Ticket::to_value).collect::<Vec<_>>(),
    }))
}

pub async fn agent_stats(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Json<Value> {
    let ticket_ids = state.assignments.get_agent_tickets(&agent_id);

    let mut by_priority = serde_json::Map::new();
    for priority in ["LOW", "MEDIUM", "HIGH", "CRITICAL"] {
        by_priority.insert(priority.into(), json!(0));
    }
    let mut by_category = serde_json::Map::new();
    let mut by_status = serde_json::Map::new();

    let bump = |map: &mut serde_json::Map<String, Value>, key: &str| {
        let count = map.get(key).and_then(Value::as_u64).unwrap_or(0);
        map.insert(key.to_string(), json!(count + 1));
    };

    for ticket_id in &ticket_ids {
        let Some(ticket) = state.repository.get(ticket_id) else {
            continue;
        };
        bump(&mut by_priority, ticket.priority().as_str());
        let category = ticket
            .category()
            .map_or("UNCATEGORIZED", |c| c.as_str());
        bump(&mut by_category, category);
        bump(&mut by_status, ticket.status().as_str());
    }

    Json(json!({
        "agent_id": agent_id,
        "stats": {
            "total": ticket_ids.len(),
            "by_priority": by_priority,
            "by_category": by_category,
            "by_status": by_status,
        },
    }))
}

fn matches_claim_filters(
    ticket: &Ticket,
    preferred_categories: Option<&[String]>,
    max_priority: Option<TicketPriority>,
) -> bool {
    if let (Some(wanted), Some(category)) = (preferred_categories, ticket.category()) {
        if !wanted.iter().any(|c| c.eq_ignore_ascii_case(category.as_str())) {
            return false;
        }
    }
    if let Some(cap) = max_priority {
        if ticket.priority().weight() > cap.weight() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TicketCategory, TicketContent, TicketSource};
    use chrono::Utc;

    fn ticket(priority: TicketPriority, category: Option<TicketCategory>) -> Ticket {
        let mut t = Ticket::create(
            TicketSource::Form,
            TicketContent::Form {
                form_fields: serde_json::Map::new(),
                submission_time: Utc::now(),
                form_id: None,
                submitter_email: None,
                submitter_name: None,
            },
            priority,
            vec![],
        );
        if let Some(category) = category {
            t.set_category(category);
        }
        t
    }

    #[test]
    fn category_filter_skips_mismatches_but_passes_uncategorised() {
        let billing = ticket(TicketPriority::Medium, Some(TicketCategory::Billing));
        let untagged = ticket(TicketPriority::Medium, None);
        let wanted = vec!["TECHNICAL_SUPPORT".to_string()];

        assert!(!matches_claim_filters(&billing, Some(&wanted), None));
        assert!(matches_claim_filters(&untagged, Some(&wanted), None));
    }

    #[test]
    fn max_priority_caps_what_an_agent_can_claim() {
        let critical = ticket(TicketPriority::Critical, None);
        let low = ticket(TicketPriority::Low, None);

        assert!(!matches_claim_filters(&critical, None, Some(TicketPriority::High)));
        assert!(matches_claim_filters(&low, None, Some(TicketPriority::High)));
    }
}
