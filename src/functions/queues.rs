use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::schema::{QueueType, Ticket};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MoveTicketRequest {
    pub ticket_id: String,
    pub from_queue: QueueType,
    pub to_queue: QueueType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PeekQuery {
    #[serde(default = "default_peek_limit")]
    pub limit: usize,
    #[serde(default = "default_true")]
    pub priority_based: bool,
}

#[derive(Debug, Deserialize)]
pub struct DetailsQuery {
    #[serde(default = "default_details_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct DequeueQuery {
    #[serde(default = "default_true")]
    pub priority_based: bool,
}

fn default_peek_limit() -> usize {
    10
}

fn default_details_limit() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn parse_queue(name: &str) -> Result<QueueType, ApiError> {
    QueueType::parse(name).ok_or_else(|| ApiError::NotFound(format!("Queue '{name}' not found")))
}

pub async fn list_all_queues(State(state): State<AppState>) -> Json<Value> {
    let stats = state.queues.get_all_queue_stats();
    let total: usize = stats.iter().map(|s| s.count).sum();
    Json(json!({
        "queues": stats,
        "total_tickets": total,
    }))
}

pub async fn queue_details(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DetailsQuery>,
) -> Result<Json<Value>, ApiError> {
    let queue = parse_queue(&name)?;
    let stats = state.queues.get_queue_stats(queue);

    let tickets: Vec<Value> = state
        .queues
        .peek_queue(queue, query.limit, true)
        .iter()
        .filter_map(|id| state.repository.get(id))
        .map(|ticket| {
            let mut wire = ticket.to_value();
            if let Some((_, position)) = state.queues.get_queue_position(ticket.id()) {
                wire["queue_position"] = json!(position);
            }
            wire
        })
        .collect();

    Ok(Json(json!({
        "queue": queue,
        "stats": stats,
        "tickets": tickets,
    })))
}

pub async fn peek_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PeekQuery>,
) -> Result<Json<Value>, ApiError> {
    let queue = parse_queue(&name)?;
    let ticket_ids = state
        .queues
        .peek_queue(queue, query.limit, query.priority_based);

    let tickets: Vec<Value> = ticket_ids
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            state.repository.get(id).map(|ticket| {
                json!({
                    "position": i + 1,
                    "ticket_id": id,
                    "priority": ticket.priority(),
                    "category": ticket.category(),
                    "created_at": ticket.created_at(),
                    "sender": ticket.content().sender(),
                })
            })
        })
        .collect();

    Ok(Json(json!({
        "queue": queue,
        "count": tickets.len(),
        "tickets": tickets,
    })))
}

pub async fn queue_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let queue = parse_queue(&name)?;
    Ok(Json(json!(state.queues.get_queue_stats(queue))))
}

pub async fn dequeue_ticket(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DequeueQuery>,
) -> Result<Json<Value>, ApiError> {
    let queue = parse_queue(&name)?;

    let Some(ticket_id) = state.queues.dequeue(queue, query.priority_based) else {
        return Ok(Json(json!({
            "ticket_id": null,
            "ticket": null,
            "queue": queue,
        })));
    };

    let ticket = state.repository.get(&ticket_id).map(|t| t.to_value());
    Ok(Json(json!({
        "ticket_id": ticket_id,
        "ticket": ticket,
        "queue": queue,
    })))
}

/// Manual queue move with state validation and live stats refresh for both
/// ends.
pub async fn move_ticket(
    State(state): State<AppState>,
    Json(request): Json<MoveTicketRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut ticket: Ticket = state
        .repository
        .get(&request.ticket_id)
        .ok_or_else(|| ApiError::NotFound("Ticket not found".into()))?;

    let current = state.queues.get_ticket_queue(&request.ticket_id);
    if current != Some(request.from_queue) {
        return Err(ApiError::Validation(format!(
            "Ticket is not in {} queue",
            request.from_queue
        )));
    }

    ticket.move_to_queue(request.to_queue)?;

    let moved = state.queues.move_ticket(
        &request.ticket_id,
        request.from_queue,
        request.to_queue,
        &ticket,
        request.reason.as_deref().unwrap_or("manual move"),
        request.actor.as_deref(),
    );
    if !moved {
        return Err(ApiError::Validation("Failed to move ticket in queue".into()));
    }

    state.repository.save(ticket.clone());
    state
        .publisher
        .publish_ticket_moved(&ticket, request.from_queue, request.to_queue);
    for queue in [request.from_queue, request.to_queue] {
        let stats = state.queues.get_queue_stats(queue);
        state.publisher.publish_queue_stats(queue, json!(stats));
    }

    Ok(Json(json!({
        "ticket_id": request.ticket_id,
        "from_queue": request.from_queue,
        "to_queue": request.to_queue,
        "status": ticket.status(),
    })))
}
