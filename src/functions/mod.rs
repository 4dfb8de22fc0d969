pub mod autoclose;
pub mod distribution;
pub mod queues;
pub mod tickets;
pub mod triage;
pub mod ws;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde_json::{Value, json};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .route("/ws/stats", get(ws::ws_stats))
        .route("/api/tickets/ingest", post(tickets::ingest))
        .route("/api/tickets", get(tickets::list_tickets))
        .route(
            "/api/tickets/{ticket_id}",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route(
            "/api/tickets/{ticket_id}/triage_complete",
            post(tickets::triage_complete),
        )
        .route("/api/tickets/{ticket_id}/resolve", post(tickets::resolve_ticket))
        .route("/api/queues", get(queues::list_all_queues))
        .route("/api/queues/move", post(queues::move_ticket))
        .route("/api/queues/{name}", get(queues::queue_details))
        .route("/api/queues/{name}/peek", get(queues::peek_queue))
        .route("/api/queues/{name}/stats", get(queues::queue_stats))
        .route("/api/queues/{name}/dequeue", post(queues::dequeue_ticket))
        .route("/api/distribution/claim", post(distribution::claim_ticket))
        .route("/api/distribution/assign", post(distribution::assign_ticket))
        .route("/api/distribution/release", post(distribution::release_ticket))
        .route("/api/distribution/transfer", post(distribution::transfer_ticket))
        .route("/api/distribution/available", get(distribution::available_tickets))
        .route("/api/distribution/my-tickets", get(distribution::my_tickets))
        .route(
            "/api/distribution/agent-stats/{agent_id}",
            get(distribution::agent_stats),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "ticket-ingestion-pipeline"}))
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "Ticket Ingestion Pipeline",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "websocket": "/ws?client_id=your-id",
        "endpoints": {
            "tickets": "/api/tickets",
            "queues": "/api/queues",
            "distribution": "/api/distribution",
        },
    }))
}
