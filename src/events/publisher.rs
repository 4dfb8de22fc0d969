use std::sync::Arc;

use serde_json::{Value, json};

use super::bus::SubscriptionBus;
use crate::schema::{QueueType, Ticket};
use crate::services::{AgentDirectory, WorkflowWebhooks};

const MIRROR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const PREVIEW_CHARS: usize = 500;

/// Fans ticket state changes out to the subscription bus and mirrors them to
/// an optional external webhook. Local broadcast is synchronous; all network
/// delivery is spawned so an originating operation never waits on it.
pub struct EventPublisher {
    bus: Arc<SubscriptionBus>,
    webhooks: Arc<WorkflowWebhooks>,
    agents: Arc<AgentDirectory>,
    external_url: Option<String>,
    client: reqwest::Client,
}

impl EventPublisher {
    pub fn new(
        bus: Arc<SubscriptionBus>,
        webhooks: Arc<WorkflowWebhooks>,
        agents: Arc<AgentDirectory>,
        external_url: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(MIRROR_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            bus,
            webhooks,
            agents,
            external_url,
            client,
        }
    }

    pub fn publish_ticket_created(&self, ticket: &Ticket) {
        self.publish(
            "ticket.created",
            json!({
                "ticket_id": ticket.id(),
                "source": ticket.source(),
                "queue": ticket.current_queue(),
                "priority": ticket.priority(),
                "sender": ticket.content().sender(),
            }),
            Some(ticket),
            Vec::new(),
        );
    }

    pub fn publish_ticket_updated(&self, ticket: &Ticket, changes: Value) {
        self.publish(
            "ticket.updated",
            json!({
                "ticket_id": ticket.id(),
                "changes": changes,
                "status": ticket.status(),
                "queue": ticket.current_queue(),
            }),
            Some(ticket),
            Vec::new(),
        );
    }

    pub fn publish_ticket_moved(&self, ticket: &Ticket, from: QueueType, to: QueueType) {
        self.publish(
            "ticket.moved",
            json!({
                "ticket_id": ticket.id(),
                "from_queue": from,
                "to_queue": to,
                "status": ticket.status(),
            }),
            Some(ticket),
            vec![format!("queue.{from}"), format!("queue.{to}")],
        );
    }

    pub fn publish_ticket_assigned(
        &self,
        ticket: &Ticket,
        assignee: Option<&str>,
        previous_assignee: Option<&str>,
    ) {
        let mut extra = Vec::new();
        if let Some(assignee) = assignee {
            extra.push(format!("agent.{assignee}"));
        }
        self.publish(
            "ticket.assigned",
            json!({
                "ticket_id": ticket.id(),
                "assignee": assignee,
                "previous_assignee": previous_assignee,
                "queue": ticket.current_queue(),
            }),
            Some(ticket),
            extra,
        );
    }

    /// Announce that a ticket needs a human triage decision, with enough
    /// context for the dashboard to act on it directly.
    pub fn publish_ticket_triage_pending(&self, ticket: &Ticket) {
        let preview: String = ticket.content().extract_body().chars().take(PREVIEW_CHARS).collect();
        self.publish(
            "ticket.triage_pending",
            json!({
                "ticket_id": ticket.id(),
                "source": ticket.source(),
                "content_preview": preview,
                "priority": ticket.priority(),
                "available_agents": self.agents.available_agents(),
            }),
            Some(ticket),
            Vec::new(),
        );
    }

    /// Broadcast resolution and hand the response back to the workflow
    /// engine for delivery through the originating channel.
    pub fn publish_ticket_resolved(&self, ticket: &Ticket, resolution_message: Option<&str>) {
        self.publish(
            "ticket.resolved",
            json!({
                "ticket_id": ticket.id(),
                "status": ticket.status(),
                "queue": ticket.current_queue(),
                "resolution_action": ticket.resolution_action(),
                "assignee": ticket.assignee(),
            }),
            Some(ticket),
            Vec::new(),
        );

        let webhooks = self.webhooks.clone();
        let ticket = ticket.clone();
        let message = resolution_message.map(str::to_string);
        tokio::spawn(async move {
            webhooks.send_resolution(&ticket, message.as_deref()).await;
        });
    }

    pub fn publish_coding_dispatch(&self, ticket: &Ticket) {
        let webhooks = self.webhooks.clone();
        let ticket = ticket.clone();
        tokio::spawn(async move {
            webhooks.send_coding_dispatch(&ticket).await;
        });
    }

    pub fn publish_queue_stats(&self, queue: QueueType, stats: Value) {
        let channels = vec!["all".to_string(), format!("queue.{queue}")];
        self.bus.broadcast_event(
            "queue.stats",
            json!({
                "queue": queue,
                "stats": stats,
            }),
            &channels,
        );
        self.mirror("queue.stats", json!({"queue": queue}));
    }

    fn publish(&self, event_type: &str, data: Value, ticket: Option<&Ticket>, extra: Vec<String>) {
        let mut channels = vec!["all".to_string(), "tickets.all".to_string()];
        if let Some(ticket) = ticket {
            channels.push(format!("ticket.{}", ticket.id()));
            channels.push(format!("queue.{}", ticket.current_queue()));
        }
        channels.extend(extra);

        self.bus.broadcast_event(event_type, data.clone(), &channels);
        self.mirror(event_type, data);
    }

    /// Best-effort copy to the external webhook; failures are logged and
    /// never reach the originating operation.
    fn mirror(&self, event_type: &str, data: Value) {
        let Some(url) = self.external_url.clone() else {
            return;
        };
        let mut payload = match data {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".into(), other);
                map
            }
        };
        payload.insert("event".into(), json!(event_type));

        let client = self.client.clone();
        let event_type = event_type.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                tracing::error!(event = %event_type, error = %e, "event mirror failed");
            }
        });
    }
}
