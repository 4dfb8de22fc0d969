use tokio::sync::mpsc;

use crate::schema::{QueueType, Ticket, TicketCategory, TicketPriority, TicketStatus};
use crate::services::TriageVerdict;
use crate::state::AppState;

const AUTO_ROUTE_CONFIDENCE: f64 = 0.8;

/// Drains triage requests scheduled by INBOX enqueues. Each ticket gets its
/// own task so a slow classifier call never blocks the next arrival.
pub async fn run_triage_worker(state: AppState, mut rx: mpsc::UnboundedReceiver<String>) {
    tracing::info!("triage worker started");
    while let Some(ticket_id) = rx.recv().await {
        let state = state.clone();
        tokio::spawn(async move {
            triage_ticket(&state, &ticket_id).await;
        });
    }
    tracing::info!("triage worker stopped");
}

/// Classify one INBOX ticket and route it on the reported confidence. A
/// failing classifier leaves the ticket in INBOX untouched; the pipeline
/// must stay live without it.
pub async fn triage_ticket(state: &AppState, ticket_id: &str) {
    let Some(mut ticket) = state.repository.get(ticket_id) else {
        tracing::debug!(ticket_id, "triage skipped, ticket gone");
        return;
    };
    if state.queues.get_ticket_queue(ticket_id) != Some(QueueType::Inbox) {
        tracing::debug!(ticket_id, "triage skipped, ticket left INBOX");
        return;
    }

    let agents = state.agents.available_agents();
    let verdict = match state
        .classifier
        .analyze_triage(ticket.to_value(), &agents)
        .await
    {
        Ok(verdict) => verdict,
        Err(e) => {
            tracing::error!(ticket_id, error = %e, "classifier call failed, ticket stays in INBOX");
            return;
        }
    };

    apply_verdict(&mut ticket, &verdict);
    if ticket.status() == TicketStatus::Inbox {
        // tickets normally arrive flagged TRIAGE_PENDING by ingress; cover
        // resets that landed here via a raw queue move
        let _ = ticket.set_status(TicketStatus::TriagePending);
    }

    let confidence = verdict.confidence;
    let mut assigned: Option<String> = None;

    let routed = if confidence >= AUTO_ROUTE_CONFIDENCE {
        if let Some(assignee) = verdict.suggested_assignee.clone() {
            ticket.assign(&assignee);
            assigned = Some(assignee);
        } else if let Err(e) = ticket.move_to_queue(QueueType::Assignment) {
            tracing::warn!(ticket_id, error = %e, "auto-route rejected by state machine");
            return;
        }
        state.queues.move_ticket(
            ticket_id,
            QueueType::Inbox,
            QueueType::Assignment,
            &ticket,
            &format!("AI Auto-Triage (confidence={confidence})"),
            None,
        )
    } else {
        if let Err(e) = ticket.move_to_queue(QueueType::Triage) {
            tracing::warn!(ticket_id, error = %e, "manual-route rejected by state machine");
            return;
        }
        state.queues.move_ticket(
            ticket_id,
            QueueType::Inbox,
            QueueType::Triage,
            &ticket,
            &format!("AI Triage Needed (confidence={confidence})"),
            None,
        )
    };

    if !routed {
        tracing::warn!(ticket_id, "ticket vanished from INBOX mid-triage");
        return;
    }

    state.repository.save(ticket.clone());

    tracing::info!(
        ticket_id,
        confidence,
        queue = %ticket.current_queue(),
        assignee = assigned.as_deref().unwrap_or("-"),
        "triage routed ticket"
    );

    state
        .publisher
        .publish_ticket_moved(&ticket, QueueType::Inbox, ticket.current_queue());
    if let Some(assignee) = &assigned {
        state
            .publisher
            .publish_ticket_assigned(&ticket, Some(assignee), None);
    }
    if ticket.current_queue() == QueueType::Triage {
        state.publisher.publish_ticket_triage_pending(&ticket);
    }
    if ticket.tags().iter().any(|t| t == "coding") {
        state.publisher.publish_coding_dispatch(&ticket);
    }
}

/// Fold the verdict into the ticket. Enum-valued fields are applied only when
/// they parse; a misbehaving classifier must not poison the ticket.
fn apply_verdict(ticket: &mut Ticket, verdict: &TriageVerdict) {
    ticket.log_reasoning(verdict.as_reasoning());

    if let Some(priority) = verdict.priority.as_deref().and_then(TicketPriority::parse) {
        ticket.update_priority(priority);
    }
    if let Some(category) = verdict.category.as_deref().and_then(TicketCategory::parse) {
        ticket.set_category(category);
    }
    if let Some(assignee) = &verdict.suggested_assignee {
        ticket.set_suggested_assignee(assignee);
    }
    for tag in &verdict.tags {
        ticket.add_tag(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::{TicketContent, TicketSource};
    use crate::services::{AgentProfile, ClassifierService};
    use chrono::Utc;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FixedClassifier(Value);

    #[async_trait::async_trait]
    impl ClassifierService for FixedClassifier {
        async fn analyze_triage(
            &self,
            _ticket: Value,
            _agents: &[AgentProfile],
        ) -> anyhow::Result<TriageVerdict> {
            Ok(serde_json::from_value(self.0.clone())?)
        }
    }

    struct DownClassifier;

    #[async_trait::async_trait]
    impl ClassifierService for DownClassifier {
        async fn analyze_triage(
            &self,
            _ticket: Value,
            _agents: &[AgentProfile],
        ) -> anyhow::Result<TriageVerdict> {
            anyhow::bail!("connection timed out")
        }
    }

    fn test_config() -> Config {
        Config {
            listen_addr: "127.0.0.1:0".into(),
            ai_service_url: "http://localhost:0".into(),
            event_webhook_url: None,
            resolution_webhook_url: None,
            coding_webhook_url: None,
        }
    }

    fn state_with(classifier: Arc<dyn ClassifierService>) -> AppState {
        let (state, _rx) = AppState::build(&test_config(), classifier);
        state
    }

    fn ingest_email(state: &AppState) -> String {
        let mut ticket = Ticket::create(
            TicketSource::Email,
            TicketContent::Email {
                sender_email: "a@x.test".into(),
                recipient_email: "support@x.test".into(),
                subject: "reset password".into(),
                body: "help".into(),
                timestamp: Utc::now(),
                thread_id: None,
                attachments: vec![],
                headers: HashMap::new(),
            },
            TicketPriority::Medium,
            vec![],
        );
        ticket.set_status(TicketStatus::TriagePending).unwrap();
        let id = ticket.id().to_string();
        state.repository.save(ticket.clone());
        state
            .queues
            .enqueue(&ticket, QueueType::Inbox, "ingested from webhook", None);
        id
    }

    #[tokio::test]
    async fn high_confidence_routes_to_assignment_with_assignee() {
        let state = state_with(Arc::new(FixedClassifier(serde_json::json!({
            "category": "TECHNICAL_SUPPORT",
            "priority": "MEDIUM",
            "confidence": 0.9,
            "suggested_assignee": "user-3",
        }))));
        let id = ingest_email(&state);

        triage_ticket(&state, &id).await;

        let ticket = state.repository.get(&id).unwrap();
        assert_eq!(ticket.status(), TicketStatus::Assigned);
        assert_eq!(ticket.current_queue(), QueueType::Assignment);
        assert_eq!(ticket.assignee(), Some("user-3"));
        assert_eq!(ticket.category(), Some(TicketCategory::TechnicalSupport));
        assert_eq!(state.queues.get_ticket_queue(&id), Some(QueueType::Assignment));

        let audit = state.queues.get_audit_log(Some(&id), 10);
        let moved = audit.last().unwrap();
        assert_eq!(moved.from_queue, Some(QueueType::Inbox));
        assert_eq!(moved.to_queue, QueueType::Assignment);
        assert!(moved.reason.contains("0.9"));
    }

    #[tokio::test]
    async fn threshold_confidence_is_inclusive() {
        let state = state_with(Arc::new(FixedClassifier(serde_json::json!({
            "confidence": 0.8,
        }))));
        let id = ingest_email(&state);

        triage_ticket(&state, &id).await;

        let ticket = state.repository.get(&id).unwrap();
        assert_eq!(ticket.status(), TicketStatus::Assigned);
        assert_eq!(state.queues.get_ticket_queue(&id), Some(QueueType::Assignment));
        assert!(ticket.assignee().is_none());
    }

    #[tokio::test]
    async fn low_confidence_routes_to_manual_triage() {
        let state = state_with(Arc::new(FixedClassifier(serde_json::json!({
            "confidence": 0.4,
            "suggested_assignee": "user-2",
        }))));
        let id = ingest_email(&state);

        triage_ticket(&state, &id).await;

        let ticket = state.repository.get(&id).unwrap();
        assert_eq!(ticket.status(), TicketStatus::TriagePending);
        assert_eq!(ticket.current_queue(), QueueType::Triage);
        // suggested but not actually assigned
        assert_eq!(ticket.suggested_assignee(), Some("user-2"));
        assert!(ticket.assignee().is_none());
        assert!(
            state
                .queues
                .get_audit_log(Some(&id), 10)
                .last()
                .unwrap()
                .reason
                .contains("0.4")
        );
    }

    #[tokio::test]
    async fn classifier_failure_leaves_ticket_in_inbox() {
        let state = state_with(Arc::new(DownClassifier));
        let id = ingest_email(&state);

        triage_ticket(&state, &id).await;

        let ticket = state.repository.get(&id).unwrap();
        assert_eq!(state.queues.get_ticket_queue(&id), Some(QueueType::Inbox));
        assert!(ticket.ai_reasoning().is_empty());
        // only the initial enqueue is audited
        assert_eq!(state.queues.get_audit_log(Some(&id), 10).len(), 1);
    }

    #[tokio::test]
    async fn invalid_enum_strings_are_ignored_but_rest_applies() {
        let state = state_with(Arc::new(FixedClassifier(serde_json::json!({
            "category": "GARDENING",
            "priority": "EXTREME",
            "confidence": 0.5,
            "tags": ["password", "password"],
            "reasoning": "unsure",
        }))));
        let id = ingest_email(&state);

        triage_ticket(&state, &id).await;

        let ticket = state.repository.get(&id).unwrap();
        assert!(ticket.category().is_none());
        assert_eq!(ticket.priority(), TicketPriority::Medium);
        assert_eq!(ticket.tags(), ["password".to_string()]);
        assert_eq!(ticket.ai_reasoning()["reasoning"], "unsure");
        assert_eq!(ticket.ai_reasoning()["category"], "GARDENING");
    }

    #[tokio::test]
    async fn tickets_already_routed_are_skipped() {
        let state = state_with(Arc::new(FixedClassifier(serde_json::json!({
            "confidence": 0.9,
        }))));
        let id = ingest_email(&state);
        // a human dequeued it first
        state.queues.dequeue(QueueType::Inbox, true);

        triage_ticket(&state, &id).await;

        let ticket = state.repository.get(&id).unwrap();
        assert_eq!(ticket.status(), TicketStatus::TriagePending);
        assert!(ticket.ai_reasoning().is_empty());
    }

    #[tokio::test]
    async fn retriage_after_clear_matches_fresh_triage() {
        let state = state_with(Arc::new(FixedClassifier(serde_json::json!({
            "category": "BILLING",
            "priority": "HIGH",
            "confidence": 0.95,
            "suggested_assignee": "user-1",
        }))));
        let id = ingest_email(&state);
        triage_ticket(&state, &id).await;

        // release with retriage: clear AI data, back to INBOX
        let mut ticket = state.repository.get(&id).unwrap();
        ticket.unassign();
        ticket.set_status(TicketStatus::TriagePending).unwrap();
        ticket.clear_ai_data();
        state.repository.save(ticket.clone());
        state.queues.remove_from_queue(&id, QueueType::Assignment);
        state
            .queues
            .enqueue(&ticket, QueueType::Inbox, "re-triage requested", None);

        triage_ticket(&state, &id).await;

        let again = state.repository.get(&id).unwrap();
        assert_eq!(again.category(), Some(TicketCategory::Billing));
        assert_eq!(again.priority(), TicketPriority::High);
        assert_eq!(again.suggested_assignee(), Some("user-1"));
        assert_eq!(again.current_queue(), QueueType::Assignment);
    }
}
