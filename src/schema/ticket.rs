use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::content::TicketContent;
use super::enums::{
    QueueType, ResolveAction, TicketCategory, TicketPriority, TicketSource, TicketStatus,
    can_transition,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot transition from {from} to {to}")]
pub struct InvalidStateTransition {
    pub from: TicketStatus,
    pub to: TicketStatus,
}

/// A normalised user report flowing through the pipeline. Identity and
/// creation time are fixed at construction; every other mutation goes through
/// a method that bumps `updated_at`.
#[derive(Debug, Clone)]
pub struct Ticket {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    source: TicketSource,
    content: TicketContent,
    priority: TicketPriority,
    category: Option<TicketCategory>,
    status: TicketStatus,
    current_queue: QueueType,
    assignee: Option<String>,
    tags: Vec<String>,
    ai_reasoning: serde_json::Map<String, Value>,
    resolution_action: ResolveAction,
    suggested_assignee: Option<String>,
    title: Option<String>,
    description: Option<String>,
}

impl Ticket {
    pub fn create(
        source: TicketSource,
        content: TicketContent,
        priority: TicketPriority,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let mut deduped = Vec::new();
        for tag in tags {
            if !deduped.contains(&tag) {
                deduped.push(tag);
            }
        }
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source,
            content,
            priority,
            category: None,
            status: TicketStatus::Inbox,
            current_queue: QueueType::Inbox,
            assignee: None,
            tags: deduped,
            ai_reasoning: serde_json::Map::new(),
            resolution_action: ResolveAction::None,
            suggested_assignee: None,
            title: None,
            description: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn source(&self) -> TicketSource {
        self.source
    }

    pub fn content(&self) -> &TicketContent {
        &self.content
    }

    pub fn priority(&self) -> TicketPriority {
        self.priority
    }

    pub fn category(&self) -> Option<TicketCategory> {
        self.category
    }

    pub fn status(&self) -> TicketStatus {
        self.status
    }

    pub fn current_queue(&self) -> QueueType {
        self.current_queue
    }

    pub fn assignee(&self) -> Option<&str> {
        self.assignee.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn ai_reasoning(&self) -> &serde_json::Map<String, Value> {
        &self.ai_reasoning
    }

    pub fn resolution_action(&self) -> ResolveAction {
        self.resolution_action
    }

    pub fn suggested_assignee(&self) -> Option<&str> {
        self.suggested_assignee.as_deref()
    }

    /// Explicit non-empty title, falling back to whatever the content can
    /// offer.
    pub fn title(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        match &self.content {
            TicketContent::Email { subject, .. } => subject.clone(),
            TicketContent::Github { issue_title, .. } => issue_title.clone(),
            TicketContent::Discord { message_text, .. } => truncate_chars(message_text, 100),
            TicketContent::Sms { .. } | TicketContent::Form { .. } => {
                "Untitled Ticket".to_string()
            }
        }
    }

    pub fn description(&self) -> String {
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            return description.to_string();
        }
        match &self.content {
            TicketContent::Email { body, .. } => body.clone(),
            TicketContent::Github { issue_body, .. } => issue_body.clone(),
            TicketContent::Discord { message_text, .. } => message_text.clone(),
            TicketContent::Sms { .. } | TicketContent::Form { .. } => String::new(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to a queue, adopting its coupled status. Moving to INBOX is a
    /// reset and is legal from any state.
    pub fn move_to_queue(&mut self, queue: QueueType) -> Result<(), InvalidStateTransition> {
        if queue == QueueType::Inbox {
            self.status = TicketStatus::Inbox;
            self.current_queue = QueueType::Inbox;
            self.touch();
            return Ok(());
        }

        let new_status = queue.coupled_status();
        if !can_transition(self.status, new_status) {
            return Err(InvalidStateTransition {
                from: self.status,
                to: new_status,
            });
        }
        self.status = new_status;
        self.current_queue = queue;
        self.touch();
        Ok(())
    }

    /// Direct status write (ingress feedback and the PATCH path). Validated
    /// against the transition table but deliberately queue-preserving: queue
    /// residency is owned by the queue manager, and ingress parks tickets in
    /// INBOX while already flagging them TRIAGE_PENDING.
    pub fn set_status(&mut self, status: TicketStatus) -> Result<(), InvalidStateTransition> {
        if !can_transition(self.status, status) {
            return Err(InvalidStateTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    /// Set the assignee. First assignment out of INBOX/TRIAGE_PENDING
    /// promotes the ticket to ASSIGNED; reassignment leaves status alone.
    pub fn assign(&mut self, assignee: &str) {
        self.assignee = Some(assignee.to_string());
        if matches!(
            self.status,
            TicketStatus::Inbox | TicketStatus::TriagePending
        ) {
            self.status = TicketStatus::Assigned;
            self.current_queue = QueueType::Assignment;
        }
        self.touch();
    }

    /// Clear the assignee and reset to INBOX regardless of prior state.
    pub fn unassign(&mut self) {
        self.assignee = None;
        self.status = TicketStatus::Inbox;
        self.current_queue = QueueType::Inbox;
        self.touch();
    }

    pub fn mark_resolved(&mut self, action: ResolveAction) -> Result<(), InvalidStateTransition> {
        if !can_transition(self.status, TicketStatus::Resolved) {
            return Err(InvalidStateTransition {
                from: self.status,
                to: TicketStatus::Resolved,
            });
        }
        self.status = TicketStatus::Resolved;
        self.current_queue = QueueType::Resolution;
        self.resolution_action = action;
        self.touch();
        Ok(())
    }

    /// Terminal close; only RESOLVED tickets qualify. The queue field is left
    /// as-is (closed tickets rest under RESOLUTION by convention).
    pub fn close(&mut self) -> Result<(), InvalidStateTransition> {
        if self.status != TicketStatus::Resolved {
            return Err(InvalidStateTransition {
                from: self.status,
                to: TicketStatus::Closed,
            });
        }
        self.status = TicketStatus::Closed;
        self.touch();
        Ok(())
    }

    pub fn update_priority(&mut self, priority: TicketPriority) {
        self.priority = priority;
        self.touch();
    }

    pub fn set_category(&mut self, category: TicketCategory) {
        self.category = Some(category);
        self.touch();
    }

    pub fn update_title(&mut self, title: String) {
        self.title = Some(title);
        self.touch();
    }

    pub fn update_description(&mut self, description: String) {
        self.description = Some(description);
        self.touch();
    }

    /// Merge classification output into the reasoning map.
    pub fn log_reasoning(&mut self, reasoning: serde_json::Map<String, Value>) {
        for (key, value) in reasoning {
            self.ai_reasoning.insert(key, value);
        }
        self.touch();
    }

    pub fn set_suggested_assignee(&mut self, assignee: &str) {
        self.suggested_assignee = Some(assignee.to_string());
        self.touch();
    }

    pub fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
            self.touch();
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        if let Some(pos) = self.tags.iter().position(|t| t == tag) {
            self.tags.remove(pos);
            self.touch();
        }
    }

    /// Store an AI-generated response for auto-resolved tickets.
    pub fn add_ai_response(&mut self, response: &str, source_docs: Vec<String>) {
        self.ai_reasoning
            .insert("auto_response".into(), Value::String(response.to_string()));
        self.ai_reasoning
            .insert("auto_resolved".into(), Value::Bool(true));
        self.ai_reasoning
            .insert("source_docs".into(), serde_json::json!(source_docs));
        self.touch();
    }

    /// Wipe classification state ahead of a re-triage. Priority falls back to
    /// the MEDIUM default a fresh ticket would carry.
    pub fn clear_ai_data(&mut self) {
        self.ai_reasoning = serde_json::Map::new();
        self.category = None;
        self.priority = TicketPriority::default();
        self.suggested_assignee = None;
        self.touch();
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("ticket serialization is infallible")
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Wire shape per the transport contract: enum fields as strings, timestamps
/// ISO-8601 UTC, content nested with its `type` tag, title/description always
/// present in their resolved form.
#[derive(Serialize, Deserialize)]
struct TicketWire {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    source: TicketSource,
    #[serde(default)]
    priority: TicketPriority,
    #[serde(default)]
    category: Option<TicketCategory>,
    #[serde(default = "default_status")]
    status: TicketStatus,
    #[serde(default = "default_queue")]
    current_queue: QueueType,
    content: TicketContent,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    ai_reasoning: serde_json::Map<String, Value>,
    #[serde(default)]
    resolution_action: ResolveAction,
    #[serde(default)]
    suggested_assignee: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn default_status() -> TicketStatus {
    TicketStatus::Inbox
}

fn default_queue() -> QueueType {
    QueueType::Inbox
}

impl Serialize for Ticket {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TicketWire {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            source: self.source,
            priority: self.priority,
            category: self.category,
            status: self.status,
            current_queue: self.current_queue,
            content: self.content.clone(),
            assignee: self.assignee.clone(),
            tags: self.tags.clone(),
            ai_reasoning: self.ai_reasoning.clone(),
            resolution_action: self.resolution_action,
            suggested_assignee: self.suggested_assignee.clone(),
            title: Some(self.title()),
            description: Some(self.description()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ticket {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = TicketWire::deserialize(deserializer)?;
        Ok(Self {
            id: wire.id,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            source: wire.source,
            content: wire.content,
            priority: wire.priority,
            category: wire.category,
            status: wire.status,
            current_queue: wire.current_queue,
            assignee: wire.assignee,
            tags: wire.tags,
            ai_reasoning: wire.ai_reasoning,
            resolution_action: wire.resolution_action,
            suggested_assignee: wire.suggested_assignee,
            title: wire.title,
            description: wire.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn email_content() -> TicketContent {
        TicketContent::Email {
            sender_email: "a@x.test".into(),
            recipient_email: "support@x.test".into(),
            subject: "reset password".into(),
            body: "help".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            thread_id: None,
            attachments: vec![],
            headers: HashMap::new(),
        }
    }

    fn ticket() -> Ticket {
        Ticket::create(
            TicketSource::Email,
            email_content(),
            TicketPriority::Medium,
            vec![],
        )
    }

    #[test]
    fn fresh_ticket_starts_in_inbox() {
        let t = ticket();
        assert_eq!(t.status(), TicketStatus::Inbox);
        assert_eq!(t.current_queue(), QueueType::Inbox);
        assert!(t.updated_at() >= t.created_at());
        assert!(t.assignee().is_none());
    }

    #[test]
    fn create_dedups_seed_tags() {
        let t = Ticket::create(
            TicketSource::Email,
            email_content(),
            TicketPriority::Medium,
            vec!["a".into(), "b".into(), "a".into()],
        );
        assert_eq!(t.tags(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn move_to_queue_couples_status() {
        let mut t = ticket();
        t.set_status(TicketStatus::TriagePending).unwrap();
        t.move_to_queue(QueueType::Assignment).unwrap();
        assert_eq!(t.status(), TicketStatus::Assigned);
        assert_eq!(t.current_queue(), QueueType::Assignment);
    }

    #[test]
    fn illegal_queue_move_is_rejected_without_mutation() {
        let mut t = ticket();
        let before = t.updated_at();
        let err = t.move_to_queue(QueueType::Active).unwrap_err();
        assert_eq!(err.from, TicketStatus::Inbox);
        assert_eq!(err.to, TicketStatus::InProgress);
        assert_eq!(t.status(), TicketStatus::Inbox);
        assert_eq!(t.updated_at(), before);
    }

    #[test]
    fn inbox_move_resets_from_any_state() {
        let mut t = ticket();
        t.assign("user-1");
        t.move_to_queue(QueueType::Active).unwrap();
        t.move_to_queue(QueueType::Inbox).unwrap();
        assert_eq!(t.status(), TicketStatus::Inbox);
        assert_eq!(t.current_queue(), QueueType::Inbox);
    }

    #[test]
    fn first_assignment_promotes_to_assigned() {
        let mut t = ticket();
        t.assign("user-3");
        assert_eq!(t.status(), TicketStatus::Assigned);
        assert_eq!(t.current_queue(), QueueType::Assignment);
        assert_eq!(t.assignee(), Some("user-3"));
    }

    #[test]
    fn reassignment_in_active_keeps_status() {
        let mut t = ticket();
        t.assign("user-3");
        t.move_to_queue(QueueType::Active).unwrap();
        t.assign("user-5");
        assert_eq!(t.status(), TicketStatus::InProgress);
        assert_eq!(t.current_queue(), QueueType::Active);
        assert_eq!(t.assignee(), Some("user-5"));
    }

    #[test]
    fn unassign_always_resets_to_inbox() {
        let mut t = ticket();
        t.assign("user-3");
        t.move_to_queue(QueueType::Active).unwrap();
        t.unassign();
        assert!(t.assignee().is_none());
        assert_eq!(t.status(), TicketStatus::Inbox);
        assert_eq!(t.current_queue(), QueueType::Inbox);
    }

    #[test]
    fn resolve_requires_a_legal_path() {
        let mut t = ticket();
        assert!(t.mark_resolved(ResolveAction::Manual).is_err());

        t.assign("user-1");
        t.mark_resolved(ResolveAction::FaqLink).unwrap();
        assert_eq!(t.status(), TicketStatus::Resolved);
        assert_eq!(t.current_queue(), QueueType::Resolution);
        assert_eq!(t.resolution_action(), ResolveAction::FaqLink);
    }

    #[test]
    fn close_requires_resolved() {
        let mut t = ticket();
        t.assign("user-1");
        assert!(t.close().is_err());

        t.mark_resolved(ResolveAction::Manual).unwrap();
        t.close().unwrap();
        assert_eq!(t.status(), TicketStatus::Closed);
        // closed tickets rest in their last queue
        assert_eq!(t.current_queue(), QueueType::Resolution);
    }

    #[test]
    fn direct_status_write_can_close_in_progress_work() {
        let mut t = ticket();
        t.assign("user-1");
        t.move_to_queue(QueueType::Active).unwrap();
        t.set_status(TicketStatus::Closed).unwrap();
        assert_eq!(t.status(), TicketStatus::Closed);
        // queue residency is untouched by direct status writes
        assert_eq!(t.current_queue(), QueueType::Active);
    }

    #[test]
    fn direct_status_write_leaves_queue_to_the_queue_manager() {
        let mut t = ticket();
        t.set_status(TicketStatus::TriagePending).unwrap();
        assert_eq!(t.status(), TicketStatus::TriagePending);
        assert_eq!(t.current_queue(), QueueType::Inbox);
    }

    #[test]
    fn closed_can_only_reopen_via_inbox() {
        let mut t = ticket();
        t.assign("user-1");
        t.mark_resolved(ResolveAction::Manual).unwrap();
        t.close().unwrap();
        assert!(t.set_status(TicketStatus::Assigned).is_err());
        t.move_to_queue(QueueType::Inbox).unwrap();
        assert_eq!(t.status(), TicketStatus::Inbox);
        assert_eq!(t.current_queue(), QueueType::Inbox);
    }

    #[test]
    fn tags_stay_unique_in_insertion_order() {
        let mut t = ticket();
        t.add_tag("billing");
        t.add_tag("urgent");
        t.add_tag("billing");
        assert_eq!(t.tags(), ["billing".to_string(), "urgent".to_string()]);
        t.remove_tag("billing");
        assert_eq!(t.tags(), ["urgent".to_string()]);
    }

    #[test]
    fn clear_ai_data_resets_classification() {
        let mut t = ticket();
        let mut reasoning = serde_json::Map::new();
        reasoning.insert("confidence".into(), serde_json::json!(0.9));
        t.log_reasoning(reasoning);
        t.set_category(TicketCategory::Billing);
        t.update_priority(TicketPriority::Critical);
        t.set_suggested_assignee("user-2");

        t.clear_ai_data();
        assert!(t.ai_reasoning().is_empty());
        assert!(t.category().is_none());
        assert_eq!(t.priority(), TicketPriority::Medium);
        assert!(t.suggested_assignee().is_none());
    }

    #[test]
    fn title_and_description_fall_back_to_content() {
        let mut t = ticket();
        assert_eq!(t.title(), "reset password");
        assert_eq!(t.description(), "help");

        t.update_title("VIP escalation".into());
        t.update_description("call them back".into());
        assert_eq!(t.title(), "VIP escalation");
        assert_eq!(t.description(), "call them back");
    }

    #[test]
    fn empty_overrides_fall_through_to_content() {
        let mut t = ticket();
        t.update_title(String::new());
        t.update_description(String::new());
        assert_eq!(t.title(), "reset password");
        assert_eq!(t.description(), "help");
    }

    #[test]
    fn sms_content_offers_no_title_or_description() {
        let t = Ticket::create(
            TicketSource::Webhook,
            TicketContent::Sms {
                sender_phone_number: "+15550001111".into(),
                recipient_phone_number: "+15550002222".into(),
                message_body: "my router is dead".into(),
                timestamp: Utc::now(),
                message_sid: Some("SM1".into()),
            },
            TicketPriority::Medium,
            vec![],
        );
        assert_eq!(t.title(), "Untitled Ticket");
        assert_eq!(t.description(), "");
    }

    #[test]
    fn wire_round_trip_preserves_observable_state() {
        let mut t = ticket();
        t.assign("user-3");
        t.set_category(TicketCategory::TechnicalSupport);
        t.add_tag("password");
        let mut reasoning = serde_json::Map::new();
        reasoning.insert("confidence".into(), serde_json::json!(0.92));
        t.log_reasoning(reasoning);

        let value = t.to_value();
        assert_eq!(value["status"], "ASSIGNED");
        assert_eq!(value["content"]["type"], "email");
        assert_eq!(value["title"], "reset password");

        let back = Ticket::from_value(value).unwrap();
        assert_eq!(back.id(), t.id());
        assert_eq!(back.status(), t.status());
        assert_eq!(back.current_queue(), t.current_queue());
        assert_eq!(back.priority(), t.priority());
        assert_eq!(back.category(), t.category());
        assert_eq!(back.assignee(), t.assignee());
        assert_eq!(back.tags(), t.tags());
        assert_eq!(back.ai_reasoning(), t.ai_reasoning());
        assert_eq!(back.title(), t.title());
        assert_eq!(back.description(), t.description());
        assert_eq!(back.created_at(), t.created_at());
    }

    #[test]
    fn wire_defaults_fill_missing_optional_fields() {
        let value = serde_json::json!({
            "id": "t-1",
            "created_at": "2026-03-01T12:00:00Z",
            "updated_at": "2026-03-01T12:00:00Z",
            "source": "FORM",
            "content": {
                "type": "form",
                "form_fields": {"message": "hi"},
                "submission_time": "2026-03-01T12:00:00Z"
            }
        });
        let t = Ticket::from_value(value).unwrap();
        assert_eq!(t.priority(), TicketPriority::Medium);
        assert_eq!(t.status(), TicketStatus::Inbox);
        assert_eq!(t.current_queue(), QueueType::Inbox);
        assert_eq!(t.resolution_action(), ResolveAction::None);
        assert!(t.tags().is_empty());
    }
}
