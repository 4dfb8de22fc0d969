use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::schema::{QueueType, Ticket, TicketCategory, TicketPriority, TicketStatus};

/// Filters for the combined repository lookup.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub queue: Option<QueueType>,
    pub assignee: Option<String>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
}

/// In-memory ticket store behind a CRUD contract, so a durable backend can be
/// swapped in later. `get` hands out a clone; callers mutate and `save` back.
pub struct TicketRepository {
    tickets: Mutex<HashMap<String, Ticket>>,
}

impl TicketRepository {
    pub fn new() -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
        }
    }

    pub fn save(&self, ticket: Ticket) {
        let mut tickets = self.tickets.lock().expect("repository lock poisoned");
        tickets.insert(ticket.id().to_string(), ticket);
    }

    pub fn get(&self, ticket_id: &str) -> Option<Ticket> {
        let tickets = self.tickets.lock().expect("repository lock poisoned");
        tickets.get(ticket_id).cloned()
    }

    pub fn get_all(&self) -> Vec<Ticket> {
        let tickets = self.tickets.lock().expect("repository lock poisoned");
        tickets.values().cloned().collect()
    }

    pub fn delete(&self, ticket_id: &str) -> bool {
        let mut tickets = self.tickets.lock().expect("repository lock poisoned");
        tickets.remove(ticket_id).is_some()
    }

    pub fn exists(&self, ticket_id: &str) -> bool {
        let tickets = self.tickets.lock().expect("repository lock poisoned");
        tickets.contains_key(ticket_id)
    }

    pub fn count(&self) -> usize {
        let tickets = self.tickets.lock().expect("repository lock poisoned");
        tickets.len()
    }

    pub fn find_by_status(&self, status: TicketStatus) -> Vec<Ticket> {
        self.collect(|t| t.status() == status)
    }

    pub fn find_by_queue(&self, queue: QueueType) -> Vec<Ticket> {
        self.collect(|t| t.current_queue() == queue)
    }

    pub fn find_by_assignee(&self, assignee: &str) -> Vec<Ticket> {
        self.collect(|t| t.assignee() == Some(assignee))
    }

    pub fn find_by_priority(&self, priority: TicketPriority) -> Vec<Ticket> {
        self.collect(|t| t.priority() == priority)
    }

    pub fn find_by_category(&self, category: TicketCategory) -> Vec<Ticket> {
        self.collect(|t| t.category() == Some(category))
    }

    /// Combined filter, newest first, with offset/limit pagination.
    pub fn find(&self, filter: &TicketFilter, limit: usize, offset: usize) -> Vec<Ticket> {
        let tickets = self.tickets.lock().expect("repository lock poisoned");
        let mut results: Vec<Ticket> = tickets
            .values()
            .filter(|t| filter.status.is_none_or(|s| t.status() == s))
            .filter(|t| filter.queue.is_none_or(|q| t.current_queue() == q))
            .filter(|t| {
                filter
                    .assignee
                    .as_deref()
                    .is_none_or(|a| t.assignee() == Some(a))
            })
            .filter(|t| filter.priority.is_none_or(|p| t.priority() == p))
            .filter(|t| filter.category.is_none_or(|c| t.category() == Some(c)))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        results.into_iter().skip(offset).take(limit).collect()
    }

    /// Claimable tickets: in the ASSIGNMENT queue with nobody on them yet.
    pub fn unassigned_in_assignment_queue(&self) -> Vec<Ticket> {
        self.collect(|t| t.current_queue() == QueueType::Assignment && t.assignee().is_none())
    }

    fn collect(&self, predicate: impl Fn(&Ticket) -> bool) -> Vec<Ticket> {
        let tickets = self.tickets.lock().expect("repository lock poisoned");
        tickets.values().filter(|t| predicate(t)).cloned().collect()
    }
}

impl Default for TicketRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Denormalised agent → tickets view; the ticket's own `assignee` field stays
/// authoritative and the two are reconciled by orchestration, not here.
pub struct AssignmentTracker {
    assignments: Mutex<HashMap<String, HashSet<String>>>,
}

impl AssignmentTracker {
    pub fn new() -> Self {
        Self {
            assignments: Mutex::new(HashMap::new()),
        }
    }

    pub fn assign(&self, agent_id: &str, ticket_id: &str) {
        let mut assignments = self.assignments.lock().expect("assignment lock poisoned");
        assignments
            .entry(agent_id.to_string())
            .or_default()
            .insert(ticket_id.to_string());
    }

    pub fn unassign(&self, agent_id: &str, ticket_id: &str) {
        let mut assignments = self.assignments.lock().expect("assignment lock poisoned");
        if let Some(tickets) = assignments.get_mut(agent_id) {
            tickets.remove(ticket_id);
        }
    }

    pub fn get_agent_tickets(&self, agent_id: &str) -> HashSet<String> {
        let assignments = self.assignments.lock().expect("assignment lock poisoned");
        assignments.get(agent_id).cloned().unwrap_or_default()
    }

    pub fn get_agent_ticket_count(&self, agent_id: &str) -> usize {
        let assignments = self.assignments.lock().expect("assignment lock poisoned");
        assignments.get(agent_id).map_or(0, HashSet::len)
    }

    pub fn find_ticket_agent(&self, ticket_id: &str) -> Option<String> {
        let assignments = self.assignments.lock().expect("assignment lock poisoned");
        assignments
            .iter()
            .find(|(_, tickets)| tickets.contains(ticket_id))
            .map(|(agent, _)| agent.clone())
    }

    pub fn all_assignments(&self) -> HashMap<String, HashSet<String>> {
        let assignments = self.assignments.lock().expect("assignment lock poisoned");
        assignments.clone()
    }
}

impl Default for AssignmentTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TicketContent, TicketSource};
    use chrono::Utc;

    fn ticket(priority: TicketPriority) -> Ticket {
        Ticket::create(
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
        )
    }

    #[test]
    fn save_get_delete_round_trip() {
        let repo = TicketRepository::new();
        let t = ticket(TicketPriority::Medium);
        let id = t.id().to_string();

        repo.save(t);
        assert!(repo.exists(&id));
        assert_eq!(repo.count(), 1);
        assert!(repo.get(&id).is_some());

        assert!(repo.delete(&id));
        assert!(!repo.exists(&id));
        assert!(!repo.delete(&id));
    }

    #[test]
    fn get_returns_a_detached_copy() {
        let repo = TicketRepository::new();
        let t = ticket(TicketPriority::Medium);
        let id = t.id().to_string();
        repo.save(t);

        let mut copy = repo.get(&id).unwrap();
        copy.assign("user-1");
        // repository is untouched until saved back
        assert!(repo.get(&id).unwrap().assignee().is_none());

        repo.save(copy);
        assert_eq!(repo.get(&id).unwrap().assignee(), Some("user-1"));
    }

    #[test]
    fn find_applies_all_filters() {
        let repo = TicketRepository::new();
        let mut a = ticket(TicketPriority::High);
        a.assign("user-1");
        let b = ticket(TicketPriority::Low);
        repo.save(a.clone());
        repo.save(b);

        let found = repo.find(
            &TicketFilter {
                assignee: Some("user-1".into()),
                priority: Some(TicketPriority::High),
                ..Default::default()
            },
            50,
            0,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), a.id());

        let none = repo.find(
            &TicketFilter {
                status: Some(TicketStatus::Resolved),
                ..Default::default()
            },
            50,
            0,
        );
        assert!(none.is_empty());
    }

    #[test]
    fn find_sorts_newest_first_and_paginates() {
        let repo = TicketRepository::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut value = ticket(TicketPriority::Medium).to_value();
            value["created_at"] =
                serde_json::json!(Utc::now() - chrono::Duration::minutes(10 - i));
            let t = Ticket::from_value(value).unwrap();
            ids.push(t.id().to_string());
            repo.save(t);
        }

        let page = repo.find(&TicketFilter::default(), 2, 0);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id(), ids[2]);
        assert_eq!(page[1].id(), ids[1]);

        let rest = repo.find(&TicketFilter::default(), 2, 2);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id(), ids[0]);
    }

    #[test]
    fn single_field_finders_match_the_combined_filter() {
        let repo = TicketRepository::new();
        let mut assigned = ticket(TicketPriority::High);
        assigned.set_category(TicketCategory::Billing);
        assigned.assign("user-1");
        let inbox = ticket(TicketPriority::Low);
        repo.save(assigned.clone());
        repo.save(inbox.clone());

        assert_eq!(repo.get_all().len(), 2);
        assert_eq!(repo.find_by_status(TicketStatus::Assigned).len(), 1);
        assert_eq!(repo.find_by_queue(QueueType::Inbox)[0].id(), inbox.id());
        assert_eq!(repo.find_by_assignee("user-1")[0].id(), assigned.id());
        assert_eq!(repo.find_by_priority(TicketPriority::Low)[0].id(), inbox.id());
        assert_eq!(
            repo.find_by_category(TicketCategory::Billing)[0].id(),
            assigned.id()
        );
    }

    #[test]
    fn unassigned_in_assignment_queue_skips_claimed_tickets() {
        let repo = TicketRepository::new();
        let mut claimed = ticket(TicketPriority::Medium);
        claimed.assign("user-1"); // ASSIGNMENT queue, has an assignee

        let mut open = ticket(TicketPriority::Medium);
        open.set_status(TicketStatus::TriagePending).unwrap();
        open.move_to_queue(QueueType::Assignment).unwrap();

        repo.save(claimed);
        repo.save(open.clone());

        let claimable = repo.unassigned_in_assignment_queue();
        assert_eq!(claimable.len(), 1);
        assert_eq!(claimable[0].id(), open.id());
    }

    #[test]
    fn tracker_maintains_both_directions() {
        let tracker = AssignmentTracker::new();
        tracker.assign("user-1", "t-1");
        tracker.assign("user-1", "t-2");
        tracker.assign("user-2", "t-3");

        assert_eq!(tracker.get_agent_ticket_count("user-1"), 2);
        assert!(tracker.get_agent_tickets("user-1").contains("t-1"));
        assert_eq!(tracker.find_ticket_agent("t-3").as_deref(), Some("user-2"));
        assert_eq!(tracker.find_ticket_agent("t-9"), None);

        tracker.unassign("user-1", "t-1");
        assert_eq!(tracker.get_agent_ticket_count("user-1"), 1);
        assert_eq!(tracker.find_ticket_agent("t-1"), None);

        let all = tracker.all_assignments();
        assert_eq!(all.len(), 2);
        assert!(all["user-2"].contains("t-3"));
    }

    #[test]
    fn tracker_copy_does_not_leak_internal_state() {
        let tracker = AssignmentTracker::new();
        tracker.assign("user-1", "t-1");
        let mut copy = tracker.get_agent_tickets("user-1");
        copy.insert("t-999".into());
        assert_eq!(tracker.get_agent_ticket_count("user-1"), 1);
    }
}
