use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::schema::{QueueType, Ticket};

/// Pins a ticket to a queue. Distinct from the ticket itself so residency and
/// creation are aged separately.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub ticket_id: String,
    pub enqueued_at: DateTime<Utc>,
    pub priority_score: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue: QueueType,
    pub count: usize,
    pub avg_wait_time_seconds: f64,
    pub oldest_ticket_age_seconds: f64,
    pub newest_ticket_age_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub ticket_id: String,
    pub from_queue: Option<QueueType>,
    pub to_queue: QueueType,
    pub reason: String,
    pub actor: Option<String>,
}

struct QueueState {
    queues: HashMap<QueueType, VecDeque<QueueEntry>>,
    index: HashMap<String, QueueType>,
    audit: Vec<AuditEntry>,
}

/// The five pipeline queues plus the transition audit log, serialised by a
/// single mutex. No operation awaits while holding the lock; the triage
/// hand-off for INBOX arrivals happens after the critical section commits.
pub struct QueueManager {
    state: Mutex<QueueState>,
    triage_tx: mpsc::UnboundedSender<String>,
}

impl QueueManager {
    pub fn new(triage_tx: mpsc::UnboundedSender<String>) -> Self {
        let queues = QueueType::ALL
            .into_iter()
            .map(|q| (q, VecDeque::new()))
            .collect();
        Self {
            state: Mutex::new(QueueState {
                queues,
                index: HashMap::new(),
                audit: Vec::new(),
            }),
            triage_tx,
        }
    }

    /// Append a fresh entry and audit it. Returns the 1-based position.
    /// Entering INBOX schedules the asynchronous triage step once the lock is
    /// released; enqueue never waits for it.
    pub fn enqueue(
        &self,
        ticket: &Ticket,
        queue: QueueType,
        reason: &str,
        actor: Option<&str>,
    ) -> usize {
        let position = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let entry = QueueEntry {
                ticket_id: ticket.id().to_string(),
                enqueued_at: Utc::now(),
                priority_score: priority_score(ticket, Utc::now()),
            };
            let members = state.queues.get_mut(&queue).expect("queue exists");
            members.push_back(entry);
            let position = members.len();
            state.index.insert(ticket.id().to_string(), queue);
            state.audit.push(AuditEntry {
                timestamp: Utc::now(),
                ticket_id: ticket.id().to_string(),
                from_queue: None,
                to_queue: queue,
                reason: reason.to_string(),
                actor: actor.map(str::to_string),
            });
            position
        };

        if queue == QueueType::Inbox && self.triage_tx.send(ticket.id().to_string()).is_err() {
            tracing::warn!(ticket_id = %ticket.id(), "triage worker unavailable, ticket stays in INBOX");
        }

        position
    }

    /// Remove and return the next ticket id. Priority-based selection takes
    /// the highest score (first of equals); otherwise the most recently
    /// appended entry.
    pub fn dequeue(&self, queue: QueueType, priority_based: bool) -> Option<String> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let members = state.queues.get_mut(&queue).expect("queue exists");

        let entry = if priority_based {
            let mut best: Option<(usize, i64)> = None;
            for (i, e) in members.iter().enumerate() {
                if best.is_none_or(|(_, score)| e.priority_score > score) {
                    best = Some((i, e.priority_score));
                }
            }
            best.and_then(|(i, _)| members.remove(i))
        } else {
            members.pop_back()
        }?;

        state.index.remove(&entry.ticket_id);
        Some(entry.ticket_id)
    }

    /// Atomically relocate a ticket between queues with a fresh entry and an
    /// audit line. Returns false (no side effects) when the ticket is not in
    /// the source queue.
    pub fn move_ticket(
        &self,
        ticket_id: &str,
        from: QueueType,
        to: QueueType,
        ticket: &Ticket,
        reason: &str,
        actor: Option<&str>,
    ) -> bool {
        let mut state = self.state.lock().expect("queue lock poisoned");

        let source = state.queues.get_mut(&from).expect("queue exists");
        let Some(pos) = source.iter().position(|e| e.ticket_id == ticket_id) else {
            return false;
        };
        source.remove(pos);

        let entry = QueueEntry {
            ticket_id: ticket_id.to_string(),
            enqueued_at: Utc::now(),
            priority_score: priority_score(ticket, Utc::now()),
        };
        state.queues.get_mut(&to).expect("queue exists").push_back(entry);
        state.index.insert(ticket_id.to_string(), to);
        state.audit.push(AuditEntry {
            timestamp: Utc::now(),
            ticket_id: ticket_id.to_string(),
            from_queue: Some(from),
            to_queue: to,
            reason: reason.to_string(),
            actor: actor.map(str::to_string),
        });
        true
    }

    /// Drop an entry without relocation or audit (hard delete path).
    pub fn remove_from_queue(&self, ticket_id: &str, queue: QueueType) -> bool {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let members = state.queues.get_mut(&queue).expect("queue exists");
        let Some(pos) = members.iter().position(|e| e.ticket_id == ticket_id) else {
            return false;
        };
        members.remove(pos);
        state.index.remove(ticket_id);
        true
    }

    /// First `limit` ticket ids without mutation, highest score first when
    /// priority-based.
    pub fn peek_queue(&self, queue: QueueType, limit: usize, priority_based: bool) -> Vec<String> {
        let state = self.state.lock().expect("queue lock poisoned");
        let members = &state.queues[&queue];
        let mut entries: Vec<&QueueEntry> = members.iter().collect();
        if priority_based {
            entries.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
        }
        entries
            .into_iter()
            .take(limit)
            .map(|e| e.ticket_id.clone())
            .collect()
    }

    /// (queue, 1-based position in insertion order) for an enqueued ticket.
    pub fn get_queue_position(&self, ticket_id: &str) -> Option<(QueueType, usize)> {
        let state = self.state.lock().expect("queue lock poisoned");
        let queue = *state.index.get(ticket_id)?;
        state.queues[&queue]
            .iter()
            .position(|e| e.ticket_id == ticket_id)
            .map(|i| (queue, i + 1))
    }

    pub fn get_ticket_queue(&self, ticket_id: &str) -> Option<QueueType> {
        let state = self.state.lock().expect("queue lock poisoned");
        state.index.get(ticket_id).copied()
    }

    pub fn get_queue_stats(&self, queue: QueueType) -> QueueStats {
        let state = self.state.lock().expect("queue lock poisoned");
        let members = &state.queues[&queue];
        let now = Utc::now();

        if members.is_empty() {
            return QueueStats {
                queue,
                count: 0,
                avg_wait_time_seconds: 0.0,
                oldest_ticket_age_seconds: 0.0,
                newest_ticket_age_seconds: 0.0,
            };
        }

        let waits: Vec<f64> = members
            .iter()
            .map(|e| (now - e.enqueued_at).num_milliseconds() as f64 / 1000.0)
            .collect();
        let sum: f64 = waits.iter().sum();
        let oldest = waits.iter().cloned().fold(f64::MIN, f64::max);
        let newest = waits.iter().cloned().fold(f64::MAX, f64::min);

        QueueStats {
            queue,
            count: members.len(),
            avg_wait_time_seconds: round2(sum / waits.len() as f64),
            oldest_ticket_age_seconds: round2(oldest),
            newest_ticket_age_seconds: round2(newest),
        }
    }

    pub fn get_all_queue_stats(&self) -> Vec<QueueStats> {
        QueueType::ALL
            .into_iter()
            .map(|q| self.get_queue_stats(q))
            .collect()
    }

    /// Tail of the audit log, optionally filtered to one ticket.
    pub fn get_audit_log(&self, ticket_id: Option<&str>, limit: usize) -> Vec<AuditEntry> {
        let state = self.state.lock().expect("queue lock poisoned");
        let filtered: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| ticket_id.is_none_or(|id| e.ticket_id == id))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }

    /// Position × per-queue handling time, in seconds.
    pub fn estimate_wait_time(queue: QueueType, position: usize) -> f64 {
        let per_ticket = match queue {
            QueueType::Inbox => 5.0,
            QueueType::Triage => 30.0,
            QueueType::Assignment => 60.0,
            QueueType::Active => 300.0,
            QueueType::Resolution => 60.0,
        };
        position as f64 * per_ticket
    }
}

/// Priority weight times 100 plus an age bonus of one point per minute since
/// creation, capped at 50.
fn priority_score(ticket: &Ticket, now: DateTime<Utc>) -> i64 {
    let base = ticket.priority().weight() * 100;
    let age_minutes = (now - ticket.created_at()).num_seconds() / 60;
    base + age_minutes.clamp(0, 50)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
