use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::events::{EventPublisher, SubscriptionBus};
use crate::queues::QueueManager;
use crate::services::{AgentDirectory, ClassifierService, HttpClassifier, WorkflowWebhooks};
use crate::storage::{AssignmentTracker, TicketRepository};

/// Application context: every core component, injected rather than global.
/// Tests build a fresh state per case with their own classifier fake.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<TicketRepository>,
    pub queues: Arc<QueueManager>,
    pub assignments: Arc<AssignmentTracker>,
    pub bus: Arc<SubscriptionBus>,
    pub publisher: Arc<EventPublisher>,
    pub classifier: Arc<dyn ClassifierService>,
    pub agents: Arc<AgentDirectory>,
}

impl AppState {
    /// Production wiring. Returns the state plus the receiver the triage
    /// worker drains.
    pub fn new(config: &Config) -> (Self, mpsc::UnboundedReceiver<String>) {
        let classifier = Arc::new(HttpClassifier::new(&config.ai_service_url));
        Self::build(config, classifier)
    }

    pub fn build(
        config: &Config,
        classifier: Arc<dyn ClassifierService>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (triage_tx, triage_rx) = mpsc::unbounded_channel();

        let bus = Arc::new(SubscriptionBus::new());
        let agents = Arc::new(AgentDirectory::new());
        let webhooks = Arc::new(WorkflowWebhooks::new(
            config.resolution_webhook_url.clone(),
            config.coding_webhook_url.clone(),
        ));
        let publisher = Arc::new(EventPublisher::new(
            bus.clone(),
            webhooks,
            agents.clone(),
            config.event_webhook_url.clone(),
        ));

        let state = Self {
            repository: Arc::new(TicketRepository::new()),
            queues: Arc::new(QueueManager::new(triage_tx)),
            assignments: Arc::new(AssignmentTracker::new()),
            bus,
            publisher,
            classifier,
            agents,
        };
        (state, triage_rx)
    }
}
