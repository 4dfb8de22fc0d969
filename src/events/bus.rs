use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Handle for one connected dashboard client. Frames are handed to the
/// per-socket writer task through the sender, so the bus itself never awaits.
struct BusClient {
    sender: mpsc::UnboundedSender<String>,
    subscriptions: HashSet<String>,
    connected_at: DateTime<Utc>,
}

struct BusState {
    clients: HashMap<String, BusClient>,
    channels: HashMap<String, HashSet<String>>,
}

/// Channel-based subscription registry for live updates. A closed sender
/// means the socket is gone; the offending client is evicted at the end of
/// the delivery pass.
pub struct SubscriptionBus {
    state: Mutex<BusState>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                clients: HashMap::new(),
                channels: HashMap::new(),
            }),
        }
    }

    /// Register a client and auto-subscribe it to `all`.
    pub fn connect(&self, client_id: &str, sender: mpsc::UnboundedSender<String>) {
        let mut state = self.state.lock().expect("bus lock poisoned");
        state.clients.insert(
            client_id.to_string(),
            BusClient {
                sender,
                subscriptions: HashSet::new(),
                connected_at: Utc::now(),
            },
        );
        subscribe_locked(&mut state, client_id, "all");
    }

    pub fn subscribe(&self, client_id: &str, channel: &str) -> bool {
        let mut state = self.state.lock().expect("bus lock poisoned");
        subscribe_locked(&mut state, client_id, channel)
    }

    pub fn unsubscribe(&self, client_id: &str, channel: &str) -> bool {
        let mut state = self.state.lock().expect("bus lock poisoned");
        if !state.clients.contains_key(client_id) {
            return false;
        }
        if let Some(client) = state.clients.get_mut(client_id) {
            client.subscriptions.remove(channel);
        }
        if let Some(subscribers) = state.channels.get_mut(channel) {
            subscribers.remove(client_id);
        }
        send_locked(
            &mut state,
            client_id,
            &json!({
                "event": "unsubscribed",
                "channel": channel,
                "timestamp": Utc::now(),
            }),
        );
        true
    }

    pub fn send_personal(&self, client_id: &str, message: &Value) -> bool {
        let mut state = self.state.lock().expect("bus lock poisoned");
        send_locked(&mut state, client_id, message)
    }

    /// Deliver to a snapshot of one channel's subscribers.
    pub fn broadcast_to_channel(&self, channel: &str, message: &Value) -> usize {
        let mut state = self.state.lock().expect("bus lock poisoned");
        let Some(subscribers) = state.channels.get(channel) else {
            return 0;
        };
        let snapshot: Vec<String> = subscribers.iter().cloned().collect();

        let mut sent = 0;
        for client_id in snapshot {
            if send_locked(&mut state, &client_id, message) {
                sent += 1;
            }
        }
        sent
    }

    /// Broadcast `{event, data, timestamp}` to every client subscribed to any
    /// of the channels; each client receives at most one copy.
    pub fn broadcast_event(&self, event_type: &str, data: Value, channels: &[String]) -> usize {
        let message = json!({
            "event": event_type,
            "data": data,
            "timestamp": Utc::now(),
        });

        let mut state = self.state.lock().expect("bus lock poisoned");
        let mut delivered: HashSet<String> = HashSet::new();
        let mut sent = 0;

        for channel in channels {
            let Some(subscribers) = state.channels.get(channel) else {
                continue;
            };
            let snapshot: Vec<String> = subscribers.iter().cloned().collect();
            for client_id in snapshot {
                if delivered.contains(&client_id) {
                    continue;
                }
                if send_locked(&mut state, &client_id, &message) {
                    delivered.insert(client_id);
                    sent += 1;
                }
            }
        }
        sent
    }

    pub fn disconnect(&self, client_id: &str) {
        let mut state = self.state.lock().expect("bus lock poisoned");
        remove_locked(&mut state, client_id);
    }

    pub fn connected_clients(&self) -> Vec<String> {
        let state = self.state.lock().expect("bus lock poisoned");
        state.clients.keys().cloned().collect()
    }

    pub fn client_subscriptions(&self, client_id: &str) -> HashSet<String> {
        let state = self.state.lock().expect("bus lock poisoned");
        state
            .clients
            .get(client_id)
            .map(|c| c.subscriptions.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Value {
        let state = self.state.lock().expect("bus lock poisoned");
        let channels: serde_json::Map<String, Value> = state
            .channels
            .iter()
            .map(|(channel, subscribers)| (channel.clone(), json!(subscribers.len())))
            .collect();
        json!({
            "total_connections": state.clients.len(),
            "channels": channels,
        })
    }
}

impl Default for SubscriptionBus {
    fn default() -> Self {
        Self::new()
    }
}

fn subscribe_locked(state: &mut BusState, client_id: &str, channel: &str) -> bool {
    if !state.clients.contains_key(client_id) {
        return false;
    }
    if let Some(client) = state.clients.get_mut(client_id) {
        client.subscriptions.insert(channel.to_string());
    }
    state
        .channels
        .entry(channel.to_string())
        .or_default()
        .insert(client_id.to_string());
    send_locked(
        state,
        client_id,
        &json!({
            "event": "subscribed",
            "channel": channel,
            "timestamp": Utc::now(),
        }),
    );
    true
}

fn send_locked(state: &mut BusState, client_id: &str, message: &Value) -> bool {
    let Some(client) = state.clients.get(client_id) else {
        return false;
    };
    if client.sender.send(message.to_string()).is_ok() {
        true
    } else {
        remove_locked(state, client_id);
        false
    }
}

fn remove_locked(state: &mut BusState, client_id: &str) {
    if let Some(client) = state.clients.remove(client_id) {
        for channel in &client.subscriptions {
            if let Some(subscribers) = state.channels.get_mut(channel) {
                subscribers.remove(client_id);
            }
        }
        tracing::debug!(
            client_id,
            connected_at = %client.connected_at,
            "client removed from bus"
        );
    }
}
