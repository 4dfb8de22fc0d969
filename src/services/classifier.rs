use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::agents::AgentProfile;

const TRIAGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Classifier output. Only the typed fields steer routing; whatever else the
/// model reports is kept verbatim and lands in the ticket's reasoning map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageVerdict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TriageVerdict {
    /// The whole verdict as a reasoning-map payload.
    pub fn as_reasoning(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// External triage collaborator. The HTTP implementation talks to the AI
/// service; tests drop in fixed or failing fakes.
#[async_trait::async_trait]
pub trait ClassifierService: Send + Sync {
    async fn analyze_triage(
        &self,
        ticket: Value,
        agents: &[AgentProfile],
    ) -> anyhow::Result<TriageVerdict>;
}

pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TRIAGE_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ClassifierService for HttpClassifier {
    async fn analyze_triage(
        &self,
        mut ticket: Value,
        agents: &[AgentProfile],
    ) -> anyhow::Result<TriageVerdict> {
        if let Value::Object(ref mut payload) = ticket {
            payload.insert("available_agents".into(), serde_json::json!(agents));
        }

        let url = format!("{}/analyze/triage", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ticket)
            .send()
            .await?
            .error_for_status()?;
        let verdict = response.json::<TriageVerdict>().await?;
        Ok(verdict)
    }
}
