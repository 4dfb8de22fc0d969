/// Service configuration, read once at startup. The classifier's own model
/// settings (OPENROUTER_*, TRIAGE_MODEL, …) belong to the AI service process
/// and are not read here.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub ai_service_url: String,
    /// Mirror target for every published event (n8n intake).
    pub event_webhook_url: Option<String>,
    /// Resolution hand-off back to the originating channel.
    pub resolution_webhook_url: Option<String>,
    /// Dispatch target for coding-tagged tickets.
    pub coding_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let event_webhook_url = std::env::var("N8N_AI_WEBHOOK_URL").ok();
        Self {
            listen_addr: std::env::var("INTAKE_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            ai_service_url: std::env::var("AI_SERVICE_URL")
                .unwrap_or_else(|_| "http://ai-service:8000".to_string()),
            resolution_webhook_url: std::env::var("N8N_RESOLUTION_WEBHOOK_URL").ok(),
            // the coding agent listens on the AI webhook unless given its own
            coding_webhook_url: std::env::var("CODING_AGENT_WEBHOOK_URL")
                .ok()
                .or_else(|| event_webhook_url.clone()),
            event_webhook_url,
        }
    }
}
