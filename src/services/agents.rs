use serde::Serialize;

/// One human agent as presented to the classifier for assignee suggestions.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub status: String,
    pub skills: Vec<String>,
    pub current_load: u32,
}

/// Static roster of support agents. A real deployment would source this from
/// a people directory; the ids are what the classifier hands back in
/// `suggested_assignee`.
pub struct AgentDirectory {
    agents: Vec<AgentProfile>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        let agent = |id: &str, name: &str, status: &str, skills: &[&str], load: u32| AgentProfile {
            id: id.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            current_load: load,
        };
        Self {
            agents: vec![
                agent("user-1", "IT Person", "active", &["hardware", "networking", "support", "windows"], 3),
                agent("user-2", "Frontend Developer", "busy", &["javascript", "react", "svelte", "css"], 5),
                agent("user-3", "Backend Developer", "active", &["python", "api", "database", "docker"], 2),
                agent("user-4", "Database Developer", "away", &["sql", "postgres", "optimization"], 0),
                agent("user-5", "UI Designer", "active", &["figma", "design", "css", "ux"], 1),
                agent("user-6", "AI Engineer", "active", &["python", "llm", "pytorch", "rag"], 2),
                agent("user-7", "Network Engineer", "offline", &["cisco", "firewall", "vpn", "routing"], 0),
            ],
        }
    }

    pub fn available_agents(&self) -> Vec<AgentProfile> {
        self.agents.clone()
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.id == agent_id)
    }
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}
