use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Inbox,
    Triaging,
    TriagePending,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::Triaging => "TRIAGING",
            Self::TriagePending => "TRIAGE_PENDING",
            Self::Assigned => "ASSIGNED",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Ordering weight used by the queue priority score.
    pub fn weight(&self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketCategory {
    Billing,
    TechnicalSupport,
    FeatureRequest,
    BugReport,
    Admin,
    Other,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Billing => "BILLING",
            Self::TechnicalSupport => "TECHNICAL_SUPPORT",
            Self::FeatureRequest => "FEATURE_REQUEST",
            Self::BugReport => "BUG_REPORT",
            Self::Admin => "ADMIN",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "BILLING" => Some(Self::Billing),
            "TECHNICAL_SUPPORT" => Some(Self::TechnicalSupport),
            "FEATURE_REQUEST" => Some(Self::FeatureRequest),
            "BUG_REPORT" => Some(Self::BugReport),
            "ADMIN" => Some(Self::Admin),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueType {
    Inbox,
    Triage,
    Assignment,
    Active,
    Resolution,
}

impl QueueType {
    pub const ALL: [QueueType; 5] = [
        Self::Inbox,
        Self::Triage,
        Self::Assignment,
        Self::Active,
        Self::Resolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::Triage => "TRIAGE",
            Self::Assignment => "ASSIGNMENT",
            Self::Active => "ACTIVE",
            Self::Resolution => "RESOLUTION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "INBOX" => Some(Self::Inbox),
            "TRIAGE" => Some(Self::Triage),
            "ASSIGNMENT" => Some(Self::Assignment),
            "ACTIVE" => Some(Self::Active),
            "RESOLUTION" => Some(Self::Resolution),
            _ => None,
        }
    }

    /// Status a ticket carries while it sits in this queue.
    pub fn coupled_status(&self) -> TicketStatus {
        match self {
            Self::Inbox => TicketStatus::Inbox,
            Self::Triage => TicketStatus::TriagePending,
            Self::Assignment => TicketStatus::Assigned,
            Self::Active => TicketStatus::InProgress,
            Self::Resolution => TicketStatus::Resolved,
        }
    }
}

impl std::fmt::Display for QueueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketSource {
    Email,
    Discord,
    Github,
    Form,
    Webhook,
}

impl TicketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Discord => "DISCORD",
            Self::Github => "GITHUB",
            Self::Form => "FORM",
            Self::Webhook => "WEBHOOK",
        }
    }
}

impl std::fmt::Display for TicketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveAction {
    Manual,
    FaqLink,
    AutoResponse,
    Reboot,
    ConfigChange,
    DuplicateClose,
    SelfServiceRedirect,
    None,
}

impl ResolveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::FaqLink => "FAQ_LINK",
            Self::AutoResponse => "AUTO_RESPONSE",
            Self::Reboot => "REBOOT",
            Self::ConfigChange => "CONFIG_CHANGE",
            Self::DuplicateClose => "DUPLICATE_CLOSE",
            Self::SelfServiceRedirect => "SELF_SERVICE_REDIRECT",
            Self::None => "NONE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "MANUAL" => Some(Self::Manual),
            "FAQ_LINK" => Some(Self::FaqLink),
            "AUTO_RESPONSE" => Some(Self::AutoResponse),
            "REBOOT" => Some(Self::Reboot),
            "CONFIG_CHANGE" => Some(Self::ConfigChange),
            "DUPLICATE_CLOSE" => Some(Self::DuplicateClose),
            "SELF_SERVICE_REDIRECT" => Some(Self::SelfServiceRedirect),
            "NONE" => Some(Self::None),
            _ => None,
        }
    }
}

impl Default for ResolveAction {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for ResolveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Targets a ticket may legally transition to from each status. A move to
/// INBOX (reset/escalation) and an identity transition are always legal and
/// are handled before this table is consulted.
pub fn legal_targets(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::*;
    match from {
        Inbox => &[Triaging, TriagePending],
        Triaging => &[TriagePending, Assigned, Resolved],
        TriagePending => &[Assigned, Resolved, Closed],
        Assigned => &[InProgress, Resolved, Inbox, Closed],
        InProgress => &[Resolved, Assigned, Inbox, Closed],
        Resolved => &[InProgress, Closed],
        Closed => &[Inbox],
    }
}

pub fn can_transition(from: TicketStatus, to: TicketStatus) -> bool {
    to == TicketStatus::Inbox || from == to || legal_targets(from).contains(&to)
}
