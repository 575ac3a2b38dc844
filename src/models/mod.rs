use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub hangout_id: String,
    pub creator_id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub policy: ConsensusPolicy,
    /// Percentage (0..=100) for `percentage`, raw vote count for `absolute`.
    /// Ignored by `majority`.
    pub threshold: f64,
    /// Floor on total votes cast below which consensus is never declared.
    pub min_participants: u32,
    pub multi_select: bool,
    pub anonymous: bool,
    pub status: PollStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusPolicy {
    Percentage,
    Absolute,
    Majority,
}

impl ConsensusPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusPolicy::Percentage => "percentage",
            ConsensusPolicy::Absolute => "absolute",
            ConsensusPolicy::Majority => "majority",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(ConsensusPolicy::Percentage),
            "absolute" => Some(ConsensusPolicy::Absolute),
            "majority" => Some(ConsensusPolicy::Majority),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Open,
    ConsensusReached,
    Expired,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Open => "open",
            PollStatus::ConsensusReached => "consensus_reached",
            PollStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PollStatus::Open),
            "consensus_reached" => Some(PollStatus::ConsensusReached),
            "expired" => Some(PollStatus::Expired),
            _ => None,
        }
    }
}

// One row per selected option. A user voting for several options in a
// multi-select poll produces several rows, at most one of them preferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: String,
    pub poll_id: String,
    pub option_id: String,
    pub preferred: bool,
    pub created_at: DateTime<Utc>,
}

/// Option payloads arrive either as bare strings or as structured objects.
/// Normalized here, at the boundary, into plain text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionInput {
    Text(String),
    Detailed { text: String },
}

impl OptionInput {
    pub fn into_text(self) -> String {
        match self {
            OptionInput::Text(text) | OptionInput::Detailed { text } => text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub hangout_id: String,
    pub creator_id: String,
    pub question: String,
    pub option_texts: Vec<String>,
    pub policy: ConsensusPolicy,
    pub threshold: f64,
    pub min_participants: u32,
    pub multi_select: bool,
    pub anonymous: bool,
    pub duration_minutes: Option<i64>,
}

impl Poll {
    pub fn new(params: NewPoll) -> Self {
        let now = Utc::now();
        let expires_at = params
            .duration_minutes
            .map(|mins| now + chrono::Duration::minutes(mins));

        let options = params
            .option_texts
            .into_iter()
            .map(|text| PollOption {
                id: Uuid::new_v4().to_string(),
                text,
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            hangout_id: params.hangout_id,
            creator_id: params.creator_id,
            question: params.question,
            options,
            policy: params.policy,
            threshold: params.threshold,
            min_participants: params.min_participants,
            multi_select: params.multi_select,
            anonymous: params.anonymous,
            status: PollStatus::Open,
            created_at: now,
            expires_at,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PollStatus::Open
    }

    /// Timestamp check only; the status flip is the background sweep's job.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|ends| ends <= now)
    }

    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }
}

// Row shape for per-hangout listings; options are only loaded when a single
// poll is fetched.
#[derive(Debug, Clone, Serialize)]
pub struct PollSummary {
    pub id: String,
    pub question: String,
    pub status: PollStatus,
    pub expires_at: Option<DateTime<Utc>>,
}
