pub mod consensus;
pub mod tally;

use serde::Serialize;

// Computed results for a whole poll, options in the poll's declared order.
#[derive(Debug, Clone, Serialize)]
pub struct PollTally {
    pub options: Vec<OptionTally>,
    pub total_votes: u64,
    pub unique_voters: u64,
    /// First option in declared order attaining the maximum count.
    /// None when no votes have been cast.
    pub leading_option_id: Option<String>,
}

// Per-option counts. Percentage is kept unrounded; rounding is a
// presentation concern.
#[derive(Debug, Clone, Serialize)]
pub struct OptionTally {
    pub option_id: String,
    pub option_text: String,
    pub count: u64,
    pub percentage: f64,
    /// Who voted for this option; omitted entirely for anonymous polls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<Vec<String>>,
}

impl PollTally {
    pub fn leading(&self) -> Option<&OptionTally> {
        let id = self.leading_option_id.as_deref()?;
        self.options.iter().find(|option| option.option_id == id)
    }

    pub fn leading_count(&self) -> u64 {
        self.leading().map(|option| option.count).unwrap_or(0)
    }
}
