use crate::models::{Poll, Vote};
use crate::voting::{OptionTally, PollTally};
use log::warn;
use std::collections::{HashMap, HashSet};

pub fn calculate(poll: &Poll, votes: &[Vote]) -> PollTally {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    let mut voters: HashMap<&str, Vec<String>> = HashMap::new();

    // Initialize all options with 0 votes so absent options still appear.
    for option in &poll.options {
        counts.insert(option.id.as_str(), 0);
        voters.insert(option.id.as_str(), Vec::new());
    }

    let mut unique_voters: HashSet<&str> = HashSet::new();
    let mut total_votes: u64 = 0;

    for vote in votes {
        let Some(count) = counts.get_mut(vote.option_id.as_str()) else {
            // A vote referencing an option outside the poll's set means the
            // write path failed to validate; skip it rather than crash.
            warn!(
                "poll {}: vote by {} references unknown option {}, skipping",
                poll.id, vote.user_id, vote.option_id
            );
            continue;
        };
        *count += 1;
        total_votes += 1;
        unique_voters.insert(vote.user_id.as_str());
        if let Some(list) = voters.get_mut(vote.option_id.as_str()) {
            list.push(vote.user_id.clone());
        }
    }

    let options: Vec<OptionTally> = poll
        .options
        .iter()
        .map(|option| {
            let count = counts[option.id.as_str()];
            let percentage = if total_votes > 0 {
                count as f64 / total_votes as f64 * 100.0
            } else {
                0.0
            };
            OptionTally {
                option_id: option.id.clone(),
                option_text: option.text.clone(),
                count,
                percentage,
                voters: if poll.anonymous {
                    None
                } else {
                    voters.remove(option.id.as_str())
                },
            }
        })
        .collect();

    // Ties resolve to the first option in the poll's declared order.
    let leading_option_id = if total_votes > 0 {
        let max_count = options.iter().map(|option| option.count).max().unwrap_or(0);
        options
            .iter()
            .find(|option| option.count == max_count)
            .map(|option| option.option_id.clone())
    } else {
        None
    };

    PollTally {
        options,
        total_votes,
        unique_voters: unique_voters.len() as u64,
        leading_option_id,
    }
}
