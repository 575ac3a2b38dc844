use crate::models::{ConsensusPolicy, Poll};
use crate::voting::PollTally;

/// Decide whether the leading option satisfies the poll's consensus policy.
///
/// All policies are gated by the minimum-participant floor, and an empty
/// poll never reaches consensus (no 0/0 is ever computed).
pub fn reached(
    policy: ConsensusPolicy,
    threshold: f64,
    min_participants: u32,
    total_votes: u64,
    leading_count: u64,
) -> bool {
    if total_votes == 0 || total_votes < u64::from(min_participants) {
        return false;
    }

    match policy {
        ConsensusPolicy::Percentage => {
            leading_count as f64 / total_votes as f64 * 100.0 >= threshold
        }
        ConsensusPolicy::Absolute => leading_count as f64 >= threshold,
        // Strict majority, kept in integers: leading > total / 2.
        ConsensusPolicy::Majority => leading_count * 2 > total_votes,
    }
}

pub fn evaluate(poll: &Poll, tally: &PollTally) -> bool {
    reached(
        poll.policy,
        poll.threshold,
        poll.min_participants,
        tally.total_votes,
        tally.leading_count(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConsensusPolicy::*;

    #[test]
    fn percentage_threshold_met() {
        // 3 of 4 votes = 75% >= 70%.
        assert!(reached(Percentage, 70.0, 2, 4, 3));
    }

    #[test]
    fn percentage_threshold_missed() {
        // 2 of 4 votes = 50% < 70%.
        assert!(!reached(Percentage, 70.0, 2, 4, 2));
    }

    #[test]
    fn percentage_blocked_by_participant_floor() {
        // 100% for the leader, but only one vote cast.
        assert!(!reached(Percentage, 70.0, 2, 1, 1));
    }

    #[test]
    fn majority_requires_strict_majority() {
        // 2 of 4 is exactly half, not a majority.
        assert!(!reached(Majority, 0.0, 0, 4, 2));
        // 3 of 4 clears it.
        assert!(reached(Majority, 0.0, 0, 4, 3));
    }

    #[test]
    fn absolute_counts_raw_votes() {
        assert!(!reached(Absolute, 5.0, 0, 20, 4));
        assert!(reached(Absolute, 5.0, 0, 20, 5));
        // Total votes beyond the leader are irrelevant to absolute.
        assert!(reached(Absolute, 5.0, 0, 5, 5));
    }

    #[test]
    fn zero_votes_never_reaches_consensus() {
        assert!(!reached(Percentage, 0.0, 0, 0, 0));
        assert!(!reached(Absolute, 0.0, 0, 0, 0));
        assert!(!reached(Majority, 0.0, 0, 0, 0));
    }
}
