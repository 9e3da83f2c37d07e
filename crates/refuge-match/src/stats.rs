use serde::{Deserialize, Serialize};

use refuge_types::models::MatchStatus;

/// Match counts by status, as shown on the NGO dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStats {
    pub total: u64,
    pub pending: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub cancelled: u64,
}

impl MatchStats {
    pub fn record(&mut self, status: MatchStatus) {
        self.total += 1;
        match status {
            MatchStatus::Pending => self.pending += 1,
            MatchStatus::Accepted => self.accepted += 1,
            MatchStatus::Rejected => self.rejected += 1,
            MatchStatus::Completed => self.completed += 1,
            MatchStatus::Cancelled => self.cancelled += 1,
        }
    }

    /// Share of matches that were accepted or completed, in whole percent.
    pub fn success_rate(&self) -> u8 {
        success_rate(self.accepted + self.completed, self.total)
    }
}

impl FromIterator<MatchStatus> for MatchStats {
    fn from_iter<I: IntoIterator<Item = MatchStatus>>(iter: I) -> Self {
        let mut stats = Self::default();
        for status in iter {
            stats.record(status);
        }
        stats
    }
}

/// `successful / total` as a percentage rounded half up. Zero when there is
/// nothing to divide by; never above 100.
pub fn success_rate(successful: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let successful = successful.min(total);
    // round(100 * s / t) == floor((200 * s + t) / (2 * t))
    let pct = (200 * successful + total) / (2 * total);
    pct as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_matches_is_zero_percent() {
        assert_eq!(MatchStats::default().success_rate(), 0);
        assert_eq!(success_rate(0, 0), 0);
    }

    #[test]
    fn test_two_of_three_rounds_to_67() {
        let stats: MatchStats = [
            MatchStatus::Accepted,
            MatchStatus::Accepted,
            MatchStatus::Rejected,
        ]
        .into_iter()
        .collect();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.success_rate(), 67);
    }

    #[test]
    fn test_completed_counts_as_success() {
        let stats: MatchStats = [
            MatchStatus::Completed,
            MatchStatus::Pending,
            MatchStatus::Cancelled,
            MatchStatus::Accepted,
        ]
        .into_iter()
        .collect();
        assert_eq!(stats.success_rate(), 50);
    }

    #[test]
    fn test_rounding_edges() {
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(1, 8), 13); // 12.5 rounds up
        assert_eq!(success_rate(5, 5), 100);
        assert_eq!(success_rate(9, 5), 100);
    }
}
