use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::HistoryEntry;

/// Number of elections a voter took part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnoutSummary {
    pub ncid: String,
    pub elections: u32,
}

/// Count history rows per NCID. Rows without an NCID are ignored.
/// Output is ordered by descending count, then NCID.
pub fn summarize_voter_history_data(entries: &[HistoryEntry]) -> Vec<TurnoutSummary> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    let mut keyless = 0usize;
    for e in entries {
        let ncid = e.ncid.trim();
        if ncid.is_empty() {
            keyless += 1;
            continue;
        }
        *counts.entry(ncid).or_default() += 1;
    }
    if keyless > 0 {
        debug!(keyless, "history rows without ncid dropped");
    }

    let mut summary: Vec<TurnoutSummary> = counts
        .into_iter()
        .map(|(ncid, elections)| TurnoutSummary {
            ncid: ncid.to_string(),
            elections,
        })
        .collect();
    summary.sort_by(|a, b| b.elections.cmp(&a.elections).then_with(|| a.ncid.cmp(&b.ncid)));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn entry(ncid: &str, election: &str) -> HistoryEntry {
        HistoryEntry {
            ncid: ncid.into(),
            county_desc: "WAKE".into(),
            election_lbl: election.into(),
            ..HistoryEntry::default()
        }
    }

    #[test]
    fn counts_match_row_frequency_per_ncid() {
        let entries = vec![
            entry("AA1", "2016"),
            entry("AA2", "2016"),
            entry("AA1", "2018"),
            entry("", "2018"),
            entry("AA1", "2020"),
            entry("AA3", "2020"),
        ];
        let summary = summarize_voter_history_data(&entries);

        let distinct: HashSet<&str> = entries
            .iter()
            .map(|e| e.ncid.as_str())
            .filter(|n| !n.is_empty())
            .collect();
        assert_eq!(summary.len(), distinct.len());
        assert_eq!(
            summary,
            vec![
                TurnoutSummary { ncid: "AA1".into(), elections: 3 },
                TurnoutSummary { ncid: "AA2".into(), elections: 1 },
                TurnoutSummary { ncid: "AA3".into(), elections: 1 },
            ]
        );
    }

    #[test]
    fn empty_history_has_empty_summary() {
        assert!(summarize_voter_history_data(&[]).is_empty());
    }
}
