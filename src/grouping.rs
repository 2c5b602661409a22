//! Gap-threshold grouping of cues into dialogue groups.
//!
//! A group is a maximal run of consecutive cues where each cue starts no more
//! than `max_gap_seconds` after the previous one ends. The scan is greedy and
//! single-pass: once a boundary is drawn no cue moves between groups.

use crate::cues::Cue;
use crate::error::{Result, SpliceError};
use serde::{Deserialize, Serialize};

/// How overlapping cues (negative gap) are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// A negative gap is always within the threshold.
    #[default]
    Merge,
    /// A negative gap always starts a new group.
    Split,
}

impl std::str::FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(OverlapPolicy::Merge),
            "split" => Ok(OverlapPolicy::Split),
            _ => Err(format!("Unknown overlap policy: {}", s)),
        }
    }
}

/// Configuration for grouping.
#[derive(Debug, Clone)]
pub struct GroupingConfig {
    /// Largest gap, in seconds, that still joins two cues.
    pub max_gap_seconds: f64,
    pub overlap: OverlapPolicy,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            max_gap_seconds: 2.0,
            overlap: OverlapPolicy::Merge,
        }
    }
}

impl GroupingConfig {
    fn validate(&self) -> Result<()> {
        if !self.max_gap_seconds.is_finite() || self.max_gap_seconds < 0.0 {
            return Err(SpliceError::Config(format!(
                "max_gap_seconds must be a non-negative number, got {}",
                self.max_gap_seconds
            )));
        }
        Ok(())
    }

    /// Whether `next` joins the group that currently ends with `prev`.
    fn joins(&self, prev: &Cue, next: &Cue) -> bool {
        let gap = next.start - prev.end;
        if gap < 0.0 && self.overlap == OverlapPolicy::Split {
            return false;
        }
        gap <= self.max_gap_seconds
    }
}

/// A contiguous run of cues, by index into the cue store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    cue_indices: Vec<usize>,
}

impl Group {
    pub fn cue_indices(&self) -> &[usize] {
        &self.cue_indices
    }

    pub fn first(&self) -> usize {
        self.cue_indices[0]
    }

    pub fn last(&self) -> usize {
        self.cue_indices[self.cue_indices.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.cue_indices.len()
    }

    /// Always false; groups are never empty.
    pub fn is_empty(&self) -> bool {
        self.cue_indices.is_empty()
    }

    /// Start of the first cue and end of the last cue.
    pub fn span(&self, cues: &[Cue]) -> (f64, f64) {
        (cues[self.first()].start, cues[self.last()].end)
    }

    /// The cues of this group, in order.
    pub fn cues<'a>(&'a self, cues: &'a [Cue]) -> impl Iterator<Item = &'a Cue> + 'a {
        self.cue_indices.iter().map(move |&i| &cues[i])
    }
}

/// Partition cues into groups in a single forward scan.
///
/// Input order is kept as-is; cues are assumed to be sorted by start time.
pub fn group_cues(cues: &[Cue], config: &GroupingConfig) -> Result<Vec<Group>> {
    config.validate()?;

    let mut groups = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for (idx, cue) in cues.iter().enumerate() {
        if let Some(&last) = current.last() {
            if !config.joins(&cues[last], cue) {
                groups.push(Group {
                    cue_indices: std::mem::take(&mut current),
                });
            }
        }
        current.push(idx);
    }

    if !current.is_empty() {
        groups.push(Group {
            cue_indices: current,
        });
    }

    Ok(groups)
}

/// Which groups to process, resolved from configuration before the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GroupSelection {
    #[default]
    All,
    /// The first `n` groups.
    First { n: usize },
    /// Every `step`-th group, starting with the first.
    Every { step: usize },
    /// Groups `start..=end`, 1-based.
    Range { start: usize, end: usize },
}

impl GroupSelection {
    /// Keep the selected groups, paired with their 1-based group number.
    pub fn apply(&self, groups: Vec<Group>) -> Result<Vec<(usize, Group)>> {
        let numbered = groups.into_iter().enumerate().map(|(i, g)| (i + 1, g));
        let selected = match *self {
            GroupSelection::All => numbered.collect(),
            GroupSelection::First { n } => numbered.take(n).collect(),
            GroupSelection::Every { step } => {
                if step == 0 {
                    return Err(SpliceError::Config("group step must be at least 1".into()));
                }
                numbered.step_by(step).collect()
            }
            GroupSelection::Range { start, end } => {
                if start == 0 || end < start {
                    return Err(SpliceError::Config(format!(
                        "invalid group range {}..={}",
                        start, end
                    )));
                }
                numbered
                    .filter(|(n, _)| *n >= start && *n <= end)
                    .collect()
            }
        };
        Ok(selected)
    }
}

impl std::str::FromStr for GroupSelection {
    type Err = String;

    /// Parse `all`, `first:N`, `every:N` or `range:A-B`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(GroupSelection::All);
        }
        let (kind, arg) = s
            .split_once(':')
            .ok_or_else(|| format!("Unknown group selection: {}", s))?;
        let number = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid number in group selection: {}", v))
        };
        match kind {
            "first" => Ok(GroupSelection::First { n: number(arg)? }),
            "every" => Ok(GroupSelection::Every { step: number(arg)? }),
            "range" => {
                let (a, b) = arg
                    .split_once('-')
                    .ok_or_else(|| format!("Expected range:A-B, got {}", s))?;
                Ok(GroupSelection::Range {
                    start: number(a)?,
                    end: number(b)?,
                })
            }
            _ => Err(format!("Unknown group selection: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cues(spans: &[(f64, f64)]) -> Vec<Cue> {
        spans
            .iter()
            .enumerate()
            .map(|(i, &(s, e))| Cue::new(i, s, e, format!("cue {}", i)))
            .collect()
    }

    fn config(max_gap: f64) -> GroupingConfig {
        GroupingConfig {
            max_gap_seconds: max_gap,
            overlap: OverlapPolicy::Merge,
        }
    }

    fn indices(groups: &[Group]) -> Vec<Vec<usize>> {
        groups.iter().map(|g| g.cue_indices().to_vec()).collect()
    }

    #[test]
    fn test_splits_on_large_gap() {
        let cues = cues(&[(0.0, 1.0), (1.5, 2.0), (5.0, 6.0)]);
        let groups = group_cues(&cues, &config(2.0)).unwrap();
        assert_eq!(indices(&groups), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_zero_gap_threshold() {
        let cues = cues(&[(0.0, 1.0), (1.2, 2.0), (2.5, 3.0)]);
        let groups = group_cues(&cues, &config(0.0)).unwrap();
        assert_eq!(indices(&groups), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_touching_cues_merge_at_zero_threshold() {
        let cues = cues(&[(0.0, 1.0), (1.0, 2.0)]);
        let groups = group_cues(&cues, &config(0.0)).unwrap();
        assert_eq!(indices(&groups), vec![vec![0, 1]]);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(group_cues(&[], &config(1.0)).unwrap().is_empty());
        let groups = group_cues(&cues(&[(3.0, 4.0)]), &config(1.0)).unwrap();
        assert_eq!(indices(&groups), vec![vec![0]]);
    }

    #[test]
    fn test_overlap_policy() {
        let cues = cues(&[(0.0, 2.0), (1.5, 3.0)]);
        let merged = group_cues(&cues, &config(0.0)).unwrap();
        assert_eq!(merged.len(), 1);

        let split = group_cues(
            &cues,
            &GroupingConfig {
                max_gap_seconds: 0.0,
                overlap: OverlapPolicy::Split,
            },
        )
        .unwrap();
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn test_rejects_negative_threshold() {
        assert!(group_cues(&cues(&[(0.0, 1.0)]), &config(-1.0)).is_err());
    }

    #[test]
    fn test_partition_and_gap_properties() {
        // Deterministic pseudo-random cue layouts.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % 10_000) as f64 / 1000.0
        };

        for round in 0..50 {
            let mut t = 0.0;
            let spans: Vec<(f64, f64)> = (0..(round % 17 + 1))
                .map(|_| {
                    let start = t + next() - 1.0;
                    let end = start + next() / 2.0;
                    t = end;
                    (start.max(0.0), end.max(start.max(0.0)))
                })
                .collect();
            let cues = cues(&spans);
            let max_gap = next() / 3.0;
            let groups = group_cues(&cues, &config(max_gap)).unwrap();

            let flat: Vec<usize> = groups.iter().flat_map(|g| g.cue_indices().to_vec()).collect();
            assert_eq!(flat, (0..cues.len()).collect::<Vec<_>>());

            for group in &groups {
                assert!(!group.is_empty());
                for pair in group.cue_indices().windows(2) {
                    assert!(cues[pair[1]].start - cues[pair[0]].end <= max_gap);
                }
            }
            for pair in groups.windows(2) {
                let gap = cues[pair[1].first()].start - cues[pair[0].last()].end;
                assert!(gap > max_gap);
            }
        }
    }

    #[test]
    fn test_group_span_and_cues() {
        let cues = cues(&[(10.0, 11.0), (11.5, 12.0)]);
        let groups = group_cues(&cues, &config(1.0)).unwrap();
        assert_eq!(groups[0].span(&cues), (10.0, 12.0));
        let texts: Vec<&str> = groups[0].cues(&cues).map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["cue 0", "cue 1"]);
    }

    #[test]
    fn test_selection() {
        let cues = cues(&[(0.0, 1.0), (10.0, 11.0), (20.0, 21.0), (30.0, 31.0), (40.0, 41.0)]);
        let groups = group_cues(&cues, &config(1.0)).unwrap();

        let numbers = |sel: GroupSelection| -> Vec<usize> {
            sel.apply(groups.clone()).unwrap().into_iter().map(|(n, _)| n).collect()
        };
        assert_eq!(numbers(GroupSelection::All), vec![1, 2, 3, 4, 5]);
        assert_eq!(numbers(GroupSelection::First { n: 2 }), vec![1, 2]);
        assert_eq!(numbers(GroupSelection::Every { step: 2 }), vec![1, 3, 5]);
        assert_eq!(numbers(GroupSelection::Range { start: 2, end: 4 }), vec![2, 3, 4]);
        assert!(GroupSelection::Every { step: 0 }.apply(groups.clone()).is_err());
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!("all".parse::<GroupSelection>().unwrap(), GroupSelection::All);
        assert_eq!(
            "first:50".parse::<GroupSelection>().unwrap(),
            GroupSelection::First { n: 50 }
        );
        assert_eq!(
            "range:3-7".parse::<GroupSelection>().unwrap(),
            GroupSelection::Range { start: 3, end: 7 }
        );
        assert!("sometimes".parse::<GroupSelection>().is_err());
    }
}
