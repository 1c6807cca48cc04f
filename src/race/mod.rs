// src/race/mod.rs

//! Post-run detection of jobs that wrote the same file without an ordering
//! between them.
//!
//! The check is a pure function of the terminal job records and the job
//! graph: running it twice on the same input yields the same report.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dag::{DependencyGraph, JobName, JobRecord};

/// Two unordered jobs that modified at least one common file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RaceRecord {
    /// The lexicographically smaller job name.
    pub first: JobName,
    pub second: JobName,
    /// Files both jobs modified, sorted.
    pub files: Vec<String>,
}

/// Jobs connected through shared files, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceSet {
    pub jobs: Vec<JobName>,
    pub files: Vec<String>,
}

/// Pairwise scan over executed jobs.
#[derive(Debug, Clone, Copy)]
pub struct RaceChecker<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> RaceChecker<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Every racing pair, sorted by job names.
    ///
    /// Only jobs that actually executed take part; skipped jobs and jobs
    /// cancelled before dispatch never touched the filesystem.
    pub fn find_races(&self, records: &[JobRecord]) -> Vec<RaceRecord> {
        let mut candidates: Vec<(&str, BTreeSet<&str>)> = records
            .iter()
            .filter(|r| r.executed && !r.modified_files.is_empty())
            .map(|r| {
                (
                    r.name.as_str(),
                    r.modified_files.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(b.0));

        let upstream: HashMap<&str, BTreeSet<JobName>> = candidates
            .iter()
            .map(|(name, _)| (*name, self.graph.upstream_of(name)))
            .collect();
        let ordered = |a: &str, b: &str| {
            upstream.get(a).is_some_and(|u| u.contains(b))
                || upstream.get(b).is_some_and(|u| u.contains(a))
        };

        let mut races = Vec::new();
        for (i, (a, a_files)) in candidates.iter().enumerate() {
            for (b, b_files) in &candidates[i + 1..] {
                let shared: Vec<String> = a_files
                    .intersection(b_files)
                    .map(|f| f.to_string())
                    .collect();
                if shared.is_empty() || ordered(*a, *b) {
                    continue;
                }
                debug!(first = %a, second = %b, files = shared.len(), "race detected");
                races.push(RaceRecord {
                    first: a.to_string(),
                    second: b.to_string(),
                    files: shared,
                });
            }
        }
        races
    }

    /// Group racing pairs into connected sets.
    pub fn race_sets(races: &[RaceRecord]) -> Vec<RaceSet> {
        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();

        fn root<'n>(parent: &BTreeMap<&'n str, &'n str>, mut node: &'n str) -> &'n str {
            while let Some(&next) = parent.get(node) {
                if next == node {
                    break;
                }
                node = next;
            }
            node
        }

        for race in races {
            parent.entry(&race.first).or_insert(&race.first);
            parent.entry(&race.second).or_insert(&race.second);
            let a = root(&parent, &race.first);
            let b = root(&parent, &race.second);
            if a != b {
                // Smaller name becomes the root so output order is stable.
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                parent.insert(hi, lo);
            }
        }

        let mut sets: BTreeMap<&str, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();
        for race in races {
            let entry = sets.entry(root(&parent, &race.first)).or_default();
            entry.0.insert(race.first.clone());
            entry.0.insert(race.second.clone());
            entry.1.extend(race.files.iter().cloned());
        }

        sets.into_values()
            .map(|(jobs, files)| RaceSet {
                jobs: jobs.into_iter().collect(),
                files: files.into_iter().collect(),
            })
            .collect()
    }

    /// Races grouped into sets in one call.
    pub fn check(&self, records: &[JobRecord]) -> Vec<RaceSet> {
        Self::race_sets(&self.find_races(records))
    }
}
