//! Inverted indices over a population snapshot.
//!
//! Platform, language and availability filters are set overlaps, so instead
//! of scanning every profile they can be answered by unioning and
//! intersecting id sets. The index is only a prefilter: the engine still runs
//! the full predicate conjunction on whatever survives it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::availability::HourToken;
use crate::{Candidate, criteria::Criteria};

type IdSet = BTreeSet<i64>;

#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    platforms: HashMap<String, IdSet>,
    languages: HashMap<String, IdSet>,
    /// `(timezone offset, local token)` → ids.
    local_hours: HashMap<(i32, String), IdSet>,
    offsets: BTreeSet<i32>,
}

impl CandidateIndex {
    pub fn build<'a, I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = &'a Candidate>,
    {
        let mut index = CandidateIndex::default();
        for candidate in candidates {
            index.insert(candidate);
        }
        index
    }

    fn insert(&mut self, candidate: &Candidate) {
        for platform in &candidate.platforms {
            self.platforms.entry(platform.clone()).or_default().insert(candidate.id);
        }
        for language in &candidate.languages {
            self.languages.entry(language.clone()).or_default().insert(candidate.id);
        }
        let offset = candidate.timezone_offset_hours;
        self.offsets.insert(offset);
        for token in &candidate.active_hours_local {
            self.local_hours
                .entry((offset, token.clone()))
                .or_default()
                .insert(candidate.id);
        }
    }

    /// Ids passing every indexed predicate, or `None` when the criteria use
    /// none of them.
    pub fn prefilter(&self, criteria: &Criteria) -> Option<IdSet> {
        let mut narrowed: Option<IdSet> = None;

        if let Some(platforms) = &criteria.platforms {
            narrowed = Some(intersect(narrowed, union_of(&self.platforms, platforms)));
        }
        if let Some(languages) = &criteria.languages {
            narrowed = Some(intersect(narrowed, union_of(&self.languages, languages)));
        }
        if let Some(tokens) = criteria.active_hours_utc.as_ref().filter(|t| !t.is_empty()) {
            narrowed = Some(intersect(narrowed, self.available_at(tokens)));
        }

        narrowed
    }

    fn available_at(&self, utc_tokens: &BTreeSet<HourToken>) -> IdSet {
        let mut ids = IdSet::new();
        for &offset in &self.offsets {
            for token in utc_tokens {
                let key = (offset, token.shifted(offset).to_string());
                if let Some(found) = self.local_hours.get(&key) {
                    ids.extend(found);
                }
            }
        }
        ids
    }
}

fn union_of(postings: &HashMap<String, IdSet>, keys: &BTreeSet<String>) -> IdSet {
    keys.iter()
        .filter_map(|key| postings.get(key))
        .flatten()
        .copied()
        .collect()
}

fn intersect(current: Option<IdSet>, next: IdSet) -> IdSet {
    match current {
        None => next,
        Some(current) => current.intersection(&next).copied().collect(),
    }
}

/// Immutable view of the profile population plus its index.
///
/// Stores replace the whole snapshot on mutation, so a snapshot being read
/// is never written to.
#[derive(Debug, Clone, Default)]
pub struct PopulationSnapshot {
    candidates: BTreeMap<i64, Candidate>,
    index: CandidateIndex,
}

impl PopulationSnapshot {
    /// Later duplicates of the same id replace earlier ones.
    pub fn new(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let candidates: BTreeMap<i64, Candidate> =
            candidates.into_iter().map(|c| (c.id, c)).collect();
        let index = CandidateIndex::build(candidates.values());
        Self { candidates, index }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Candidate> {
        self.candidates.get(&id)
    }

    /// Candidates ordered by id.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    pub fn index(&self) -> &CandidateIndex {
        &self.index
    }

    /// Candidates the index cannot rule out, ordered by id.
    pub fn prefiltered(&self, criteria: &Criteria) -> Vec<&Candidate> {
        match self.index.prefilter(criteria) {
            None => self.candidates.values().collect(),
            Some(ids) => ids.iter().filter_map(|id| self.candidates.get(id)).collect(),
        }
    }
}
