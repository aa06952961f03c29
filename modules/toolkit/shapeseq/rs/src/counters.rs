use std::collections::BTreeSet;
use std::ops::AddAssign;

use ahash::AHashMap;
use derive_getters::Getters;
use derive_more::Constructor;

use crate::failure::Failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {
    /// Reverse transcription stopped with the fragment starting at this target offset.
    Stop(u32),
    /// Mismatch at this 1-based target position.
    Mutation(u32),
    /// Low-quality mismatch at this 1-based position, dropped from the pair.
    RemovedMutation(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Constructor)]
pub struct CountKey {
    pub target: u32,
    pub mask: u32,
    pub end: u32,
    pub event: Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::AddAssign)]
pub struct MaskTally {
    /// Pairs assigned to the mask.
    pub total: u64,
    /// Pairs assigned to the mask that were registered.
    pub kept: u64,
}

/// Multiplicity-weighted, additive tallies of a run. Merging is key-wise addition, so the
/// result doesn't depend on how pairs were split between workers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Getters)]
pub struct Counters {
    total_pairs: u64,
    unique_pairs: u64,
    registered_pairs: u64,
    mutations: u64,
    edge_mutations: u64,
    removed_mutations: u64,
    adapter_trimmed: u64,
    #[getter(skip)]
    masks: Vec<MaskTally>,
    #[getter(skip)]
    failures: AHashMap<Failure, u64>,
    #[getter(skip)]
    events: AHashMap<CountKey, u64>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_mask(&mut self, mask: usize, multiplicity: u64) {
        if self.masks.len() <= mask {
            self.masks.resize(mask + 1, MaskTally::default());
        }
        self.masks[mask].total += multiplicity;
    }

    pub fn count_failure(&mut self, failure: Failure, multiplicity: u64) {
        *self.failures.entry(failure).or_default() += multiplicity;
    }

    /// Count a registered pair: its stop and each of its 1-based mutation positions.
    pub fn register(
        &mut self,
        target: usize,
        mask: usize,
        site: usize,
        end: usize,
        mutations: &[u32],
        multiplicity: u64,
    ) {
        let key = |event| CountKey::new(target as u32, mask as u32, end as u32, event);
        *self.events.entry(key(Event::Stop(site as u32))).or_default() += multiplicity;
        for position in mutations {
            *self.events.entry(key(Event::Mutation(*position))).or_default() += multiplicity;
        }

        if self.masks.len() <= mask {
            self.masks.resize(mask + 1, MaskTally::default());
        }
        self.masks[mask].kept += multiplicity;
        self.registered_pairs += multiplicity;
        self.mutations += mutations.len() as u64 * multiplicity;
    }

    pub fn count_adapter_trimmed(&mut self, multiplicity: u64) {
        self.adapter_trimmed += multiplicity;
    }

    pub fn count_edge_mutation(&mut self, multiplicity: u64) {
        self.edge_mutations += multiplicity;
    }

    pub fn count_removed_mutations(&mut self, removed: u64, multiplicity: u64) {
        self.removed_mutations += removed * multiplicity;
    }

    /// Positions of a registered pair whose mutations were dropped. They take the pair out of the
    /// mutation depth at those positions.
    pub fn register_removed_mutations(
        &mut self,
        target: usize,
        mask: usize,
        end: usize,
        positions: &[u32],
        multiplicity: u64,
    ) {
        for position in positions {
            let key = CountKey::new(
                target as u32,
                mask as u32,
                end as u32,
                Event::RemovedMutation(*position),
            );
            *self.events.entry(key).or_default() += multiplicity;
        }
    }

    /// Input bookkeeping, which can't be derived from per-pair counts once duplicates were
    /// collapsed.
    pub fn set_totals(&mut self, total_pairs: u64, unique_pairs: u64) {
        self.total_pairs = total_pairs;
        self.unique_pairs = unique_pairs;
    }

    pub fn merge(&mut self, other: &Counters) {
        self.total_pairs += other.total_pairs;
        self.unique_pairs += other.unique_pairs;
        self.registered_pairs += other.registered_pairs;
        self.mutations += other.mutations;
        self.edge_mutations += other.edge_mutations;
        self.removed_mutations += other.removed_mutations;
        self.adapter_trimmed += other.adapter_trimmed;

        if self.masks.len() < other.masks.len() {
            self.masks.resize(other.masks.len(), MaskTally::default());
        }
        for (mine, theirs) in self.masks.iter_mut().zip(&other.masks) {
            *mine += *theirs;
        }
        for (failure, count) in &other.failures {
            *self.failures.entry(*failure).or_default() += count;
        }
        for (key, count) in &other.events {
            *self.events.entry(*key).or_default() += count;
        }
    }

    pub fn mask(&self, mask: usize) -> MaskTally {
        self.masks.get(mask).copied().unwrap_or_default()
    }

    pub fn failure(&self, failure: Failure) -> u64 {
        self.failures.get(&failure).copied().unwrap_or(0)
    }

    /// Non-zero failure counts in pipeline order.
    pub fn failures(&self) -> impl Iterator<Item = (Failure, u64)> + '_ {
        Failure::ALL
            .into_iter()
            .map(|failure| (failure, self.failure(failure)))
            .filter(|(_, count)| *count > 0)
    }

    pub fn failed_pairs(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn count(&self, key: &CountKey) -> u64 {
        self.events.get(key).copied().unwrap_or(0)
    }

    fn series(
        &self,
        (target, mask, end): (usize, usize, usize),
        len: usize,
        event: impl Fn(u32) -> Event,
    ) -> Vec<u64> {
        (0..len as u32)
            .map(|x| self.count(&CountKey::new(target as u32, mask as u32, end as u32, event(x))))
            .collect()
    }

    /// Stop counts for sites `0..len`.
    pub fn stops(&self, target: usize, mask: usize, end: usize, len: usize) -> Vec<u64> {
        self.series((target, mask, end), len, Event::Stop)
    }

    /// Mutation counts indexed by 1-based position, entry 0 is always zero.
    pub fn mutation_counts(&self, target: usize, mask: usize, end: usize, len: usize) -> Vec<u64> {
        self.series((target, mask, end), len, Event::Mutation)
    }

    /// Counts of dropped low-quality mutations, indexed like `mutation_counts`.
    pub fn removed_mutation_counts(
        &self,
        target: usize,
        mask: usize,
        end: usize,
        len: usize,
    ) -> Vec<u64> {
        self.series((target, mask, end), len, Event::RemovedMutation)
    }

    /// Distinct reverse transcription starts observed for the target.
    pub fn ends(&self, target: usize) -> BTreeSet<u32> {
        self.events
            .keys()
            .filter(|key| key.target == target as u32)
            .map(|key| key.end)
            .collect()
    }

    /// Summary of the run at info level.
    pub fn report(&self, masks: &[&str]) {
        let fraction = |count: u64| {
            if self.total_pairs == 0 {
                0.0
            } else {
                100.0 * count as f64 / self.total_pairs as f64
            }
        };

        log::info!(
            "Processed {} pairs ({} unique), registered {} ({:.2}%)",
            self.total_pairs,
            self.unique_pairs,
            self.registered_pairs,
            fraction(self.registered_pairs)
        );
        for (i, name) in masks.iter().enumerate() {
            let tally = self.mask(i);
            log::info!("Mask {name}: {} pairs, {} kept", tally.total, tally.kept);
        }
        for (failure, count) in self.failures() {
            log::info!("{failure}: {count} ({:.2}%)", fraction(count));
        }
        log::info!(
            "Mutations: {}, edge mutations: {}, removed low-quality mutations: {}, adapter trimmed pairs: {}",
            self.mutations,
            self.edge_mutations,
            self.removed_mutations,
            self.adapter_trimmed
        );
    }
}

impl AddAssign<&Counters> for Counters {
    fn add_assign(&mut self, rhs: &Counters) {
        self.merge(rhs);
    }
}
