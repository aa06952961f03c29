use derive_getters::Getters;

use crate::failure::Failure;

/// Processing state of one read pair. A single instance is reused for every record a worker
/// processes and is reset before each one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
pub struct Pair {
    multiplicity: u64,
    mask: Option<usize>,
    target: Option<usize>,
    site: Option<usize>,
    end: Option<usize>,
    // 1-based target positions (offset + 1), sorted and unique
    mutations: Vec<u32>,
    failure: Option<Failure>,
    adapter_trimmed: bool,
    edge_mutation: bool,
    // 1-based positions of mutations dropped for low base quality
    removed_mutations: Vec<u32>,
}

impl Pair {
    pub fn reset(&mut self, multiplicity: u64) {
        self.multiplicity = multiplicity;
        self.mask = None;
        self.target = None;
        self.site = None;
        self.end = None;
        self.mutations.clear();
        self.failure = None;
        self.adapter_trimmed = false;
        self.edge_mutation = false;
        self.removed_mutations.clear();
    }

    pub fn fail(&mut self, failure: Failure) {
        self.failure = Some(failure);
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// A pair is registered once it has a site and no failure.
    pub fn is_registered(&self) -> bool {
        self.failure.is_none() && self.site.is_some()
    }

    pub fn set_mask(&mut self, mask: usize) {
        self.mask = Some(mask);
    }

    pub fn resolve(&mut self, target: usize, site: usize, end: usize) {
        self.target = Some(target);
        self.site = Some(site);
        self.end = Some(end);
    }

    pub fn mutations_mut(&mut self) -> &mut Vec<u32> {
        &mut self.mutations
    }

    pub fn set_adapter_trimmed(&mut self, trimmed: bool) {
        self.adapter_trimmed = trimmed;
    }

    pub fn set_edge_mutation(&mut self, edge: bool) {
        self.edge_mutation = edge;
    }

    pub fn add_removed_mutation(&mut self, position: u32) {
        self.removed_mutations.push(position);
    }
}
