use derive_getters::Getters;
use eyre::Result;
use impl_tools::autoimpl;

use crate::failure::Failure;
use crate::pair::Pair;
use crate::source::PairRecord;

/// Per-pair result of a run, written back when requested.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct PairOutcome {
    pair_id: u64,
    row_id: Option<u64>,
    target: Option<usize>,
    mask: Option<usize>,
    site: Option<usize>,
    end: Option<usize>,
    /// Number of counted mutations
    mutations: usize,
    multiplicity: u64,
    failure: Option<Failure>,
}

impl PairOutcome {
    pub fn new(record: &PairRecord, pair: &Pair) -> Self {
        Self {
            pair_id: *record.id(),
            row_id: *record.row_id(),
            target: *pair.target(),
            mask: *pair.mask(),
            site: *pair.site(),
            end: *pair.end(),
            mutations: pair.mutations().len(),
            multiplicity: *record.multiplicity(),
            failure: *pair.failure(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.failure.is_none() && self.site.is_some()
    }
}

/// Receiver of per-pair outcomes. Called on the thread that drives the run, never concurrently.
#[autoimpl(for<S: trait + ?Sized> &mut S, Box<S>)]
pub trait ResultSink {
    fn write_outcomes(&mut self, outcomes: Vec<PairOutcome>) -> Result<()>;
}

impl ResultSink for Vec<PairOutcome> {
    fn write_outcomes(&mut self, mut outcomes: Vec<PairOutcome>) -> Result<()> {
        self.append(&mut outcomes);
        Ok(())
    }
}
