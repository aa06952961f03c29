use dyn_clone::DynClone;
use eyre::Result;
use impl_tools::autoimpl;
use itertools::Itertools;
use stopmap_core_rs::nuc;

use crate::config::{Config, EdgeMutations};
use crate::counters::Counters;
use crate::failure::Failure;
use crate::mask::Masks;
use crate::pair::Pair;
use crate::source::PairRecord;
use crate::targets::{TargetMatch, Targets};

const PHRED_OFFSET: u8 = 33;

/// Stages of single pair processing. Every worker owns a clone of the processor, so
/// implementations are free to keep scratch buffers.
#[autoimpl(for <P: trait> Box<P> where Box<P>: Clone)]
pub trait PairProcessor: DynClone + Send + Sync {
    /// Assign a mask or fail the pair.
    fn classify(&mut self, record: &PairRecord, pair: &mut Pair);

    /// Locate both mates and resolve the stop site of a classified pair.
    fn match_pair(&mut self, targets: &Targets, record: &PairRecord, pair: &mut Pair);

    /// Fold the final state of the pair into the counters.
    fn count(&mut self, pair: &Pair, counters: &mut Counters) {
        let multiplicity = *pair.multiplicity();
        if let Some(mask) = pair.mask() {
            counters.count_mask(*mask, multiplicity);
        }
        if *pair.adapter_trimmed() {
            counters.count_adapter_trimmed(multiplicity);
        }
        if *pair.edge_mutation() {
            counters.count_edge_mutation(multiplicity);
        }
        counters.count_removed_mutations(pair.removed_mutations().len() as u64, multiplicity);

        match (pair.failure(), pair.target(), pair.mask(), pair.site(), pair.end()) {
            (Some(failure), ..) => counters.count_failure(*failure, multiplicity),
            (None, &Some(target), &Some(mask), &Some(site), &Some(end)) => {
                counters.register(target, mask, site, end, pair.mutations(), multiplicity);
                counters.register_removed_mutations(
                    target,
                    mask,
                    end,
                    pair.removed_mutations(),
                    multiplicity,
                );
            }
            _ => {}
        }
    }

    fn process(
        &mut self,
        targets: &Targets,
        record: &PairRecord,
        pair: &mut Pair,
        counters: &mut Counters,
    ) {
        pair.reset(*record.multiplicity());
        self.classify(record, pair);
        if !pair.is_failed() {
            self.match_pair(targets, record, pair);
        }
        if let Some(failure) = pair.failure() {
            log::trace!("Pair {}: {failure}", record.id());
        }
        self.count(pair, counters);
    }
}

/// Anchors both mates with the two-tier partial search, then derives the fragment geometry,
/// adapter trimming and mutations from the anchors.
#[derive(Debug, Clone)]
pub struct PartialFindProcessor {
    config: Config,
    masks: Masks,
    // Adapter as it appears at the end of mate 2 (reverse complement)
    adapter_t: Vec<u8>,
    adapter_b: Vec<u8>,
    // Empty unless cotrans
    linker: Vec<u8>,
    // Scratch buffers
    rc1: Vec<u8>,
    observed: Vec<(u32, u8)>,
}

impl PartialFindProcessor {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let masks = Masks::new(&config.masks)?;
        let adapter_t = nuc::reverse_complement(&nuc::normalize(config.adapter_t.as_bytes())?);
        let adapter_b = nuc::normalize(config.adapter_b.as_bytes())?;
        let linker = if config.cotrans {
            nuc::normalize(config.cotrans_linker.as_bytes())?
        } else {
            Vec::new()
        };
        Ok(Self {
            config: config.clone(),
            masks,
            adapter_t,
            adapter_b,
            linker,
            rc1: Vec::new(),
            observed: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn masks(&self) -> &Masks {
        &self.masks
    }

    fn adapter_errors(tail: &[u8], adapter: &[u8]) -> usize {
        // Bases past the end of the adapter can't agree with it
        let overhang = tail.len().saturating_sub(adapter.len());
        nuc::mismatches(tail, adapter).count() + overhang
    }

    fn resolve(
        &mut self,
        targets: &Targets,
        record: &PairRecord,
        pair: &mut Pair,
    ) -> std::result::Result<(), Failure> {
        let min_len = self.config.minimum_target_match_length;
        let allowed_adapter_errors = self.config.allowed_adapter_errors;
        let allowed_target_errors = self.config.allowed_target_errors;

        let handle = (*pair.mask())
            .map(|x| self.masks[x].len())
            .ok_or(Failure::Mask)?;
        let (r1, r2) = (record.r1().as_slice(), record.r2().as_slice());

        // Anchors
        let (tid, r2m) = match targets.find_partial_tiered(r2, min_len) {
            TargetMatch::Unique(tid, found) => (tid, found),
            TargetMatch::Ambiguous => return Err(Failure::MultipleTargets),
            TargetMatch::NotFound => return Err(Failure::R2NotFound),
        };
        if r1.len() <= handle {
            return Err(Failure::R1NotFound);
        }
        let seq = targets[tid].seq().as_slice();
        let n = seq.len();

        // In cotrans runs mate 1 starts reading at the linker, only the rest is target
        nuc::reverse_complement_into(&r1[handle..], &mut self.rc1);
        let body = self.rc1.len();
        let linker = self.linker.len();
        if body < linker {
            return Err(Failure::Linker);
        }
        let r1_target = body - linker;
        if linker > 0
            && Self::adapter_errors(&self.rc1[r1_target..], &self.linker) > allowed_adapter_errors
        {
            return Err(Failure::Linker);
        }

        let r1m = targets[tid].find_partial_tiered(&self.rc1[..r1_target], min_len);
        if r1m.is_empty() {
            return Err(Failure::R1NotFound);
        }

        let site = usize::try_from(r2m.origin()).map_err(|_| Failure::LeftOfTarget)?;
        let origin1 = r1m.origin();
        let end1 = origin1 + r1_target as isize;

        // Target offset where the fragment is expected to end
        let limit = if self.config.cotrans {
            if end1 <= site as isize {
                return Err(Failure::R1R2Mismatch);
            }
            if end1 > n as isize {
                return Err(Failure::R1RightEdge);
            }
            if (end1 as usize) < self.config.cotrans_minimum_length {
                return Err(Failure::CotransMinimum);
            }
            end1 as usize
        } else {
            n
        };

        // Adapter trimming: everything past the fragment must be adapter
        let fragment = limit + linker - site;
        let r2_keep = r2.len().min(fragment);
        let r2_trim = r2.len() - r2_keep;
        if r2_trim > 0 {
            let visible = r2_trim.saturating_sub(handle);
            if visible < self.config.minimum_adapter_len {
                return Err(Failure::AdapterTrim);
            }
            if visible > 0
                && Self::adapter_errors(&r2[r2_keep + handle..], &self.adapter_t)
                    > allowed_adapter_errors
            {
                return Err(Failure::AdapterTrim);
            }
        }
        let r2_target = r2_keep.min(limit - site);
        if r2_keep > r2_target
            && Self::adapter_errors(&r2[r2_target..r2_keep], &self.linker)
                > allowed_adapter_errors
        {
            return Err(Failure::Linker);
        }

        let r1_keep = body.min(fragment);
        let r1_trim = body - r1_keep;
        if r1_trim > 0
            && Self::adapter_errors(&r1[handle + r1_keep..], &self.adapter_b)
                > allowed_adapter_errors
        {
            return Err(Failure::AdapterTrim);
        }
        pair.set_adapter_trimmed(r2_trim > 0 || r1_trim > 0);

        // Mate 1 must cover the fragment from the stop to the RT start
        let start1 = origin1 + r1_trim as isize;
        if start1 < site as isize || end1 > n as isize || (r1_trim > 0 && start1 != site as isize)
        {
            return Err(Failure::R1R2Mismatch);
        }
        let (start1, end) = (start1 as usize, end1 as usize);
        if !self.config.cotrans && !self.config.allow_multiple_rt_starts && end != n {
            return Err(Failure::R1RightEdge);
        }

        // Mismatches of both mates against the target, with the quality of the read base
        let quality = record.quality().as_ref();
        self.observed.clear();
        for i in nuc::mismatches(&r2[..r2_target], &seq[site..limit]) {
            let phred = quality.map_or(u8::MAX, |(_, q2)| q2[i]);
            self.observed.push(((site + i) as u32, phred));
        }
        if self.observed.len() > allowed_target_errors {
            return Err(Failure::MatchErrors);
        }

        let r2_errors = self.observed.len();
        for j in nuc::mismatches(&self.rc1[r1_trim..r1_target], &seq[start1..end]) {
            // rc1[k] was read at r1[handle + body - 1 - k]
            let phred = quality.map_or(u8::MAX, |(q1, _)| q1[handle + body - 1 - (r1_trim + j)]);
            self.observed.push(((start1 + j) as u32, phred));
        }
        if self.observed.len() - r2_errors > allowed_target_errors {
            return Err(Failure::MatchErrors);
        }

        // Mutations are unioned over mates, the best quality call of a position decides
        self.observed.sort_unstable();
        let threshold = self.config.mutation_quality_threshold;
        for (offset, calls) in &self.observed.iter().chunk_by(|x| x.0) {
            let phred = calls.map(|x| x.1).max().unwrap_or(u8::MAX);
            if threshold.is_some_and(|t| phred.saturating_sub(PHRED_OFFSET) < t) {
                pair.add_removed_mutation(offset + 1);
            } else {
                pair.mutations_mut().push(offset + 1);
            }
        }

        let edge = site as u32 + 1;
        if pair.mutations().contains(&edge) {
            pair.set_edge_mutation(true);
            match self.config.count_edge_mutations {
                EdgeMutations::Discard => return Err(Failure::EdgeMutation),
                EdgeMutations::StopOnly => pair.mutations_mut().retain(|x| *x != edge),
                EdgeMutations::StopAndMut => {}
            }
        }

        pair.resolve(tid, site, end);
        Ok(())
    }
}

impl PairProcessor for PartialFindProcessor {
    fn classify(&mut self, record: &PairRecord, pair: &mut Pair) {
        if !self.config.allow_indeterminate
            && !(nuc::all_determinate(record.r1()) && nuc::all_determinate(record.r2()))
        {
            pair.fail(Failure::Indeterminate);
            return;
        }

        match self.masks.classify(record.r1()) {
            Some(mask) => pair.set_mask(mask),
            None => pair.fail(Failure::Mask),
        }
    }

    fn match_pair(&mut self, targets: &Targets, record: &PairRecord, pair: &mut Pair) {
        if let Err(failure) = self.resolve(targets, record, pair) {
            pair.fail(failure);
        }
    }
}
