use crate::counters::Counters;
use crate::pair::Pair;
use crate::processor::PairProcessor;
use crate::sink::PairOutcome;
use crate::source::PairRecord;
use crate::targets::Targets;

/// Thread-local state of the engine: a private processor clone, the pair being processed and the
/// counters of every pair this worker has seen in the current run.
pub struct Worker {
    processor: Box<dyn PairProcessor>,
    pair: Pair,
    counters: Counters,
    processed: u64,
}

impl Worker {
    pub fn new(processor: Box<dyn PairProcessor>) -> Self {
        Self {
            processor,
            pair: Pair::default(),
            counters: Counters::default(),
            processed: 0,
        }
    }

    pub fn reset(&mut self, processor: Box<dyn PairProcessor>) {
        self.processor = processor;
        self.counters = Counters::default();
        self.processed = 0;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Process every record of the batch. Outcomes are collected only when `writeback` is set.
    pub fn process(
        &mut self,
        batch: &[PairRecord],
        targets: &Targets,
        writeback: bool,
    ) -> Option<Vec<PairOutcome>> {
        let mut outcomes = writeback.then(|| Vec::with_capacity(batch.len()));
        for record in batch {
            self.processor
                .process(targets, record, &mut self.pair, &mut self.counters);
            if let Some(outcomes) = outcomes.as_mut() {
                outcomes.push(PairOutcome::new(record, &self.pair));
            }
        }
        self.processed += batch.len() as u64;
        outcomes
    }

    pub fn collapse<'a>(workers: impl Iterator<Item = &'a mut Self>) -> Counters {
        let mut collapsed = Counters::default();
        for worker in workers {
            log::debug!("Worker processed {} unique pairs", worker.processed);
            collapsed.merge(&worker.counters);
        }
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::processor::tests::make_reads;
    use crate::processor::PartialFindProcessor;
    use crate::target::tests::SRP;
    use eyre::Result;

    #[test]
    fn test_split_batches_collapse_to_the_same_counts() -> Result<()> {
        let mut targets = Targets::new(8);
        targets.add("SRP", SRP.as_bytes())?;
        let processor = PartialFindProcessor::new(&Config::default())?;

        let batch = [0, 20, 50, 120, 20]
            .into_iter()
            .enumerate()
            .map(|(id, site)| {
                let (r1, r2) = make_reads(site, "AGGT");
                PairRecord::new(id as u64, &r1, &r2, 2)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut single = Worker::new(Box::new(processor.clone()));
        single.process(&batch, &targets, false);
        let expected = Worker::collapse(std::iter::once(&mut single));

        let mut split = [
            Worker::new(Box::new(processor.clone())),
            Worker::new(Box::new(processor.clone())),
        ];
        let outcomes = split[0].process(&batch[..2], &targets, true);
        split[1].process(&batch[2..], &targets, false);
        assert_eq!(Worker::collapse(split.iter_mut()), expected);

        let outcomes = outcomes.unwrap_or_default();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(*outcomes[1].site(), Some(20));
        assert_eq!(*outcomes[1].multiplicity(), 2);

        assert_eq!(expected.stops(0, 0, SRP.len(), SRP.len())[20], 4);

        // Reset drops the counts of the previous run
        single.reset(Box::new(processor));
        assert_eq!(single.processed(), 0);
        assert_eq!(Worker::collapse(std::iter::once(&mut single)), Counters::default());
        Ok(())
    }
}
