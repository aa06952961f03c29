use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use eyre::{ensure, eyre, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use thread_local::ThreadLocal;

use crate::counters::Counters;
use crate::processor::PairProcessor;
use crate::sink::{PairOutcome, ResultSink};
use crate::source::{PairRecord, PairSource};
use crate::targets::Targets;
use crate::worker::Worker;

// Batches in flight per worker
const QUEUE_DEPTH: usize = 2;

/// Fan-out/fan-in over a fixed pool of workers.
///
/// The calling thread reads batches from the source into a bounded queue and blocks when the
/// queue is full. Pool threads pull batches, process them with thread-local workers and send
/// per-pair outcomes back when a sink is attached. Each worker keeps private counters that are
/// merged once every worker has drained the queue.
pub struct Engine {
    pool: ThreadPool,
    workers: ThreadLocal<RefCell<Worker>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl Engine {
    pub fn new(num_workers: usize) -> Result<Self> {
        ensure!(num_workers > 0, "At least one worker is required");
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("stopmap-worker-{i}"))
            .build()?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: ThreadPool) -> Self {
        Self {
            pool,
            workers: ThreadLocal::new(),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Process every remaining pair of the source. The returned counters cover this run only, with
    /// `total_pairs`/`unique_pairs` taken from the source bookkeeping.
    pub fn run(
        &mut self,
        processor: &(dyn PairProcessor + 'static),
        targets: &Targets,
        source: &mut dyn PairSource,
        mut sink: Option<&mut dyn ResultSink>,
        batch_size: usize,
    ) -> Result<Counters> {
        ensure!(batch_size > 0, "Batch size must be positive");
        ensure!(!targets.is_empty(), "No targets to match pairs against");

        // Soft-reset all workers
        for w in self.workers.iter_mut() {
            w.get_mut().reset(dyn_clone::clone_box(processor));
        }

        let nworkers = self.num_workers();
        let writeback = sink.is_some();
        let (total_before, unique_before) = (source.total_pairs(), source.unique_pairs());

        let (batches, queue): (Sender<Option<Vec<PairRecord>>>, Receiver<_>) =
            bounded(QUEUE_DEPTH * nworkers);
        let (results, outcomes): (Sender<Vec<PairOutcome>>, Receiver<_>) = unbounded();
        let has_failed = AtomicBool::new(false);

        let workers = &self.workers;
        let produced = self.pool.in_place_scope(|s| {
            for _ in 0..nworkers {
                let (queue, results, has_failed) = (queue.clone(), results.clone(), &has_failed);
                s.spawn(move |_| {
                    while let Ok(Some(batch)) = queue.recv() {
                        // Keep draining the queue after a failure so the producer never blocks
                        if has_failed.load(Ordering::Relaxed) {
                            continue;
                        }

                        let processed = catch_unwind(AssertUnwindSafe(|| {
                            let mut worker = workers
                                .get_or(|| RefCell::new(Worker::new(dyn_clone::clone_box(processor))))
                                .borrow_mut();
                            worker.process(&batch, targets, writeback)
                        }));

                        let failure = match processed {
                            Ok(Some(outcomes)) => results
                                .send(outcomes)
                                .err()
                                .map(|_| "result channel is closed".to_string()),
                            Ok(None) => None,
                            Err(panic) => Some(panic_message(&*panic).to_string()),
                        };
                        if let Some(err) = failure {
                            has_failed.store(true, Ordering::Relaxed);
                            log::error!("Pair processing failed: {err}");
                        }
                    }
                });
            }

            let mut feed = || -> Result<()> {
                loop {
                    // Stop feeding new batches, in-flight ones are finished by the workers
                    if has_failed.load(Ordering::Relaxed) {
                        return Ok(());
                    }

                    let mut batch = Vec::with_capacity(batch_size);
                    if source.read_batch(&mut batch, batch_size)? == 0 {
                        return Ok(());
                    }
                    batches
                        .send(Some(batch))
                        .map_err(|_| eyre!("Work queue is closed"))?;

                    if let Some(sink) = sink.as_mut() {
                        for chunk in outcomes.try_iter() {
                            sink.write_outcomes(chunk)?;
                        }
                    }
                }
            };
            let produced = feed();

            // One sentinel per worker
            for _ in 0..nworkers {
                if batches.send(None).is_err() {
                    break;
                }
            }
            produced
        });

        if has_failed.into_inner() {
            return Err(eyre!("Pair processing internal error. See log for details."));
        }
        produced?;

        drop(results);
        if let Some(sink) = sink.as_mut() {
            for chunk in outcomes.try_iter() {
                sink.write_outcomes(chunk)?;
            }
        }

        let mut counters = Worker::collapse(self.workers.iter_mut().map(|x| x.get_mut()));
        counters.set_totals(
            source.total_pairs().saturating_sub(total_before),
            source.unique_pairs().saturating_sub(unique_before),
        );
        Ok(counters)
    }
}
