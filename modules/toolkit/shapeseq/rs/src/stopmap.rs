use std::io::Write;
use std::path::Path;

use eyre::{ensure, Result};
use stopmap_core_rs::parallelism;
use stopmap_io_rs::{reactivity, WriteRecord};

use crate::config::Config;
use crate::counters::Counters;
use crate::engine::Engine;
use crate::mask::Masks;
use crate::pair::Pair;
use crate::processor::{PairProcessor, PartialFindProcessor};
use crate::profile::Profile;
use crate::sink::{PairOutcome, ResultSink};
use crate::source::{PairRecord, PairSource};
use crate::targets::Targets;

/// A SHAPE-Seq experiment: targets, run configuration and the counters accumulated over every
/// processed source.
pub struct StopMap {
    config: Config,
    processor: PartialFindProcessor,
    targets: Targets,
    engine: Engine,
    counters: Counters,
}

impl StopMap {
    pub fn new(config: Config) -> Result<Self> {
        let processor = PartialFindProcessor::new(&config)?;
        let engine = Engine::new(parallelism::workers(config.num_workers)?)?;
        log::debug!("Launched {} workers", engine.num_workers());
        Ok(Self {
            targets: Targets::new(config.index_word_length),
            config,
            processor,
            engine,
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn masks(&self) -> &Masks {
        self.processor.masks()
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Counters of every pair processed so far.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn add_target(&mut self, name: &str, seq: &[u8]) -> Result<&mut Self> {
        self.targets.add(name, seq)?;
        Ok(self)
    }

    pub fn add_targets_fasta(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let added = self.targets.add_fasta(path)?;
        log::info!("Loaded {added} targets");
        self.check_self_matches();
        Ok(self)
    }

    /// Longest stretch of at least the minimum match length shared by two places of the target
    /// set. Anchors in such a stretch can't tell the places apart, so finding one is a warning.
    pub fn check_self_matches(&self) -> Option<usize> {
        let min_len = self.config.minimum_target_match_length;
        let longest = self.targets.self_match(min_len);
        if let Some(longest) = longest {
            log::warn!(
                "Targets share a stretch of {longest} bases, the minimum match length is {min_len}: matches may be ambiguous"
            );
        }
        longest
    }

    /// Process every remaining pair of the source and fold the result into the running counters.
    /// Returns the counters of this run alone.
    pub fn process(
        &mut self,
        source: &mut dyn PairSource,
        sink: Option<&mut dyn ResultSink>,
    ) -> Result<Counters> {
        ensure!(!self.targets.is_empty(), "Add targets before processing pairs");
        let sink = match sink {
            Some(_) if !self.config.writeback_results => {
                log::warn!("writeback_results is disabled, per-pair outcomes are not written");
                None
            }
            sink => sink,
        };

        let counters = self.engine.run(
            &self.processor,
            &self.targets,
            source,
            sink,
            self.config.batch_size,
        )?;
        self.counters.merge(&counters);
        Ok(counters)
    }

    /// Process a single pair on the calling thread without touching the running counters.
    pub fn process_pair(&self, record: &PairRecord) -> PairOutcome {
        let mut processor = self.processor.clone();
        let mut pair = Pair::default();
        processor.process(&self.targets, record, &mut pair, &mut Counters::default());
        PairOutcome::new(record, &pair)
    }

    pub fn report(&self) {
        let masks: Vec<&str> = self.masks().iter().map(|x| x.chars().as_str()).collect();
        self.counters.report(&masks);
    }

    /// Profiles of every target, one per observed reverse transcription start. Targets without
    /// registered pairs get a single all-zero profile for their 3' end. Cotrans runs get one
    /// profile for every transcript length from the configured minimum to the full target.
    pub fn profiles(&self, with_mutations: bool) -> Result<Vec<Profile>> {
        let mut profiles = Vec::new();
        for target in self.targets.iter() {
            let mut ends: Vec<usize> = if self.config.cotrans {
                (self.config.cotrans_minimum_length..=target.len()).collect()
            } else {
                self.counters
                    .ends(*target.id())
                    .into_iter()
                    .map(|x| x as usize)
                    .collect()
            };
            if ends.is_empty() {
                ends.push(target.len());
            }

            for end in ends {
                let profile = if with_mutations {
                    Profile::from_counters_with_mutations(&self.counters, target, end)?
                } else {
                    Profile::from_counters(&self.counters, target, end)?
                };
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    pub fn write_reactivities(&self, writer: impl Write, with_mutations: bool) -> Result<()> {
        self.write_rows(reactivity::Writer::new(writer, with_mutations)?, with_mutations)
    }

    pub fn write_reactivities_to(&self, path: impl AsRef<Path>, with_mutations: bool) -> Result<()> {
        self.write_rows(
            reactivity::Writer::from_path(path, with_mutations)?,
            with_mutations,
        )
    }

    fn write_rows<W: Write>(
        &self,
        mut writer: reactivity::Writer<W>,
        with_mutations: bool,
    ) -> Result<()> {
        for profile in self.profiles(with_mutations)? {
            let target = &self.targets[*profile.target()];
            writer.write_records(&profile.rows(target))?;
        }
        writer.flush()
    }
}
