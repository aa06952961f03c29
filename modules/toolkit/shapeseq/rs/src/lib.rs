pub use config::{Config, EdgeMutations};
pub use counters::{CountKey, Counters, Event, MaskTally};
pub use engine::Engine;
pub use failure::Failure;
pub use mask::{Mask, Masks};
pub use pair::Pair;
pub use processor::{PairProcessor, PartialFindProcessor};
pub use profile::{MutationCounts, MutationProfile, Profile};
pub use sink::{PairOutcome, ResultSink};
pub use source::{MemorySource, PairRecord, PairSource};
pub use stopmap::StopMap;
pub use target::{extend_match, PartialMatch, Target};
pub use targets::{TargetMatch, Targets};

mod config;
mod counters;
mod engine;
mod failure;
mod mask;
mod pair;
mod processor;
mod profile;
mod sink;
mod source;
mod stopmap;
mod target;
mod targets;
mod worker;
