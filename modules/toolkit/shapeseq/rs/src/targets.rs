use std::ops::Index;
use std::path::Path;

use ahash::AHashMap;
use eyre::{ensure, OptionExt, Result};
use stopmap_io_rs::{fasta, ReadRecord};

use crate::target::{extend_match, PartialMatch, Target};

/// Outcome of a partial search over every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMatch {
    Unique(usize, PartialMatch),
    /// The longest block has the same length in several targets.
    Ambiguous,
    NotFound,
}

/// Ordered set of uniquely named targets sharing one index word length. Target ids are positions
/// in the set.
#[derive(Debug, Clone)]
pub struct Targets {
    word: usize,
    targets: Vec<Target>,
    names: AHashMap<String, usize>,
}

impl Default for Targets {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Targets {
    pub fn new(word: usize) -> Self {
        Self {
            word,
            targets: Vec::new(),
            names: AHashMap::new(),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, seq: &[u8]) -> Result<&Target> {
        let name = name.into();
        ensure!(
            !self.names.contains_key(&name),
            "Duplicate target name: {name}"
        );

        let id = self.targets.len();
        let target = Target::new(id, name.clone(), seq, self.word)?;
        self.names.insert(name, id);
        self.targets.push(target);
        Ok(&self.targets[id])
    }

    /// Add every record of a FASTA reader, returns the number of added targets.
    pub fn add_records(
        &mut self,
        reader: &mut impl ReadRecord<Record = fasta::Record>,
    ) -> Result<usize> {
        let mut record = fasta::Record::default();
        let mut added = 0;
        while reader.read_record(&mut record)? {
            self.add(record.name().as_str(), record.seq())?;
            added += 1;
        }
        Ok(added)
    }

    /// Add all targets from a plain or gzip-compressed FASTA file.
    pub fn add_fasta(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut reader = fasta::Reader::from_path(path)?;
        let added = self.add_records(&mut reader)?;
        ensure!(added > 0, "No targets found in {}", path.display());
        Ok(added)
    }

    pub fn word(&self) -> usize {
        self.word
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn by_name(&self, name: &str) -> Result<&Target> {
        self.names
            .get(name)
            .map(|id| &self.targets[*id])
            .ok_or_eyre(format!("Unknown target: {name}"))
    }

    /// Longest block across all targets, failing on ties between different targets.
    pub fn find_partial(&self, query: &[u8], min_len: usize) -> TargetMatch {
        let mut best = TargetMatch::NotFound;
        let mut best_len = 0;
        for target in &self.targets {
            let found = target.find_partial(query, min_len);
            if found.is_empty() || found.len < best_len {
                continue;
            }
            best = if found.len > best_len {
                TargetMatch::Unique(*target.id(), found)
            } else {
                TargetMatch::Ambiguous
            };
            best_len = found.len;
        }
        best
    }

    /// `find_partial` with `2 * min_len` first and `min_len` only when that finds nothing.
    pub fn find_partial_tiered(&self, query: &[u8], min_len: usize) -> TargetMatch {
        match self.find_partial(query, 2 * min_len) {
            TargetMatch::NotFound => self.find_partial(query, min_len),
            found => found,
        }
    }

    /// Length of the longest block of at least `min_len` bases that occurs at two different places
    /// of the target set, if there is one.
    pub fn self_match(&self, min_len: usize) -> Option<usize> {
        let mut longest = None;
        for target in &self.targets {
            let seq = target.seq();
            if min_len < self.word || seq.len() < min_len {
                continue;
            }

            let mut start = 0;
            loop {
                let query = &seq[start..start + min_len];
                if let Some(len) = self.longest_repeat(*target.id(), start, query) {
                    longest = longest.max(Some(len));
                }
                start += 1;
                if start + longest.unwrap_or(0).max(min_len) >= seq.len() {
                    break;
                }
            }
        }
        longest
    }

    // Longest extension over every other occurrence of `query` in the set
    fn longest_repeat(&self, id: usize, start: usize, query: &[u8]) -> Option<usize> {
        let mut longest = None;
        for other in &self.targets {
            for &hit in other.index().hits(query) {
                let hit = hit as usize;
                if *other.id() == id && hit == start {
                    continue;
                }
                if other.seq()[hit..].starts_with(query) {
                    let (left, right) =
                        extend_match(self.targets[id].seq(), start, other.seq(), hit, query.len());
                    longest = longest.max(Some(left + query.len() + right));
                }
            }
        }
        longest
    }
}

impl Index<usize> for Targets {
    type Output = Target;

    fn index(&self, id: usize) -> &Self::Output {
        &self.targets[id]
    }
}
