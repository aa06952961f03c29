use ahash::AHashMap;
use derive_getters::{Dissolve, Getters};
use eyre::{ensure, Result, WrapErr};
use impl_tools::autoimpl;
use stopmap_core_rs::nuc;

/// One read pair as delivered to the engine. R1 starts with the barcode handle, R2 reads
/// forward from the fragment start.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Dissolve)]
pub struct PairRecord {
    id: u64,
    r1: Vec<u8>,
    r2: Vec<u8>,
    /// Phred+33 qualities of (R1, R2)
    quality: Option<(Vec<u8>, Vec<u8>)>,
    /// Number of identical pairs this record stands for
    multiplicity: u64,
    /// Row of the backing store the record came from, echoed in written-back outcomes.
    row_id: Option<u64>,
}

impl PairRecord {
    pub fn new(id: u64, r1: &[u8], r2: &[u8], multiplicity: u64) -> Result<Self> {
        ensure!(multiplicity >= 1, "Pair {id} has zero multiplicity");
        let r1 = nuc::normalize(r1).wrap_err_with(|| format!("Invalid R1 of pair {id}"))?;
        let r2 = nuc::normalize(r2).wrap_err_with(|| format!("Invalid R2 of pair {id}"))?;
        Ok(Self {
            id,
            r1,
            r2,
            quality: None,
            multiplicity,
            row_id: None,
        })
    }

    pub fn with_quality(mut self, q1: &[u8], q2: &[u8]) -> Result<Self> {
        ensure!(
            q1.len() == self.r1.len() && q2.len() == self.r2.len(),
            "Quality strings of pair {} don't match the read lengths",
            self.id
        );
        self.quality = Some((q1.to_vec(), q2.to_vec()));
        Ok(self)
    }

    pub fn with_row_id(mut self, row_id: u64) -> Self {
        self.row_id = Some(row_id);
        self
    }
}

/// A resumable stream of read pairs.
///
/// `total_pairs` and `unique_pairs` describe the records delivered so far: the sum of their
/// multiplicities and their number. `position` is an opaque checkpoint that `seek` accepts to
/// continue from the same record later.
#[autoimpl(for<S: trait + ?Sized> &mut S, Box<S>)]
pub trait PairSource {
    /// Append up to `limit` records to `into`, returns how many were added. Zero means the
    /// source is exhausted.
    fn read_batch(&mut self, into: &mut Vec<PairRecord>, limit: usize) -> Result<usize>;

    fn total_pairs(&self) -> u64;

    fn unique_pairs(&self) -> u64;

    fn position(&self) -> u64;

    fn seek(&mut self, position: u64) -> Result<()>;
}

/// In-memory pair source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<PairRecord>,
    cursor: usize,
}

impl MemorySource {
    pub fn new(records: Vec<PairRecord>) -> Self {
        Self { records, cursor: 0 }
    }

    /// Collapse identical (R1, R2) pairs into one record each, numbered by first appearance.
    pub fn collapsed<R: AsRef<[u8]>>(pairs: impl IntoIterator<Item = (R, R)>) -> Result<Self> {
        let mut order: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut counts: AHashMap<(Vec<u8>, Vec<u8>), u64> = AHashMap::new();
        for (r1, r2) in pairs {
            let key = (r1.as_ref().to_vec(), r2.as_ref().to_vec());
            let count = counts.entry(key.clone()).or_default();
            if *count == 0 {
                order.push(key);
            }
            *count += 1;
        }

        let records = order
            .into_iter()
            .enumerate()
            .map(|(id, key)| {
                let multiplicity = counts[&key];
                PairRecord::new(id as u64, &key.0, &key.1, multiplicity)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PairRecord] {
        &self.records
    }
}

impl PairSource for MemorySource {
    fn read_batch(&mut self, into: &mut Vec<PairRecord>, limit: usize) -> Result<usize> {
        let end = (self.cursor + limit).min(self.records.len());
        into.extend_from_slice(&self.records[self.cursor..end]);
        let added = end - self.cursor;
        self.cursor = end;
        Ok(added)
    }

    fn total_pairs(&self) -> u64 {
        self.records[..self.cursor]
            .iter()
            .map(|x| x.multiplicity)
            .sum()
    }

    fn unique_pairs(&self) -> u64 {
        self.cursor as u64
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        ensure!(
            position as usize <= self.records.len(),
            "Position {position} is past the end of the source ({} records)",
            self.records.len()
        );
        self.cursor = position as usize;
        Ok(())
    }
}
