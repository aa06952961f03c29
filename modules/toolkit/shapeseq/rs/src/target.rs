use ahash::AHashMap;
use derive_getters::Getters;
use eyre::{ensure, Result};
use stopmap_core_rs::nuc;

/// Longest contiguous agreement between a query and a target. A zero `len` means no region
/// reached the requested minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PartialMatch {
    pub query_start: usize,
    pub len: usize,
    pub target_start: usize,
}

impl PartialMatch {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Target offset aligned with the first query base. Negative when the query overhangs the 5'
    /// end of the target.
    pub fn origin(&self) -> isize {
        self.target_start as isize - self.query_start as isize
    }
}

/// Number of compatible bases to the left and to the right of an already agreeing block of
/// `len` bases at `a[a_start..]` / `b[b_start..]`.
pub fn extend_match(
    a: &[u8],
    a_start: usize,
    b: &[u8],
    b_start: usize,
    len: usize,
) -> (usize, usize) {
    let compatible = |(x, y): (&u8, &u8)| nuc::compatible(*x, *y);
    let left = a[..a_start]
        .iter()
        .rev()
        .zip(b[..b_start].iter().rev())
        .take_while(|x| compatible(*x))
        .count();
    let right = a[a_start + len..]
        .iter()
        .zip(&b[b_start + len..])
        .take_while(|x| compatible(*x))
        .count();
    (left, right)
}

// 2 bits per base, `None` for words with anything but ACGT
fn encode(word: &[u8]) -> Option<u64> {
    word.iter().try_fold(0u64, |key, base| {
        let bits = match base {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            _ => return None,
        };
        Some((key << 2) | bits)
    })
}

/// Positions of every fixed-length word of a sequence.
#[derive(Debug, Clone, Default)]
pub(crate) struct WordIndex {
    word: usize,
    positions: AHashMap<u64, Vec<u32>>,
}

impl WordIndex {
    fn new(seq: &[u8], word: usize) -> Self {
        let mut positions: AHashMap<u64, Vec<u32>> = AHashMap::new();
        for (start, window) in seq.windows(word).enumerate() {
            if let Some(key) = encode(window) {
                positions.entry(key).or_default().push(start as u32);
            }
        }
        Self { word, positions }
    }

    pub(crate) fn word(&self) -> usize {
        self.word
    }

    /// Target offsets where the first `word` bases of `query` occur.
    pub(crate) fn hits(&self, query: &[u8]) -> &[u32] {
        query
            .get(..self.word)
            .and_then(encode)
            .and_then(|key| self.positions.get(&key))
            .map(|x| x.as_slice())
            .unwrap_or(&[])
    }
}

/// A reference sequence together with its word index. The sequence can't change after
/// construction.
#[derive(Debug, Clone, Getters)]
pub struct Target {
    id: usize,
    name: String,
    seq: Vec<u8>,
    #[getter(skip)]
    index: WordIndex,
}

impl Target {
    pub fn new(id: usize, name: impl Into<String>, seq: &[u8], word: usize) -> Result<Self> {
        let name = name.into();
        ensure!(!name.is_empty(), "Target name cannot be empty");
        ensure!(
            (1..=32).contains(&word),
            "Index word length must be within 1..=32, got {word}"
        );
        let seq = nuc::normalize(seq)
            .map_err(|err| err.wrap_err(format!("Invalid sequence for target {name}")))?;
        ensure!(
            seq.len() >= word,
            "Target {name} is shorter ({}) than the index word length ({word})",
            seq.len()
        );

        let index = WordIndex::new(&seq, word);
        Ok(Self {
            id,
            name,
            seq,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub(crate) fn index(&self) -> &WordIndex {
        &self.index
    }

    /// Offset of the only verbatim occurrence of the query. Absent and repeated queries both give
    /// `None`.
    pub fn find_exact(&self, query: &[u8]) -> Option<usize> {
        if query.is_empty() || query.len() > self.seq.len() {
            return None;
        }

        let occurrences: Vec<usize> = if query.len() >= self.index.word {
            self.index
                .hits(query)
                .iter()
                .map(|x| *x as usize)
                .filter(|x| self.seq[*x..].starts_with(query))
                .take(2)
                .collect()
        } else {
            // Restart right after each hit, occurrences may overlap
            let finder = memchr::memmem::Finder::new(query);
            let mut occurrences = Vec::with_capacity(2);
            let mut from = 0;
            while occurrences.len() < 2 {
                match finder.find(&self.seq[from..]) {
                    Some(hit) => {
                        occurrences.push(from + hit);
                        from += hit + 1;
                    }
                    None => break,
                }
            }
            occurrences
        };

        match occurrences.as_slice() {
            [offset] => Some(*offset),
            _ => None,
        }
    }

    /// Longest block of at least `min_len` compatible bases shared by the query and the target.
    /// The query may hang over either end of the target. Among blocks of equal length the first
    /// one found wins.
    pub fn find_partial(&self, query: &[u8], min_len: usize) -> PartialMatch {
        let word = self.index.word;
        let mut best = PartialMatch::default();
        if min_len == 0 || query.len() < min_len.max(word) {
            return best;
        }

        // Any block of min_len bases covers at least one sampled word
        let step = min_len.saturating_sub(word).max(1);
        let last = query.len() - step.max(word);
        for site in (0..last).step_by(step).chain(std::iter::once(last)) {
            for &hit in self.index.hits(&query[site..]) {
                let hit = hit as usize;
                let (left, right) = extend_match(query, site, &self.seq, hit, word);
                let len = left + word + right;
                if len >= min_len && len > best.len {
                    best = PartialMatch {
                        query_start: site - left,
                        len,
                        target_start: hit - left,
                    };
                }
            }
        }
        best
    }

    /// `find_partial` with `2 * min_len` first and `min_len` only when that finds nothing.
    pub fn find_partial_tiered(&self, query: &[u8], min_len: usize) -> PartialMatch {
        let long = self.find_partial(query, 2 * min_len);
        if long.is_empty() {
            self.find_partial(query, min_len)
        } else {
            long
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use stopmap_core_rs::nuc::reverse_complement;

    pub(crate) const SRP: &str = "ATCGGGGGCTCTGTTGGTTCTCCCGCAACGCTACTCTGTTTACCAGGTCAGGTCCGGAAGGAAGCAGCCAAGGCAGATGACGCGTGTGCCGGGATGTAGCTGGCAGGGCCCCCACCCGTCCTTGGTGCCCGAGTCAG";

    fn srp() -> Result<Target> {
        Target::new(0, "SRP", SRP.as_bytes(), 8)
    }

    fn found(offset: usize, len: usize, target: usize) -> PartialMatch {
        PartialMatch {
            query_start: offset,
            len,
            target_start: target,
        }
    }

    #[test]
    fn test_invalid_targets() {
        assert!(Target::new(0, "x", b"ACGTACGTX", 8).is_err());
        assert!(Target::new(0, "x", b"", 8).is_err());
        assert!(Target::new(0, "x", b"ACGT", 8).is_err());
        assert!(Target::new(0, "", b"ACGTACGT", 8).is_err());
        assert!(Target::new(0, "x", b"ACGTACGT", 0).is_err());
    }

    #[test]
    fn test_lowercase_and_uracil() -> Result<()> {
        let target = Target::new(3, "5S", b"ggaugcuggacguacg", 8)?;
        assert_eq!(target.seq(), b"GGATGCTGGACGTACG");
        assert_eq!(target.find_exact(b"GATGCTGG"), Some(1));
        Ok(())
    }

    #[test]
    fn test_find_exact() -> Result<()> {
        let target = srp()?;
        for (query, expected) in [
            ("ATCGGGGGCT", Some(0)),
            ("TCTGTTGGTTCTC", Some(9)),
            ("CCCCCCCCCCC", None),
            ("TCTGTTGGTTCCC", None),
            ("", None),
        ] {
            assert_eq!(target.find_exact(query.as_bytes()), expected, "{query}");
        }
        Ok(())
    }

    #[test]
    fn test_find_exact_requires_uniqueness() -> Result<()> {
        let target = Target::new(0, "repeats", b"ACGTACGTTTTTACGTACGTGGGG", 8)?;
        for (query, expected) in [
            ("ACGTACGT", None),
            ("ACGTACGTT", Some(0)),
            ("GGG", None),
            ("TTTTT", Some(7)),
            ("CGTG", Some(17)),
        ] {
            assert_eq!(target.find_exact(query.as_bytes()), expected, "{query}");
        }
        Ok(())
    }

    #[test]
    fn test_find_exact_overlapping_occurrences() -> Result<()> {
        let target = Target::new(0, "T", b"ACGTACGTCAAAACGTACGTAC", 8)?;
        for (query, expected) in [
            ("AAA", None),
            ("AAAA", Some(9)),
            ("CAAA", Some(8)),
            ("ACGTAC", None),
            ("TAC", None),
        ] {
            assert_eq!(target.find_exact(query.as_bytes()), expected, "{query}");
        }
        Ok(())
    }

    #[test]
    fn test_find_exact_offsets_are_verbatim() -> Result<()> {
        let target = srp()?;
        let seq = SRP.as_bytes();
        for len in [5, 8, 12] {
            for start in 0..=(seq.len() - len) {
                let query = &seq[start..start + len];
                let occurrences = seq.windows(len).filter(|x| *x == query).count();
                match target.find_exact(query) {
                    Some(offset) => {
                        assert_eq!(&seq[offset..offset + len], query);
                        assert_eq!(occurrences, 1);
                    }
                    None => assert!(occurrences > 1),
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_find_partial() -> Result<()> {
        let target = srp()?;
        assert_eq!(
            target.find_partial_tiered(b"ATCGGGGGCTCTGTTGGTT", 8),
            found(0, 19, 0)
        );
        assert_eq!(target.find_partial(b"ATGGGGGGCTCTGTTGGTT", 12), found(3, 16, 3));

        let query = format!("CCCCC{}GGGGG", "CAGCCAAGGCAGATGA");
        assert_eq!(target.find_partial(query.as_bytes(), 12), found(5, 16, 64));

        assert!(target.find_partial(b"TTTTTTTTTTTTTTTTTTTT", 8).is_empty());
        assert!(target.find_partial(b"ATCGGGG", 8).is_empty());
        Ok(())
    }

    #[test]
    fn test_find_partial_with_overhangs() -> Result<()> {
        let target = srp()?;
        for (query, expected) in [
            (
                reverse_complement(b"GGGCCTGACTCGGGCACCAAGGACGGGTGGGGGCC"),
                found(0, 31, 106),
            ),
            (
                reverse_complement(b"GGGCCTGACTCGGGCACCAAGGACGGGTGGGGGCA"),
                found(1, 30, 107),
            ),
            (
                reverse_complement(b"GGGCCTGACTCGGGCACCAAGGACAGATCGGAAGA"),
                found(11, 20, 117),
            ),
            (
                b"ATCGGGGGCTCTGTTGGTTCTCCCGCAACGCTACT".to_vec(),
                found(0, 35, 0),
            ),
            (
                b"GCAGGGCCCCCACCCGTCCTTGGTGCCCGAGTCAG".to_vec(),
                found(0, 35, 102),
            ),
            (
                b"CAGGGCCCCCACCCGTCCTTGGTGCCCGAGTCAGG".to_vec(),
                found(0, 34, 103),
            ),
            (
                b"GTCCTTGGTGCCCGAGTCAGGCCCAGATCGGAAGA".to_vec(),
                found(0, 20, 117),
            ),
        ] {
            assert_eq!(target.find_partial_tiered(&query, 8), expected);
        }
        Ok(())
    }

    #[test]
    fn test_find_partial_is_monotonic() -> Result<()> {
        let target = srp()?;
        let mut queries = vec![
            b"ATGGGGGGCTCTGTTGGTT".to_vec(),
            b"CCCCCCAGCCAAGGCAGATGAGGGGG".to_vec(),
            reverse_complement(b"GGGCCTGACTCGGGCACCAAGGACAGATCGGAAGA"),
        ];
        queries.push(SRP.as_bytes()[40..90].to_vec());

        for query in queries {
            let mut previous = usize::MAX;
            for min_len in 8..=40 {
                let len = target.find_partial(&query, min_len).len;
                assert!(len <= previous, "min_len {min_len}");
                assert!(len == 0 || len >= min_len);
                previous = len;
            }
        }
        Ok(())
    }

    #[test]
    fn test_extend_match() {
        for (a, a_start, b, b_start, expected) in [
            ("ATC", 0, "TTATGA", 2, (0, 1)),
            ("ATC", 0, "TTAGGA", 2, (0, 0)),
            ("ATC", 0, "TTATCA", 2, (0, 2)),
            ("GATC", 1, "TTATCA", 2, (0, 2)),
            ("GATC", 1, "TGATCA", 2, (1, 2)),
            ("GNTC", 1, "TGATCA", 2, (1, 2)),
        ] {
            assert_eq!(
                extend_match(a.as_bytes(), a_start, b.as_bytes(), b_start, 1),
                expected,
                "{a} vs {b}"
            );
        }
    }
}
