use std::ops::Index;

use derive_getters::Getters;
use eyre::{ensure, Result};
use stopmap_core_rs::nuc;

/// Degenerate barcode at the start of mate 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters)]
pub struct Mask {
    chars: String,
    #[getter(skip)]
    values: Vec<u8>,
}

impl Mask {
    pub fn new(chars: &str) -> Result<Self> {
        let normalized = nuc::normalize_degenerate(chars.as_bytes())
            .map_err(|err| err.wrap_err(format!("Invalid mask: {chars}")))?;
        let values = normalized.iter().map(|x| nuc::mask(*x)).collect();
        Ok(Self {
            chars: String::from_utf8_lossy(&normalized).into_owned(),
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the read starts with a sequence this mask stands for.
    pub fn matches(&self, read: &[u8]) -> bool {
        read.len() >= self.values.len()
            && read
                .iter()
                .zip(&self.values)
                .all(|(base, allowed)| nuc::mask(*base) & allowed != 0)
    }
}

/// Masks in classification priority. The first one is the treated channel, the second one the
/// untreated channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Masks(Vec<Mask>);

impl Masks {
    pub fn new(patterns: &[impl AsRef<str>]) -> Result<Self> {
        ensure!(
            patterns.len() >= 2,
            "At least two masks (treated and untreated) are required"
        );
        let masks = patterns
            .iter()
            .map(|x| Mask::new(x.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        for (i, mask) in masks.iter().enumerate() {
            ensure!(
                !masks[..i].contains(mask),
                "Duplicate mask: {}",
                mask.chars()
            );
        }
        Ok(Self(masks))
    }

    /// Index of the first mask matching the read.
    pub fn classify(&self, read: &[u8]) -> Option<usize> {
        self.0.iter().position(|x| x.matches(read))
    }

    pub fn treated(&self) -> &Mask {
        &self.0[0]
    }

    pub fn untreated(&self) -> &Mask {
        &self.0[1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mask> {
        self.0.iter()
    }
}

impl Index<usize> for Masks {
    type Output = Mask;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_matches() -> Result<()> {
        let treated = Mask::new("RRRY")?;
        for (read, expected) in [
            ("AGGTCTGA", true),
            ("GAAC", true),
            ("GAA", false),
            ("CCTG", false),
            ("AGGA", false),
            ("NGGT", true),
            ("", false),
        ] {
            assert_eq!(treated.matches(read.as_bytes()), expected, "{read}");
        }

        let concrete = Mask::new("acgt")?;
        assert_eq!(concrete.chars(), "ACGT");
        assert!(concrete.matches(b"ACGTTT"));
        assert!(!concrete.matches(b"ACGA"));
        Ok(())
    }

    #[test]
    fn test_classify_in_priority_order() -> Result<()> {
        let masks = Masks::new(&["RRRY", "YYYR", "NNNN"])?;
        for (read, expected) in [
            ("AGGTACGT", Some(0)),
            ("CCTGACGT", Some(1)),
            ("ACGTACGT", Some(2)),
        ] {
            assert_eq!(masks.classify(read.as_bytes()), expected, "{read}");
        }
        assert_eq!(masks.treated().chars(), "RRRY");
        assert_eq!(masks.untreated().chars(), "YYYR");

        let masks = Masks::new(&["RRRY", "YYYR"])?;
        assert_eq!(masks.classify(b"ACGTACGT"), None);
        Ok(())
    }

    #[test]
    fn test_invalid_masks() {
        assert!(Masks::new(&["RRRY"]).is_err());
        assert!(Masks::new(&["RRRY", "RRRY"]).is_err());
        assert!(Masks::new(&["RRRY", "YYJR"]).is_err());
        assert!(Masks::new(&["RRRY", ""]).is_err());
    }
}
