//! Nucleotide alphabet shared by targets, barcode masks, and reads.
//!
//! Every symbol maps to a 4-bit set of the concrete bases it may stand for (IUPAC). Two symbols are
//! compatible when they are identical or when their sets intersect, so `N` is compatible with
//! anything and `R` with both `A` and `G`.

use eyre::{ensure, Result};

pub const A: u8 = 0b0001;
pub const C: u8 = 0b0010;
pub const G: u8 = 0b0100;
pub const T: u8 = 0b1000;
pub const ANY: u8 = A | C | G | T;

const fn build_masks() -> [u8; 256] {
    let mut table = [0u8; 256];
    let symbols: [(u8, u8); 16] = [
        (b'A', A),
        (b'C', C),
        (b'G', G),
        (b'T', T),
        (b'U', T),
        (b'R', A | G),
        (b'Y', C | T),
        (b'S', G | C),
        (b'W', A | T),
        (b'K', G | T),
        (b'M', A | C),
        (b'B', C | G | T),
        (b'D', A | G | T),
        (b'H', A | C | T),
        (b'V', A | C | G),
        (b'N', ANY),
    ];
    let mut i = 0;
    while i < symbols.len() {
        let (symbol, mask) = symbols[i];
        table[symbol as usize] = mask;
        table[symbol.to_ascii_lowercase() as usize] = mask;
        i += 1;
    }
    table
}

static MASKS: [u8; 256] = build_masks();

/// Set of concrete bases the symbol stands for, 0 for symbols outside the IUPAC alphabet.
#[inline(always)]
pub fn mask(symbol: u8) -> u8 {
    MASKS[symbol as usize]
}

#[inline(always)]
pub fn compatible(a: u8, b: u8) -> bool {
    a == b || mask(a) & mask(b) != 0
}

#[inline(always)]
pub fn is_determinate(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

pub fn all_determinate(seq: &[u8]) -> bool {
    seq.iter().all(|x| is_determinate(*x))
}

#[inline(always)]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

/// Write the reverse complement of `seq` into `into`, replacing its content.
pub fn reverse_complement_into(seq: &[u8], into: &mut Vec<u8>) {
    into.clear();
    into.extend(seq.iter().rev().map(|x| complement(*x)));
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(seq.len());
    reverse_complement_into(seq, &mut result);
    result
}

/// Offsets where the two sequences hold incompatible symbols. Only the overlapping prefix is
/// compared.
pub fn mismatches<'a>(a: &'a [u8], b: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    a.iter()
        .zip(b)
        .enumerate()
        .filter_map(|(i, (x, y))| (!compatible(*x, *y)).then_some(i))
}

/// Upper-case the sequence, turn U into T, and check that only `ACGTN` remain.
pub fn normalize(seq: &[u8]) -> Result<Vec<u8>> {
    ensure!(!seq.is_empty(), "Nucleotide sequence cannot be empty");
    let mut result = Vec::with_capacity(seq.len());
    for (i, &x) in seq.iter().enumerate() {
        let x = match x.to_ascii_uppercase() {
            b'U' => b'T',
            x => x,
        };
        ensure!(
            matches!(x, b'A' | b'C' | b'G' | b'T' | b'N'),
            "Unsupported nucleotide at index {i} = {:?}",
            x as char
        );
        result.push(x);
    }
    Ok(result)
}

/// Check that the pattern is made of IUPAC symbols only and return it upper-cased.
pub fn normalize_degenerate(pattern: &[u8]) -> Result<Vec<u8>> {
    ensure!(!pattern.is_empty(), "Degenerate pattern cannot be empty");
    for (i, &x) in pattern.iter().enumerate() {
        ensure!(
            mask(x) != 0,
            "Unsupported degenerate symbol at index {i} = {:?}",
            x as char
        );
    }
    Ok(pattern.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        for (seq, expected) in [
            ("TTGGACG", "CGTCCAA"),
            ("ATCGGGGGCTCTGTTG", "CAACAGAGCCCCCGAT"),
            ("GNATC", "GATNC"),
            ("", ""),
        ] {
            assert_eq!(reverse_complement(seq.as_bytes()), expected.as_bytes());
        }
    }

    #[test]
    fn test_mismatches() {
        for (a, b, expected) in [
            ("GATC", "GACC", vec![2]),
            ("GATC", "CATG", vec![0, 3]),
            ("GATC", "GATC", vec![]),
            ("GNTC", "GATC", vec![]),
            ("RRRY", "AGGT", vec![]),
            ("RRRY", "AGCT", vec![2]),
            ("GATCA", "GAT", vec![]),
        ] {
            let found: Vec<_> = mismatches(a.as_bytes(), b.as_bytes()).collect();
            assert_eq!(found, expected, "{a} vs {b}");
        }
    }

    #[test]
    fn test_compatible() {
        for (a, b, expected) in [
            (b'A', b'A', true),
            (b'A', b'C', false),
            (b'N', b'C', true),
            (b'R', b'G', true),
            (b'Y', b'G', false),
            (b'U', b'T', true),
            (b'X', b'A', false),
            (b'X', b'X', true),
        ] {
            assert_eq!(compatible(a, b), expected, "{} vs {}", a as char, b as char);
        }
    }

    #[test]
    fn test_normalize() -> Result<()> {
        assert_eq!(normalize(b"acguN")?, b"ACGTN");
        for invalid in ["", "ACGR", "AC GT", "ACGT\n"] {
            assert!(normalize(invalid.as_bytes()).is_err(), "{invalid:?}");
        }

        assert_eq!(normalize_degenerate(b"rrry")?, b"RRRY");
        assert!(normalize_degenerate(b"RRJY").is_err());
        Ok(())
    }
}
