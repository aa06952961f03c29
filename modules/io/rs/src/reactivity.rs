//! Tab-separated reactivity tables, one row per target site.

use crate::traits::WriteRecord;
use derive_getters::{Dissolve, Getters};
use derive_more::Constructor;
use eyre::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const HEADER: &str =
    "sequence\trt_start\tfive_prime_offset\tnucleotide\ttreated_mods\tuntreated_mods\tbeta\ttheta\tc";
pub const MUTATION_HEADER: &str = "treated_muts\tuntreated_muts\tmu\tr";

/// Optional mutation columns appended after `c`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Constructor, Dissolve, Getters)]
pub struct MutationColumns {
    treated_muts: u64,
    untreated_muts: u64,
    mu: f64,
    r: f64,
}

#[derive(Debug, Clone, PartialEq, Constructor, Dissolve, Getters)]
pub struct Row {
    sequence: String,
    rt_start: u32,
    five_prime_offset: u32,
    // None for the site 0 placeholder
    nucleotide: Option<u8>,
    treated_mods: u64,
    untreated_mods: u64,
    // None for the site 0 placeholder
    beta: Option<f64>,
    theta: Option<f64>,
    c: f64,
    mutations: Option<MutationColumns>,
}

/// Writes the header on construction, then one line per row.
pub struct Writer<W: Write> {
    writer: W,
    with_mutations: bool,
}

impl Writer<BufWriter<File>> {
    pub fn from_path(path: impl AsRef<Path>, with_mutations: bool) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?), with_mutations)
    }
}

impl<W: Write> Writer<W> {
    pub fn new(mut writer: W, with_mutations: bool) -> Result<Self> {
        writer.write_all(HEADER.as_bytes())?;
        if with_mutations {
            writer.write_all(b"\t")?;
            writer.write_all(MUTATION_HEADER.as_bytes())?;
        }
        writer.write_all(b"\n")?;
        Ok(Self {
            writer,
            with_mutations,
        })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn placeholder(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |x| format!("{x:.6}"))
}

impl<W: Write> WriteRecord for Writer<W> {
    type Record = Row;

    fn write_record(&mut self, row: &Self::Record) -> Result<()> {
        write!(
            self.writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.5}",
            row.sequence,
            row.rt_start,
            row.five_prime_offset,
            row.nucleotide.map_or('*', |x| x as char),
            row.treated_mods,
            row.untreated_mods,
            placeholder(row.beta),
            placeholder(row.theta),
            row.c
        )?;
        if self.with_mutations {
            let muts = row.mutations.unwrap_or_default();
            write!(
                self.writer,
                "\t{}\t{}\t{:.6}\t{:.6}",
                muts.treated_muts, muts.untreated_muts, muts.mu, muts.r
            )?;
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_rows() -> Result<()> {
        let mut writer = Writer::new(Vec::new(), false)?;
        writer.write_records(&[
            Row::new("SRP".into(), 137, 0, None, 10, 12, None, None, 0.28768, None),
            Row::new(
                "SRP".into(),
                137,
                1,
                Some(b'A'),
                20,
                10,
                Some(1.0 / 12.0),
                Some(0.302457),
                0.28768,
                None,
            ),
        ])?;
        writer.flush()?;

        let content = String::from_utf8(writer.into_inner())?;
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "SRP\t137\t0\t*\t10\t12\t-\t-\t0.28768");
        assert_eq!(
            lines[2],
            "SRP\t137\t1\tA\t20\t10\t0.083333\t0.302457\t0.28768"
        );
        Ok(())
    }

    #[test]
    fn test_mutation_columns() -> Result<()> {
        let mut writer = Writer::new(Vec::new(), true)?;
        let muts = MutationColumns::new(3, 1, 0.5, 0.75);
        writer.write_record(&Row::new(
            "5S".into(),
            120,
            7,
            Some(b'G'),
            0,
            0,
            Some(0.25),
            Some(0.0),
            1.0,
            Some(muts),
        ))?;

        let content = String::from_utf8(writer.into_inner())?;
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], format!("{HEADER}\t{MUTATION_HEADER}"));
        assert_eq!(
            lines[1],
            "5S\t120\t7\tG\t0\t0\t0.250000\t0.000000\t1.00000\t3\t1\t0.500000\t0.750000"
        );
        Ok(())
    }
}
