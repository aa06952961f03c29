use super::record::Record;
use crate::compression;
use crate::traits::ReadRecord;
use derive_getters::Dissolve;
use eyre::{ensure, eyre, Result};
use std::io::BufRead;
use std::path::Path;

/// A line-oriented FASTA reader. Blank lines and trailing carriage returns are ignored, every
/// other line must either be a `>name` header or a sequence line following a header.
#[derive(Debug, Dissolve)]
pub struct Reader<R> {
    reader: R,
    line: Vec<u8>,
    // Header of the record that will be read next
    pending: Option<String>,
    lineno: usize,
}

impl Reader<()> {
    /// Open a plain or gzip-compressed FASTA file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Reader<Box<dyn BufRead + Send + 'static>>> {
        Reader::new(compression::open(path)?)
    }
}

impl<R: BufRead> Reader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = Self {
            reader,
            line: Vec::new(),
            pending: None,
            lineno: 0,
        };

        // Everything before the first header must be blank
        while reader.next_line()? {
            if reader.line.is_empty() {
                continue;
            }
            ensure!(
                reader.line[0] == b'>',
                "Expected '>' at the start of the FASTA file, line {}",
                reader.lineno
            );
            reader.pending = Some(reader.header()?);
            break;
        }
        Ok(reader)
    }

    fn next_line(&mut self) -> Result<bool> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(false);
        }
        self.lineno += 1;
        while matches!(self.line.last(), Some(b'\n' | b'\r')) {
            self.line.pop();
        }
        Ok(true)
    }

    fn header(&self) -> Result<String> {
        let name = std::str::from_utf8(&self.line[1..])
            .map_err(|_| eyre!("FASTA header is not valid UTF-8, line {}", self.lineno))?;
        Ok(name.trim().to_string())
    }
}

impl<R: BufRead> ReadRecord for Reader<R> {
    type Record = Record;

    fn read_record(&mut self, into: &mut Self::Record) -> Result<bool> {
        let name = match self.pending.take() {
            Some(name) => name,
            None => return Ok(false),
        };

        let mut seq = Vec::new();
        while self.next_line()? {
            if self.line.first() == Some(&b'>') {
                self.pending = Some(self.header()?);
                break;
            }
            seq.extend(self.line.iter().filter(|x| !x.is_ascii_whitespace()));
        }

        *into = Record::new(name, seq).map_err(|err| err.wrap_err(format!(
            "Invalid FASTA record ending at line {}",
            self.lineno
        )))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(content: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        Reader::new(Cursor::new(content))?.read_to_end(&mut records)?;
        Ok(records)
    }

    #[test]
    fn test_valid_fasta() -> Result<()> {
        for (content, expected) in [
            ("", vec![]),
            ("\n\n", vec![]),
            (">SRP\nACGT\n", vec![("SRP", "ACGT")]),
            (">SRP\nACGT", vec![("SRP", "ACGT")]),
            (">SRP\nAC\nGT\n\n>5S\nGGAU\n", vec![("SRP", "ACGT"), ("5S", "GGAU")]),
            (
                "\n> SRP  \r\nACG\r\nT\r\n>5S\r\nG\r\n",
                vec![("SRP", "ACGT"), ("5S", "G")],
            ),
        ] {
            let records = read(content)?;
            let expected = expected
                .into_iter()
                .map(Record::try_from)
                .collect::<Result<Vec<_>>>()?;
            assert_eq!(records, expected, "Content: {content:?}");
        }
        Ok(())
    }

    #[test]
    fn test_invalid_fasta() {
        for content in [
            "ACGT\n>SRP\nACGT\n",
            ">\nACGT\n",
            ">SRP\n",
            ">SRP\n>5S\nACGT\n",
            ">SRP\nAC1GT\n",
        ] {
            assert!(read(content).is_err(), "Content: {content:?}");
        }
    }

    #[test]
    fn test_record_by_record() -> Result<()> {
        let mut reader = Reader::new(Cursor::new(">a\nAC\n>b\nGT\n"))?;
        let mut record = Record::default();

        assert!(reader.read_record(&mut record)?);
        assert_eq!(record.name(), "a");
        assert!(reader.read_record(&mut record)?);
        assert_eq!(record.seq(), b"GT");
        assert!(!reader.read_record(&mut record)?);
        Ok(())
    }
}
