use derive_getters::{Dissolve, Getters};
use derive_more::Into;
use eyre::{ensure, Result};
use std::error::Error;

/// A named sequence from a FASTA file:
/// - The name is the header line without the leading '>' and surrounding whitespace; it can't be
///   empty.
/// - The sequence is the concatenation of all lines up to the next header, must be non-empty,
///   and contains only ASCII alphabetic characters.
#[derive(Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Dissolve, Getters, Into)]
pub struct Record {
    name: String,
    seq: Vec<u8>,
}

impl<NAME, SEQ> TryFrom<(NAME, SEQ)> for Record
where
    NAME: TryInto<String, Error: Error + Send + Sync + 'static>,
    SEQ: TryInto<Vec<u8>, Error: Error + Send + Sync + 'static>,
{
    type Error = eyre::Report;

    fn try_from(value: (NAME, SEQ)) -> Result<Self> {
        Self::new(value.0.try_into()?, value.1.try_into()?)
    }
}

impl Record {
    pub fn new(name: String, seq: Vec<u8>) -> Result<Self> {
        Self::validate_name(&name)?;
        Self::validate_seq(&name, &seq)?;
        Ok(Self { name, seq })
    }

    pub fn validate_name(name: &str) -> Result<()> {
        ensure!(!name.is_empty(), "FASTA record name cannot be empty");
        ensure!(
            !name.contains(['\n', '\r']),
            "Newline characters are not allowed in the FASTA record name: {name}"
        );
        Ok(())
    }

    pub fn validate_seq(name: &str, seq: &[u8]) -> Result<()> {
        ensure!(!seq.is_empty(), "FASTA sequence for {name} is empty");
        if let Some(i) = seq.iter().position(|x| !x.is_ascii_alphabetic()) {
            return Err(eyre::eyre!(
                "Non-alphabetic character in {name} at index {i} = {:?}",
                seq[i] as char
            ));
        }
        Ok(())
    }
}
