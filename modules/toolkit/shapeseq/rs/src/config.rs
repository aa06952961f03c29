use std::fmt::{Display, Formatter};
use std::str::FromStr;

use derive_getters::Dissolve;
use eyre::{ensure, eyre, Report, Result, WrapErr};
use stopmap_core_rs::nuc;

pub const DEFAULT_ADAPTER_T: &str = "AATGATACGGCGACCACCGAGATCTACACTCTTTCCCTACACGACGCTCTTCCGATCT";
pub const DEFAULT_ADAPTER_B: &str = "AGATCGGAAGAGCACACGTCTGAACTCCAGTCAC";
pub const DEFAULT_COTRANS_LINKER: &str = "CTGACTCGGGCACCAAGGAC";
pub const MAX_MATCH_LENGTH: usize = 35;

/// What to do with a pair that has a mutation at the first base of its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum EdgeMutations {
    /// Count both the stop and the mutation.
    #[display("stop_and_mut")]
    StopAndMut,
    /// Count the stop, drop the edge mutation.
    #[display("stop_only")]
    StopOnly,
    /// Fail the pair: neither the stop nor any mutation is counted.
    #[default]
    #[display("discard")]
    Discard,
}

impl FromStr for EdgeMutations {
    type Err = Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stop_and_mut" => Ok(EdgeMutations::StopAndMut),
            "stop_only" => Ok(EdgeMutations::StopOnly),
            "discard" | "None" => Ok(EdgeMutations::Discard),
            _ => Err(eyre!("Invalid count_edge_mutations value: {s}")),
        }
    }
}

/// Options of a run. Passed by reference to the engine and cloned into every processor.
#[derive(Debug, Clone, PartialEq, Eq, Dissolve)]
pub struct Config {
    /// Barcode patterns in priority order; the first is treated, the second untreated.
    pub masks: Vec<String>,
    pub minimum_target_match_length: usize,
    pub index_word_length: usize,
    pub adapter_t: String,
    pub adapter_b: String,
    pub allowed_adapter_errors: usize,
    /// Per mate.
    pub allowed_target_errors: usize,
    pub allow_indeterminate: bool,
    /// `None` = all available cores, negative = all but `|n| - 1`.
    pub num_workers: Option<isize>,
    pub count_edge_mutations: EdgeMutations,
    pub allow_multiple_rt_starts: bool,
    pub minimum_adapter_len: usize,
    /// Phred score below which mutations are dropped.
    pub mutation_quality_threshold: Option<u8>,
    pub batch_size: usize,
    pub writeback_results: bool,
    /// Cotranscriptional experiment: every fragment ends with the linker, at any target offset.
    pub cotrans: bool,
    pub cotrans_linker: String,
    /// Shortest transcript (linker excluded) that is registered in cotrans runs.
    pub cotrans_minimum_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            masks: vec!["RRRY".to_string(), "YYYR".to_string()],
            minimum_target_match_length: 10,
            index_word_length: 8,
            adapter_t: DEFAULT_ADAPTER_T.to_string(),
            adapter_b: DEFAULT_ADAPTER_B.to_string(),
            allowed_adapter_errors: 0,
            allowed_target_errors: 0,
            allow_indeterminate: false,
            num_workers: None,
            count_edge_mutations: EdgeMutations::default(),
            allow_multiple_rt_starts: false,
            minimum_adapter_len: 0,
            mutation_quality_threshold: None,
            batch_size: 16384,
            writeback_results: false,
            cotrans: false,
            cotrans_linker: DEFAULT_COTRANS_LINKER.to_string(),
            cotrans_minimum_length: 20,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_masks(&mut self, masks: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.masks = masks.into_iter().map(Into::into).collect();
        self
    }

    pub fn set_minimum_target_match_length(&mut self, length: usize) -> &mut Self {
        self.minimum_target_match_length = length;
        self
    }

    pub fn set_index_word_length(&mut self, length: usize) -> &mut Self {
        self.index_word_length = length;
        self
    }

    pub fn set_adapters(&mut self, adapter_t: &str, adapter_b: &str) -> &mut Self {
        self.adapter_t = adapter_t.to_string();
        self.adapter_b = adapter_b.to_string();
        self
    }

    pub fn set_allowed_adapter_errors(&mut self, errors: usize) -> &mut Self {
        self.allowed_adapter_errors = errors;
        self
    }

    pub fn set_allowed_target_errors(&mut self, errors: usize) -> &mut Self {
        self.allowed_target_errors = errors;
        self
    }

    pub fn set_allow_indeterminate(&mut self, allow: bool) -> &mut Self {
        self.allow_indeterminate = allow;
        self
    }

    pub fn set_num_workers(&mut self, workers: Option<isize>) -> &mut Self {
        self.num_workers = workers;
        self
    }

    pub fn set_count_edge_mutations(&mut self, policy: EdgeMutations) -> &mut Self {
        self.count_edge_mutations = policy;
        self
    }

    pub fn set_allow_multiple_rt_starts(&mut self, allow: bool) -> &mut Self {
        self.allow_multiple_rt_starts = allow;
        self
    }

    pub fn set_minimum_adapter_len(&mut self, length: usize) -> &mut Self {
        self.minimum_adapter_len = length;
        self
    }

    pub fn set_mutation_quality_threshold(&mut self, threshold: Option<u8>) -> &mut Self {
        self.mutation_quality_threshold = threshold;
        self
    }

    pub fn set_batch_size(&mut self, size: usize) -> &mut Self {
        self.batch_size = size;
        self
    }

    pub fn set_writeback_results(&mut self, writeback: bool) -> &mut Self {
        self.writeback_results = writeback;
        self
    }

    pub fn set_cotrans(&mut self, cotrans: bool) -> &mut Self {
        self.cotrans = cotrans;
        self
    }

    pub fn set_cotrans_linker(&mut self, linker: &str) -> &mut Self {
        self.cotrans_linker = linker.to_string();
        self
    }

    pub fn set_cotrans_minimum_length(&mut self, length: usize) -> &mut Self {
        self.cotrans_minimum_length = length;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.masks.len() >= 2,
            "At least two masks (treated and untreated) are required"
        );
        for mask in &self.masks {
            nuc::normalize_degenerate(mask.as_bytes())
                .wrap_err_with(|| format!("Invalid mask: {mask}"))?;
        }
        ensure!(
            (1..=32).contains(&self.index_word_length),
            "index_word_length must be within 1..=32, got {}",
            self.index_word_length
        );
        ensure!(
            (self.index_word_length..=MAX_MATCH_LENGTH).contains(&self.minimum_target_match_length),
            "minimum_target_match_length must be within {}..={MAX_MATCH_LENGTH}, got {}",
            self.index_word_length,
            self.minimum_target_match_length
        );
        for (name, adapter) in [("adapter_t", &self.adapter_t), ("adapter_b", &self.adapter_b)] {
            nuc::normalize(adapter.as_bytes()).wrap_err_with(|| format!("Invalid {name}"))?;
        }
        ensure!(self.batch_size > 0, "batch_size must be positive");
        if self.cotrans {
            nuc::normalize(self.cotrans_linker.as_bytes()).wrap_err("Invalid cotrans_linker")?;
            ensure!(
                self.cotrans_minimum_length > 0,
                "cotrans_minimum_length must be positive"
            );
        }
        Ok(())
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let optional = |x: Option<String>| x.unwrap_or_else(|| "None".to_string());
        writeln!(f, "masks = {}", self.masks.join(","))?;
        writeln!(
            f,
            "minimum_target_match_length = {}",
            self.minimum_target_match_length
        )?;
        writeln!(f, "index_word_length = {}", self.index_word_length)?;
        writeln!(f, "adapter_t = {}", self.adapter_t)?;
        writeln!(f, "adapter_b = {}", self.adapter_b)?;
        writeln!(f, "allowed_adapter_errors = {}", self.allowed_adapter_errors)?;
        writeln!(f, "allowed_target_errors = {}", self.allowed_target_errors)?;
        writeln!(f, "allow_indeterminate = {}", self.allow_indeterminate)?;
        writeln!(
            f,
            "num_workers = {}",
            optional(self.num_workers.map(|x| x.to_string()))
        )?;
        writeln!(f, "count_edge_mutations = {}", self.count_edge_mutations)?;
        writeln!(f, "allow_multiple_rt_starts = {}", self.allow_multiple_rt_starts)?;
        writeln!(f, "minimum_adapter_len = {}", self.minimum_adapter_len)?;
        writeln!(
            f,
            "mutation_quality_threshold = {}",
            optional(self.mutation_quality_threshold.map(|x| x.to_string()))
        )?;
        writeln!(f, "batch_size = {}", self.batch_size)?;
        writeln!(f, "writeback_results = {}", self.writeback_results)?;
        writeln!(f, "cotrans = {}", self.cotrans)?;
        writeln!(f, "cotrans_linker = {}", self.cotrans_linker)?;
        writeln!(f, "cotrans_minimum_length = {}", self.cotrans_minimum_length)
    }
}

fn optional<T: FromStr>(value: &str) -> Result<Option<T>, T::Err> {
    match value {
        "None" | "" => Ok(None),
        value => value.parse().map(Some),
    }
}

impl FromStr for Config {
    type Err = Report;

    /// Parse `key = value` lines on top of the defaults. Blank lines and `#` comments are
    /// skipped, unknown keys are an error.
    fn from_str(s: &str) -> Result<Self> {
        let mut config = Config::default();
        for (lineno, line) in s.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| eyre!("Expected `key = value` at line {}: {line}", lineno + 1))?;
            let (key, value) = (key.trim(), value.trim());

            let parsed: Result<()> = (|| {
                match key {
                    "masks" => {
                        config.set_masks(value.split(',').map(str::trim));
                    }
                    "minimum_target_match_length" => {
                        config.minimum_target_match_length = value.parse()?
                    }
                    "index_word_length" => config.index_word_length = value.parse()?,
                    "adapter_t" => config.adapter_t = value.to_string(),
                    "adapter_b" => config.adapter_b = value.to_string(),
                    "allowed_adapter_errors" => config.allowed_adapter_errors = value.parse()?,
                    "allowed_target_errors" => config.allowed_target_errors = value.parse()?,
                    "allow_indeterminate" => config.allow_indeterminate = value.parse()?,
                    "num_workers" => config.num_workers = optional(value)?,
                    "count_edge_mutations" => config.count_edge_mutations = value.parse()?,
                    "allow_multiple_rt_starts" => {
                        config.allow_multiple_rt_starts = value.parse()?
                    }
                    "minimum_adapter_len" => config.minimum_adapter_len = value.parse()?,
                    "mutation_quality_threshold" => {
                        config.mutation_quality_threshold = optional(value)?
                    }
                    "batch_size" => config.batch_size = value.parse()?,
                    "writeback_results" => config.writeback_results = value.parse()?,
                    "cotrans" => config.cotrans = value.parse()?,
                    "cotrans_linker" => config.cotrans_linker = value.to_string(),
                    "cotrans_minimum_length" => config.cotrans_minimum_length = value.parse()?,
                    _ => return Err(eyre!("Unknown configuration key: {key}")),
                }
                Ok(())
            })();
            parsed.wrap_err_with(|| format!("Invalid value at line {}: {line}", lineno + 1))?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let config = Config::default();
        config.validate()?;
        assert_eq!(config.masks, ["RRRY", "YYYR"]);
        assert_eq!(config.count_edge_mutations, EdgeMutations::Discard);
        assert_eq!(config.minimum_target_match_length, 10);
        Ok(())
    }

    #[test]
    fn test_invalid_configs() {
        let mut invalid = Vec::new();
        invalid.push(Config::new().set_masks(["RRRY"]).clone());
        invalid.push(Config::new().set_masks(["RRRY", "YYXR"]).clone());
        invalid.push(Config::new().set_minimum_target_match_length(7).clone());
        invalid.push(Config::new().set_minimum_target_match_length(36).clone());
        invalid.push(Config::new().set_index_word_length(0).clone());
        invalid.push(Config::new().set_adapters("AGAT!", DEFAULT_ADAPTER_B).clone());
        invalid.push(Config::new().set_batch_size(0).clone());
        invalid.push(Config::new().set_cotrans(true).set_cotrans_linker("").clone());
        invalid.push(Config::new().set_cotrans(true).set_cotrans_linker("CTGA-C").clone());
        invalid.push(Config::new().set_cotrans(true).set_cotrans_minimum_length(0).clone());

        for config in invalid {
            assert!(config.validate().is_err(), "{config}");
        }
    }

    #[test]
    fn test_edge_mutations_from_str() -> Result<()> {
        for (value, expected) in [
            ("stop_and_mut", EdgeMutations::StopAndMut),
            ("stop_only", EdgeMutations::StopOnly),
            ("discard", EdgeMutations::Discard),
            ("None", EdgeMutations::Discard),
        ] {
            assert_eq!(value.parse::<EdgeMutations>()?, expected);
        }
        assert!("both".parse::<EdgeMutations>().is_err());
        Ok(())
    }

    #[test]
    fn test_text_roundtrip() -> Result<()> {
        let mut config = Config::new();
        config
            .set_masks(["RRRY", "YYYR", "NNNN"])
            .set_num_workers(Some(-2))
            .set_count_edge_mutations(EdgeMutations::StopOnly)
            .set_mutation_quality_threshold(Some(30))
            .set_allowed_target_errors(1)
            .set_cotrans(true)
            .set_cotrans_minimum_length(25);

        let parsed: Config = config.to_string().parse()?;
        assert_eq!(parsed, config);
        Ok(())
    }

    #[test]
    fn test_parse_partial_text() -> Result<()> {
        let text = "
            # Cotranscriptional run
            cotrans = true
            allow_multiple_rt_starts = true
            count_edge_mutations = stop_and_mut   # count everything
            num_workers = None
            minimum_target_match_length = 12
        ";
        let config: Config = text.parse()?;
        assert!(config.cotrans);
        assert_eq!(config.cotrans_linker, DEFAULT_COTRANS_LINKER);
        assert!(config.allow_multiple_rt_starts);
        assert_eq!(config.count_edge_mutations, EdgeMutations::StopAndMut);
        assert_eq!(config.num_workers, None);
        assert_eq!(config.minimum_target_match_length, 12);
        assert_eq!(config.adapter_b, DEFAULT_ADAPTER_B);

        for invalid in ["batch_size = many", "unknown = 1", "masks"] {
            assert!(invalid.parse::<Config>().is_err(), "{invalid}");
        }
        Ok(())
    }
}
