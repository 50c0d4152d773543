//! # Simulation input files
//!
//! Reads the plain-text `key = value` input deck handed to the simulation,
//! so the checker can recover run parameters such as the total beam charge.
//!
//! The syntax accepted is the common subset of AMReX ParmParse decks:
//! one assignment per line, `#` starts a comment, blank lines are
//! ignored, and a later assignment of the same key replaces the earlier
//! one.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Key holding the total physical charge of the injected beam
pub const DEFAULT_CHARGE_KEY: &str = "physical_q_tot";

/// Errors raised while reading an input deck
#[derive(Error, Debug)]
pub enum InputsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key is absent from the deck
    #[error("key `{0}` not found in inputs")]
    MissingKey(String),

    /// The value could not be parsed as a number
    #[error("value `{value}` of key `{key}` is not a number")]
    NotANumber { key: String, value: String },
}

/// Parsed `key = value` pairs
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    values: HashMap<String, String>,
}

impl Inputs {
    /// Read and parse an input deck from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, InputsError> {
        let text = fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "parsing inputs");
        Ok(Self::parse(&text))
    }

    /// Parse the text of an input deck. Lines without `=` are skipped.
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_string(), value.trim().to_string());
        }
        Self { values }
    }

    /// Raw value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value of a key parsed as a float.
    ///
    /// Only the first whitespace-separated token is used, so
    /// `q = -1.e-20 1.0` yields `-1e-20`.
    pub fn get_f64(&self, key: &str) -> Result<f64, InputsError> {
        let value = self
            .get(key)
            .ok_or_else(|| InputsError::MissingKey(key.to_string()))?;
        let token = value.split_whitespace().next().unwrap_or_default();
        token.parse::<f64>().map_err(|_| InputsError::NotANumber {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = "\
# beam injected from file
max_step = 2
beam.injection_style = external_file   # openPMD
physical_q_tot=-8.010883e-19

physical_q_tot = -1.602176634e-18
not an assignment
 = orphan
";

    #[test]
    fn parses_assignments_and_comments() {
        let inputs = Inputs::parse(DECK);
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs.get("max_step"), Some("2"));
        assert_eq!(inputs.get("beam.injection_style"), Some("external_file"));
        assert!(!inputs.contains("not an assignment"));
    }

    #[test]
    fn later_assignment_wins() {
        let inputs = Inputs::parse(DECK);
        let q = inputs.get_f64(DEFAULT_CHARGE_KEY).unwrap();
        assert_eq!(q, -1.602176634e-18);
    }

    #[test]
    fn missing_and_malformed_keys() {
        let inputs = Inputs::parse("a = b\nn = 3 4");
        assert!(matches!(
            inputs.get_f64("missing"),
            Err(InputsError::MissingKey(_))
        ));
        assert!(matches!(
            inputs.get_f64("a"),
            Err(InputsError::NotANumber { .. })
        ));
        assert_eq!(inputs.get_f64("n").unwrap(), 3.0);
    }

    #[test]
    fn empty_value_is_not_a_number() {
        let inputs = Inputs::parse("q =");
        assert!(matches!(
            inputs.get_f64("q"),
            Err(InputsError::NotANumber { .. })
        ));
    }
}
