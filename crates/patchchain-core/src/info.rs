//! Step configuration records.
//!
//! Each step directory carries an `info.log` with one `key:value` pair per
//! line, plus a `_coef.log` derived from it that the rewriting tool reads.

use crate::error::{ChainError, ChainResult};
use std::fmt;

pub const KEY_CIRCUIT: &str = "ckt";
pub const KEY_PARTITION: &str = "partSyn";
pub const KEY_RESULT: &str = "Result";
pub const KEY_BUDGET: &str = "C";
pub const KEY_BASE_COMMAND: &str = "basicCmd";

const REQUIRED_KEYS: [&str; 5] = [
    KEY_CIRCUIT,
    KEY_PARTITION,
    KEY_RESULT,
    KEY_BUDGET,
    KEY_BASE_COMMAND,
];

/// Leading value of every coefficient file; selects the tool's rewriting mode.
pub const COEFFICIENT_MODE: i32 = -7;

/// Which of the two circuits a step rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Circuit {
    First,
    Second,
}

impl Circuit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Circuit::First => "1",
            Circuit::Second => "2",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Circuit::First => Circuit::Second,
            Circuit::Second => Circuit::First,
        }
    }

    fn parse(raw: &str) -> ChainResult<Self> {
        match raw.trim() {
            "1" => Ok(Circuit::First),
            "2" => Ok(Circuit::Second),
            other => Err(ChainError::MalformedRecord(format!(
                "'{}' must be 1 or 2, got '{}'",
                KEY_CIRCUIT, other
            ))),
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRecord {
    pub circuit: Circuit,
    /// Partition-synthesis method id, passed through to the tool untouched.
    pub partition: String,
    /// Path of the circuit artifact this step produces.
    pub result: String,
    /// Conflict budget handed to the tool via `-C`.
    pub budget: u32,
    pub base_command: String,
    /// Keys outside the required set, in file order.
    pub extra: Vec<(String, String)>,
}

impl InfoRecord {
    pub fn parse(text: &str) -> ChainResult<Self> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                ChainError::MalformedRecord(format!(
                    "line {} has no ':' separator: '{}'",
                    index + 1,
                    line
                ))
            })?;
            match pairs.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.to_string(),
                None => pairs.push((key.to_string(), value.to_string())),
            }
        }

        let mut take = |key: &str| -> ChainResult<String> {
            let position = pairs
                .iter()
                .position(|(k, _)| k == key)
                .ok_or_else(|| ChainError::MalformedRecord(format!("missing key '{}'", key)))?;
            Ok(pairs.remove(position).1)
        };

        let circuit = Circuit::parse(&take(KEY_CIRCUIT)?)?;
        let partition = take(KEY_PARTITION)?;
        let result = take(KEY_RESULT)?;
        let raw_budget = take(KEY_BUDGET)?;
        let base_command = take(KEY_BASE_COMMAND)?;

        let budget = raw_budget
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                ChainError::MalformedRecord(format!(
                    "'{}' must be a positive integer, got '{}'",
                    KEY_BUDGET, raw_budget
                ))
            })?;

        Ok(Self {
            circuit,
            partition,
            result,
            budget,
            base_command,
            extra: pairs,
        })
    }

    /// Renders the required fields in fixed order, then the extras. Fails on
    /// values that could not be read back: a line break anywhere, a `:` in an
    /// extra key, or the same extra key twice. Extras named like a required
    /// key are dropped since `parse` never produces them.
    pub fn serialize(&self) -> ChainResult<String> {
        let mut out = String::new();
        let budget = self.budget.to_string();
        let fields = [
            (KEY_CIRCUIT, self.circuit.as_str()),
            (KEY_PARTITION, self.partition.as_str()),
            (KEY_RESULT, self.result.as_str()),
            (KEY_BUDGET, budget.as_str()),
            (KEY_BASE_COMMAND, self.base_command.as_str()),
        ];
        for (key, value) in fields {
            push_line(&mut out, key, value)?;
        }
        for (index, (key, value)) in self.extra.iter().enumerate() {
            if REQUIRED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if key.contains(':') {
                return Err(ChainError::MalformedRecord(format!(
                    "extra key '{}' contains ':'",
                    key
                )));
            }
            if self.extra[..index].iter().any(|(k, _)| k == key) {
                return Err(ChainError::MalformedRecord(format!(
                    "extra key '{}' appears twice",
                    key
                )));
            }
            push_line(&mut out, key, value)?;
        }
        Ok(out)
    }

    pub fn coefficients(&self) -> CoefficientFile {
        CoefficientFile::derive(self.circuit, &self.partition)
    }
}

fn push_line(out: &mut String, key: &str, value: &str) -> ChainResult<()> {
    if key.contains(['\n', '\r']) || value.contains(['\n', '\r']) {
        return Err(ChainError::MalformedRecord(format!(
            "'{}' contains a line break",
            key.trim()
        )));
    }
    out.push_str(key);
    out.push(':');
    out.push_str(value);
    out.push('\n');
    Ok(())
}

/// Weights read by the tool's `-F` option: the mode constant, the circuit
/// selector, then the partition method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientFile {
    values: Vec<String>,
}

impl CoefficientFile {
    pub fn derive(circuit: Circuit, partition: &str) -> Self {
        Self {
            values: vec![
                COEFFICIENT_MODE.to_string(),
                circuit.as_str().to_string(),
                partition.to_string(),
            ],
        }
    }

    pub fn render(&self) -> String {
        format!("{}\n", self.values.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InfoRecord {
        InfoRecord {
            circuit: Circuit::Second,
            partition: "3".to_string(),
            result: "/runs/a/0/final.aig".to_string(),
            budget: 1500,
            base_command: "-g -G 5 -a".to_string(),
            extra: Vec::new(),
        }
    }

    #[test]
    fn serialize_uses_fixed_field_order() {
        assert_eq!(
            sample().serialize().unwrap(),
            "ckt:2\npartSyn:3\nResult:/runs/a/0/final.aig\nC:1500\nbasicCmd:-g -G 5 -a\n"
        );
    }

    fn round_trip(record: &InfoRecord) -> InfoRecord {
        InfoRecord::parse(&record.serialize().unwrap()).unwrap()
    }

    #[test]
    fn parse_round_trips_serialized_records() {
        let mut record = sample();
        record.base_command = "-x key:value -y".to_string();
        record.extra.push(("note".to_string(), "seeded by hand".to_string()));
        assert_eq!(round_trip(&record), record);
    }

    #[test]
    fn round_trip_keeps_empty_values_and_colons() {
        let record = InfoRecord {
            circuit: Circuit::First,
            partition: String::new(),
            result: "C:/runs/a/1/final.aig".to_string(),
            budget: 1,
            base_command: String::new(),
            extra: vec![
                ("host".to_string(), "node-3:8080".to_string()),
                ("empty".to_string(), String::new()),
                ("seed".to_string(), "::".to_string()),
                ("note".to_string(), " padded ".to_string()),
            ],
        };
        assert_eq!(round_trip(&record), record);
    }

    #[test]
    fn serialize_rejects_unreadable_extras() {
        let mut colon_key = sample();
        colon_key.extra.push(("a:b".to_string(), "v".to_string()));
        assert!(matches!(
            colon_key.serialize(),
            Err(ChainError::MalformedRecord(ref msg)) if msg.contains("a:b")
        ));

        let mut multiline = sample();
        multiline.extra.push(("note".to_string(), "one\ntwo".to_string()));
        assert!(multiline.serialize().is_err());

        let mut twice = sample();
        twice.extra.push(("note".to_string(), "1".to_string()));
        twice.extra.push(("note".to_string(), "2".to_string()));
        assert!(twice.serialize().is_err());

        let mut broken_command = sample();
        broken_command.base_command = "-a\r\n-b".to_string();
        assert!(broken_command.serialize().is_err());
    }

    #[test]
    fn parse_accepts_any_key_order_and_crlf() {
        let text = "C:200\r\nbasicCmd:-v\r\n\r\nResult:r.aig\r\nckt:1\r\npartSyn:0\r\n";
        let parsed = InfoRecord::parse(text).unwrap();
        assert_eq!(parsed.circuit, Circuit::First);
        assert_eq!(parsed.budget, 200);
        assert_eq!(parsed.base_command, "-v");
        assert_eq!(parsed.result, "r.aig");
    }

    #[test]
    fn parse_rejects_missing_required_key() {
        let text = "ckt:1\npartSyn:0\nResult:r.aig\nbasicCmd:-v\n";
        let err = InfoRecord::parse(text).unwrap_err();
        assert!(matches!(err, ChainError::MalformedRecord(ref msg) if msg.contains("'C'")));
    }

    #[test]
    fn parse_rejects_line_without_separator() {
        let text = "ckt:1\npartSyn 0\n";
        assert!(matches!(
            InfoRecord::parse(text),
            Err(ChainError::MalformedRecord(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_selector_and_budget() {
        let bad_ckt = "ckt:3\npartSyn:0\nResult:r\nC:10\nbasicCmd:\n";
        assert!(InfoRecord::parse(bad_ckt).is_err());
        let zero_budget = "ckt:1\npartSyn:0\nResult:r\nC:0\nbasicCmd:\n";
        assert!(InfoRecord::parse(zero_budget).is_err());
    }

    #[test]
    fn coefficients_lead_with_mode_constant() {
        assert_eq!(sample().coefficients().render(), "-7,2,3\n");
        assert_eq!(Circuit::First.flipped(), Circuit::Second);
    }
}
