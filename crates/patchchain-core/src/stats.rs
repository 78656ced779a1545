//! Per-node solver statistics gathered from an attempt tree.
//!
//! Two sources feed the same record type:
//!
//! - `replace_<node>_cec.log` files anywhere under the tree, carrying the SAT
//!   solver counters and the wall time of the final SAT call;
//! - one summary log whose `UNSAT (rewritable):` section lists, per node, a
//!   header line followed by abstraction and patch size lines.
//!
//! Each scan returns its own map; [`merge`] combines them. Unreadable files
//! and lines that do not fit their grammar are skipped.

use crate::error::LogFormatError;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

pub const DEFAULT_THRESHOLD: f64 = 431.86;
pub const FAST_FACTOR: f64 = 1.1;
pub const SLOW_FACTOR: f64 = 0.9;

pub const SUMMARY_SECTION_MARKER: &str = "UNSAT (rewritable):";
/// Headers of the sections printed after the rewritable one; their node
/// lines share its grammar but are not rewritable.
const SECTION_END_MARKERS: [&str; 2] = ["SAT:", "Huge:"];

const LABEL_CONFLICTS: &str = "conflicts     :";
const LABEL_PROPAGATION: &str = "propagation";
const LABEL_DECISION: &str = "decision";
const LABEL_FINAL_SAT: &str = "Final SAT";
const LABEL_COST_THRESHOLD: &str = "costThreshold";
const LABEL_ABS_SIZE: &str = "absSize";
const LABEL_PATCH_SIZE: &str = "patchSize";

mod grammar {
    use super::*;

    /// `replace_<node>_cec.log`; the node id is the first `_` field.
    pub static ATTEMPT_LOG_NAME: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^replace_(?P<node>[^_]+)(?:_.*)?_cec\.log$")
            .expect("Invalid attempt log name regex")
    });

    /// `conflicts     : 120`, `propagations  : 5678`, ...
    pub static COUNTER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(?P<label>\S+)\s+:\s+(?P<value>-?\d+)(?:\s|$)")
            .expect("Invalid solver counter regex")
    });

    /// `Final SAT` followed by five tokens, then the elapsed seconds.
    pub static FINAL_SAT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^\s*Final\s+SAT(?:\s+\S+){5}\s+(?P<time>[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)(?:\s|$)",
        )
        .expect("Invalid final SAT regex")
    });

    /// `12 (34): color = 1, level = 3, conflict = 120, cost = ..., costThreshold = ...`
    pub static SUMMARY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(?P<node>\S+)\s+\((?P<abs>-?\d+)\):")
            .expect("Invalid summary header regex")
    });

    pub static HEADER_CONFLICT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\bconflict\s*=\s*(?P<value>-?\d+),").expect("Invalid header conflict regex")
    });

    pub static ABS_SIZE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\babsSize\s*=\s*(?P<size>-?\d+),\s*absHeight\s*=\s*(?P<height>-?\d+),")
            .expect("Invalid absSize regex")
    });

    pub static PATCH_SIZE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\bpatchSize\s*=\s*(?P<size>-?\d+),\s*patchHeight\s*=\s*(?P<height>-?\d+),")
            .expect("Invalid patchSize regex")
    });
}

/// Node identifier as printed by the tool. Integer ids sort numerically
/// ahead of anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverLogRecord {
    pub conflict: Option<i64>,
    pub propagation: Option<i64>,
    pub decision: Option<i64>,
    /// Seconds spent in the final SAT call.
    pub time: Option<f64>,
    pub abs_id: Option<i64>,
    pub abs_size: Option<i64>,
    pub abs_height: Option<i64>,
    pub patch_size: Option<i64>,
    pub patch_height: Option<i64>,
    /// Conflict count reported on the summary header line.
    pub p_conflict: Option<i64>,
}

impl SolverLogRecord {
    /// Fields set in `other` replace ours; unset fields leave ours alone.
    pub fn absorb(&mut self, other: &SolverLogRecord) {
        fn take<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.conflict, other.conflict);
        take(&mut self.propagation, other.propagation);
        take(&mut self.decision, other.decision);
        take(&mut self.time, other.time);
        take(&mut self.abs_id, other.abs_id);
        take(&mut self.abs_size, other.abs_size);
        take(&mut self.abs_height, other.abs_height);
        take(&mut self.patch_size, other.patch_size);
        take(&mut self.patch_height, other.patch_height);
        take(&mut self.p_conflict, other.p_conflict);
    }
}

pub type SolverStats = BTreeMap<NodeId, SolverLogRecord>;

pub fn attempt_log_node(file_name: &str) -> Option<NodeId> {
    grammar::ATTEMPT_LOG_NAME
        .captures(file_name)
        .map(|caps| NodeId::new(&caps["node"]))
}

fn parse_counter(line: &str, grammar_name: &'static str) -> Result<i64, LogFormatError> {
    grammar::COUNTER
        .captures(line)
        .and_then(|caps| caps["value"].parse::<i64>().ok())
        .ok_or_else(|| LogFormatError::new(grammar_name, line))
}

fn parse_final_sat(line: &str) -> Result<f64, LogFormatError> {
    grammar::FINAL_SAT
        .captures(line)
        .and_then(|caps| caps["time"].parse::<f64>().ok())
        .ok_or_else(|| LogFormatError::new("final SAT", line))
}

/// Parse the text of one per-node attempt log. Labels are independent, so a
/// single line may feed more than one field.
pub fn parse_attempt_log(text: &str) -> SolverLogRecord {
    let mut record = SolverLogRecord::default();
    for line in text.lines() {
        if line.contains(LABEL_CONFLICTS) {
            store_field(parse_counter(line, "conflicts"), &mut record.conflict);
        }
        if line.contains(LABEL_PROPAGATION) {
            store_field(parse_counter(line, "propagation"), &mut record.propagation);
        }
        if line.contains(LABEL_DECISION) {
            store_field(parse_counter(line, "decision"), &mut record.decision);
        }
        if line.contains(LABEL_FINAL_SAT) {
            store_field(parse_final_sat(line), &mut record.time);
        }
    }
    record
}

fn store_field<T>(parsed: Result<T, LogFormatError>, slot: &mut Option<T>) {
    match parsed {
        Ok(value) => *slot = Some(value),
        Err(err) => debug!("skipping attempt log line: {}", err),
    }
}

/// Walk `root` and collect every `replace_<node>_cec.log`. A later file for
/// the same node replaces the earlier one.
pub fn scan_solver_logs(root: &Path) -> SolverStats {
    let mut stats = SolverStats::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(node) = entry.file_name().to_str().and_then(attempt_log_node) else {
            continue;
        };
        let text = match fs::read(entry.path()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(err) => {
                debug!(path = %entry.path().display(), "unreadable attempt log: {}", err);
                continue;
            }
        };
        stats.insert(node, parse_attempt_log(&text));
    }
    stats
}

/// Parse the `UNSAT (rewritable):` section of a summary log. The section
/// ends at the `SAT:` or `Huge:` header.
pub fn parse_summary_log(text: &str) -> SolverStats {
    let mut stats = SolverStats::new();
    let mut in_section = false;
    let mut current: Option<NodeId> = None;

    for line in text.lines() {
        if !in_section {
            in_section = line.contains(SUMMARY_SECTION_MARKER);
            continue;
        }
        let trimmed = line.trim_start();
        if SECTION_END_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            in_section = false;
            current = None;
            continue;
        }

        let parsed = if line.contains(LABEL_COST_THRESHOLD) {
            parse_summary_header(line).map(|(node, record)| {
                stats.entry(node.clone()).or_default().absorb(&record);
                current = Some(node);
            })
        } else if line.contains(LABEL_ABS_SIZE) {
            parse_size_pair(line, &grammar::ABS_SIZE, "absSize").and_then(|(size, height)| {
                let record = current_record(&mut stats, current.as_ref(), line)?;
                record.abs_size = Some(size);
                record.abs_height = Some(height);
                Ok(())
            })
        } else if line.contains(LABEL_PATCH_SIZE) {
            parse_size_pair(line, &grammar::PATCH_SIZE, "patchSize").and_then(|(size, height)| {
                let record = current_record(&mut stats, current.as_ref(), line)?;
                record.patch_size = Some(size);
                record.patch_height = Some(height);
                Ok(())
            })
        } else {
            Ok(())
        };

        if let Err(err) = parsed {
            debug!("skipping summary line: {}", err);
        }
    }
    stats
}

fn parse_summary_header(line: &str) -> Result<(NodeId, SolverLogRecord), LogFormatError> {
    let caps = grammar::SUMMARY_HEADER
        .captures(line)
        .ok_or_else(|| LogFormatError::new("summary header", line))?;
    let abs_id = caps["abs"]
        .parse::<i64>()
        .map_err(|_| LogFormatError::new("summary header", line))?;
    let p_conflict = grammar::HEADER_CONFLICT
        .captures(line)
        .and_then(|c| c["value"].parse::<i64>().ok());
    let record = SolverLogRecord {
        abs_id: Some(abs_id),
        p_conflict,
        ..SolverLogRecord::default()
    };
    Ok((NodeId::new(&caps["node"]), record))
}

fn parse_size_pair(
    line: &str,
    pattern: &Regex,
    grammar_name: &'static str,
) -> Result<(i64, i64), LogFormatError> {
    pattern
        .captures(line)
        .and_then(|caps| {
            let size = caps["size"].parse::<i64>().ok()?;
            let height = caps["height"].parse::<i64>().ok()?;
            Some((size, height))
        })
        .ok_or_else(|| LogFormatError::new(grammar_name, line))
}

fn current_record<'a>(
    stats: &'a mut SolverStats,
    current: Option<&NodeId>,
    line: &str,
) -> Result<&'a mut SolverLogRecord, LogFormatError> {
    let node = current.ok_or_else(|| LogFormatError::new("size line outside a node", line))?;
    Ok(stats.entry(node.clone()).or_default())
}

/// Read and parse a summary log; a missing file yields no records.
pub fn scan_summary_log(path: &Path) -> SolverStats {
    match fs::read(path) {
        Ok(bytes) => parse_summary_log(&String::from_utf8_lossy(&bytes)),
        Err(err) => {
            debug!(path = %path.display(), "summary log unavailable: {}", err);
            SolverStats::new()
        }
    }
}

/// Union by node id. When both sides set a field, `b` wins.
pub fn merge(a: SolverStats, b: SolverStats) -> SolverStats {
    let mut merged = a;
    for (node, record) in b {
        merged.entry(node).or_default().absorb(&record);
    }
    merged
}

/// Nodes near the threshold on either side. The two lists overlap for times
/// within `(0.9 T, 1.1 T)`; nodes without a time are in neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThresholdBuckets {
    pub fast: Vec<NodeId>,
    pub slow: Vec<NodeId>,
}

impl ThresholdBuckets {
    /// One line per list, each id followed by a comma.
    pub fn render(&self) -> String {
        fn line(ids: &[NodeId]) -> String {
            ids.iter().map(|id| format!("{},", id)).collect()
        }
        format!("{}\n{}\n", line(&self.fast), line(&self.slow))
    }
}

pub fn classify(records: &SolverStats, threshold: f64) -> ThresholdBuckets {
    let fast_limit = threshold * FAST_FACTOR;
    let slow_limit = threshold * SLOW_FACTOR;
    let mut buckets = ThresholdBuckets::default();
    for (node, record) in records {
        let Some(time) = record.time else {
            continue;
        };
        if time < fast_limit {
            buckets.fast.push(node.clone());
        }
        if time > slow_limit {
            buckets.slow.push(node.clone());
        }
    }
    buckets
}
