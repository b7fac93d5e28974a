//! Append-only battle log
//!
//! Every entry is kept in memory for renderers and summaries. Entries can
//! also be echoed to stdout as they are written, filtered by verbosity and
//! printed as text or one JSON object per line.

use crate::core::Slot;
use serde::{Deserialize, Serialize};

/// How much of the log is echoed to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum VerbosityLevel {
    /// Nothing is printed
    Silent = 0,
    /// Opening, defeat and victory only
    Minimal = 1,
    /// Every resolved action and narration (default)
    #[default]
    Normal = 2,
    /// Also engine bookkeeping (resets, turn changes)
    Verbose = 3,
}

/// Output format for echoed entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Where entries go besides the in-memory log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputMode {
    /// Keep entries in memory only (default)
    #[default]
    Memory,
    /// Keep in memory and echo to stdout
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Opening,
    Hit,
    Miss,
    Heal,
    Defeat,
    Narrative,
    Victory,
    System,
}

impl LogKind {
    /// Verbosity at which this kind of entry is echoed
    pub fn level(self) -> VerbosityLevel {
        match self {
            LogKind::Opening | LogKind::Defeat | LogKind::Victory => VerbosityLevel::Minimal,
            LogKind::Hit | LogKind::Miss | LogKind::Heal | LogKind::Narrative => {
                VerbosityLevel::Normal
            }
            LogKind::System => VerbosityLevel::Verbose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log, starting at 0
    pub sequence: u64,
    pub kind: LogKind,
    /// Slot the entry is attributed to, if any
    pub actor: Option<Slot>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct BattleLog {
    entries: Vec<LogEntry>,
    verbosity: VerbosityLevel,
    output_format: OutputFormat,
    output_mode: OutputMode,
}

impl BattleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that echoes to stdout at the given verbosity
    pub fn with_verbosity(verbosity: VerbosityLevel) -> Self {
        BattleLog {
            entries: Vec::new(),
            verbosity,
            output_format: OutputFormat::default(),
            output_mode: OutputMode::Both,
        }
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    pub fn set_verbosity(&mut self, verbosity: VerbosityLevel) {
        self.verbosity = verbosity;
    }

    /// Append an entry and return its sequence number
    pub fn push(&mut self, kind: LogKind, actor: Option<Slot>, message: impl Into<String>) -> u64 {
        let entry = LogEntry {
            sequence: self.entries.len() as u64,
            kind,
            actor,
            message: message.into(),
        };
        let sequence = entry.sequence;
        if self.output_mode == OutputMode::Both && kind.level() <= self.verbosity {
            self.echo(&entry);
        }
        self.entries.push(entry);
        sequence
    }

    fn echo(&self, entry: &LogEntry) {
        match self.output_format {
            OutputFormat::Text => {
                if entry.kind.level() == VerbosityLevel::Minimal {
                    println!("{}", entry.message);
                } else {
                    println!("  {}", entry.message);
                }
            }
            OutputFormat::Json => match serde_json::to_string(entry) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(error = %err, "failed to encode log entry"),
            },
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one kind
    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Messages only, in order
    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.message.as_str()).collect()
    }

    /// Drop every entry (battle reset only)
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Print the last `tail` entries, noting how many were skipped
    pub fn print_tail(&self, tail: usize) {
        let elided = self.entries.len().saturating_sub(tail);
        if elided > 0 {
            println!(">>> {elided} LOG LINES ELIDED. PRINTING LAST {tail} LINES <<<");
        }
        for entry in self.entries.iter().skip(elided) {
            println!("{}", entry.message);
        }
    }
}
