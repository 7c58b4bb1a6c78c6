//! Header comment parsing
//!
//! Scripts carry their launch settings in comment lines starting with the
//! `#pqr` marker. Two dialects exist, picked per line by whether the line
//! contains `=`:
//!
//! ```text
//! #pqr cat=Games; mac=/opt/homebrew/bin/python3; term=true; def=python3
//! #pqr cat "Games"
//! #pqr ubuntu "/usr/bin/python3"
//! #pqr terminal true
//! ```
//!
//! Marker lines may appear anywhere in the file. They are folded top to
//! bottom: each line overwrites only the fields it sets.

use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument};

use super::types::UNCATEGORIZED;
use crate::error::LauncherError;

/// Token that marks a metadata line
pub const MARKER: &str = "#pqr";

/// Metadata parsed from a script's marker lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHeader {
    pub category: String,
    pub interp_mac: String,
    pub interp_win: String,
    pub interp_linux: String,
    pub terminal: bool,
    pub interp_default: String,
}

impl Default for ScriptHeader {
    fn default() -> Self {
        ScriptHeader {
            category: UNCATEGORIZED.to_string(),
            interp_mac: String::new(),
            interp_win: String::new(),
            interp_linux: String::new(),
            terminal: false,
            interp_default: String::new(),
        }
    }
}

/// One classified marker line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerLine {
    /// `#pqr key=value; key=value`
    KeyValue(Vec<(String, String)>),
    /// `#pqr <keyword> "value"`
    Legacy(LegacyField),
}

/// The single field a legacy line sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyField {
    Category(String),
    Mac(String),
    Win(String),
    Ubuntu(String),
    /// `#pqr terminal ...` containing "true"
    TerminalOn,
    /// Keyword missing, value unquoted, or `terminal` without "true"
    NoChange,
}

impl ScriptHeader {
    /// Apply one marker line, overwriting only the fields it mentions
    pub fn apply(&mut self, line: &MarkerLine) {
        match line {
            MarkerLine::KeyValue(pairs) => {
                for (key, value) in pairs {
                    match key.to_lowercase().as_str() {
                        "cat" => self.category = value.clone(),
                        "mac" => self.interp_mac = value.clone(),
                        "win" => self.interp_win = value.clone(),
                        "linux" | "ubuntu" => self.interp_linux = value.clone(),
                        "term" => self.terminal = value.to_lowercase() == "true",
                        "def" => self.interp_default = value.clone(),
                        _ => {}
                    }
                }
            }
            MarkerLine::Legacy(field) => match field {
                LegacyField::Category(v) => self.category = v.clone(),
                LegacyField::Mac(v) => self.interp_mac = v.clone(),
                LegacyField::Win(v) => self.interp_win = v.clone(),
                LegacyField::Ubuntu(v) => self.interp_linux = v.clone(),
                LegacyField::TerminalOn => self.terminal = true,
                LegacyField::NoChange => {}
            },
        }
    }
}

/// Whether a raw line is a marker line
pub fn is_marker_line(line: &str) -> bool {
    line.trim().starts_with(MARKER)
}

/// Classify a raw line. Returns None for non-marker lines.
pub fn classify_marker_line(line: &str) -> Option<MarkerLine> {
    let trimmed = line.trim();
    if !trimmed.starts_with(MARKER) {
        return None;
    }
    if trimmed.contains('=') {
        Some(MarkerLine::KeyValue(parse_key_values(trimmed)))
    } else {
        Some(MarkerLine::Legacy(parse_legacy(trimmed)))
    }
}

/// `key=value` pairs separated by `;`. Splits on the first `=` only.
fn parse_key_values(trimmed: &str) -> Vec<(String, String)> {
    trimmed[MARKER.len()..]
        .trim()
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

static LEGACY_PATTERNS: LazyLock<[(&'static str, Regex); 4]> = LazyLock::new(|| {
    let pattern = |kw: &str| {
        Regex::new(&format!(r#"{}\s+{}\s+"([^"]+)""#, MARKER, kw))
            .expect("legacy header pattern is valid")
    };
    [
        ("cat", pattern("cat")),
        ("mac", pattern("mac")),
        ("win", pattern("win")),
        ("ubuntu", pattern("ubuntu")),
    ]
});

fn parse_legacy(trimmed: &str) -> LegacyField {
    for (keyword, regex) in LEGACY_PATTERNS.iter() {
        if !trimmed.starts_with(&format!("{} {}", MARKER, keyword)) {
            continue;
        }
        let Some(value) = regex
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return LegacyField::NoChange;
        };
        return match *keyword {
            "cat" => LegacyField::Category(value),
            "mac" => LegacyField::Mac(value),
            "win" => LegacyField::Win(value),
            _ => LegacyField::Ubuntu(value),
        };
    }

    if trimmed.starts_with(&format!("{} terminal", MARKER)) && trimmed.contains("true") {
        return LegacyField::TerminalOn;
    }
    LegacyField::NoChange
}

/// Parse header metadata from script text
pub fn parse_header_str(content: &str) -> ScriptHeader {
    content
        .lines()
        .filter_map(classify_marker_line)
        .fold(ScriptHeader::default(), |mut header, line| {
            header.apply(&line);
            header
        })
}

/// Read a script's text. Invalid UTF-8 is replaced rather than rejected.
pub fn read_header_source(path: &Path) -> Result<String, LauncherError> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| LauncherError::HeaderUnreadable {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })
}

/// Parse header metadata from a file. Never fails: unreadable files get defaults.
#[instrument(level = "trace", skip_all, fields(path = %path.display()))]
pub fn parse_header_file(path: &Path) -> ScriptHeader {
    match read_header_source(path) {
        Ok(content) => parse_header_str(&content),
        Err(e) => {
            debug!(error = %e, "Header unreadable, using defaults");
            ScriptHeader::default()
        }
    }
}
