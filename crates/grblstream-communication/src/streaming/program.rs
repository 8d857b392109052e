//! G-code program loading
//!
//! A program is the ordered list of lines that will actually be sent:
//! each source line is trimmed, and blank lines and `;` comment lines are
//! dropped. Nothing else is interpreted.

use grblstream_core::GcodeError;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Prefix of a full-line comment
pub const COMMENT_PREFIX: char = ';';

const UTF8_BOM: char = '\u{feff}';

/// Immutable sequence of sendable G-code lines
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GcodeProgram {
    lines: Vec<String>,
}

impl GcodeProgram {
    /// Keep the sendable lines of `source`, in order. May be empty.
    pub fn from_lines<I, S>(source: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = source
            .into_iter()
            .filter_map(|line| {
                let line = line.as_ref().trim_start_matches(UTF8_BOM).trim();
                if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
                    None
                } else {
                    Some(line.to_string())
                }
            })
            .collect();
        Self { lines }
    }

    /// Read a program from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, GcodeError> {
        let mut lines = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line.map_err(|e| GcodeError::FileError {
                reason: e.to_string(),
            })?;
            lines.push(line);
        }
        Self::non_empty(Self::from_lines(lines))
    }

    /// Load a program from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GcodeError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| GcodeError::FileError {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let program = Self::from_reader(file)?;
        tracing::info!("Loaded {} lines from {}", program.len(), path.display());
        Ok(program)
    }

    fn non_empty(program: Self) -> Result<Self, GcodeError> {
        if program.is_empty() {
            Err(GcodeError::Empty)
        } else {
            Ok(program)
        }
    }

    /// All lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check for an empty program
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Iterate lines in send order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

impl FromStr for GcodeProgram {
    type Err = GcodeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::non_empty(Self::from_lines(text.lines()))
    }
}
