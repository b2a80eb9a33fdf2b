//! Hosts file line parser
//!
//! Turns one raw line into the entries it declares, or classifies it as a
//! line that carries no entry. Non-entry lines are never owned by the store
//! and are replayed verbatim on rewrite.
//!
//! ```text
//! 10.0.0.5   vm1 vm1.lab   # managed by api
//! ^ip        ^hostnames    ^comment (marker field and everything after it)
//! ```

use crate::entry::HostEntry;
use thiserror::Error;

/// Why a line produced no entries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Blank or whitespace-only line
    #[error("empty line")]
    EmptyLine,

    /// Whole-line comment
    #[error("comment line")]
    CommentLine,

    /// Data line without at least an address and one hostname
    #[error("line {line}: malformed entry {content:?}")]
    MalformedLine {
        /// Zero-based line index
        line: usize,
        /// Trimmed line content
        content: String,
    },

    /// Line is not valid UTF-8
    #[error("line {line}: invalid UTF-8")]
    InvalidUtf8 {
        /// Zero-based line index
        line: usize,
    },
}

impl ParseError {
    /// Blank lines and whole-line comments are expected and not worth reporting
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::EmptyLine | Self::CommentLine)
    }
}

/// Parse one line of a hosts file
///
/// Every returned entry carries `index` as its source line, the line's
/// address and the line's comment.
pub fn parse_line(index: usize, line: &str) -> Result<Vec<HostEntry>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyLine);
    }
    if trimmed.starts_with('#') {
        return Err(ParseError::CommentLine);
    }

    let mut fields = trimmed.split_whitespace();
    // Non-empty after trim, so there is a first field and it is not a comment.
    let ip = fields.next().unwrap_or_default();

    let mut hostnames = Vec::new();
    let mut comment_fields = Vec::new();
    for field in fields.by_ref() {
        if let Some(rest) = field.strip_prefix('#') {
            let rest = rest.trim_start_matches('#');
            if !rest.is_empty() {
                comment_fields.push(rest);
            }
            break;
        }
        hostnames.push(field);
    }
    comment_fields.extend(fields);

    if hostnames.is_empty() {
        return Err(ParseError::MalformedLine {
            line: index,
            content: trimmed.to_string(),
        });
    }

    let comment = comment_fields.join(" ");
    Ok(hostnames
        .into_iter()
        .map(|hostname| HostEntry::new(ip, hostname, comment.clone()).with_source_line(index))
        .collect())
}

/// Parse one raw line given as bytes
///
/// Lines that are not valid UTF-8 are rejected so they survive rewrite untouched.
pub fn parse_raw_line(index: usize, raw: &[u8]) -> Result<Vec<HostEntry>, ParseError> {
    let line = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8 { line: index })?;
    parse_line(index, line)
}
