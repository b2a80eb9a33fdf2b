//! Hosts file entry model
//!
//! A [`HostEntry`] is one (IP, hostname, comment) record plus the index of the
//! line it was loaded from. A data line that lists several hostnames becomes
//! several entries sharing the same IP, comment and source line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Separator placed between a managed entry and its comment on output
const COMMENT_SEPARATOR: &str = "    # ";

/// One hostname mapping in the hosts file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Zero-based index of the line this entry was loaded from.
    /// `None` for entries created after load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<usize>,
    /// Address literal, not validated
    pub ip: String,
    /// Hostname, the store key
    pub hostname: String,
    /// Inline comment without the leading `#`, empty if none
    #[serde(default)]
    pub comment: String,
}

impl HostEntry {
    /// Create an entry that does not originate from the file
    pub fn new(
        ip: impl Into<String>,
        hostname: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            source_line: None,
            ip: ip.into(),
            hostname: hostname.into(),
            comment: comment.into(),
        }
    }

    /// Create an entry from a typed address
    pub fn from_addr(ip: IpAddr, hostname: impl Into<String>, comment: impl Into<String>) -> Self {
        Self::new(ip.to_string(), hostname, comment)
    }

    /// Attach the source line index
    pub fn with_source_line(mut self, index: usize) -> Self {
        self.source_line = Some(index);
        self
    }

    /// Compare IP, hostname and comment, ignoring the source line
    pub fn same_record(&self, other: &HostEntry) -> bool {
        self.ip == other.ip && self.hostname == other.hostname && self.comment == other.comment
    }

    /// Whether the comment contains `marker`; an empty marker matches everything
    pub fn matches_filter(&self, marker: &str) -> bool {
        marker.is_empty() || self.comment.contains(marker)
    }

    /// Render the entry as a hosts file line, without terminator
    pub fn to_line(&self) -> String {
        if self.comment.is_empty() {
            format!("{} {}", self.ip, self.hostname)
        } else {
            format!(
                "{} {}{}{}",
                self.ip, self.hostname, COMMENT_SEPARATOR, self.comment
            )
        }
    }
}

impl fmt::Display for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_line {
            Some(line) => write!(
                f,
                "line:{}, ip:{}, hostname:{}, comment:{}",
                line, self.ip, self.hostname, self.comment
            ),
            None => write!(
                f,
                "line:new, ip:{}, hostname:{}, comment:{}",
                self.ip, self.hostname, self.comment
            ),
        }
    }
}

/// Collapse whitespace runs to single spaces and trim the ends
///
/// This is the form a comment takes after a write and re-parse, so only
/// normalized comments compare equal across cycles.
pub fn normalize_comment(comment: &str) -> String {
    comment.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check that `hostname` can be written to a hosts file
///
/// Basic RFC 1035 shape: at most 253 characters, non-empty labels of at most
/// 63 characters made of alphanumerics, hyphens and underscores, not starting
/// or ending with a hyphen.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        return Err(Error::invalid_input("Hostname cannot be empty"));
    }

    if hostname.len() > 253 {
        return Err(Error::invalid_input(format!(
            "Hostname too long: {} chars (max 253). Got: {}",
            hostname.len(),
            hostname
        )));
    }

    for label in hostname.split('.') {
        if label.is_empty() {
            return Err(Error::invalid_input(format!(
                "Hostname has empty label: '{}'",
                hostname
            )));
        }

        if label.len() > 63 {
            return Err(Error::invalid_input(format!(
                "Hostname label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::invalid_input(format!(
                "Hostname label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::invalid_input(format!(
                "Hostname label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}
