use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::PositionError;
use crate::hash::sha1_str;

/// Composite line key: `sha1(file_path)_old_line_new_line`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineCode {
    file_hash: String,
    pub old_line: u32,
    pub new_line: u32,
}

impl LineCode {
    pub fn new(file_path: &str, old_line: u32, new_line: u32) -> Self {
        Self {
            file_hash: sha1_str(file_path),
            old_line,
            new_line,
        }
    }

    pub fn file_hash(&self) -> &str {
        &self.file_hash
    }

    /// Whether this code was built from `file_path`.
    pub fn is_for_path(&self, file_path: &str) -> bool {
        self.file_hash == sha1_str(file_path)
    }
}

impl fmt::Display for LineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.file_hash, self.old_line, self.new_line)
    }
}

impl FromStr for LineCode {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PositionError::InvalidLineCode(s.to_string());
        let mut parts = s.rsplitn(3, '_');
        let new_line = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let old_line = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let file_hash = parts.next().ok_or_else(invalid)?;
        if file_hash.len() != 40 || !file_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        Ok(Self {
            file_hash: file_hash.to_ascii_lowercase(),
            old_line,
            new_line,
        })
    }
}

impl Serialize for LineCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
