//! The `Hash` value and its `(filename@)?method:hexdigest` text encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{DatasetsError, DatasetsResult};

const FILENAME_SEPARATOR: char = '@';
const METHOD_SEPARATOR: char = ':';

/// A content checksum, optionally tied to the file it was computed from.
///
/// Equality is asymmetric in the filename: two hashes are equal when method
/// and digest match, and the filenames only have to agree when *both* sides
/// carry one. The relation is not transitive, so `Hash` implements
/// `PartialEq` only.
#[derive(Clone, Debug)]
pub struct Hash {
    method: String,
    hexdigest: String,
    filename: Option<String>,
}

fn is_method(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn is_hexdigest(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn check_filename(filename: &str) -> Result<(), String> {
    if filename.is_empty() {
        return Err("Filename cannot be empty".to_string());
    }
    if filename.contains(FILENAME_SEPARATOR) {
        return Err(format!("Filename cannot contain '@': '{filename}'"));
    }
    Ok(())
}

impl Hash {
    /// Build a hash, rejecting values that could not survive an
    /// encode/decode round trip.
    pub fn new(
        method: impl Into<String>,
        hexdigest: impl Into<String>,
        filename: Option<String>,
    ) -> DatasetsResult<Self> {
        let method = method.into();
        let hexdigest = hexdigest.into();

        if !is_method(&method) {
            return Err(DatasetsError::Validation(format!(
                "Hash method must match [A-Za-z0-9_]+, got '{method}'"
            )));
        }
        if !is_hexdigest(&hexdigest) {
            return Err(DatasetsError::Validation(format!(
                "Hex digest must be hexadecimal, got '{hexdigest}'"
            )));
        }
        if let Some(name) = &filename {
            check_filename(name).map_err(DatasetsError::Validation)?;
        }

        Ok(Self {
            method,
            hexdigest,
            filename,
        })
    }

    /// Digest output is lowercase hex and the filename has already been
    /// checked by the caller.
    pub(crate) fn from_parts(method: String, hexdigest: String, filename: Option<String>) -> Self {
        Self {
            method,
            hexdigest,
            filename,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn hexdigest(&self) -> &str {
        &self.hexdigest
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Render as `method:hexdigest`, prefixed with `filename@` when
    /// `include_filename` is set and a filename is known.
    pub fn encode(&self, include_filename: bool) -> String {
        let hash_part = format!("{}{METHOD_SEPARATOR}{}", self.method, self.hexdigest);
        match &self.filename {
            Some(filename) if include_filename => {
                format!("{filename}{FILENAME_SEPARATOR}{hash_part}")
            }
            _ => hash_part,
        }
    }

    /// Parse `(filename@)?method:hexdigest`.
    pub fn decode(text: &str) -> DatasetsResult<Self> {
        let (filename, hash_part) = match text.rsplit_once(FILENAME_SEPARATOR) {
            Some((left, right)) => {
                check_filename(left)
                    .map_err(|reason| DatasetsError::Format(format!("{reason} in '{text}'")))?;
                (Some(left.to_string()), right)
            }
            None => (None, text),
        };

        let (method, hexdigest) = hash_part.split_once(METHOD_SEPARATOR).ok_or_else(|| {
            DatasetsError::Format(format!("Missing ':' between method and digest in '{text}'"))
        })?;

        if !is_method(method) {
            return Err(DatasetsError::Format(format!(
                "Invalid hash method '{method}' in '{text}'"
            )));
        }
        if !is_hexdigest(hexdigest) {
            return Err(DatasetsError::Format(format!(
                "Invalid hex digest '{hexdigest}' in '{text}'"
            )));
        }

        Ok(Self {
            method: method.to_string(),
            hexdigest: hexdigest.to_string(),
            filename,
        })
    }
}

impl PartialEq for Hash {
    fn eq(&self, other: &Self) -> bool {
        let filename_eq = match (&self.filename, &other.filename) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        self.method == other.method && self.hexdigest == other.hexdigest && filename_eq
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode(true))
    }
}

impl FromStr for Hash {
    type Err = DatasetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(serde::de::Error::custom)
    }
}
