//! Content-addressed artifact identifiers: `code(hash)` or a bare hash.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::checksum::Hash;
use crate::errors::{DatasetsError, DatasetsResult};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once via LazyLock)
// ---------------------------------------------------------------------------

static CODIGO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// `code(` + bare hash + `)`; the inner text is validated by `Hash::decode`.
static PRODUCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+)\((.+)\)$").unwrap());

/// One produced artifact, optionally namespaced under a dataset code.
#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    codigo: Option<String>,
    checksum: Hash,
}

impl Product {
    pub fn new(codigo: Option<String>, checksum: Hash) -> DatasetsResult<Self> {
        if let Some(code) = &codigo {
            if !CODIGO_RE.is_match(code) {
                return Err(DatasetsError::Validation(format!(
                    "Product code must match [A-Za-z0-9_]+, got '{code}'"
                )));
            }
        }
        Ok(Self { codigo, checksum })
    }

    pub fn codigo(&self) -> Option<&str> {
        self.codigo.as_deref()
    }

    pub fn checksum(&self) -> &Hash {
        &self.checksum
    }

    pub fn encode(&self, include_filename: bool) -> String {
        let hash = self.checksum.encode(include_filename);
        match &self.codigo {
            Some(code) => format!("{code}({hash})"),
            None => hash,
        }
    }

    /// Parse a product token. The coded form is tried first, the bare hash
    /// form is the fallback.
    pub fn decode(text: &str) -> DatasetsResult<Self> {
        if let Some(caps) = PRODUCT_RE.captures(text) {
            if let Ok(checksum) = Hash::decode(&caps[2]) {
                return Ok(Self {
                    codigo: Some(caps[1].to_string()),
                    checksum,
                });
            }
        }

        Hash::decode(text)
            .map(|checksum| Self {
                codigo: None,
                checksum,
            })
            .map_err(|_| DatasetsError::Format(format!("Invalid product: {text}")))
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode(true))
    }
}

impl FromStr for Product {
    type Err = DatasetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Product {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Product {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(serde::de::Error::custom)
    }
}
