//! Per-dataset proxy handed out by [`Ledger::dataset`].

use std::path::{Path, PathBuf};

use tracing::info;

use crate::ledger::{Extra, Ledger, ProducedRecord};

/// Accessors for one named dataset. Every read is recorded in the ledger's
/// `used` set; every `register` appends to its `produced` list.
#[derive(Clone, Debug)]
pub struct DatasetHandle {
    name: String,
    ledger: Ledger,
}

impl DatasetHandle {
    pub(crate) fn new(name: String, ledger: Ledger) -> Self {
        Self { name, ledger }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name` or `name@version`. An empty version counts as none.
    pub fn uri(&self, version: Option<&str>) -> String {
        match version {
            Some(v) if !v.is_empty() => format!("{}@{v}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Record that this dataset was read at `version` and return its URI.
    pub fn record_use(&self, version: Option<&str>) -> String {
        let uri = self.uri(version);
        self.ledger.uses(uri.clone());
        uri
    }

    /// Record the usage and return the URI as a placeholder.
    pub fn get(&self, version: Option<&str>) -> String {
        self.record_use(version)
    }

    /// Record the usage and hand the URI to `retrieve`.
    pub fn get_with<T, F>(&self, version: Option<&str>, retrieve: F) -> T
    where
        F: FnOnce(&str) -> T,
    {
        let uri = self.record_use(version);
        retrieve(&uri)
    }

    /// Record the usage and return `to/<uri>` as a placeholder path.
    pub fn download(&self, to: impl AsRef<Path>, version: Option<&str>) -> PathBuf {
        let uri = self.record_use(version);
        to.as_ref().join(uri)
    }

    /// Record the usage and hand `(uri, to)` to `download`.
    pub fn download_with<T, F>(&self, to: impl AsRef<Path>, version: Option<&str>, download: F) -> T
    where
        F: FnOnce(&str, &Path) -> T,
    {
        let uri = self.record_use(version);
        download(&uri, to.as_ref())
    }

    /// Declare that this run produces `filename` for this dataset.
    ///
    /// Repeated calls append repeated records. Returns `self` so a following
    /// `save` reads as part of the same declaration.
    pub fn register(&self, filename: impl Into<String>, extra: Extra) -> &Self {
        let filename = filename.into();
        info!(
            dataset = %self.name,
            filename = %filename,
            metadata = ?extra,
            "Registered dataset {} with filename {}",
            self.name,
            filename
        );
        self.ledger.record_produced(ProducedRecord {
            name: self.name.clone(),
            filename,
            extra,
        });
        self
    }

    /// Registrations recorded for this dataset name, oldest first.
    pub fn registrations(&self) -> Vec<ProducedRecord> {
        self.ledger
            .produced()
            .into_iter()
            .filter(|record| record.name == self.name)
            .collect()
    }

    /// Pass-through persistence hook without a writer.
    pub fn save<T>(&self, value: T) -> T {
        value
    }

    /// Persist `value` with `writer` and return its result.
    pub fn save_with<T, R, F>(&self, value: T, writer: F) -> R
    where
        F: FnOnce(T) -> R,
    {
        writer(value)
    }
}
