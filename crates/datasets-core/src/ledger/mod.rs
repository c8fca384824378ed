//! Runtime ledger of datasets used and produced by a live script run.
//!
//! A session is opened explicitly and handed to whoever needs it; cloning a
//! [`Ledger`] yields another handle onto the same state. `used` only grows
//! (set union) and `produced` only grows (append), for the life of the
//! session.

pub mod dataset;
pub mod metadata;

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use dataset::DatasetHandle;
pub use metadata::MetadataClient;

/// Free-form metadata attached to a registration, in insertion order.
pub type Extra = IndexMap<String, serde_json::Value>;

/// One `register(...)` call, as observed at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProducedRecord {
    pub name: String,
    pub filename: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Default)]
struct LedgerState {
    used: BTreeSet<String>,
    produced: Vec<ProducedRecord>,
}

/// Shared handle onto one ledger session.
#[derive(Clone, Default)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,
}

impl Ledger {
    /// Start an empty session.
    pub fn open_session() -> Self {
        debug!("opened dataset ledger session");
        Self::default()
    }

    /// Proxy for the dataset called `name`.
    pub fn dataset(&self, name: impl Into<String>) -> DatasetHandle {
        DatasetHandle::new(name.into(), self.clone())
    }

    pub fn metadata(&self) -> MetadataClient {
        MetadataClient
    }

    /// Record that `uri` was read.
    pub fn uses(&self, uri: impl Into<String>) {
        let uri = uri.into();
        let inserted = self.state.lock().used.insert(uri.clone());
        if inserted {
            debug!(uri = %uri, "dataset used");
        }
    }

    /// Snapshot of every URI used so far.
    pub fn used(&self) -> BTreeSet<String> {
        self.state.lock().used.clone()
    }

    /// Snapshot of every registration so far, oldest first.
    pub fn produced(&self) -> Vec<ProducedRecord> {
        self.state.lock().produced.clone()
    }

    pub(crate) fn record_produced(&self, record: ProducedRecord) {
        self.state.lock().produced.push(record);
    }

    /// Whether two handles point at the same session.
    pub fn same_session(&self, other: &Ledger) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Ledger")
            .field("used", &state.used)
            .field("produced", &state.produced.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let ledger = Ledger::open_session();
        assert!(ledger.used().is_empty());
        assert!(ledger.produced().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let ledger = Ledger::open_session();
        let other = ledger.clone();
        other.uses("R1C0@latest");
        assert_eq!(ledger.used(), BTreeSet::from(["R1C0@latest".to_string()]));
        assert!(ledger.same_session(&other));
        assert!(!ledger.same_session(&Ledger::open_session()));
    }

    #[test]
    fn test_used_snapshot_is_frozen() {
        let ledger = Ledger::open_session();
        ledger.uses("R1C0");
        let snapshot = ledger.used();
        ledger.uses("R1C2");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(ledger.used().len(), 2);
    }

    #[test]
    fn test_concurrent_mutation_loses_nothing() {
        let ledger = Ledger::open_session();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let ledger = ledger.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        ledger.uses(format!("R{worker}C{i}"));
                        ledger
                            .dataset(format!("R{worker}C{i}"))
                            .register("out.csv", Extra::new());
                    }
                });
            }
        });
        assert_eq!(ledger.used().len(), 400);
        assert_eq!(ledger.produced().len(), 400);
    }

    #[test]
    fn test_produced_record_serializes_flat() {
        let mut extra = Extra::new();
        extra.insert("unit".to_string(), serde_json::json!("pct"));
        let record = ProducedRecord {
            name: "R1C1".to_string(),
            filename: "out.csv".to_string(),
            extra,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "R1C1", "filename": "out.csv", "unit": "pct"})
        );
    }
}
