//! Dataset metadata lookups.

use crate::ledger::Extra;

/// Entry point for `Datasets.metadata`-style lookups. The lookup itself is
/// supplied by the caller; without one the result is empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataClient;

impl MetadataClient {
    pub fn get(&self, _fields: &[&str]) -> Extra {
        Extra::new()
    }

    pub fn get_with<F>(&self, fields: &[&str], by: F) -> Extra
    where
        F: FnOnce(&[&str]) -> Extra,
    {
        by(fields)
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::Ledger;

    #[test]
    fn test_get_without_lookup_is_empty() {
        let ledger = Ledger::open_session();
        assert!(ledger.metadata().get(&["unit", "source"]).is_empty());
    }

    #[test]
    fn test_get_with_lookup() {
        let ledger = Ledger::open_session();
        let meta = ledger.metadata().get_with(&["unit"], |fields| {
            fields
                .iter()
                .map(|f| (f.to_string(), serde_json::json!("pct")))
                .collect()
        });
        assert_eq!(meta["unit"], serde_json::json!("pct"));
        assert!(ledger.used().is_empty());
    }
}
