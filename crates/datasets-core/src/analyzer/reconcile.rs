//! Cross-check of a script's static facts against a ledger snapshot.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::analyzer::registrations::{DatasetRegister, FilenameRef};
use crate::analyzer::requests::Request;
use crate::ledger::{Ledger, ProducedRecord};

/// Request methods that reach the ledger's `used` set when executed.
pub const RUNTIME_READ_METHODS: &[&str] = &["get", "download"];

/// What static analysis says a script reads and writes.
#[derive(Clone, Debug, Default)]
pub struct StaticFacts {
    pub requests: BTreeSet<Request>,
    pub registrations: Vec<DatasetRegister>,
}

/// What a live run actually read and wrote.
#[derive(Clone, Debug, Default)]
pub struct RuntimeFacts {
    pub used: BTreeSet<String>,
    pub produced: Vec<ProducedRecord>,
}

impl RuntimeFacts {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        Self {
            used: ledger.used(),
            produced: ledger.produced(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    /// URIs read at runtime that no static request accounts for.
    pub undeclared_uses: Vec<String>,
    /// Static read requests never observed at runtime.
    pub unused_requests: Vec<Request>,
    /// Runtime registrations with no matching static registration.
    pub unregistered_products: Vec<ProducedRecord>,
    /// Static registrations never executed.
    pub unproduced_registrations: Vec<DatasetRegister>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.undeclared_uses.is_empty()
            && self.unused_requests.is_empty()
            && self.unregistered_products.is_empty()
            && self.unproduced_registrations.is_empty()
    }
}

fn uri_name(uri: &str) -> &str {
    uri.split_once('@').map_or(uri, |(name, _)| name)
}

/// A request without a literal version accepts any version of its dataset.
fn request_covers(request: &Request, uri: &str) -> bool {
    match request.version.as_deref() {
        Some(v) if !v.is_empty() => request.uri() == uri,
        _ => request.name == uri_name(uri),
    }
}

fn registration_covers(registration: &DatasetRegister, record: &ProducedRecord) -> bool {
    if registration.name != record.name {
        return false;
    }
    match &registration.filename {
        FilenameRef::Literal(filename) => *filename == record.filename,
        FilenameRef::Reference(_) => true,
    }
}

pub fn reconcile(static_facts: &StaticFacts, runtime: &RuntimeFacts) -> Reconciliation {
    let reads: Vec<&Request> = static_facts
        .requests
        .iter()
        .filter(|r| RUNTIME_READ_METHODS.contains(&r.method.as_str()))
        .collect();

    let undeclared_uses = runtime
        .used
        .iter()
        .filter(|uri| !reads.iter().any(|r| request_covers(r, uri)))
        .cloned()
        .collect();

    let unused_requests = reads
        .iter()
        .filter(|r| !runtime.used.iter().any(|uri| request_covers(r, uri)))
        .map(|r| (*r).clone())
        .collect();

    let unregistered_products = runtime
        .produced
        .iter()
        .filter(|record| {
            !static_facts
                .registrations
                .iter()
                .any(|reg| registration_covers(reg, record))
        })
        .cloned()
        .collect();

    let unproduced_registrations = static_facts
        .registrations
        .iter()
        .filter(|reg| {
            !runtime
                .produced
                .iter()
                .any(|record| registration_covers(reg, record))
        })
        .cloned()
        .collect();

    Reconciliation {
        undeclared_uses,
        unused_requests,
        unregistered_products,
        unproduced_registrations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ast::parse_module;
    use crate::analyzer::registrations::correlate;
    use crate::analyzer::requests::extract_requests;
    use crate::ledger::Extra;

    const SCRIPT: &str = "
src = Datasets.R1C0.get(version='latest')
extra = Datasets.R2C0.get()
out = Datasets.R1C1.register(filename='out.csv')
out.save(src)
";

    fn static_facts() -> StaticFacts {
        let tree = parse_module(SCRIPT).unwrap();
        StaticFacts {
            requests: extract_requests(&tree),
            registrations: correlate(&tree)
                .unwrap()
                .into_iter()
                .map(|c| c.registration)
                .collect(),
        }
    }

    #[test]
    fn test_matching_run_is_clean() {
        let ledger = Ledger::open_session();
        ledger.dataset("R1C0").get(Some("latest"));
        ledger.dataset("R2C0").get(Some("2023"));
        ledger.dataset("R1C1").register("out.csv", Extra::new());

        let report = reconcile(&static_facts(), &RuntimeFacts::from_ledger(&ledger));
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn test_mismatches_are_reported() {
        let ledger = Ledger::open_session();
        ledger.dataset("R1C0").get(Some("v2"));
        ledger.dataset("R9C9").download(".", None);
        ledger.dataset("R1C1").register("other.csv", Extra::new());

        let report = reconcile(&static_facts(), &RuntimeFacts::from_ledger(&ledger));
        assert_eq!(report.undeclared_uses, vec!["R1C0@v2", "R9C9"]);

        let unused: Vec<_> = report.unused_requests.iter().map(Request::uri).collect();
        assert_eq!(unused, vec!["R1C0@latest", "R2C0"]);

        assert_eq!(report.unregistered_products.len(), 1);
        assert_eq!(report.unregistered_products[0].filename, "other.csv");
        assert_eq!(report.unproduced_registrations.len(), 1);
        assert_eq!(report.unproduced_registrations[0].name, "R1C1");
    }

    #[test]
    fn test_non_read_methods_not_expected_at_runtime() {
        let tree = parse_module("Datasets.R1C0.describe()").unwrap();
        let facts = StaticFacts {
            requests: extract_requests(&tree),
            registrations: Vec::new(),
        };
        let report = reconcile(&facts, &RuntimeFacts::default());
        assert!(report.is_clean());
    }
}
