//! Pairs dataset registrations with the save call that persists them.
//!
//! A registration is a top-level assignment of the form
//!
//! ```text
//! symbol = Datasets.R<n>C<m>.register(filename=<literal or name>, ...)
//! ```
//!
//! and its save is any `symbol.<method>(...)` call anywhere in the script.
//! Each registered symbol must be saved exactly once.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analyzer::ast::{Node, NodeKind, Span};
use crate::config::AnalyzerConfig;
use crate::errors::StructuralError;

static DATASET_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^R\d+C\d+$").unwrap());

/// Whether `name` follows the `R<digits>C<digits>` dataset code convention.
pub fn is_dataset_code(name: &str) -> bool {
    DATASET_CODE_RE.is_match(name)
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Where a registration's output filename comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilenameRef {
    /// `filename='out.csv'`
    Literal(String),
    /// `filename=OUTPUT`; the variable is not resolved.
    Reference(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRegister {
    pub symbol: String,
    pub name: String,
    pub filename: FilenameRef,
    /// Position of the assignment in the top-level statement list.
    pub stmt_index: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetSave<'a> {
    pub symbol: String,
    pub call_site: &'a Node,
}

impl DatasetSave<'_> {
    pub fn span(&self) -> Span {
        self.call_site.span
    }

    /// Method invoked on the registered symbol, usually `save`.
    pub fn method(&self) -> &str {
        self.call_site
            .as_call()
            .and_then(|call| call.func.as_attribute())
            .map(|(_, attr)| attr)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorrelatedRegistration<'a> {
    pub symbol: String,
    pub registration: DatasetRegister,
    pub save: DatasetSave<'a>,
}

// ---------------------------------------------------------------------------
// Shape matching
// ---------------------------------------------------------------------------

/// Match one top-level statement against the registration shape.
fn parse_register(
    statement: &Node,
    stmt_index: usize,
    config: &AnalyzerConfig,
) -> Option<DatasetRegister> {
    let (targets, value) = statement.as_assign()?;
    let call = value.as_call()?;
    let (receiver, method) = call.func.as_attribute()?;
    let (root, name) = receiver.as_attribute()?;

    if root.as_name()? != config.sentinel
        || method != config.register_method
        || !is_dataset_code(name)
    {
        return None;
    }

    let Some(symbol) = targets.first().and_then(Node::as_name) else {
        debug!(stmt_index, "registration target is not a plain name, skipping");
        return None;
    };

    let filename = match call.keyword("filename").map(|node| &node.kind) {
        Some(NodeKind::Constant(constant)) => FilenameRef::Literal(constant.as_text()?),
        Some(NodeKind::Name(id)) => FilenameRef::Reference(id.clone()),
        _ => {
            debug!(
                stmt_index,
                symbol, "registration has no literal or named filename, skipping"
            );
            return None;
        }
    };

    Some(DatasetRegister {
        symbol: symbol.to_string(),
        name: name.to_string(),
        filename,
        stmt_index,
    })
}

/// Symbol a call is made on, if the callee is `<name>.<attr>`.
fn call_receiver(node: &Node) -> Option<&str> {
    let call = node.as_call()?;
    let (receiver, _) = call.func.as_attribute()?;
    receiver.as_name()
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// Correlate registrations and saves, configured from the environment.
pub fn correlate(tree: &Node) -> Result<Vec<CorrelatedRegistration<'_>>, StructuralError> {
    correlate_with(tree, &AnalyzerConfig::from_env())
}

/// Locate registrations in the top-level block of `tree` and pair each with
/// its single save call-site. Results follow save discovery order
/// (breadth-first), not statement order.
pub fn correlate_with<'a>(
    tree: &'a Node,
    config: &AnalyzerConfig,
) -> Result<Vec<CorrelatedRegistration<'a>>, StructuralError> {
    let indexed_assignments: Vec<(usize, &Node)> = tree
        .statements()
        .iter()
        .enumerate()
        .filter(|(_, statement)| statement.as_assign().is_some())
        .collect();

    if indexed_assignments.is_empty() {
        warn!("no assignment statements found");
        return Err(StructuralError::NoAssignmentsFound);
    }

    let registrations: Vec<DatasetRegister> = indexed_assignments
        .iter()
        .filter_map(|(i, statement)| parse_register(statement, *i, config))
        .collect();

    if registrations.is_empty() {
        let err = StructuralError::NoRegistrationsFound {
            assignments: indexed_assignments.len(),
        };
        warn!("{err}");
        return Err(err);
    }

    let mut by_symbol: HashMap<&str, &DatasetRegister> = HashMap::new();
    for registration in &registrations {
        if let Some(first) = by_symbol.insert(registration.symbol.as_str(), registration) {
            let err = StructuralError::DuplicateRegistration {
                symbol: registration.symbol.clone(),
                first: first.stmt_index,
                second: registration.stmt_index,
            };
            warn!("{err}");
            return Err(err);
        }
    }

    let saves: Vec<(&str, &Node)> = tree
        .walk()
        .filter_map(|node| {
            let symbol = call_receiver(node)?;
            by_symbol.contains_key(symbol).then_some((symbol, node))
        })
        .collect();

    if saves.is_empty() {
        let err = StructuralError::NoSavesFound {
            registrations: registrations.len(),
        };
        warn!("{err}");
        return Err(err);
    }

    if saves.len() != registrations.len() {
        let err = StructuralError::CardinalityMismatch {
            registrations: registrations.len(),
            saves: saves.len(),
        };
        warn!("{err}");
        return Err(err);
    }

    let mut save_counts: HashMap<&str, usize> = HashMap::new();
    for (symbol, _) in &saves {
        *save_counts.entry(*symbol).or_insert(0) += 1;
    }
    if let Some((symbol, count)) = save_counts.iter().find(|(_, count)| **count > 1) {
        let err = StructuralError::DuplicateSave {
            symbol: symbol.to_string(),
            saves: *count,
        };
        warn!("{err}");
        return Err(err);
    }

    let mut result = Vec::with_capacity(saves.len());
    for (symbol, call_site) in saves {
        let Some(registration) = by_symbol.get(symbol) else {
            continue;
        };
        result.push(CorrelatedRegistration {
            symbol: symbol.to_string(),
            registration: (*registration).clone(),
            save: DatasetSave {
                symbol: symbol.to_string(),
                call_site,
            },
        });
    }

    debug!(count = result.len(), "correlated dataset registrations");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ast::parse_module;

    const PROGRAM: &str = "
from argendata.datasets import Datasets
import pathlib

x = Datasets.R1C0.get(version='latest')

dataset = Datasets.R1C1.register(
    filename=FILENAME,
)

dataset.save(...)
";

    #[test]
    fn test_get_dataset_registrations() {
        let tree = parse_module(PROGRAM).unwrap();
        let registrations = correlate(&tree).unwrap();
        assert_eq!(registrations.len(), 1);

        let first = &registrations[0];
        assert_eq!(first.symbol, "dataset");
        assert_eq!(first.registration.name, "R1C1");
        assert_eq!(
            first.registration.filename,
            FilenameRef::Reference("FILENAME".to_string())
        );
        assert_eq!(first.registration.stmt_index, 3);
        assert_eq!(first.save.symbol, "dataset");
        assert_eq!(first.save.method(), "save");
        assert_eq!(first.save.span().line, 11);
    }

    #[test]
    fn test_literal_filename() {
        let source = "out = Datasets.R2C3.register(filename='out.csv', unit='pct')\nout.save(df)\n";
        let tree = parse_module(source).unwrap();
        let registrations = correlate(&tree).unwrap();
        assert_eq!(
            registrations[0].registration.filename,
            FilenameRef::Literal("out.csv".to_string())
        );
        assert_eq!(registrations[0].registration.stmt_index, 0);
    }

    #[test]
    fn test_result_follows_save_order() {
        let source = "
a = Datasets.R1C1.register(filename='a.csv')
b = Datasets.R1C2.register(filename='b.csv')
b.save(x)
a.save(y)
";
        let tree = parse_module(source).unwrap();
        let symbols: Vec<_> = correlate(&tree)
            .unwrap()
            .into_iter()
            .map(|r| (r.symbol, r.registration.stmt_index))
            .collect();
        assert_eq!(
            symbols,
            vec![("b".to_string(), 1), ("a".to_string(), 0)]
        );
    }

    #[test]
    fn test_save_inside_function() {
        let source = "
out = Datasets.R1C1.register(filename='a.csv')

def main():
    out.save(build())
";
        let tree = parse_module(source).unwrap();
        assert_eq!(correlate(&tree).unwrap().len(), 1);
    }

    #[test]
    fn test_no_assignments() {
        let tree = parse_module("import os\nprint(1)\n").unwrap();
        assert_eq!(
            correlate(&tree).unwrap_err(),
            StructuralError::NoAssignmentsFound
        );
    }

    #[test]
    fn test_no_registrations() {
        let tree = parse_module("x = Datasets.R1C0.get()\ny = 2\n").unwrap();
        assert_eq!(
            correlate(&tree).unwrap_err(),
            StructuralError::NoRegistrationsFound { assignments: 2 }
        );
    }

    #[test]
    fn test_shape_exclusions() {
        let source = "
a = Datasets.X1.register(filename='a.csv')
b = Datasets.R1C1.register(filename=path / 'b.csv')
c = Datasets.R1C2.register(name='c')
d = Datasets.R1C3.get(filename='d.csv')
e = Other.R1C4.register(filename='e.csv')
f = Datasets.R1C5.register(filename=None)
";
        let tree = parse_module(source).unwrap();
        assert_eq!(
            correlate(&tree).unwrap_err(),
            StructuralError::NoRegistrationsFound { assignments: 6 }
        );
    }

    #[test]
    fn test_no_saves() {
        let tree = parse_module("a = Datasets.R1C1.register(filename='a.csv')\n").unwrap();
        assert_eq!(
            correlate(&tree).unwrap_err(),
            StructuralError::NoSavesFound { registrations: 1 }
        );
    }

    #[test]
    fn test_cardinality_mismatch() {
        let source = "
a = Datasets.R1C1.register(filename='a.csv')
b = Datasets.R1C2.register(filename='b.csv')
a.save(x)
";
        let tree = parse_module(source).unwrap();
        assert_eq!(
            correlate(&tree).unwrap_err(),
            StructuralError::CardinalityMismatch {
                registrations: 2,
                saves: 1
            }
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let source = "
a = Datasets.R1C1.register(filename='a.csv')
a = Datasets.R1C2.register(filename='b.csv')
a.save(x)
a.save(y)
";
        let tree = parse_module(source).unwrap();
        assert_eq!(
            correlate(&tree).unwrap_err(),
            StructuralError::DuplicateRegistration {
                symbol: "a".to_string(),
                first: 0,
                second: 1
            }
        );
    }

    #[test]
    fn test_duplicate_save_with_matching_totals() {
        let source = "
a = Datasets.R1C1.register(filename='a.csv')
b = Datasets.R1C2.register(filename='b.csv')
a.save(x)
a.save(y)
";
        let tree = parse_module(source).unwrap();
        assert_eq!(
            correlate(&tree).unwrap_err(),
            StructuralError::DuplicateSave {
                symbol: "a".to_string(),
                saves: 2
            }
        );
    }

    #[test]
    fn test_is_dataset_code() {
        assert!(is_dataset_code("R1C0"));
        assert!(is_dataset_code("R12C345"));
        assert!(!is_dataset_code("R1C"));
        assert!(!is_dataset_code("r1c0"));
        assert!(!is_dataset_code("R1C0x"));
    }
}
