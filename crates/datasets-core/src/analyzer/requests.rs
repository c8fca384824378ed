//! Static recovery of dataset usage requests.
//!
//! Finds every `Datasets.<NAME>.<method>(..., version=<literal>)` call in a
//! script. `register` calls declare outputs, not usages, and are skipped.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analyzer::ast::{parse_module, Node};
use crate::config::AnalyzerConfig;
use crate::errors::DatasetsResult;

/// One dataset usage found in a script.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Request {
    pub name: String,
    pub method: String,
    pub version: Option<String>,
}

impl Request {
    /// Dataset URI the call resolves to at runtime: `name` or `name@version`.
    pub fn uri(&self) -> String {
        match self.version.as_deref() {
            Some(version) if !version.is_empty() => format!("{}@{version}", self.name),
            _ => self.name.clone(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.uri(), self.method)
    }
}

/// Match a single node against the request shape.
pub fn parse_call(node: &Node, config: &AnalyzerConfig) -> Option<Request> {
    let call = node.as_call()?;
    let (receiver, method_name) = call.func.as_attribute()?;
    let (root, dataset_name) = receiver.as_attribute()?;
    if root.as_name()? != config.sentinel {
        return None;
    }
    if method_name == config.register_method {
        return None;
    }

    let version = call
        .keyword("version")
        .and_then(Node::as_constant)
        .and_then(|constant| constant.as_text());

    Some(Request {
        name: dataset_name.to_string(),
        method: method_name.to_string(),
        version,
    })
}

/// All usage requests in `tree`, configured from the environment.
pub fn extract_requests(tree: &Node) -> BTreeSet<Request> {
    extract_requests_with(tree, &AnalyzerConfig::from_env())
}

pub fn extract_requests_with(tree: &Node, config: &AnalyzerConfig) -> BTreeSet<Request> {
    tree.walk()
        .filter_map(|node| parse_call(node, config))
        .collect()
}

/// Parse `text` and return its usage requests.
///
/// Surrounding whitespace is stripped first so indented snippets parse.
pub fn get_datasets(text: &str) -> DatasetsResult<BTreeSet<Request>> {
    let tree = parse_module(text.trim())?;
    Ok(extract_requests(&tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, method: &str, version: Option<&str>) -> Request {
        Request {
            name: name.to_string(),
            method: method.to_string(),
            version: version.map(str::to_string),
        }
    }

    #[test]
    fn test_get_datasets_single_line() {
        let found = get_datasets("Datasets.R1C0.method(version='latest')").unwrap();
        assert_eq!(
            found,
            BTreeSet::from([request("R1C0", "method", Some("latest"))])
        );
    }

    #[test]
    fn test_get_datasets_multi_line() {
        let testcase = "
        (Datasets
            .R1C0
            .method(
            version='latest')
        )
        ";
        let found = get_datasets(testcase).unwrap();
        assert_eq!(
            found,
            BTreeSet::from([request("R1C0", "method", Some("latest"))])
        );
    }

    #[test]
    fn test_register_is_excluded() {
        let found = get_datasets("x = Datasets.R1C1.register(filename='out.csv')").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_missing_or_dynamic_version() {
        let source = "a = Datasets.R1C0.get()\nb = Datasets.R2C0.get(version=v)\n";
        let found = get_datasets(source).unwrap();
        assert_eq!(
            found,
            BTreeSet::from([request("R1C0", "get", None), request("R2C0", "get", None)])
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let source = "
Datasets.R1C0.get(version='v1')
Datasets.R1C0.get(version='v1')
Datasets.R1C0.get(version='v2')
Datasets.R1C0.download(to='.', version='v1')
";
        let found = get_datasets(source).unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_other_roots_ignored() {
        let source = "Other.R1C0.get()\nDatasets.get()\nobj.Datasets.R1C0.get()\nDatasets.R1C0()\n";
        assert!(get_datasets(source).unwrap().is_empty());
    }

    #[test]
    fn test_nested_calls_found() {
        let source = "
def main():
    for _ in range(2):
        df = load(Datasets.R3C4.get(version='2024'))
";
        let found = get_datasets(source).unwrap();
        assert_eq!(
            found,
            BTreeSet::from([request("R3C4", "get", Some("2024"))])
        );
    }

    #[test]
    fn test_custom_sentinel() {
        let tree = parse_module("DS.R1C0.get()").unwrap();
        let config = AnalyzerConfig {
            sentinel: "DS".to_string(),
            ..AnalyzerConfig::default()
        };
        assert_eq!(extract_requests_with(&tree, &config).len(), 1);
        assert!(extract_requests(&tree).is_empty());
    }

    #[test]
    fn test_uri() {
        assert_eq!(request("R1C0", "get", Some("latest")).uri(), "R1C0@latest");
        assert_eq!(request("R1C0", "get", None).uri(), "R1C0");
        assert_eq!(request("R1C0", "get", Some("")).uri(), "R1C0");
    }
}
