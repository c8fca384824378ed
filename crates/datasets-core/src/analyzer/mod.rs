//! Static analysis of pipeline scripts.

pub mod ast;
pub mod pipeline;
pub mod reconcile;
pub mod registrations;
pub mod requests;

pub use ast::{parse_module, Node, NodeKind, Span};
pub use pipeline::{analyze_source, analyze_tree, parallel_analyze, scan_scripts, ScriptAnalysis};
pub use reconcile::{reconcile, Reconciliation, RuntimeFacts, StaticFacts};
pub use registrations::{correlate, correlate_with, DatasetRegister, FilenameRef};
pub use requests::{extract_requests, extract_requests_with, get_datasets, Request};
