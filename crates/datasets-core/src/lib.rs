//! Datasets core library: static and runtime accounting of the datasets a
//! pipeline script reads and produces.
//!
//! The analyzer recovers dataset usage requests and registration/save pairs
//! from script source without running it; the ledger records what a live run
//! actually touched. Checksums and product tokens identify the files a run
//! produces. With the `python` feature the crate also builds the
//! `_datasets_core` extension module via PyO3.

pub mod analyzer;
pub mod checksum;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod product;

#[cfg(feature = "python")]
mod python;

pub use checksum::{Hash, HashMethod};
pub use config::AnalyzerConfig;
pub use errors::{DatasetsError, DatasetsResult, StructuralError};
pub use ledger::{DatasetHandle, Ledger, ProducedRecord};
pub use product::Product;

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: _datasets_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _datasets_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register_module(m)
}
