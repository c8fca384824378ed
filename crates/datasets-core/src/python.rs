//! Python extension surface (`_datasets_core`).

use std::collections::BTreeSet;

use parking_lot::Mutex;
use pyo3::exceptions::PyAttributeError;
use pyo3::prelude::*;
use pyo3::sync::GILOnceCell;
use pyo3::types::{PyDict, PyFrozenSet, PyList, PyString, PyTuple};

use crate::analyzer::ast::parse_module;
use crate::analyzer::registrations::{correlate, FilenameRef};
use crate::analyzer::requests;
use crate::errors::DatasetsError;
use crate::ledger::{DatasetHandle, Extra, Ledger, MetadataClient};
use crate::product::Product;

/// The process-wide client: `Datasets`, and what every `Client()` returns.
static DATASETS: GILOnceCell<Py<Client>> = GILOnceCell::new();

fn datasets(py: Python<'_>) -> PyResult<&Py<Client>> {
    DATASETS.get_or_try_init(py, || {
        Py::new(
            py,
            Client {
                ledger: Ledger::open_session(),
                produced: Mutex::new(Vec::new()),
            },
        )
    })
}

fn json_loads<'py>(py: Python<'py>, text: &str) -> PyResult<Bound<'py, PyAny>> {
    py.import("json")?.call_method1("loads", (text,))
}

/// JSON view of registration extras for the ledger. Values JSON cannot
/// represent are stored as their `str()`.
fn extra_to_json(py: Python<'_>, extra: Option<&Bound<'_, PyDict>>) -> PyResult<Extra> {
    match extra {
        Some(extra) if !extra.is_empty() => {
            let kwargs = PyDict::new(py);
            kwargs.set_item("default", py.import("builtins")?.getattr("str")?)?;
            let dumped = py
                .import("json")?
                .call_method("dumps", (extra,), Some(&kwargs))?;
            let extra = serde_json::from_str(&dumped.extract::<String>()?)
                .map_err(DatasetsError::from)?;
            Ok(extra)
        }
        _ => Ok(Extra::new()),
    }
}

// ---------------------------------------------------------------------------
// Static analysis
// ---------------------------------------------------------------------------

/// Usage requests in `text` as a set of `(name, method, version)` tuples.
#[pyfunction]
pub fn get_datasets(text: &str) -> PyResult<BTreeSet<(String, String, Option<String>)>> {
    let found = requests::get_datasets(text)?;
    Ok(found
        .into_iter()
        .map(|r| (r.name, r.method, r.version))
        .collect())
}

/// Correlated `(registration, save)` dict pairs, in save discovery order.
#[pyfunction]
pub fn get_dataset_registrations<'py>(py: Python<'py>, text: &str) -> PyResult<Bound<'py, PyList>> {
    let tree = parse_module(text.trim())?;
    let correlated = correlate(&tree).map_err(DatasetsError::from)?;

    let result = PyList::empty(py);
    for item in correlated {
        let registration = PyDict::new(py);
        registration.set_item("symbol", &item.registration.symbol)?;
        registration.set_item("name", &item.registration.name)?;
        match &item.registration.filename {
            FilenameRef::Literal(value) => {
                registration.set_item("filename", value)?;
                registration.set_item("filename_is_reference", false)?;
            }
            FilenameRef::Reference(value) => {
                registration.set_item("filename", value)?;
                registration.set_item("filename_is_reference", true)?;
            }
        }
        registration.set_item("stmt_index", item.registration.stmt_index)?;

        let span = item.save.span();
        let save = PyDict::new(py);
        save.set_item("symbol", &item.save.symbol)?;
        save.set_item("method", item.save.method())?;
        save.set_item("line", span.line)?;
        save.set_item("column", span.column)?;

        result.append(PyTuple::new(py, [registration, save])?)?;
    }
    Ok(result)
}

/// Decode a product token into a dict of its parts.
#[pyfunction]
pub fn parse_product<'py>(py: Python<'py>, text: &str) -> PyResult<Bound<'py, PyDict>> {
    let product = Product::decode(text)?;
    let checksum = product.checksum();
    let dict = PyDict::new(py);
    dict.set_item("codigo", product.codigo())?;
    dict.set_item("method", checksum.method())?;
    dict.set_item("hexdigest", checksum.hexdigest())?;
    dict.set_item("filename", checksum.filename())?;
    dict.set_item("encoded", product.encode(true))?;
    Ok(dict)
}

// ---------------------------------------------------------------------------
// Runtime ledger
// ---------------------------------------------------------------------------

/// Attribute-style entry point: `Datasets.R1C0.get(version="latest")`.
#[pyclass(frozen)]
pub struct Client {
    ledger: Ledger,
    /// Registration dicts exactly as passed in, extras untouched.
    produced: Mutex<Vec<Py<PyDict>>>,
}

#[pymethods]
impl Client {
    /// Every `Client()` is the module-level `Datasets` object.
    #[new]
    fn new(py: Python<'_>) -> PyResult<Py<Self>> {
        Ok(datasets(py)?.clone_ref(py))
    }

    #[getter]
    fn used<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyFrozenSet>> {
        PyFrozenSet::new(py, &self.ledger.used())
    }

    /// Registrations in call order, one dict per `register` call.
    #[getter]
    fn produced<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyList>> {
        let produced = self.produced.lock();
        PyList::new(py, produced.iter().map(|record| record.bind(py)))
    }

    #[getter]
    fn metadata(&self) -> PyMetadataClient {
        PyMetadataClient {
            inner: self.ledger.metadata(),
        }
    }

    fn uses(&self, uri: String) {
        self.ledger.uses(uri);
    }

    fn __getattr__(slf: &Bound<'_, Self>, name: String) -> PyResult<DatasetProxy> {
        if name.starts_with('_') {
            return Err(PyAttributeError::new_err(name));
        }
        Ok(DatasetProxy {
            handle: slf.get().ledger.dataset(name),
            client: slf.clone().unbind(),
        })
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.ledger)
    }
}

#[pyclass(frozen)]
pub struct DatasetProxy {
    handle: DatasetHandle,
    client: Py<Client>,
}

#[pymethods]
impl DatasetProxy {
    #[getter]
    fn name(&self) -> &str {
        self.handle.name()
    }

    #[pyo3(signature = (*, version=None, by=None))]
    fn get<'py>(
        &self,
        py: Python<'py>,
        version: Option<&str>,
        by: Option<Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let uri = self.handle.record_use(version);
        match by {
            Some(by) => {
                let kwargs = PyDict::new(py);
                kwargs.set_item("uri", &uri)?;
                by.call((), Some(&kwargs))
            }
            None => Ok(PyString::new(py, &uri).into_any()),
        }
    }

    /// `to` may be a `str` or a `pathlib.Path`; the result is a `Path`.
    #[pyo3(signature = (*, to, version=None, by=None))]
    fn download<'py>(
        &self,
        py: Python<'py>,
        to: Bound<'py, PyAny>,
        version: Option<&str>,
        by: Option<Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let uri = self.handle.record_use(version);
        let to = py.import("pathlib")?.getattr("Path")?.call1((to,))?;
        match by {
            Some(by) => {
                let kwargs = PyDict::new(py);
                kwargs.set_item("uri", &uri)?;
                kwargs.set_item("to", &to)?;
                by.call((), Some(&kwargs))
            }
            None => to.div(uri),
        }
    }

    #[pyo3(signature = (*, filename, **extra))]
    fn register<'py>(
        slf: &Bound<'py, Self>,
        filename: String,
        extra: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<Bound<'py, Self>> {
        let py = slf.py();
        let this = slf.get();

        let record = PyDict::new(py);
        record.set_item("name", this.handle.name())?;
        record.set_item("filename", &filename)?;
        if let Some(extra) = extra {
            record.update(extra.as_mapping())?;
        }

        this.handle.register(filename, extra_to_json(py, extra)?);
        this.client.get().produced.lock().push(record.unbind());
        Ok(slf.clone())
    }

    /// `func(value, **kwargs)` when a writer is given, else `value`.
    #[pyo3(signature = (value, /, func=None, **kwargs))]
    fn save<'py>(
        &self,
        value: Bound<'py, PyAny>,
        func: Option<Bound<'py, PyAny>>,
        kwargs: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<Bound<'py, PyAny>> {
        match func {
            Some(func) => self
                .handle
                .save_with(value, |value| func.call((value,), kwargs)),
            None => Ok(self.handle.save(value)),
        }
    }

    fn __repr__(&self) -> String {
        format!("DatasetProxy(name={:?})", self.handle.name())
    }
}

/// `Datasets.metadata`; any attribute lookup yields another metadata client.
#[pyclass(frozen, name = "MetadataClient")]
pub struct PyMetadataClient {
    inner: MetadataClient,
}

#[pymethods]
impl PyMetadataClient {
    #[pyo3(signature = (*fields, by=None))]
    fn get<'py>(
        &self,
        py: Python<'py>,
        fields: &Bound<'py, PyTuple>,
        by: Option<Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyAny>> {
        match by {
            Some(by) => by.call1(fields.clone()),
            None => {
                let names: Vec<String> = fields.extract()?;
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                let text = serde_json::to_string(&self.inner.get(&names))
                    .map_err(DatasetsError::from)?;
                json_loads(py, &text)
            }
        }
    }

    fn __getattr__(&self, name: String) -> PyResult<PyMetadataClient> {
        if name.starts_with('_') {
            return Err(PyAttributeError::new_err(name));
        }
        Ok(PyMetadataClient { inner: self.inner })
    }
}

pub fn register_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    m.add_function(wrap_pyfunction!(get_datasets, m)?)?;
    m.add_function(wrap_pyfunction!(get_dataset_registrations, m)?)?;
    m.add_function(wrap_pyfunction!(parse_product, m)?)?;
    m.add_class::<Client>()?;
    m.add_class::<DatasetProxy>()?;
    m.add_class::<PyMetadataClient>()?;
    m.add("Datasets", datasets(py)?.clone_ref(py))?;
    Ok(())
}
