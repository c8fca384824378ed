//! Batch analysis of pipeline scripts with Rayon-based parallelism.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::analyzer::ast::{parse_module, Span};
use crate::analyzer::reconcile::StaticFacts;
use crate::analyzer::registrations::{correlate_with, DatasetRegister};
use crate::analyzer::requests::{extract_requests_with, Request};
use crate::config::AnalyzerConfig;
use crate::errors::DatasetsResult;

const SCRIPT_EXTENSION: &str = "py";

/// A correlated registration detached from the syntax tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegistrationSummary {
    pub registration: DatasetRegister,
    pub save_method: String,
    pub save_span: Span,
}

/// Static facts for one script, or the stage at which analysis failed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScriptAnalysis {
    pub path: String,
    pub requests: Vec<Request>,
    pub registrations: Vec<RegistrationSummary>,
    /// `"read"`, `"parse"` or `"structure"`.
    pub error_stage: Option<String>,
    pub error_message: Option<String>,
}

impl ScriptAnalysis {
    fn failed(path: &str, stage: &str, message: String) -> Self {
        Self {
            path: path.to_string(),
            error_stage: Some(stage.to_string()),
            error_message: Some(message),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_stage.is_none()
    }

    pub fn static_facts(&self) -> StaticFacts {
        StaticFacts {
            requests: self.requests.iter().cloned().collect(),
            registrations: self
                .registrations
                .iter()
                .map(|summary| summary.registration.clone())
                .collect(),
        }
    }
}

/// Run both analyzers over one script's source.
///
/// Requests are kept even when correlation fails, so a script that breaks
/// the registration convention still reports what it reads.
pub fn analyze_source(path: &str, source: &str, config: &AnalyzerConfig) -> ScriptAnalysis {
    let tree = match parse_module(source) {
        Ok(tree) => tree,
        Err(e) => return ScriptAnalysis::failed(path, "parse", e.to_string()),
    };

    let requests: Vec<Request> = extract_requests_with(&tree, config).into_iter().collect();

    match correlate_with(&tree, config) {
        Ok(correlated) => ScriptAnalysis {
            path: path.to_string(),
            requests,
            registrations: correlated
                .into_iter()
                .map(|c| RegistrationSummary {
                    save_method: c.save.method().to_string(),
                    save_span: c.save.span(),
                    registration: c.registration,
                })
                .collect(),
            error_stage: None,
            error_message: None,
        },
        Err(e) => ScriptAnalysis {
            requests,
            ..ScriptAnalysis::failed(path, "structure", e.to_string())
        },
    }
}

fn analyze_file_worker(root: &Path, relative_path: &str, config: &AnalyzerConfig) -> ScriptAnalysis {
    let absolute = root.join(relative_path);
    match std::fs::read_to_string(&absolute) {
        Ok(source) => analyze_source(relative_path, &source, config),
        Err(e) => ScriptAnalysis::failed(relative_path, "read", e.to_string()),
    }
}

/// List `.py` scripts under `root`, honouring `.gitignore` files, as paths
/// relative to `root`, sorted.
pub fn scan_scripts(root: &Path) -> Vec<String> {
    let mut scripts = Vec::new();
    let walker = ignore::WalkBuilder::new(root).require_git(false).build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
        let is_script = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == SCRIPT_EXTENSION);
        if !is_file || !is_script {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        scripts.push(rel);
    }

    scripts.sort();
    scripts
}

/// Analyze `files` (relative to `root`) on a pool of `workers` threads,
/// preserving input order.
pub fn parallel_analyze(
    root: &Path,
    files: &[String],
    config: &AnalyzerConfig,
) -> Vec<ScriptAnalysis> {
    if files.is_empty() {
        return vec![];
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            files
                .par_iter()
                .map(|path| analyze_file_worker(root, path, config))
                .collect()
        }),
        Err(e) => {
            warn!("Falling back to sequential analysis: {e}");
            files
                .iter()
                .map(|path| analyze_file_worker(root, path, config))
                .collect()
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub root: PathBuf,
    pub scripts: Vec<ScriptAnalysis>,
    pub scripts_failed: usize,
    pub elapsed_ms: u128,
}

impl AnalysisReport {
    pub fn to_json(&self) -> DatasetsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Scan `root` and analyze every script found.
pub fn analyze_tree(root: &Path, config: &AnalyzerConfig) -> AnalysisReport {
    let started = Instant::now();
    let files = scan_scripts(root);
    let scripts = parallel_analyze(root, &files, config);

    for failed in scripts.iter().filter(|s| !s.is_ok()) {
        warn!(
            path = %failed.path,
            stage = failed.error_stage.as_deref().unwrap_or_default(),
            "{}",
            failed.error_message.as_deref().unwrap_or_default()
        );
    }

    let scripts_failed = scripts.iter().filter(|s| !s.is_ok()).count();
    let elapsed_ms = started.elapsed().as_millis();
    info!(
        root = %root.display(),
        scripts = scripts.len(),
        scripts_failed,
        elapsed_ms = elapsed_ms as u64,
        "analyzed pipeline scripts"
    );

    AnalysisReport {
        root: root.to_path_buf(),
        scripts,
        scripts_failed,
        elapsed_ms,
    }
}
