//! Analyzer configuration, read from `DATASETS_*` environment variables.

/// Root name every dataset access hangs off (`Datasets.R1C0.get(...)`).
pub const DEFAULT_SENTINEL: &str = "Datasets";

/// Method name that declares a produced artifact instead of a usage.
pub const DEFAULT_REGISTER_METHOD: &str = "register";

pub const DEFAULT_WORKERS: usize = 4;

/// Knobs shared by the request extractor, the correlator and the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerConfig {
    pub sentinel: String,
    pub register_method: String,
    pub workers: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            register_method: DEFAULT_REGISTER_METHOD.to_string(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl AnalyzerConfig {
    /// Build a config from `DATASETS_SENTINEL` and `DATASETS_WORKERS`.
    ///
    /// Blank or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("DATASETS_SENTINEL") {
            let v = val.trim();
            if is_identifier(v) {
                config.sentinel = v.to_string();
            }
        }

        if let Some(val) = lookup("DATASETS_WORKERS") {
            if let Ok(n) = val.trim().parse::<usize>() {
                config.workers = n.max(1);
            }
        }

        config
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
