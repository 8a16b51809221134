//! Project state loading: model definitions and Sails config files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use relift_domain::{parse_model_source, scan_top_level_keys, ModelFacts, ModelParseError};
use relift_types::{CONFIG_DIR, MODELS_CONFIG_COMPANION, MODELS_DIR, NON_MODEL_EXTENSIONS};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to extract model facts from {path}")]
    Model {
        path: PathBuf,
        #[source]
        source: ModelParseError,
    },
}

/// Load every model definition under `api/models`.
///
/// A missing directory is an app without models, not an error. Files with
/// documentation extensions (`.md`, `.txt`) and dotted stems are skipped,
/// anything else is treated as a model module.
pub fn load_models(root: &Path) -> Result<ModelFacts, LoadError> {
    let dir = root.join(MODELS_DIR);
    if !dir.is_dir() {
        return Ok(ModelFacts::default());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .map_err(|source| LoadError::Io {
            path: dir.clone(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    let mut models = BTreeMap::new();
    for path in paths {
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if NON_MODEL_EXTENSIONS.contains(&ext) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.contains('.') {
            continue;
        }

        let text = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let model = parse_model_source(stem, &text).map_err(|source| LoadError::Model {
            path: path.clone(),
            source,
        })?;
        debug!(model = %model.global_id, path = %path.display(), "loaded model definition");
        models.insert(stem.to_lowercase(), model);
    }

    Ok(ModelFacts::from_models(models))
}

/// Read one `config/<name>.js` file as raw source. Absence is None.
pub fn load_config_source(root: &Path, name: &str) -> Result<Option<String>, LoadError> {
    let path = root.join(CONFIG_DIR).join(format!("{name}.js"));
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(Some(text))
}

/// Read one `config/<name>.js` file into its top-level key map.
/// Absence of the file is an empty map, never an error.
pub fn load_config_keys(root: &Path, name: &str) -> Result<BTreeMap<String, String>, LoadError> {
    Ok(load_config_source(root, name)?
        .map(|text| scan_top_level_keys(&text))
        .unwrap_or_default())
}

/// All Sails config state the pipeline and report care about, loaded once.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    pub globals: BTreeMap<String, String>,
    pub models: BTreeMap<String, String>,
    pub connections: BTreeMap<String, String>,
    /// Raw `config/connections.js` source, kept for block lifting.
    pub connections_source: Option<String>,
    /// None when no `config/blueprints.js` file exists at all; the report
    /// distinguishes "no file" from "file without the key".
    pub blueprints: Option<BTreeMap<String, String>>,
    pub views: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// A global toggle is disabled only when explicitly set to `false`.
    pub fn global_is_disabled(&self, key: &str) -> bool {
        self.globals.get(key).is_some_and(|v| v == "false")
    }
}

pub fn load_project_config(root: &Path) -> Result<ProjectConfig, LoadError> {
    let connections_source = load_config_source(root, "connections")?;
    let connections = connections_source
        .as_deref()
        .map(scan_top_level_keys)
        .unwrap_or_default();
    let blueprints = load_config_source(root, "blueprints")?.map(|text| scan_top_level_keys(&text));

    Ok(ProjectConfig {
        globals: load_config_keys(root, "globals")?,
        models: load_config_keys(root, "models")?,
        connections,
        connections_source,
        blueprints,
        views: load_config_keys(root, "views")?,
    })
}

/// True when `config/models_1.0.js` exists and pins `connection: null`,
/// marking the legacy key in `config/models.js` as already handled.
pub fn companion_pins_connection_null(root: &Path) -> bool {
    let path = root.join(MODELS_CONFIG_COMPANION);
    let Ok(text) = fs::read_to_string(path) else {
        return false;
    };
    scan_top_level_keys(&text)
        .get("connection")
        .is_some_and(|v| v == "null")
}
