//! Generation of the Sails 1.0 config files: `config/globals_1.0.js`,
//! `config/models_1.0.js` and `config/datastores.js`.
//!
//! The new files are written next to the legacy ones so the operator can
//! review and merge at their own pace; only the datastores migration
//! touches an existing file, and it backs the original up first.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use relift_domain::{extract_object_block, ModelFacts};
use relift_types::CONFIG_DIR;

use crate::loader::ProjectConfig;

/// The implicit disk datastore name used by pre-1.0 generated apps.
const LOCAL_DISK_DB: &str = "localDiskDb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigGenError {
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to back up {path}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn write_file(path: PathBuf, text: &str) -> Result<PathBuf, ConfigGenError> {
    fs::write(&path, text).map_err(|source| ConfigGenError::Write {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "wrote config file");
    Ok(path)
}

/// Render the replacement globals config, preserving which toggles the
/// project had disabled.
pub fn render_globals_config(config: &ProjectConfig) -> String {
    let value = |key: &str, enabled: &str| -> String {
        if config.global_is_disabled(key) {
            "false".to_string()
        } else {
            enabled.to_string()
        }
    };
    format!(
        "/**\n\
         \x20* Global Variable Configuration\n\
         \x20* (sails.config.globals)\n\
         \x20*\n\
         \x20* Generated for the Sails 1.0 migration. Review it, then copy it\n\
         \x20* over your existing `config/globals.js`.\n\
         \x20*/\n\
         \n\
         module.exports.globals = {{\n\
         \n\
         \x20 _: {lodash},\n\
         \n\
         \x20 async: {async_val},\n\
         \n\
         \x20 models: {models},\n\
         \n\
         \x20 sails: {sails}\n\
         \n\
         }};\n",
        lodash = value("_", "require('lodash')"),
        async_val = value("async", "require('async')"),
        models = value("models", "true"),
        sails = value("sails", "true"),
    )
}

pub fn write_globals_config(
    root: &Path,
    config: &ProjectConfig,
) -> Result<PathBuf, ConfigGenError> {
    write_file(
        root.join(CONFIG_DIR).join("globals_1.0.js"),
        &render_globals_config(config),
    )
}

/// The default datastore name for the new models config: the legacy
/// `connection` value, with the implicit disk store mapping to `default`.
fn default_datastore(config: &ProjectConfig) -> String {
    match config.models.get("connection").map(|v| unquote(v)) {
        Some(name) if !name.is_empty() && name != LOCAL_DISK_DB => name.to_string(),
        _ => "default".to_string(),
    }
}

/// Render the replacement models config. The legacy `connection` key is
/// pinned to `null` so later scans treat the old file as handled.
pub fn render_models_config(config: &ProjectConfig) -> String {
    format!(
        "/**\n\
         \x20* Default model settings\n\
         \x20* (sails.config.models)\n\
         \x20*\n\
         \x20* Generated for the Sails 1.0 migration. Review it, then merge it\n\
         \x20* into your existing `config/models.js`.\n\
         \x20*/\n\
         \n\
         module.exports.models = {{\n\
         \n\
         \x20 // `connection` is no longer used; the setting is called `datastore` now.\n\
         \x20 connection: null,\n\
         \n\
         \x20 datastore: '{datastore}',\n\
         \n\
         \x20 migrate: 'safe'\n\
         \n\
         }};\n",
        datastore = default_datastore(config),
    )
}

pub fn write_models_config(
    root: &Path,
    config: &ProjectConfig,
) -> Result<PathBuf, ConfigGenError> {
    write_file(
        root.join(CONFIG_DIR).join("models_1.0.js"),
        &render_models_config(config),
    )
}

/// What the datastores migration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoresMigration {
    pub written: PathBuf,
    pub backup: PathBuf,
    /// Datastore names carried over, in discovery order.
    pub carried: Vec<String>,
}

/// Datastore names actually referenced by the project: the models-config
/// default plus every per-model `connection`, first reference wins.
fn datastores_in_use(config: &ProjectConfig, facts: &ModelFacts) -> Vec<String> {
    let mut in_use: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !name.is_empty() && !in_use.iter().any(|n| n == name) {
            in_use.push(name.to_string());
        }
    };

    if let Some(value) = config.models.get("connection") {
        let name = unquote(value);
        if name != LOCAL_DISK_DB {
            push(name);
        }
    }
    for model in facts.models.values() {
        if let Some(connection) = &model.connection {
            push(connection);
        }
    }
    in_use
}

pub fn render_datastores_config(entries: &[String]) -> String {
    format!(
        "/**\n\
         \x20* Datastores\n\
         \x20* (sails.config.datastores)\n\
         \x20*\n\
         \x20* Migrated from `config/connections.js`. Only the connections your\n\
         \x20* models actually use were carried over; in Sails 1.0 every\n\
         \x20* configured datastore is loaded whether used or not.\n\
         \x20*/\n\
         \n\
         module.exports.datastores = {{\n\
         \n\
         \x20 {entries}\n\
         \n\
         }};\n",
        entries = entries.join(",\n\n  "),
    )
}

/// Write `config/datastores.js` from the legacy connections config and
/// back the old file up to `config/connections-old.js.txt`.
///
/// Returns None when the project has no connections config to migrate.
pub fn migrate_datastores(
    root: &Path,
    config: &ProjectConfig,
    facts: &ModelFacts,
) -> Result<Option<DatastoresMigration>, ConfigGenError> {
    let Some(source) = &config.connections_source else {
        return Ok(None);
    };

    let mut carried = Vec::new();
    let mut entries = Vec::new();
    for name in datastores_in_use(config, facts) {
        if let Some(block) = extract_object_block(source, &name) {
            entries.push(format!("'{name}': {block}"));
            carried.push(name);
        }
    }

    let written = write_file(
        root.join(CONFIG_DIR).join("datastores.js"),
        &render_datastores_config(&entries),
    )?;

    let old = root.join(CONFIG_DIR).join("connections.js");
    let backup = root.join(CONFIG_DIR).join("connections-old.js.txt");
    fs::rename(&old, &backup).map_err(|source| ConfigGenError::Backup {
        path: old.clone(),
        source,
    })?;
    info!(backup = %backup.display(), "backed up legacy connections config");

    Ok(Some(DatastoresMigration {
        written,
        backup,
        carried,
    }))
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '\'' || c == '"')
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use relift_domain::parse_model_source;

    use super::*;

    fn config_with(models: &[(&str, &str)]) -> ProjectConfig {
        ProjectConfig {
            models: models
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..ProjectConfig::default()
        }
    }

    #[test]
    fn globals_rendering_preserves_disabled_toggles() {
        let mut config = ProjectConfig::default();
        let text = render_globals_config(&config);
        assert!(text.contains("_: require('lodash'),"));
        assert!(text.contains("async: require('async'),"));
        assert!(text.contains("models: true,"));
        assert!(text.contains("sails: true"));

        config.globals.insert("_".to_string(), "false".to_string());
        config
            .globals
            .insert("models".to_string(), "false".to_string());
        let text = render_globals_config(&config);
        assert!(text.contains("_: false,"));
        assert!(text.contains("async: require('async'),"));
        assert!(text.contains("models: false,"));
    }

    #[test]
    fn models_rendering_maps_local_disk_db_to_default() {
        let text = render_models_config(&config_with(&[("connection", "'localDiskDb'")]));
        assert!(text.contains("datastore: 'default',"));

        let text = render_models_config(&config_with(&[("connection", "'someMysqlDb'")]));
        assert!(text.contains("datastore: 'someMysqlDb',"));

        let text = render_models_config(&config_with(&[]));
        assert!(text.contains("datastore: 'default',"));
    }

    #[test]
    fn models_rendering_pins_connection_null() {
        let text = render_models_config(&ProjectConfig::default());
        assert!(text.contains("connection: null,"));
        assert!(text.contains("migrate: 'safe'"));
    }

    #[test]
    fn datastores_migration_carries_only_used_connections() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("config")).expect("mkdir");
        let connections_source = "module.exports.connections = {\n\n  someMysqlDb: {\n    adapter: 'sails-mysql',\n    host: 'localhost'\n  },\n\n  unusedDb: {\n    adapter: 'sails-disk'\n  }\n\n};\n";
        fs::write(dir.path().join("config/connections.js"), connections_source).expect("write");

        let mut config = config_with(&[("connection", "'localDiskDb'")]);
        config.connections_source = Some(connections_source.to_string());

        let pet = parse_model_source(
            "pet",
            "module.exports = {\n  connection: 'someMysqlDb',\n  attributes: {}\n};\n",
        )
        .expect("parse");
        let mut models = BTreeMap::new();
        models.insert("pet".to_string(), pet);
        let facts = ModelFacts::from_models(models);

        let migration = migrate_datastores(dir.path(), &config, &facts)
            .expect("migrate")
            .expect("had connections");
        assert_eq!(migration.carried, vec!["someMysqlDb".to_string()]);

        let written = fs::read_to_string(&migration.written).expect("read");
        assert!(written.contains("'someMysqlDb': {"));
        assert!(written.contains("adapter: 'sails-mysql'"));
        assert!(!written.contains("unusedDb"));

        assert!(!dir.path().join("config/connections.js").exists());
        assert!(migration.backup.ends_with("config/connections-old.js.txt"));
        assert_eq!(
            fs::read_to_string(&migration.backup).expect("read backup"),
            connections_source
        );
    }

    #[test]
    fn no_connections_config_means_no_migration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = migrate_datastores(
            dir.path(),
            &ProjectConfig::default(),
            &ModelFacts::default(),
        )
        .expect("migrate");
        assert!(result.is_none());
    }

    #[test]
    fn written_globals_file_round_trips_through_the_key_scanner() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("config")).expect("mkdir");
        let mut config = ProjectConfig::default();
        config
            .globals
            .insert("async".to_string(), "false".to_string());

        let path = write_globals_config(dir.path(), &config).expect("write");
        let keys =
            relift_domain::scan_top_level_keys(&fs::read_to_string(path).expect("read"));
        assert_eq!(keys["async"], "false");
        assert_eq!(keys["_"], "require('lodash')");
    }
}
