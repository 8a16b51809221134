//! Core engine: loads project state, scans the tree, and synthesizes the
//! migration report.

mod configgen;
mod loader;
mod manifest;
mod report;
mod scan;

pub use configgen::{
    migrate_datastores, render_datastores_config, render_globals_config, render_models_config,
    write_globals_config, write_models_config, ConfigGenError, DatastoresMigration,
};
pub use loader::{
    companion_pins_connection_null, load_config_keys, load_config_source, load_models,
    load_project_config, LoadError, ProjectConfig,
};
pub use manifest::{
    load_manifest, plan_dependencies, DependencyPlan, ManifestError, PackageManifest, PackageSpec,
};
pub use report::{render_report, synthesize_report, write_report, NOTHING_TO_REPORT};
pub use scan::{scan_project, ScanError, ScanOutcome};
