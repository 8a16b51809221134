//! Data types (model facts + scan results) for relift.
//!
//! This crate is intentionally "dumb": pure DTOs with serde + schemars,
//! plus the frozen tables the scanner is parameterized by.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ── Schema Identifiers ─────────────────────────────────────────
pub const SCAN_SCHEMA_V1: &str = "relift.scan.v1";

// ── Frozen Vocabulary ──────────────────────────────────────────

/// File name of the text report written at the project root.
pub const REPORT_FILE_NAME: &str = "migration-report.txt";

/// Directory names excluded from the tree walk, by name, at any depth.
pub const EXCLUDED_DIR_NAMES: &[&str] = &["node_modules", ".tmp"];

/// Extensions of files the scanner reads (scripts and view templates).
pub const SCANNED_EXTENSIONS: &[&str] = &["js", "ejs"];

/// Model-file extensions the loader refuses (docs living next to models).
pub const NON_MODEL_EXTENSIONS: &[&str] = &["md", "txt"];

/// Resourceful pubsub methods removed in Sails 1.0.
pub const PUBSUB_METHODS: &[&str] = &[
    "publishAdd",
    "publishCreate",
    "publishDestroy",
    "publishRemove",
    "publishUpdate",
    "watch",
    "unwatch",
    "message",
];

/// Validation keywords retired by the Sails 1.0 validation system.
///
/// Attribute descriptor keys are intersected with this table; structural
/// keys (`type`, `collection`, `required`, ...) are simply never in it.
pub const DEPRECATED_VALIDATIONS: &[&str] = &[
    "array",
    "binary",
    "boolean",
    "date",
    "datetime",
    "decimal",
    "empty",
    "equals",
    "falsey",
    "finite",
    "float",
    "floatPrecision",
    "hexColor",
    "hexadecimal",
    "int",
    "integer",
    "integerPrecision",
    "is",
    "json",
    "len",
    "lowercase",
    "max",
    "min",
    "not",
    "notContains",
    "notEmpty",
    "notNull",
    "null",
    "number",
    "numeric",
    "object",
    "string",
    "text",
    "truthy",
    "undefined",
    "uppercase",
    "urlish",
    "uuid",
    "uuidv3",
    "uuidv4",
];

/// Project-relative subtrees the exclusion predicates reason about.
pub const ASSETS_DIR: &str = "assets";
pub const CONFIG_DIR: &str = "config";
pub const MODELS_DIR: &str = "api/models";

/// The legacy model-config file and its already-migrated companion.
pub const MODELS_CONFIG_FILE: &str = "config/models.js";
pub const MODELS_CONFIG_COMPANION: &str = "config/models_1.0.js";

// ── Model facts ────────────────────────────────────────────────

/// One attribute inside a model's `attributes` dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AttributeSpec {
    pub name: String,
    /// True if the descriptor declares a `collection:` relation.
    pub is_collection: bool,
    /// All descriptor keys present on this attribute.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub validation_keys: BTreeSet<String>,
    /// True if the attribute's value is a function, not a descriptor.
    pub is_function: bool,
}

/// One model definition, loaded once per run and immutable thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelDefinition {
    /// Display name (explicit `globalId:` or derived from the file stem).
    pub global_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeSpec>,
    /// Legacy per-model datastore name, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

// ── Scan results ───────────────────────────────────────────────

/// Category of a single pattern match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum HitCategory {
    AddCall,
    RemoveCall,
    SaveCall,
    PubsubCall,
    LegacyConnectionsKey,
    LegacyConnectionKey,
    CsrfRoute,
}

impl HitCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            HitCategory::AddCall => "add-call",
            HitCategory::RemoveCall => "remove-call",
            HitCategory::SaveCall => "save-call",
            HitCategory::PubsubCall => "pubsub-call",
            HitCategory::LegacyConnectionsKey => "legacy-connections-key",
            HitCategory::LegacyConnectionKey => "legacy-connection-key",
            HitCategory::CsrfRoute => "csrf-route",
        }
    }
}

/// One pattern match: category, project-relative path, 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScanHit {
    pub category: HitCategory,
    /// Relative to the project root, forward slashes.
    pub path: String,
    pub line: u32,
    /// Which model matched (pubsub hits only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Which removed method matched (pubsub hits only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// One rendered block of the migration report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
}

/// Summary of a scan, serializable as a JSON receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScanReceipt {
    pub schema: String,
    pub tool: ToolMeta,
    pub files_scanned: u32,
    /// Files that could not be read and were skipped (coverage gap).
    pub skipped_files: u32,
    pub hits: Vec<ScanHit>,
    pub sections: Vec<ReportSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolMeta {
    pub name: String,
    pub version: String,
}
