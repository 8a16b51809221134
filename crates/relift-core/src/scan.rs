//! Project tree scanning.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::debug;

use relift_domain::{evaluate_line, CompiledPatterns, FileContext, ModelFacts, PatternCompileError};
use relift_types::{HitCategory, ScanHit, EXCLUDED_DIR_NAMES, SCANNED_EXTENSIONS};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Patterns(#[from] PatternCompileError),
}

/// Everything one scan produced: hits in walk order, plus coverage counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub hits: Vec<ScanHit>,
    pub files_scanned: u32,
    /// Files that were eligible but could not be read (binary content,
    /// permissions). The walk never aborts on one bad file.
    pub skipped_files: u32,
}

impl ScanOutcome {
    /// Hits of one category, preserving walk order.
    pub fn hits_in(&self, category: HitCategory) -> Vec<&ScanHit> {
        self.hits.iter().filter(|h| h.category == category).collect()
    }

    pub fn has_hits_in(&self, categories: &[HitCategory]) -> bool {
        self.hits.iter().any(|h| categories.contains(&h.category))
    }
}

/// Walk the project root and evaluate every eligible line.
///
/// `companion_pins_null` is the precomputed `config/models_1.0.js` state;
/// see [`crate::companion_pins_connection_null`].
pub fn scan_project(
    root: &Path,
    facts: &ModelFacts,
    companion_pins_null: bool,
) -> Result<ScanOutcome, ScanError> {
    let patterns =
        CompiledPatterns::compile(&facts.collection_attributes(), &facts.model_names())?;
    let eligible = eligible_files_globset();

    let mut outcome = ScanOutcome::default();

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a: &OsStr, b: &OsStr| a.cmp(b))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && EXCLUDED_DIR_NAMES
                    .iter()
                    .any(|name| entry.file_name() == OsStr::new(name)))
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unwalkable entry");
                outcome.skipped_files += 1;
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if !eligible.is_match(path) {
            continue;
        }

        let rel = match path.strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %rel, error = %err, "skipping unreadable file");
                outcome.skipped_files += 1;
                continue;
            }
        };

        outcome.files_scanned += 1;
        let ctx = FileContext::new(&rel, companion_pins_null);
        for (idx, line) in text.lines().enumerate() {
            evaluate_line(&ctx, &patterns, idx as u32 + 1, line, &mut outcome.hits);
        }
    }

    Ok(outcome)
}

fn eligible_files_globset() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for ext in SCANNED_EXTENSIONS {
        let glob = Glob::new(&format!("*.{ext}")).expect("static glob should compile");
        builder.add(glob);
    }
    builder.build().expect("globset build should succeed")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use relift_domain::parse_model_source;

    use super::*;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, text).expect("write");
    }

    fn facts_with_pet() -> ModelFacts {
        let pet = parse_model_source(
            "pet",
            "module.exports = {\n  attributes: {\n    toys: { collection: 'toy' }\n  }\n};\n",
        )
        .expect("parse");
        let mut models = BTreeMap::new();
        models.insert("pet".to_string(), pet);
        ModelFacts::from_models(models)
    }

    #[test]
    fn finds_add_call_with_relative_path_and_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "api/controllers/PetController.js",
            "module.exports = {\n  give: function (req, res) {\n    pet.toys.add(toyId);\n  }\n};\n",
        );

        let outcome = scan_project(dir.path(), &facts_with_pet(), false).expect("scan");
        assert_eq!(outcome.files_scanned, 1);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].category, HitCategory::AddCall);
        assert_eq!(outcome.hits[0].path, "api/controllers/PetController.js");
        assert_eq!(outcome.hits[0].line, 3);
    }

    #[test]
    fn skips_excluded_directories_and_other_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "node_modules/dep/index.js", "pet.toys.add(1);\n");
        write(dir.path(), ".tmp/build/out.js", "pet.toys.add(1);\n");
        write(dir.path(), "README.md", "pet.toys.add(1);\n");
        write(dir.path(), "views/pet.ejs", "<% pet.toys.add(1); %>\n");

        let outcome = scan_project(dir.path(), &facts_with_pet(), false).expect("scan");
        assert_eq!(outcome.files_scanned, 1);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].path, "views/pet.ejs");
    }

    #[test]
    fn unreadable_file_is_counted_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("binary.js"), [0xff, 0xfe, 0x00, 0x01]).expect("write");
        write(dir.path(), "ok.js", "pet.toys.add(1);\n");

        let outcome = scan_project(dir.path(), &facts_with_pet(), false).expect("scan");
        assert_eq!(outcome.skipped_files, 1);
        assert_eq!(outcome.files_scanned, 1);
        assert_eq!(outcome.hits.len(), 1);
    }

    #[test]
    fn walk_order_is_deterministic() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "b.js", "pet.save(cb);\n");
        write(dir.path(), "a.js", "pet.save(cb);\n");
        write(dir.path(), "api/z.js", "pet.save(cb);\n");

        let first = scan_project(dir.path(), &facts_with_pet(), false).expect("scan");
        let second = scan_project(dir.path(), &facts_with_pet(), false).expect("scan");
        assert_eq!(first, second);

        let paths: Vec<&str> = first.hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["a.js", "api/z.js", "b.js"]);
    }

    #[test]
    fn legacy_connections_key_in_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "config/connections.js",
            "module.exports = {\n\n  connections: {\n    someDb: { adapter: 'sails-disk' }\n  }\n};\n",
        );

        let outcome = scan_project(dir.path(), &ModelFacts::default(), false).expect("scan");
        let hits = outcome.hits_in(HitCategory::LegacyConnectionsKey);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "config/connections.js");
        assert_eq!(hits[0].line, 3);
    }

    #[test]
    fn clean_project_has_no_hits() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "api/controllers/HomeController.js",
            "module.exports = {\n  index: function (req, res) {\n    return res.ok();\n  }\n};\n",
        );

        let outcome = scan_project(dir.path(), &ModelFacts::default(), false).expect("scan");
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.files_scanned, 1);
    }
}
