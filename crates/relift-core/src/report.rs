//! Report synthesis: a fixed, ordered sequence of independent checks, each
//! contributing at most one section, rendered to one deterministic text
//! artifact.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use relift_domain::ModelFacts;
use relift_types::{HitCategory, ReportSection, ScanHit, REPORT_FILE_NAME};

use crate::loader::ProjectConfig;
use crate::scan::ScanOutcome;

/// Message printed in place of a report when no section triggered.
pub const NOTHING_TO_REPORT: &str =
    "Looking good -- we didn't find anything that needs manual attention!";

const BANNER: &str = "\
====================================================
 Sails 1.0 migration report
====================================================";

const SECTION_SEPARATOR: &str = "\n----------------------------------------------------\n";

const FOOTER: &str = "\
----------------------------------------------------
Next steps:
 * Work through the items above, then try lifting
   your app with `sails lift`.
 * For the full migration checklist, see:
   http://bit.ly/sails_migration_checklist";

/// Default templating engine; any other configured engine changed shape.
const DEFAULT_VIEW_ENGINE: &str = "ejs";

/// Run every check in its fixed order and collect the triggered sections.
pub fn synthesize_report(
    facts: &ModelFacts,
    config: &ProjectConfig,
    outcome: &ScanOutcome,
) -> Vec<ReportSection> {
    let steps: &[fn(&ModelFacts, &ProjectConfig, &ScanOutcome) -> Option<ReportSection>] = &[
        blueprint_actions_default_changed,
        to_json_attribute_removed,
        instance_methods_removed,
        view_engine_changed,
        database_config_renamed,
        csrf_route_removed,
        outdated_validations,
        add_remove_save_removed,
        pubsub_methods_removed,
    ];

    let sections: Vec<ReportSection> = steps
        .iter()
        .filter_map(|step| step(facts, config, outcome))
        .collect();
    debug!(sections = sections.len(), "synthesized report sections");
    sections
}

fn section(title: &str, body: String) -> Option<ReportSection> {
    Some(ReportSection {
        title: title.to_string(),
        body,
    })
}

fn blueprint_actions_default_changed(
    _facts: &ModelFacts,
    config: &ProjectConfig,
    _outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let blueprints = config.blueprints.as_ref()?;
    if blueprints.contains_key("actions") {
        return None;
    }
    section(
        "Blueprint action routes are now off by default",
        "Your project has a `config/blueprints.js` file that does not explicitly set\n\
         `actions`. In Sails 1.0 the default for `actions` changed from `true` to\n\
         `false`, so implicit controller action routes will no longer be bound.\n\
         If your app relies on them, set `actions: true` explicitly."
            .to_string(),
    )
}

fn to_json_attribute_removed(
    facts: &ModelFacts,
    _config: &ProjectConfig,
    _outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let models = facts.to_json_models();
    if models.is_empty() {
        return None;
    }
    let mut body = String::from(
        "The `toJSON` instance method is no longer supported on model attributes.\n\
         Use the `customToJSON` model setting instead. Affected models:\n",
    );
    for model in models {
        let _ = writeln!(body, " * {model}");
    }
    section("`toJSON` attributes are no longer supported", trimmed(body))
}

fn instance_methods_removed(
    facts: &ModelFacts,
    _config: &ProjectConfig,
    _outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let models = facts.instance_method_models();
    if models.is_empty() {
        return None;
    }
    let mut body = String::from(
        "Instance methods (function-valued attributes) were removed in Sails 1.0.\n\
         Move this logic into helpers or model class methods. Affected models:\n",
    );
    for model in models {
        let _ = writeln!(body, " * {model}");
    }
    section("Model instance methods were removed", trimmed(body))
}

fn view_engine_changed(
    _facts: &ModelFacts,
    config: &ProjectConfig,
    _outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let engine = config.views.get("engine")?;
    let engine = engine.trim_matches(|c| c == '\'' || c == '"');
    if engine == DEFAULT_VIEW_ENGINE {
        return None;
    }
    section(
        "View engine configuration changed",
        format!(
            "Your `config/views.js` configures the `{engine}` template engine.\n\
             The shape of custom view engine configuration changed in Sails 1.0;\n\
             see the migration guide for the new `extension`/`getRenderFn` settings."
        ),
    )
}

fn database_config_renamed(
    _facts: &ModelFacts,
    _config: &ProjectConfig,
    outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let connections = outcome.hits_in(HitCategory::LegacyConnectionsKey);
    let connection = outcome.hits_in(HitCategory::LegacyConnectionKey);
    if connections.is_empty() && connection.is_empty() {
        return None;
    }
    let mut body = String::from(
        "Database connections are called datastores in Sails 1.0. The following\n\
         places still use the old setting names:\n",
    );
    for hit in connections {
        let _ = writeln!(
            body,
            " * {} (replace `connections:` with `datastores:`)",
            location(hit)
        );
    }
    for hit in connection {
        let _ = writeln!(
            body,
            " * {} (replace `connection:` with `datastore:`)",
            location(hit)
        );
    }
    section("Database configuration was renamed", trimmed(body))
}

fn csrf_route_removed(
    _facts: &ModelFacts,
    _config: &ProjectConfig,
    outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let hits = outcome.hits_in(HitCategory::CsrfRoute);
    if hits.is_empty() {
        return None;
    }
    let mut body = String::from(
        "The built-in `/csrfToken` route was removed in Sails 1.0. Declare it\n\
         explicitly in `config/routes.js`:\n\n\
         \x20 'GET /csrfToken': { action: 'security/grant-csrf-token' }\n\n\
         Referenced from:\n",
    );
    for hit in hits {
        let _ = writeln!(body, " * {}", location(hit));
    }
    section("The `/csrfToken` route must be declared", trimmed(body))
}

fn outdated_validations(
    facts: &ModelFacts,
    _config: &ProjectConfig,
    _outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let outdated = facts.outdated_validations();
    if outdated.is_empty() {
        return None;
    }
    let mut body = String::from(
        "The following attributes use validations that were removed from Sails 1.0.\n\
         Replace them with supported validation rules or custom logic:\n",
    );
    for entry in outdated {
        let _ = writeln!(
            body,
            " * {}.{}: {}",
            entry.model,
            entry.attribute,
            entry.keys.join(", ")
        );
    }
    section("Outdated attribute validations", trimmed(body))
}

fn add_remove_save_removed(
    _facts: &ModelFacts,
    _config: &ProjectConfig,
    outcome: &ScanOutcome,
) -> Option<ReportSection> {
    if !outcome.has_hits_in(&[
        HitCategory::AddCall,
        HitCategory::RemoveCall,
        HitCategory::SaveCall,
    ]) {
        return None;
    }
    let mut body = String::from(
        "The `.add()`, `.remove()` and `.save()` record methods were removed in\n\
         Sails 1.0. Use `Model.addToCollection()`, `Model.removeFromCollection()`\n\
         and `Model.update()` instead. Possible usages:\n",
    );
    for hit in &outcome.hits {
        let note = match hit.category {
            HitCategory::AddCall => "`.add()` -> `Model.addToCollection()`",
            HitCategory::RemoveCall => "`.remove()` -> `Model.removeFromCollection()`",
            HitCategory::SaveCall => "`.save()` -> `Model.update()`",
            _ => continue,
        };
        let _ = writeln!(body, " * {} ({note})", location(hit));
    }
    section(
        "add, remove and save methods were removed",
        trimmed(body),
    )
}

fn pubsub_methods_removed(
    _facts: &ModelFacts,
    _config: &ProjectConfig,
    outcome: &ScanOutcome,
) -> Option<ReportSection> {
    let hits = outcome.hits_in(HitCategory::PubsubCall);
    if hits.is_empty() {
        return None;
    }
    let mut body = String::from(
        "The resourceful pubsub methods were consolidated in Sails 1.0: use\n\
         `Model.publish()` to broadcast and `Model.subscribe()` to listen.\n\
         Possible usages of removed methods:\n",
    );
    for hit in hits {
        let model = hit.model.as_deref().unwrap_or("?");
        let method = hit.method.as_deref().unwrap_or("?");
        let _ = writeln!(body, " * {model}.{method}() at {}", location(hit));
    }
    section("Resourceful pubsub methods were removed", trimmed(body))
}

fn location(hit: &ScanHit) -> String {
    format!("{}:{}", hit.path, hit.line)
}

fn trimmed(mut body: String) -> String {
    while body.ends_with('\n') {
        body.pop();
    }
    body
}

/// Render the full report text. Deterministic: same sections, same bytes.
pub fn render_report(sections: &[ReportSection]) -> String {
    let mut out = String::new();
    out.push_str(BANNER);
    out.push('\n');
    for section in sections {
        out.push_str(SECTION_SEPARATOR);
        out.push(' ');
        out.push_str(&section.title);
        out.push('\n');
        out.push_str(SECTION_SEPARATOR.trim_start_matches('\n'));
        out.push_str(&section.body);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(FOOTER);
    out.push('\n');
    out
}

/// Write the rendered report to its fixed path under the project root.
pub fn write_report(root: &Path, text: &str) -> io::Result<PathBuf> {
    let path = root.join(REPORT_FILE_NAME);
    fs::write(&path, text)?;
    Ok(path)
}
