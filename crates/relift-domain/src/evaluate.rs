//! Per-line evaluation: apply the compiled patterns to one source line,
//! subject to the location-based exclusions, and append any hits.

use relift_types::{
    HitCategory, ScanHit, ASSETS_DIR, CONFIG_DIR, MODELS_CONFIG_FILE, MODELS_DIR,
};

use crate::patterns::CompiledPatterns;

/// Where in the project tree a file lives, precomputed once per file.
#[derive(Debug, Clone)]
pub struct FileContext {
    /// Project-relative path, forward slashes.
    pub rel_path: String,
    in_assets: bool,
    in_config: bool,
    in_models: bool,
    is_models_config: bool,
    /// True when `config/models_1.0.js` exists and pins `connection: null`,
    /// which makes the legacy key in `config/models.js` old news.
    companion_pins_null: bool,
}

impl FileContext {
    pub fn new(rel_path: &str, companion_pins_null: bool) -> Self {
        Self {
            rel_path: rel_path.to_string(),
            in_assets: in_subtree(rel_path, ASSETS_DIR),
            in_config: in_subtree(rel_path, CONFIG_DIR),
            in_models: in_subtree(rel_path, MODELS_DIR),
            is_models_config: rel_path == MODELS_CONFIG_FILE,
            companion_pins_null,
        }
    }
}

fn in_subtree(rel_path: &str, dir: &str) -> bool {
    rel_path
        .strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Evaluate one line against all categories, in their fixed order.
pub fn evaluate_line(
    ctx: &FileContext,
    patterns: &CompiledPatterns,
    line_no: u32,
    line: &str,
    out: &mut Vec<ScanHit>,
) {
    let is_comment = line.trim_start().starts_with("//");

    let mut push = |category, model: Option<String>, method: Option<String>| {
        out.push(ScanHit {
            category,
            path: ctx.rel_path.clone(),
            line: line_no,
            model,
            method,
        });
    };

    // Front-end asset code is not server code: collection mutations and
    // `.save()` there belong to a different API entirely.
    if !ctx.in_assets && patterns.matches_add(line) {
        push(HitCategory::AddCall, None, None);
    }
    // Config files declare settings, they do not call model methods.
    if !ctx.in_config && patterns.matches_remove(line) {
        push(HitCategory::RemoveCall, None, None);
    }
    if !ctx.in_assets && !ctx.in_config && patterns.matches_save(line) {
        push(HitCategory::SaveCall, None, None);
    }
    if !ctx.in_config {
        if let Some((model, method)) = patterns.match_pubsub(line) {
            push(HitCategory::PubsubCall, Some(model), Some(method));
        }
    }

    // Legacy datastore keys only mean anything where Sails reads them.
    let key_location = ctx.in_config || ctx.in_models;
    if key_location && !is_comment && patterns.matches_connections_key(line) {
        push(HitCategory::LegacyConnectionsKey, None, None);
    }
    if key_location && !is_comment && patterns.matches_connection_key(line) {
        let already_migrated = patterns.pins_connection_null(line)
            || (ctx.is_models_config && ctx.companion_pins_null);
        if !already_migrated {
            push(HitCategory::LegacyConnectionKey, None, None);
        }
    }

    if !is_comment && patterns.matches_csrf_route(line) {
        push(HitCategory::CsrfRoute, None, None);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn patterns(attrs: &[&str], models: &[&str]) -> CompiledPatterns {
        let attrs: BTreeSet<String> = attrs.iter().map(|s| s.to_string()).collect();
        let models: BTreeSet<String> = models.iter().map(|s| s.to_string()).collect();
        CompiledPatterns::compile(&attrs, &models).expect("compile")
    }

    fn hits(ctx: &FileContext, p: &CompiledPatterns, line: &str) -> Vec<HitCategory> {
        let mut out = Vec::new();
        evaluate_line(ctx, p, 1, line, &mut out);
        out.into_iter().map(|h| h.category).collect()
    }

    #[test]
    fn add_and_save_are_skipped_under_assets() {
        let p = patterns(&["toys"], &[]);
        let assets = FileContext::new("assets/js/app.js", false);
        let server = FileContext::new("api/controllers/PetController.js", false);

        assert!(hits(&assets, &p, "pet.toys.add(1); pet.save(cb);").is_empty());
        assert_eq!(
            hits(&server, &p, "pet.toys.add(1); pet.save(cb);"),
            vec![HitCategory::AddCall, HitCategory::SaveCall]
        );
    }

    #[test]
    fn remove_save_pubsub_are_skipped_under_config() {
        let p = patterns(&["toys"], &["Pet"]);
        let config = FileContext::new("config/bootstrap.js", false);

        assert!(hits(&config, &p, "pet.toys.remove(1);").is_empty());
        assert!(hits(&config, &p, "pet.save(cb);").is_empty());
        assert!(hits(&config, &p, "Pet.publishUpdate(1, {});").is_empty());
        // add is not config-excluded
        assert_eq!(
            hits(&config, &p, "pet.toys.add(1);"),
            vec![HitCategory::AddCall]
        );
    }

    #[test]
    fn legacy_keys_only_hit_in_config_or_models() {
        let p = patterns(&[], &[]);
        let config = FileContext::new("config/connections.js", false);
        let model = FileContext::new("api/models/Pet.js", false);
        let controller = FileContext::new("api/controllers/PetController.js", false);

        assert_eq!(
            hits(&config, &p, "  connections: {"),
            vec![HitCategory::LegacyConnectionsKey]
        );
        assert_eq!(
            hits(&model, &p, "  connection: 'someMysqlDb',"),
            vec![HitCategory::LegacyConnectionKey]
        );
        assert!(hits(&controller, &p, "  connection: 'someMysqlDb',").is_empty());
    }

    #[test]
    fn commented_legacy_keys_do_not_hit() {
        let p = patterns(&[], &[]);
        let config = FileContext::new("config/models.js", false);
        assert!(hits(&config, &p, "  // connection: 'localDiskDb',").is_empty());
        assert!(hits(&config, &p, "  // connections: {").is_empty());
    }

    #[test]
    fn connection_null_is_already_migrated() {
        let p = patterns(&[], &[]);
        let model = FileContext::new("api/models/Pet.js", false);
        assert!(hits(&model, &p, "  connection: null,").is_empty());
    }

    #[test]
    fn companion_pin_suppresses_models_config_only() {
        let p = patterns(&[], &[]);
        let models_config = FileContext::new("config/models.js", true);
        let other_config = FileContext::new("config/local.js", true);

        assert!(hits(&models_config, &p, "  connection: 'localDiskDb',").is_empty());
        assert_eq!(
            hits(&other_config, &p, "  connection: 'localDiskDb',"),
            vec![HitCategory::LegacyConnectionKey]
        );
    }

    #[test]
    fn csrf_route_hits_anywhere_except_comments() {
        let p = patterns(&[], &[]);
        let routes = FileContext::new("config/routes.js", false);
        let view = FileContext::new("views/homepage.ejs", false);

        assert_eq!(
            hits(&routes, &p, "  'GET /csrfToken': 'SecurityController.grantToken',"),
            vec![HitCategory::CsrfRoute]
        );
        assert_eq!(
            hits(&view, &p, "$.get('/csrfToken', function (data) {"),
            vec![HitCategory::CsrfRoute]
        );
        assert!(hits(&routes, &p, "  // 'GET /csrfToken': 'x',").is_empty());
    }

    #[test]
    fn subtree_check_is_path_component_aware() {
        let p = patterns(&["toys"], &[]);
        // "assets-old" is not the assets directory
        let not_assets = FileContext::new("assets-old/js/app.js", false);
        assert_eq!(
            hits(&not_assets, &p, "pet.toys.add(1);"),
            vec![HitCategory::AddCall]
        );
        // a file literally named "config" has no subtree
        let not_config = FileContext::new("configure.js", false);
        assert_eq!(
            hits(&not_config, &p, "pet.save(cb);"),
            vec![HitCategory::SaveCall]
        );
    }

    #[test]
    fn hits_carry_path_and_line() {
        let p = patterns(&[], &["Pet"]);
        let ctx = FileContext::new("api/controllers/PetController.js", false);
        let mut out = Vec::new();
        evaluate_line(&ctx, &p, 42, "Pet.publishUpdate(1, {});", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "api/controllers/PetController.js");
        assert_eq!(out[0].line, 42);
        assert_eq!(out[0].model.as_deref(), Some("Pet"));
        assert_eq!(out[0].method.as_deref(), Some("publishUpdate"));
    }
}
