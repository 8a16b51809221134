//! Lenient key scanning for Sails config files.
//!
//! Config files are CommonJS modules exporting one settings dictionary
//! (`module.exports.globals = {...}`). Only top-level `key: value` pairs
//! are recovered; nested structure is skipped by brace tracking. Missing
//! or unparseable structure degrades to fewer keys, never to an error.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::facts::{blank_strings, strip_comments};

fn re_key_value() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*['"]?([A-Za-z_$][A-Za-z0-9_$]*)['"]?\s*:\s*(.*?),?\s*$"#)
            .expect("static regex should compile")
    })
}

/// Collect the top-level `key: value` pairs of a config module.
///
/// Values are the raw source text after the colon, trailing comma
/// stripped; a multi-line value keeps only its first line (enough to
/// tell `false` from `require('lodash')` from `{`).
pub fn scan_top_level_keys(source: &str) -> BTreeMap<String, String> {
    let mut keys = BTreeMap::new();
    let mut in_block_comment = false;
    let mut depth: i32 = 0;

    for raw in source.lines() {
        let stripped = strip_comments(raw, &mut in_block_comment);
        let masked = blank_strings(&stripped);

        if depth == 1 {
            if let Some(caps) = re_key_value().captures(&stripped) {
                // Confirm against the masked line so a key-shaped string
                // literal does not count.
                if re_key_value().is_match(&masked) {
                    keys.insert(caps[1].to_string(), caps[2].trim().to_string());
                }
            }
        }

        for ch in masked.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
    }

    keys
}

/// Lift the raw `{ ... }` block of one top-level key, braces included.
///
/// Used to carry a legacy connection definition over to the new config
/// file verbatim. Returns None when the key is absent or its value is
/// not an object literal.
pub fn extract_object_block(source: &str, key: &str) -> Option<String> {
    let open = Regex::new(&format!(
        r#"^\s*['"]?{}['"]?\s*:\s*\{{"#,
        regex::escape(key)
    ))
    .ok()?;

    let mut in_block_comment = false;
    let mut depth: i32 = 0;
    let mut block: Option<(String, i32)> = None;

    for raw in source.lines() {
        let stripped = strip_comments(raw, &mut in_block_comment);
        let masked = blank_strings(&stripped);

        if block.is_none() && depth == 1 && open.is_match(&masked) {
            let start = raw.find('{')?;
            block = Some((raw[start..].to_string(), depth));
        } else if let Some((text, _)) = &mut block {
            text.push('\n');
            text.push_str(raw);
        }

        for ch in masked.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }

        if let Some((text, entry)) = &block {
            if depth <= *entry {
                // Cut at the closing brace of the block.
                let end = text.rfind('}')?;
                return Some(text[..=end].to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLOBALS_CONFIG: &str = r#"
/**
 * Global variable configuration
 */
module.exports.globals = {
  _: require('lodash'),
  async: false,
  models: true,
  sails: true
};
"#;

    #[test]
    fn collects_top_level_keys_with_raw_values() {
        let keys = scan_top_level_keys(GLOBALS_CONFIG);
        assert_eq!(keys["_"], "require('lodash')");
        assert_eq!(keys["async"], "false");
        assert_eq!(keys["models"], "true");
        assert_eq!(keys["sails"], "true");
    }

    #[test]
    fn nested_keys_are_not_collected() {
        let src = "module.exports.views = {\n  engine: 'jade',\n  locals: {\n    layout: false\n  }\n};\n";
        let keys = scan_top_level_keys(src);
        assert_eq!(keys["engine"], "'jade'");
        assert!(keys.contains_key("locals"));
        assert!(!keys.contains_key("layout"));
    }

    #[test]
    fn commented_keys_are_not_collected() {
        let src = "module.exports.models = {\n  // connection: 'localDiskDb',\n  migrate: 'alter'\n};\n";
        let keys = scan_top_level_keys(src);
        assert!(!keys.contains_key("connection"));
        assert_eq!(keys["migrate"], "'alter'");
    }

    #[test]
    fn extracts_a_connection_block() {
        let src = "module.exports.connections = {\n  someMysqlDb: {\n    adapter: 'sails-mysql',\n    host: 'localhost',\n    port: 3306\n  },\n  unusedDb: {\n    adapter: 'sails-disk'\n  }\n};\n";
        let block = extract_object_block(src, "someMysqlDb").expect("block");
        assert!(block.starts_with('{'));
        assert!(block.ends_with('}'));
        assert!(block.contains("adapter: 'sails-mysql'"));
        assert!(block.contains("port: 3306"));
        assert!(!block.contains("unusedDb"));
    }

    #[test]
    fn extracts_a_single_line_block() {
        let src = "module.exports.connections = {\n  localDiskDb: { adapter: 'sails-disk' },\n};\n";
        let block = extract_object_block(src, "localDiskDb").expect("block");
        assert_eq!(block, "{ adapter: 'sails-disk' }");
    }

    #[test]
    fn missing_key_yields_none() {
        let src = "module.exports.connections = {\n  someDb: { adapter: 'x' }\n};\n";
        assert!(extract_object_block(src, "otherDb").is_none());
    }
}
