//! Model fact extraction.
//!
//! Sails model files are CommonJS modules, so they cannot be loaded the way
//! the target app loads them. Facts are recovered with the same
//! line-oriented sweep the scanner uses: comments and string contents are
//! masked out, brace depth is tracked, and attribute declarations are
//! recognized by shape. Good enough for the conventional one-declaration-
//! per-line layout of generated Sails models; anything the sweep cannot
//! balance aborts the extraction rather than feeding partial facts to the
//! scanner.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use relift_types::{AttributeSpec, ModelDefinition, DEPRECATED_VALIDATIONS};

#[derive(Debug, thiserror::Error)]
pub enum ModelParseError {
    #[error("attributes block is never closed")]
    UnclosedAttributes,
}

fn re_global_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"globalId\s*:\s*['"]([^'"]+)['"]"#).expect("static regex should compile")
    })
}

fn re_top_connection() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:connection|datastore)\s*:").expect("static regex should compile")
    })
}

fn re_quoted_value() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("static regex should compile"))
}

fn re_attributes_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*attributes\s*:\s*\{").expect("static regex should compile")
    })
}

fn re_attr_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*['"]?([A-Za-z_$][A-Za-z0-9_$]*)['"]?\s*:\s*(.*)$"#)
            .expect("static regex should compile")
    })
}

fn re_method_shorthand() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:async\s+)?([A-Za-z_$][A-Za-z0-9_$]*)\s*\([^)]*\)\s*\{")
            .expect("static regex should compile")
    })
}

fn re_function_value() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|[A-Za-z_$][A-Za-z0-9_$]*\s*=>)")
            .expect("static regex should compile")
    })
}

fn re_descriptor_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"['"]?([A-Za-z_$][A-Za-z0-9_$]*)['"]?\s*:"#)
            .expect("static regex should compile")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrKind {
    Descriptor,
    Function,
    Plain,
}

struct OpenAttr {
    spec: AttributeSpec,
    kind: AttrKind,
}

/// Parse one model file's source text.
///
/// `stem` is the file name without extension; it supplies the display name
/// when the module declares no explicit `globalId`.
pub fn parse_model_source(stem: &str, source: &str) -> Result<ModelDefinition, ModelParseError> {
    let mut model = ModelDefinition {
        global_id: capitalize(stem),
        ..ModelDefinition::default()
    };

    let mut in_block_comment = false;
    let mut depth: i32 = 0;
    let mut attrs_entry_depth: Option<i32> = None;
    let mut open_attr: Option<OpenAttr> = None;

    for raw in source.lines() {
        let masked = mask_line(raw, &mut in_block_comment);

        match attrs_entry_depth {
            None => {
                if let Some(caps) = re_global_id().captures(raw) {
                    model.global_id = caps[1].to_string();
                }
                if depth == 1 && re_top_connection().is_match(&masked) {
                    if let Some(caps) = re_quoted_value().captures(raw) {
                        model.connection = Some(caps[1].to_string());
                    }
                }
                if depth >= 1 && re_attributes_open().is_match(&masked) {
                    attrs_entry_depth = Some(depth + 1);
                }
                let (end_depth, _) = walk_braces(&masked, depth, None);
                depth = end_depth;
                if let Some(entry) = attrs_entry_depth {
                    // `attributes: {}` on one line
                    if depth < entry {
                        attrs_entry_depth = None;
                    }
                }
            }
            Some(entry) => {
                let mut collect_at = None;

                if let Some(open) = &open_attr {
                    if open.kind == AttrKind::Descriptor {
                        collect_at = Some(entry + 1);
                    }
                } else if depth == entry {
                    if let Some(started) = start_attribute(&masked) {
                        if started.kind == AttrKind::Descriptor {
                            collect_at = Some(entry + 1);
                        }
                        open_attr = Some(started);
                    }
                }

                let (end_depth, keys) = walk_braces(&masked, depth, collect_at);
                depth = end_depth;

                if let Some(open) = &mut open_attr {
                    for key in keys {
                        if key == "collection" {
                            open.spec.is_collection = true;
                        }
                        open.spec.validation_keys.insert(key);
                    }
                    let finished = match open.kind {
                        AttrKind::Plain => true,
                        AttrKind::Descriptor | AttrKind::Function => depth <= entry,
                    };
                    if finished {
                        let committed = open_attr.take().map(|o| o.spec);
                        if let Some(spec) = committed {
                            model.attributes.insert(spec.name.clone(), spec);
                        }
                    }
                }

                if depth < entry {
                    attrs_entry_depth = None;
                }
            }
        }
    }

    if attrs_entry_depth.is_some() || open_attr.is_some() {
        return Err(ModelParseError::UnclosedAttributes);
    }

    Ok(model)
}

/// Recognize the start of an attribute declaration on a masked line.
fn start_attribute(masked: &str) -> Option<OpenAttr> {
    if let Some(caps) = re_attr_key().captures(masked) {
        let name = caps[1].to_string();
        let rest = caps[2].trim_start();
        let kind = if re_function_value().is_match(rest) {
            AttrKind::Function
        } else if rest.starts_with('{') {
            AttrKind::Descriptor
        } else {
            AttrKind::Plain
        };
        return Some(OpenAttr {
            spec: AttributeSpec {
                name,
                is_function: kind == AttrKind::Function,
                ..AttributeSpec::default()
            },
            kind,
        });
    }

    // ES2015 method shorthand: `fullName() { ... }`
    if let Some(caps) = re_method_shorthand().captures(masked) {
        return Some(OpenAttr {
            spec: AttributeSpec {
                name: caps[1].to_string(),
                is_function: true,
                ..AttributeSpec::default()
            },
            kind: AttrKind::Function,
        });
    }

    None
}

/// Walk a masked line: update brace depth and, when `collect_at` is set,
/// collect `key:` tokens from the segments that sit at that depth.
fn walk_braces(masked: &str, start_depth: i32, collect_at: Option<i32>) -> (i32, Vec<String>) {
    let mut depth = start_depth;
    let mut keys = Vec::new();
    let mut segment = String::new();

    let flush = |segment: &mut String, keys: &mut Vec<String>| {
        for caps in re_descriptor_key().captures_iter(segment) {
            keys.push(caps[1].to_string());
        }
        segment.clear();
    };

    for ch in masked.chars() {
        match ch {
            '{' => {
                if Some(depth) == collect_at {
                    flush(&mut segment, &mut keys);
                }
                depth += 1;
            }
            '}' => {
                if Some(depth) == collect_at {
                    flush(&mut segment, &mut keys);
                }
                depth -= 1;
            }
            _ => {
                if Some(depth) == collect_at {
                    segment.push(ch);
                }
            }
        }
    }
    if Some(depth) == collect_at {
        flush(&mut segment, &mut keys);
    }

    (depth, keys)
}

/// Blank out string contents and comments so brace counting and key
/// recognition only see structure.
fn mask_line(line: &str, in_block_comment: &mut bool) -> String {
    blank_strings(&strip_comments(line, in_block_comment))
}

/// Drop `//` and `/* */` comments, keeping string contents intact.
/// String-aware so `'http://x'` is not mistaken for a comment.
/// Template literals are treated as single-line, which is the usual
/// shape in config and model files.
pub(crate) fn strip_comments(line: &str, in_block_comment: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if *in_block_comment {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_block_comment = false;
            }
            continue;
        }
        match ch {
            '/' if chars.peek() == Some(&'/') => break,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                *in_block_comment = true;
            }
            '\'' | '"' | '`' => {
                out.push(ch);
                let quote = ch;
                while let Some(c) = chars.next() {
                    out.push(c);
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                        continue;
                    }
                    if c == quote {
                        break;
                    }
                }
            }
            _ => out.push(ch),
        }
    }

    out
}

/// Blank out string contents (quotes stay) on a comment-free line.
pub(crate) fn blank_strings(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                out.push(ch);
                let quote = ch;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        chars.next();
                        continue;
                    }
                    if c == quote {
                        out.push(quote);
                        break;
                    }
                }
            }
            _ => out.push(ch),
        }
    }

    out
}

fn capitalize(stem: &str) -> String {
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// A model attribute that still uses retired validation keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedValidation {
    pub model: String,
    pub attribute: String,
    /// Only the keys that intersect the deprecated table, sorted.
    pub keys: Vec<String>,
}

/// Aggregated facts over every loaded model, derived once before scanning.
#[derive(Debug, Clone, Default)]
pub struct ModelFacts {
    pub models: BTreeMap<String, ModelDefinition>,
}

impl ModelFacts {
    pub fn from_models(models: BTreeMap<String, ModelDefinition>) -> Self {
        Self { models }
    }

    /// Attribute names declared as collections, across all models.
    pub fn collection_attributes(&self) -> BTreeSet<String> {
        self.models
            .values()
            .flat_map(|m| m.attributes.values())
            .filter(|a| a.is_collection)
            .map(|a| a.name.clone())
            .collect()
    }

    /// Display names of all models.
    pub fn model_names(&self) -> BTreeSet<String> {
        self.models.values().map(|m| m.global_id.clone()).collect()
    }

    /// Models that declare a `toJSON` attribute (reported on their own).
    pub fn to_json_models(&self) -> Vec<String> {
        self.models
            .values()
            .filter(|m| m.attributes.contains_key("toJSON"))
            .map(|m| m.global_id.clone())
            .collect()
    }

    /// Models with function-valued attributes other than `toJSON`.
    pub fn instance_method_models(&self) -> Vec<String> {
        self.models
            .values()
            .filter(|m| {
                m.attributes
                    .values()
                    .any(|a| a.is_function && a.name != "toJSON")
            })
            .map(|m| m.global_id.clone())
            .collect()
    }

    /// Every model/attribute pair whose descriptor keys intersect the
    /// deprecated-validation table, with exactly the intersecting keys.
    pub fn outdated_validations(&self) -> Vec<OutdatedValidation> {
        let mut out = Vec::new();
        for model in self.models.values() {
            for attr in model.attributes.values() {
                let keys: Vec<String> = attr
                    .validation_keys
                    .iter()
                    .filter(|k| DEPRECATED_VALIDATIONS.contains(&k.as_str()))
                    .cloned()
                    .collect();
                if !keys.is_empty() {
                    out.push(OutdatedValidation {
                        model: model.global_id.clone(),
                        attribute: attr.name.clone(),
                        keys,
                    });
                }
            }
        }
        out
    }
}
