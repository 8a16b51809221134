//! Pattern compilation.
//!
//! The fact-dependent patterns are compiled once per run from the loaded
//! model facts. An empty fact set compiles to *no* pattern at all, never to
//! a match-everything wildcard: a project with no collection attributes
//! cannot produce `.add()` hits.

use std::collections::BTreeSet;

use regex::Regex;

use relift_types::PUBSUB_METHODS;

#[derive(Debug, thiserror::Error)]
#[error("failed to compile scan pattern: {0}")]
pub struct PatternCompileError(#[from] regex::Error);

/// All line patterns for one scan, compiled up front.
#[derive(Debug)]
pub struct CompiledPatterns {
    /// `.<collectionAttr>.add(` — None when no collection attributes exist.
    add: Option<Regex>,
    /// `.<collectionAttr>.remove(` — None when no collection attributes exist.
    remove: Option<Regex>,
    /// `.save(` on anything; fact-independent.
    save: Regex,
    /// `<Model>.<pubsubMethod>(` — None when no models exist.
    pubsub: Option<Regex>,
    /// Top-level-ish `connections:` key.
    connections_key: Regex,
    /// Per-model `connection:` key.
    connection_key: Regex,
    /// `connection: null`, which marks an already-migrated declaration.
    connection_null: Regex,
}

impl CompiledPatterns {
    pub fn compile(
        collection_attrs: &BTreeSet<String>,
        model_names: &BTreeSet<String>,
    ) -> Result<Self, PatternCompileError> {
        let add = Self::collection_call(collection_attrs, "add")?;
        let remove = Self::collection_call(collection_attrs, "remove")?;

        let pubsub = if model_names.is_empty() {
            None
        } else {
            let models = alternation(model_names.iter());
            let methods = PUBSUB_METHODS.join("|");
            Some(Regex::new(&format!(r"\b({models})\.({methods})\s*\("))?)
        };

        Ok(Self {
            add,
            remove,
            save: Regex::new(r"\.save\s*\(")?,
            pubsub,
            connections_key: Regex::new(r"\bconnections\s*:")?,
            connection_key: Regex::new(r"\bconnection\s*:")?,
            connection_null: Regex::new(r"\bconnection\s*:\s*null\b")?,
        })
    }

    fn collection_call(
        attrs: &BTreeSet<String>,
        method: &str,
    ) -> Result<Option<Regex>, PatternCompileError> {
        if attrs.is_empty() {
            return Ok(None);
        }
        let names = alternation(attrs.iter());
        Ok(Some(Regex::new(&format!(
            r"\.({names})\.{method}\s*\("
        ))?))
    }

    pub fn matches_add(&self, line: &str) -> bool {
        self.add.as_ref().is_some_and(|re| re.is_match(line))
    }

    pub fn matches_remove(&self, line: &str) -> bool {
        self.remove.as_ref().is_some_and(|re| re.is_match(line))
    }

    pub fn matches_save(&self, line: &str) -> bool {
        self.save.is_match(line)
    }

    /// Returns the matched (model, method) pair, if any.
    pub fn match_pubsub(&self, line: &str) -> Option<(String, String)> {
        let caps = self.pubsub.as_ref()?.captures(line)?;
        Some((caps[1].to_string(), caps[2].to_string()))
    }

    pub fn matches_connections_key(&self, line: &str) -> bool {
        self.connections_key.is_match(line)
    }

    pub fn matches_connection_key(&self, line: &str) -> bool {
        self.connection_key.is_match(line)
    }

    pub fn pins_connection_null(&self, line: &str) -> bool {
        self.connection_null.is_match(line)
    }

    /// `'/csrfToken'` route address, matched as a plain substring.
    pub fn matches_csrf_route(&self, line: &str) -> bool {
        line.contains("/csrfToken")
    }
}

fn alternation<'a>(names: impl Iterator<Item = &'a String>) -> String {
    names
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|")
}
