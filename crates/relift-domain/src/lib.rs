//! Domain logic for relift: extracting facts from Sails model files,
//! compiling line-matching patterns from those facts, and evaluating
//! source lines against the compiled patterns.
//!
//! Everything here is line-oriented, best-effort text matching: no AST,
//! no symbol resolution. Occasional false positives and negatives are an
//! accepted property of the approach; the output is a human-reviewed
//! checklist, not a verdict.

mod evaluate;
mod facts;
mod jsconfig;
mod patterns;

pub use evaluate::{evaluate_line, FileContext};
pub use facts::{parse_model_source, ModelFacts, ModelParseError, OutdatedValidation};
pub use jsconfig::{extract_object_block, scan_top_level_keys};
pub use patterns::{CompiledPatterns, PatternCompileError};
