//! Template index and rewriter.
//!
//! Templates are plain `key=value` files whose values may be placeholders of
//! the form `{#name#}`. When the node `name` changes, the rewriter renders the
//! template with the new value and overwrites the generated file next to it.

pub mod document;
pub mod index;
pub mod rewriter;

pub use document::{placeholder_token, Binding, BindingPos, TemplateDocument};
pub use index::{TemplateIndex, TemplateNaming, TemplateRecord};
pub use rewriter::{AmbiguityPolicy, RewriteOutcome, TemplateRewriter};
