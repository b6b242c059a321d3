//! Adapter surface for a native incremental-parsing engine.
//!
//! The syntax services layer never talks to a concrete parser library.
//! Everything it needs — parser handles scoped to included ranges, immutable
//! node views, compiled queries, subtree statistics — is expressed as the
//! traits in this crate, implemented by the host for whatever engine it
//! embeds. The crate also defines the host document model consumed by the
//! layer: text access plus position-tracking span handles, with a
//! ropey-backed reference implementation.

mod document;
mod range;
mod tree;

pub use document::{Document, RopeDocument, SpanId};
pub use range::{Range, is_sorted_disjoint};
pub use tree::{
	CompiledQuery, EngineError, GrammarId, QueryCapture, QueryError, SyntaxEngine, SyntaxNode,
	SyntaxParser, TreeStats,
};
