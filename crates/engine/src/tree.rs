//! Node, parser, and query traits implemented by the host's engine binding.

use std::fmt;

use kstring::KString;
use thiserror::Error;

use crate::Range;

/// Identifier of a language definition understood by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrammarId(KString);

impl GrammarId {
	pub fn new(name: &str) -> Self {
		Self(KString::from_ref(name))
	}

	pub fn as_str(&self) -> &str {
		self.0.as_str()
	}
}

impl fmt::Display for GrammarId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.0.as_str())
	}
}

impl From<&str> for GrammarId {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

/// Immutable, position-addressed view into a parse tree.
///
/// Handles are cheap to clone but die at the next reparse: consumers must
/// re-fetch nodes after any document edit and never cache them across edits.
pub trait SyntaxNode: Clone + PartialEq {
	fn start(&self) -> u32;
	fn end(&self) -> u32;
	fn kind(&self) -> &str;
	/// Field name this node occupies in its parent, if any.
	fn field_name(&self) -> Option<&str>;
	fn parent(&self) -> Option<Self>;
	fn child(&self, i: usize) -> Option<Self>;
	fn child_count(&self) -> usize;
	fn next_sibling(&self) -> Option<Self>;
	fn prev_sibling(&self) -> Option<Self>;
	/// First child extending at or beyond `pos`, if any.
	fn first_child_for_byte(&self, pos: u32) -> Option<Self>;

	fn range(&self) -> Range {
		Range::new(self.start(), self.end())
	}
}

/// A parser instance bound to one grammar and one included-range list.
///
/// A parser with no included ranges set is scoped to the whole document by
/// convention. Within one parser the included-range list is always sorted
/// and non-overlapping.
pub trait SyntaxParser {
	type Node: SyntaxNode;

	fn grammar(&self) -> &GrammarId;
	fn root(&self) -> Self::Node;
	fn set_included_ranges(&mut self, ranges: &[Range]);
	fn included_ranges(&self) -> Vec<Range>;
}

/// A `(capture name, node)` pair produced by a query match.
#[derive(Debug, Clone)]
pub struct QueryCapture<N> {
	pub name: KString,
	pub node: N,
}

/// A compiled query, executable against any node of its grammar.
pub trait CompiledQuery {
	type Node: SyntaxNode;

	/// Captures under `node`, optionally restricted to matches whose
	/// enclosing pattern intersects `window`. Note that a captured node may
	/// itself lie outside the window when a sibling part of its pattern
	/// intersects it.
	fn captures(&self, node: &Self::Node, window: Option<Range>) -> Vec<QueryCapture<Self::Node>>;
}

/// Shape sample of a subtree, used for degeneracy detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
	pub max_depth: u32,
	pub max_width: u32,
}

/// The native parsing engine, scoped to one document.
pub trait SyntaxEngine {
	type Node: SyntaxNode;
	type Parser: SyntaxParser<Node = Self::Node>;
	type Query: CompiledQuery<Node = Self::Node>;

	fn create_parser(&self, grammar: &GrammarId) -> Result<Self::Parser, EngineError>;
	fn compile_query(&self, grammar: &GrammarId, pattern: &str) -> Result<Self::Query, QueryError>;
	fn subtree_stats(&self, node: &Self::Node) -> TreeStats;
}

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
	/// The engine has no grammar under this id and cannot load one.
	#[error("no grammar available for `{0}`")]
	UnknownGrammar(GrammarId),
}

/// A query pattern the engine rejected.
#[derive(Debug, Error)]
#[error("invalid query pattern at offset {offset}: {message}")]
pub struct QueryError {
	pub pattern: String,
	pub offset: usize,
	pub message: String,
}
