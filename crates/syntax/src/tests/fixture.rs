//! Hand-built engine used by the unit tests.
//!
//! Trees are declared as literal node specs, parsers read from a shared
//! per-grammar slot so a test can swap a grammar's tree mid-test, and
//! queries understand the `(kind) @capture` subset the tests need.

use std::cell::RefCell;
use std::rc::Rc;

use arbor_engine::{
	CompiledQuery, EngineError, GrammarId, QueryCapture, QueryError, Range, SyntaxEngine, SyntaxNode,
	SyntaxParser, TreeStats,
};
use kstring::KString;
use rustc_hash::FxHashMap;

/// Literal description of one node and its subtree.
pub struct NodeSpec {
	kind: String,
	field: Option<String>,
	start: u32,
	end: u32,
	children: Vec<NodeSpec>,
}

pub fn node(kind: &str, start: u32, end: u32, children: Vec<NodeSpec>) -> NodeSpec {
	NodeSpec { kind: kind.to_owned(), field: None, start, end, children }
}

pub fn leaf(kind: &str, start: u32, end: u32) -> NodeSpec {
	node(kind, start, end, Vec::new())
}

/// Attaches the field name a node occupies in its parent.
pub fn field(name: &str, mut spec: NodeSpec) -> NodeSpec {
	spec.field = Some(name.to_owned());
	spec
}

struct NodeData {
	kind: String,
	field: Option<String>,
	start: u32,
	end: u32,
	parent: Option<usize>,
	children: Vec<usize>,
}

/// Immutable arena-backed tree.
pub struct Tree {
	nodes: Vec<NodeData>,
}

impl Tree {
	fn build(spec: NodeSpec) -> Self {
		let mut tree = Tree { nodes: Vec::new() };
		tree.add(spec, None);
		tree
	}

	fn add(&mut self, spec: NodeSpec, parent: Option<usize>) -> usize {
		let idx = self.nodes.len();
		self.nodes.push(NodeData {
			kind: spec.kind,
			field: spec.field,
			start: spec.start,
			end: spec.end,
			parent,
			children: Vec::new(),
		});
		for child in spec.children {
			let child_idx = self.add(child, Some(idx));
			self.nodes[idx].children.push(child_idx);
		}
		idx
	}
}

#[derive(Clone)]
pub struct TestNode {
	tree: Rc<Tree>,
	idx: usize,
}

impl TestNode {
	fn data(&self) -> &NodeData {
		&self.tree.nodes[self.idx]
	}

	fn at(&self, idx: usize) -> Self {
		Self { tree: self.tree.clone(), idx }
	}

	fn sibling(&self, offset: isize) -> Option<Self> {
		let parent = &self.tree.nodes[self.data().parent?];
		let my_slot = parent.children.iter().position(|&c| c == self.idx)?;
		let slot = my_slot.checked_add_signed(offset)?;
		parent.children.get(slot).map(|&c| self.at(c))
	}
}

impl PartialEq for TestNode {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.tree, &other.tree) && self.idx == other.idx
	}
}

impl std::fmt::Debug for TestNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "({} {:?})", self.data().kind, self.range())
	}
}

impl SyntaxNode for TestNode {
	fn start(&self) -> u32 {
		self.data().start
	}

	fn end(&self) -> u32 {
		self.data().end
	}

	fn kind(&self) -> &str {
		&self.data().kind
	}

	fn field_name(&self) -> Option<&str> {
		self.data().field.as_deref()
	}

	fn parent(&self) -> Option<Self> {
		self.data().parent.map(|p| self.at(p))
	}

	fn child(&self, i: usize) -> Option<Self> {
		self.data().children.get(i).map(|&c| self.at(c))
	}

	fn child_count(&self) -> usize {
		self.data().children.len()
	}

	fn next_sibling(&self) -> Option<Self> {
		self.sibling(1)
	}

	fn prev_sibling(&self) -> Option<Self> {
		self.sibling(-1)
	}

	fn first_child_for_byte(&self, pos: u32) -> Option<Self> {
		self.data()
			.children
			.iter()
			.find(|&&c| self.tree.nodes[c].end > pos)
			.map(|&c| self.at(c))
	}
}

type TreeSlot = Rc<RefCell<Rc<Tree>>>;

pub struct TestParser {
	grammar: GrammarId,
	slot: TreeSlot,
	ranges: Vec<Range>,
}

impl SyntaxParser for TestParser {
	type Node = TestNode;

	fn grammar(&self) -> &GrammarId {
		&self.grammar
	}

	fn root(&self) -> TestNode {
		TestNode { tree: self.slot.borrow().clone(), idx: 0 }
	}

	fn set_included_ranges(&mut self, ranges: &[Range]) {
		self.ranges = ranges.to_vec();
	}

	fn included_ranges(&self) -> Vec<Range> {
		self.ranges.clone()
	}
}

/// Query over the `(kind) @capture` pattern subset.
#[derive(Debug)]
pub struct TestQuery {
	patterns: Vec<(String, KString)>,
}

impl TestQuery {
	fn parse(pattern: &str) -> Result<Self, QueryError> {
		let err = |offset: usize, message: &str| QueryError {
			pattern: pattern.to_owned(),
			offset,
			message: message.to_owned(),
		};
		let bytes = pattern.as_bytes();
		let mut patterns = Vec::new();
		let mut i = 0;
		while i < bytes.len() {
			if bytes[i].is_ascii_whitespace() {
				i += 1;
				continue;
			}
			if bytes[i] != b'(' {
				return Err(err(i, "expected `(`"));
			}
			let close = pattern[i..].find(')').ok_or_else(|| err(i, "unclosed `(`"))? + i;
			let kind = pattern[i + 1..close].trim().to_owned();
			if kind.is_empty() {
				return Err(err(i, "empty node kind"));
			}
			i = close + 1;
			while i < bytes.len() && bytes[i].is_ascii_whitespace() {
				i += 1;
			}
			if i >= bytes.len() || bytes[i] != b'@' {
				return Err(err(i, "expected `@capture`"));
			}
			i += 1;
			let start = i;
			while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
				i += 1;
			}
			if start == i {
				return Err(err(start, "empty capture name"));
			}
			patterns.push((kind.clone(), KString::from_ref(&pattern[start..i])));
		}
		Ok(Self { patterns })
	}
}

impl CompiledQuery for TestQuery {
	type Node = TestNode;

	fn captures(&self, node: &TestNode, window: Option<Range>) -> Vec<QueryCapture<TestNode>> {
		// A match is considered inside the window if the captured node or its
		// parent intersects it, mirroring how a real engine returns captures
		// whose enclosing pattern straddles the window boundary.
		let in_window = |n: &TestNode| match window {
			None => true,
			Some(w) => {
				n.range().intersects(w) || n.parent().is_some_and(|p| p.range().intersects(w))
			}
		};
		let mut out = Vec::new();
		let mut stack = vec![node.clone()];
		while let Some(n) = stack.pop() {
			for (kind, name) in &self.patterns {
				if n.kind() == kind && in_window(&n) {
					out.push(QueryCapture { name: name.clone(), node: n.clone() });
				}
			}
			for i in (0..n.child_count()).rev() {
				if let Some(child) = n.child(i) {
					stack.push(child);
				}
			}
		}
		out
	}
}

/// Engine over a table of literal trees, one per grammar. Clones share the
/// tree slots, so a cloned handle can swap trees under a live engine.
#[derive(Clone)]
pub struct TestEngine {
	trees: FxHashMap<GrammarId, TreeSlot>,
}

impl TestEngine {
	pub fn new() -> Self {
		Self { trees: FxHashMap::default() }
	}

	/// Installs or replaces a grammar's tree. Live parsers of the grammar see
	/// the replacement on their next `root()` call.
	pub fn set_tree(&mut self, grammar: &str, spec: NodeSpec) {
		let tree = Rc::new(Tree::build(spec));
		match self.trees.get(&GrammarId::new(grammar)) {
			Some(slot) => *slot.borrow_mut() = tree,
			None => {
				self.trees
					.insert(GrammarId::new(grammar), Rc::new(RefCell::new(tree)));
			}
		}
	}
}

impl SyntaxEngine for TestEngine {
	type Node = TestNode;
	type Parser = TestParser;
	type Query = TestQuery;

	fn create_parser(&self, grammar: &GrammarId) -> Result<TestParser, EngineError> {
		let slot = self
			.trees
			.get(grammar)
			.ok_or_else(|| EngineError::UnknownGrammar(grammar.clone()))?;
		Ok(TestParser { grammar: grammar.clone(), slot: slot.clone(), ranges: Vec::new() })
	}

	fn compile_query(&self, _grammar: &GrammarId, pattern: &str) -> Result<TestQuery, QueryError> {
		TestQuery::parse(pattern)
	}

	fn subtree_stats(&self, node: &TestNode) -> TreeStats {
		fn walk(node: &TestNode, depth: u32, stats: &mut TreeStats) {
			stats.max_depth = stats.max_depth.max(depth);
			stats.max_width = stats.max_width.max(node.child_count() as u32);
			for i in 0..node.child_count() {
				if let Some(child) = node.child(i) {
					walk(&child, depth + 1, stats);
				}
			}
		}
		let mut stats = TreeStats { max_depth: 0, max_width: 0 };
		walk(node, 0, &mut stats);
		stats
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn query_parser_rejects_malformed_patterns() {
		assert!(TestQuery::parse("(kw) @keyword (str) @string").is_ok());
		assert_eq!(TestQuery::parse("kw @keyword").unwrap_err().offset, 0);
		assert_eq!(TestQuery::parse("(kw) keyword").unwrap_err().offset, 5);
		assert!(TestQuery::parse("(kw").is_err());
	}

	#[test]
	fn first_child_for_byte_skips_earlier_children() {
		let mut engine = TestEngine::new();
		engine.set_tree("g", node("root", 0, 30, vec![leaf("a", 0, 10), leaf("b", 10, 20)]));
		let root = engine.create_parser(&GrammarId::new("g")).unwrap().root();
		assert_eq!(root.first_child_for_byte(5).unwrap().kind(), "a");
		assert_eq!(root.first_child_for_byte(10).unwrap().kind(), "b");
		assert_eq!(root.first_child_for_byte(25), None);
	}
}
