//! Named "thing" predicates and positional lookup primitives.
//!
//! A thing is a predicate-defined category of node ("statement", "comment",
//! "defun") used by structural navigation. Predicates are declared as data,
//! compiled once per table install, and evaluated against nodes without any
//! further allocation.

use arbor_engine::{GrammarId, SyntaxNode};
use kstring::KString;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::SyntaxError;

/// Declarative predicate over a node, compiled by [`Thing::compile`].
pub enum ThingExpr<N> {
	/// Node kind matches this pattern. Anchored: the pattern must cover the
	/// whole kind string, so `"if_statement|while_statement"` works as
	/// expected.
	Kind(String),
	/// Arbitrary host-supplied classifier.
	Func(Box<dyn Fn(&N) -> bool>),
	All(Vec<ThingExpr<N>>),
	Any(Vec<ThingExpr<N>>),
	Not(Box<ThingExpr<N>>),
}

impl<N> ThingExpr<N> {
	pub fn kind(pattern: &str) -> Self {
		Self::Kind(pattern.to_owned())
	}

	pub fn func(f: impl Fn(&N) -> bool + 'static) -> Self {
		Self::Func(Box::new(f))
	}
}

enum Compiled<N> {
	Kind(Regex),
	Func(Box<dyn Fn(&N) -> bool>),
	All(Vec<Compiled<N>>),
	Any(Vec<Compiled<N>>),
	Not(Box<Compiled<N>>),
}

/// A compiled thing predicate.
pub struct Thing<N> {
	expr: Compiled<N>,
}

impl<N: SyntaxNode> Thing<N> {
	pub fn compile(expr: ThingExpr<N>) -> Result<Self, SyntaxError> {
		Ok(Self { expr: compile(expr)? })
	}

	pub fn matches(&self, node: &N) -> bool {
		eval(&self.expr, node)
	}
}

fn compile<N>(expr: ThingExpr<N>) -> Result<Compiled<N>, SyntaxError> {
	Ok(match expr {
		ThingExpr::Kind(pattern) => {
			let regex = Regex::new(&format!("^(?:{pattern})$"))
				.map_err(|e| SyntaxError::Config(format!("bad kind pattern `{pattern}`: {e}")))?;
			Compiled::Kind(regex)
		}
		ThingExpr::Func(f) => Compiled::Func(f),
		ThingExpr::All(exprs) => Compiled::All(exprs.into_iter().map(compile).collect::<Result<_, _>>()?),
		ThingExpr::Any(exprs) => Compiled::Any(exprs.into_iter().map(compile).collect::<Result<_, _>>()?),
		ThingExpr::Not(expr) => Compiled::Not(Box::new(compile(*expr)?)),
	})
}

fn eval<N: SyntaxNode>(expr: &Compiled<N>, node: &N) -> bool {
	match expr {
		Compiled::Kind(regex) => regex.is_match(node.kind()),
		Compiled::Func(f) => f(node),
		Compiled::All(exprs) => exprs.iter().all(|e| eval(e, node)),
		Compiled::Any(exprs) => exprs.iter().any(|e| eval(e, node)),
		Compiled::Not(expr) => !eval(expr, node),
	}
}

/// Per-grammar table of named thing predicates, installed once per session.
pub struct ThingTable<N> {
	map: FxHashMap<GrammarId, FxHashMap<KString, Thing<N>>>,
}

impl<N: SyntaxNode> ThingTable<N> {
	pub fn new() -> Self {
		Self { map: FxHashMap::default() }
	}

	pub fn define(
		&mut self,
		grammar: &GrammarId,
		name: &str,
		expr: ThingExpr<N>,
	) -> Result<(), SyntaxError> {
		let thing = Thing::compile(expr)?;
		self.map
			.entry(grammar.clone())
			.or_default()
			.insert(KString::from_ref(name), thing);
		Ok(())
	}

	pub fn get(&self, grammar: &GrammarId, name: &str) -> Option<&Thing<N>> {
		self.map.get(grammar)?.get(name)
	}
}

impl<N: SyntaxNode> Default for ThingTable<N> {
	fn default() -> Self {
		Self::new()
	}
}

/// Smallest node whose span contains `pos`, reached by repeated descent.
pub(crate) fn descend_to<N: SyntaxNode>(root: &N, pos: u32) -> N {
	let mut node = root.clone();
	loop {
		match node.first_child_for_byte(pos) {
			Some(child) if child.start() <= pos => node = child,
			_ => return node,
		}
	}
}

/// Smallest matching node enclosing `pos`: `start <= pos` (`<` when
/// `strict`) and `end > pos`.
pub fn thing_at<N: SyntaxNode>(root: &N, pos: u32, thing: &Thing<N>, strict: bool) -> Option<N> {
	let mut node = Some(descend_to(root, pos));
	while let Some(n) = node {
		let encloses = if strict { n.start() < pos } else { n.start() <= pos };
		if encloses && n.end() > pos && thing.matches(&n) {
			return Some(n);
		}
		node = n.parent();
	}
	None
}

/// Nearest matching node entirely after `pos` (`start >= pos`), outermost
/// first on ties.
pub fn thing_next<N: SyntaxNode>(root: &N, pos: u32, thing: &Thing<N>) -> Option<N> {
	// preorder visits nodes in start order, so the first hit is the nearest
	if root.range().is_empty() || root.end() < pos {
		return None;
	}
	if root.start() >= pos && thing.matches(root) {
		return Some(root.clone());
	}
	for i in 0..root.child_count() {
		if let Some(found) = root.child(i).and_then(|c| thing_next(&c, pos, thing)) {
			return Some(found);
		}
	}
	None
}

/// Nearest matching node entirely before `pos` (`end <= pos`), outermost
/// first on ties.
pub fn thing_prev<N: SyntaxNode>(root: &N, pos: u32, thing: &Thing<N>) -> Option<N> {
	// parent-then-children-reversed visits nodes in decreasing end order
	if root.range().is_empty() || root.start() > pos {
		return None;
	}
	if root.end() <= pos && thing.matches(root) {
		return Some(root.clone());
	}
	for i in (0..root.child_count()).rev() {
		if let Some(found) = root.child(i).and_then(|c| thing_prev(&c, pos, thing)) {
			return Some(found);
		}
	}
	None
}

/// Whether any strict descendant of `node` matches.
pub(crate) fn contains_matching_descendant<N: SyntaxNode>(node: &N, thing: &Thing<N>) -> bool {
	for i in 0..node.child_count() {
		if let Some(child) = node.child(i) {
			if thing.matches(&child) || contains_matching_descendant(&child, thing) {
				return true;
			}
		}
	}
	false
}
