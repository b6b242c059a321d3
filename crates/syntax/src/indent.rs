//! Table-driven indentation.
//!
//! A grammar's indentation behavior is an ordered rule list; each rule is a
//! matcher over the line's `(node, parent)` context, an anchor resolving to
//! a document position, and an integer offset added to the anchor's column.
//! The evaluator only dispatches over the tagged expressions, so new presets
//! are new variants plus a resolution arm, nothing else.

use arbor_engine::{Document, GrammarId, Range, SpanId, SyntaxNode};
use kstring::KString;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::SyntaxError;
use crate::things::descend_to;

/// Declarative predicate over a line's context. Kind patterns are anchored,
/// as in thing predicates.
pub enum Matcher<N> {
	NodeKind(String),
	ParentKind(String),
	/// The node occupies this field in its parent.
	FieldIs(String),
	/// No node starts on this line.
	NoNode,
	Always,
	All(Vec<Matcher<N>>),
	Any(Vec<Matcher<N>>),
	Not(Box<Matcher<N>>),
	Func(Box<dyn Fn(Option<&N>, Option<&N>, u32) -> bool>),
}

impl<N> Matcher<N> {
	pub fn node_kind(pattern: &str) -> Self {
		Self::NodeKind(pattern.to_owned())
	}

	pub fn parent_kind(pattern: &str) -> Self {
		Self::ParentKind(pattern.to_owned())
	}

	pub fn field_is(name: &str) -> Self {
		Self::FieldIs(name.to_owned())
	}

	pub fn func(f: impl Fn(Option<&N>, Option<&N>, u32) -> bool + 'static) -> Self {
		Self::Func(Box::new(f))
	}
}

enum CompiledMatcher<N> {
	NodeKind(Regex),
	ParentKind(Regex),
	FieldIs(String),
	NoNode,
	Always,
	All(Vec<CompiledMatcher<N>>),
	Any(Vec<CompiledMatcher<N>>),
	Not(Box<CompiledMatcher<N>>),
	Func(Box<dyn Fn(Option<&N>, Option<&N>, u32) -> bool>),
}

fn compile<N>(matcher: Matcher<N>) -> Result<CompiledMatcher<N>, SyntaxError> {
	let anchored = |pattern: String| {
		Regex::new(&format!("^(?:{pattern})$"))
			.map_err(|e| SyntaxError::Config(format!("bad kind pattern `{pattern}`: {e}")))
	};
	Ok(match matcher {
		Matcher::NodeKind(p) => CompiledMatcher::NodeKind(anchored(p)?),
		Matcher::ParentKind(p) => CompiledMatcher::ParentKind(anchored(p)?),
		Matcher::FieldIs(name) => CompiledMatcher::FieldIs(name),
		Matcher::NoNode => CompiledMatcher::NoNode,
		Matcher::Always => CompiledMatcher::Always,
		Matcher::All(ms) => CompiledMatcher::All(ms.into_iter().map(compile).collect::<Result<_, _>>()?),
		Matcher::Any(ms) => CompiledMatcher::Any(ms.into_iter().map(compile).collect::<Result<_, _>>()?),
		Matcher::Not(m) => CompiledMatcher::Not(Box::new(compile(*m)?)),
		Matcher::Func(f) => CompiledMatcher::Func(f),
	})
}

fn matches<N: SyntaxNode>(
	matcher: &CompiledMatcher<N>,
	node: Option<&N>,
	parent: Option<&N>,
	line_start: u32,
) -> bool {
	match matcher {
		CompiledMatcher::NodeKind(re) => node.is_some_and(|n| re.is_match(n.kind())),
		CompiledMatcher::ParentKind(re) => parent.is_some_and(|p| re.is_match(p.kind())),
		CompiledMatcher::FieldIs(name) => {
			node.and_then(|n| n.field_name()).is_some_and(|f| f == name)
		}
		CompiledMatcher::NoNode => node.is_none(),
		CompiledMatcher::Always => true,
		CompiledMatcher::All(ms) => ms.iter().all(|m| matches(m, node, parent, line_start)),
		CompiledMatcher::Any(ms) => ms.iter().any(|m| matches(m, node, parent, line_start)),
		CompiledMatcher::Not(m) => !matches(m, node, parent, line_start),
		CompiledMatcher::Func(f) => f(node, parent, line_start),
	}
}

/// Maps a matched line context to the document position whose column the
/// offset is added to.
pub enum Anchor<N> {
	/// The parent node's start.
	Parent,
	/// First non-blank column of the line the parent starts on.
	ParentLineStart,
	/// First non-blank column of the line the grandparent starts on.
	GrandparentLineStart,
	/// Start of the node's previous sibling.
	PrevSibling,
	/// Start of the parent's first child.
	FirstSibling,
	/// Start of the nearest ancestor that begins its own line.
	StandaloneParent,
	/// Column zero of the line being indented.
	ColumnZero,
	Func(Box<dyn Fn(&dyn Document, Option<&N>, Option<&N>, u32) -> Option<u32>>),
}

impl<N> Anchor<N> {
	pub fn func(f: impl Fn(&dyn Document, Option<&N>, Option<&N>, u32) -> Option<u32> + 'static) -> Self {
		Self::Func(Box::new(f))
	}
}

fn resolve_anchor<N: SyntaxNode, D: Document>(
	anchor: &Anchor<N>,
	doc: &D,
	node: Option<&N>,
	parent: Option<&N>,
	line_start: u32,
) -> Option<u32> {
	let line_head = |pos: u32| doc.first_non_blank(doc.line_start(pos));
	match anchor {
		Anchor::Parent => Some(parent?.start()),
		Anchor::ParentLineStart => Some(line_head(parent?.start())),
		Anchor::GrandparentLineStart => Some(line_head(parent?.parent()?.start())),
		Anchor::PrevSibling => Some(node?.prev_sibling()?.start()),
		Anchor::FirstSibling => Some(parent?.child(0)?.start()),
		Anchor::StandaloneParent => {
			let mut cursor = parent.cloned();
			while let Some(n) = cursor {
				if line_head(n.start()) == n.start() {
					return Some(n.start());
				}
				cursor = n.parent();
			}
			None
		}
		Anchor::ColumnZero => Some(doc.line_start(line_start)),
		Anchor::Func(f) => f(doc, node, parent, line_start),
	}
}

/// Integer offset, possibly resolved through named variables at evaluation
/// time so hosts can rebind e.g. a basic indent width per document.
#[derive(Debug, Clone)]
pub enum Offset {
	Const(i32),
	Var(KString),
	Sum(Vec<Offset>),
}

impl Offset {
	pub fn var(name: &str) -> Self {
		Self::Var(KString::from_ref(name))
	}

	fn validate(&self, vars: &FxHashMap<KString, i32>) -> Result<(), SyntaxError> {
		match self {
			Self::Const(_) => Ok(()),
			Self::Var(name) => {
				if vars.contains_key(name) {
					Ok(())
				} else {
					Err(SyntaxError::Config(format!("unknown indent variable `{name}`")))
				}
			}
			Self::Sum(offsets) => offsets.iter().try_for_each(|o| o.validate(vars)),
		}
	}

	fn resolve(&self, vars: &FxHashMap<KString, i32>) -> i32 {
		match self {
			Self::Const(v) => *v,
			// validated against the table when the rule was added
			Self::Var(name) => vars.get(name).copied().unwrap_or(0),
			Self::Sum(offsets) => offsets.iter().map(|o| o.resolve(vars)).sum(),
		}
	}
}

struct IndentRule<N> {
	matcher: CompiledMatcher<N>,
	anchor: Anchor<N>,
	offset: Offset,
}

/// Ordered per-grammar rule tables plus the variable bindings offsets may
/// reference.
pub struct IndentEvaluator<N> {
	rules: FxHashMap<GrammarId, Vec<IndentRule<N>>>,
	vars: FxHashMap<KString, i32>,
}

impl<N: SyntaxNode> IndentEvaluator<N> {
	pub fn new() -> Self {
		Self { rules: FxHashMap::default(), vars: FxHashMap::default() }
	}

	pub fn define_var(&mut self, name: &str, value: i32) {
		self.vars.insert(KString::from_ref(name), value);
	}

	/// Rebinds an already defined variable.
	pub fn set_var(&mut self, name: &str, value: i32) -> Result<(), SyntaxError> {
		match self.vars.get_mut(name) {
			Some(slot) => {
				*slot = value;
				Ok(())
			}
			None => Err(SyntaxError::Config(format!("unknown indent variable `{name}`"))),
		}
	}

	/// Appends a rule to `grammar`'s list. Rule order is evaluation order.
	pub fn add_rule(
		&mut self,
		grammar: &GrammarId,
		matcher: Matcher<N>,
		anchor: Anchor<N>,
		offset: Offset,
	) -> Result<(), SyntaxError> {
		offset.validate(&self.vars)?;
		let rule = IndentRule { matcher: compile(matcher)?, anchor, offset };
		self.rules.entry(grammar.clone()).or_default().push(rule);
		Ok(())
	}

	/// `(anchor position, offset)` from the first rule whose matcher accepts,
	/// or `None` when no rule matches and the line is to be left alone.
	pub fn compute<D: Document>(
		&self,
		doc: &D,
		grammar: &GrammarId,
		node: Option<&N>,
		parent: Option<&N>,
		line_start: u32,
	) -> Option<(u32, i32)> {
		let rules = self.rules.get(grammar)?;
		for (idx, rule) in rules.iter().enumerate() {
			if !matches(&rule.matcher, node, parent, line_start) {
				continue;
			}
			trace!(grammar = %grammar, rule = idx, line_start, "indent rule matched");
			return match resolve_anchor(&rule.anchor, doc, node, parent, line_start) {
				Some(anchor) => Some((anchor, rule.offset.resolve(&self.vars))),
				None => {
					warn!(grammar = %grammar, rule = idx, line_start, "indent anchor did not resolve");
					None
				}
			};
		}
		None
	}
}

impl<N: SyntaxNode> Default for IndentEvaluator<N> {
	fn default() -> Self {
		Self::new()
	}
}

/// Tuning knobs for batch indentation.
#[derive(Debug, Clone, Copy)]
pub struct IndentOptions {
	/// Lines per batch; the engine refetches the parse root between batches,
	/// bounding reparses to one per batch instead of one per line.
	pub batch_lines: usize,
}

impl Default for IndentOptions {
	fn default() -> Self {
		Self { batch_lines: 400 }
	}
}

/// Applies evaluator verdicts to document lines.
pub struct IndentEngine<N> {
	evaluator: IndentEvaluator<N>,
	options: IndentOptions,
}

/// One line's precomputed verdict: the line held as a tracked span plus the
/// anchor (also tracked) and offset, if a rule fired.
struct LinePlan {
	line: SpanId,
	verdict: Option<(SpanId, i32)>,
}

impl<N: SyntaxNode> IndentEngine<N> {
	pub fn new(evaluator: IndentEvaluator<N>, options: IndentOptions) -> Self {
		Self { evaluator, options }
	}

	pub fn evaluator(&self) -> &IndentEvaluator<N> {
		&self.evaluator
	}

	pub fn evaluator_mut(&mut self) -> &mut IndentEvaluator<N> {
		&mut self.evaluator
	}

	/// The `(node, parent)` context of the line at `line_start`: the largest
	/// node starting at the line's first non-blank column, or no node and the
	/// innermost enclosing node as parent.
	fn line_context<D: Document>(&self, doc: &D, root: &N, line_start: u32) -> (Option<N>, Option<N>) {
		let head = doc.first_non_blank(line_start);
		let mut node = descend_to(root, head);
		if node.start() != head {
			return (None, Some(node));
		}
		while let Some(parent) = node.parent() {
			if parent.start() != head {
				break;
			}
			node = parent;
		}
		let parent = node.parent();
		(Some(node), parent)
	}

	/// Reindents the line containing `pos`. Returns whether a rule fired.
	pub fn indent_line<D: Document>(
		&self,
		doc: &mut D,
		root: &N,
		grammar: &GrammarId,
		pos: u32,
	) -> bool {
		let line_start = doc.line_start(pos);
		let (node, parent) = self.line_context(doc, root, line_start);
		let verdict =
			self.evaluator
				.compute(doc, grammar, node.as_ref(), parent.as_ref(), line_start);
		match verdict {
			Some((anchor, offset)) => {
				let column = apply_offset(doc.column(anchor), offset);
				doc.set_line_indent(line_start, column);
				true
			}
			None => false,
		}
	}

	/// Reindents every line of `region` in bounded batches. Each batch first
	/// computes every line's verdict against one parse root without touching
	/// the document, then applies the columns through tracked spans, then the
	/// next batch starts from a fresh root.
	pub fn indent_region<D: Document>(
		&self,
		doc: &mut D,
		mut fresh_root: impl FnMut(&D) -> N,
		grammar: &GrammarId,
		region: Range,
	) {
		let region = region.clamp_to(Range::new(0, doc.len()));
		let end_marker = doc.track(Range::point(region.end));
		let mut cursor = doc.line_start(region.start);

		'batches: loop {
			let root = fresh_root(doc);
			let mut plans: Vec<LinePlan> = Vec::new();

			// pass 1: compute, no mutation
			for _ in 0..self.options.batch_lines {
				let end = doc.resolve(end_marker).map_or(region.end, |r| r.start);
				if cursor >= end {
					break;
				}
				let (node, parent) = self.line_context(doc, &root, cursor);
				let verdict = self
					.evaluator
					.compute(doc, grammar, node.as_ref(), parent.as_ref(), cursor)
					.map(|(anchor, offset)| (doc.track(Range::point(anchor)), offset));
				plans.push(LinePlan { line: doc.track(Range::point(cursor)), verdict });

				let next = doc.line_end(cursor) + 1;
				if next > doc.len() {
					break;
				}
				cursor = next;
			}
			if plans.is_empty() {
				break;
			}
			let exhausted = plans.len() < self.options.batch_lines;

			// pass 2: apply through the (possibly shifting) tracked spans
			let mut resume = None;
			for plan in plans {
				let line_start = doc.resolve(plan.line).map(|r| r.start);
				if let Some(line_start) = line_start
					&& let Some((anchor, offset)) = plan.verdict
					&& let Some(anchor_pos) = doc.resolve(anchor)
				{
					let column = apply_offset(doc.column(anchor_pos.start), offset);
					doc.set_line_indent(line_start, column);
				}
				if let Some((anchor, _)) = plan.verdict {
					doc.release(anchor);
				}
				resume = line_start.map(|ls| doc.line_start(ls));
				doc.release(plan.line);
			}

			if exhausted {
				break;
			}
			// continue after the last applied line
			match resume {
				Some(last) => {
					cursor = doc.line_end(last) + 1;
					if cursor > doc.len() {
						break 'batches;
					}
				}
				None => break,
			}
		}
		doc.release(end_marker);
	}
}

fn apply_offset(column: u32, offset: i32) -> u32 {
	column.saturating_add_signed(offset)
}

#[cfg(test)]
mod tests {
	use arbor_engine::{RopeDocument, SyntaxEngine, SyntaxParser};
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::tests::fixture::{TestEngine, TestNode, field, leaf, node};

	// lines: "call(" at 0, "    arg1" at 6, " arg2" at 15, ")" at 21
	const TEXT: &str = "call(\n    arg1\n arg2\n)";

	/// Builds the call-expression tree for the document's current text, the
	/// way a reparse would.
	fn parse(doc: &RopeDocument) -> TestNode {
		let text = doc.contents();
		let find = |pat: &str| text.find(pat).expect("token") as u32;
		let open = find("(");
		let close = find(")");
		let a1 = find("arg1");
		let a2 = find("arg2");
		let len = text.chars().count() as u32;
		let mut engine = TestEngine::new();
		engine.set_tree(
			"lang",
			node("call", 0, len, vec![
				field("callee", leaf("ident", 0, 4)),
				node("args", open, len, vec![
					leaf("open", open, open + 1),
					leaf("arg", a1, a1 + 4),
					leaf("arg", a2, a2 + 4),
					leaf("close", close, close + 1),
				]),
			]),
		);
		engine
			.create_parser(&GrammarId::new("lang"))
			.expect("parser")
			.root()
	}

	fn root() -> TestNode {
		parse(&RopeDocument::new(TEXT))
	}

	fn lang() -> GrammarId {
		GrammarId::new("lang")
	}

	fn arg_rules() -> IndentEvaluator<TestNode> {
		let mut eval = IndentEvaluator::new();
		eval.define_var("indent-width", 2);
		eval.add_rule(
			&lang(),
			Matcher::node_kind("arg"),
			Anchor::ParentLineStart,
			Offset::var("indent-width"),
		)
		.expect("rule");
		eval.add_rule(&lang(), Matcher::node_kind("close"), Anchor::ParentLineStart, Offset::Const(0))
			.expect("rule");
		eval
	}

	#[test]
	fn no_rules_yield_no_verdict() {
		let eval = IndentEvaluator::<TestNode>::new();
		let doc = RopeDocument::new(TEXT);
		assert_eq!(eval.compute(&doc, &lang(), None, None, 0), None);
	}

	#[test]
	fn first_matching_rule_wins() {
		let mut eval = IndentEvaluator::new();
		eval.add_rule(&lang(), Matcher::node_kind("arg"), Anchor::ColumnZero, Offset::Const(7))
			.expect("rule");
		// also matches, but must never fire
		eval.add_rule(&lang(), Matcher::Always, Anchor::ColumnZero, Offset::Const(3))
			.expect("rule");

		let doc = RopeDocument::new(TEXT);
		let root = root();
		let arg = root.child(1).and_then(|args| args.child(1)).expect("arg node");
		let args = root.child(1).expect("args node");
		let verdict = eval.compute(&doc, &lang(), Some(&arg), Some(&args), 6);
		assert_eq!(verdict, Some((6, 7)));
	}

	#[test]
	fn unresolvable_anchor_yields_none() {
		let mut eval = IndentEvaluator::new();
		eval.add_rule(&lang(), Matcher::node_kind("open"), Anchor::PrevSibling, Offset::Const(0))
			.expect("rule");
		let doc = RopeDocument::new(TEXT);
		let root = root();
		let args = root.child(1).expect("args");
		let open = args.child(0).expect("open");
		// `open` has no previous sibling
		assert_eq!(eval.compute(&doc, &lang(), Some(&open), Some(&args), 0), None);
	}

	#[test]
	fn unknown_offset_variable_is_a_config_error() {
		let mut eval = IndentEvaluator::<TestNode>::new();
		let err = eval
			.add_rule(&lang(), Matcher::Always, Anchor::ColumnZero, Offset::var("missing"))
			.unwrap_err();
		assert!(matches!(err, SyntaxError::Config(_)));
		assert!(matches!(eval.set_var("missing", 4), Err(SyntaxError::Config(_))));
	}

	#[test]
	fn matcher_combinators() {
		let root = root();
		let callee = root.child(0).expect("callee");
		let m = compile::<TestNode>(Matcher::All(vec![
			Matcher::field_is("callee"),
			Matcher::parent_kind("call"),
			Matcher::Not(Box::new(Matcher::NoNode)),
		]))
		.expect("compiles");
		assert!(matches(&m, Some(&callee), Some(&root), 0));
		assert!(!matches(&m, None, Some(&root), 0));
	}

	#[test]
	fn indent_line_applies_the_anchored_column() {
		let mut doc = RopeDocument::new(TEXT);
		let engine = IndentEngine::new(arg_rules(), IndentOptions::default());
		// line "    arg1": anchored to the call line's head plus the variable
		let changed = engine.indent_line(&mut doc, &root(), &lang(), 7);
		assert!(changed);
		assert_eq!(doc.contents(), "call(\n  arg1\n arg2\n)");
	}

	#[test]
	fn lines_without_verdict_are_left_alone() {
		let mut doc = RopeDocument::new(TEXT);
		let engine = IndentEngine::new(arg_rules(), IndentOptions::default());
		// the "call(" line matches no rule
		assert!(!engine.indent_line(&mut doc, &root(), &lang(), 0));
		assert_eq!(doc.contents(), TEXT);
	}

	#[test]
	fn line_context_finds_the_line_head_node() {
		let doc = RopeDocument::new(TEXT);
		let engine = IndentEngine::new(IndentEvaluator::new(), IndentOptions::default());
		let root = root();
		// "arg2" starts exactly at its line head
		let (node, parent) = engine.line_context(&doc, &root, 15);
		assert_eq!(node.as_ref().map(|n| n.kind()), Some("arg"));
		assert_eq!(parent.as_ref().map(|n| n.kind()), Some("args"));
		// the ")" line: `close` starts at the head
		let (node, _) = engine.line_context(&doc, &root, 21);
		assert_eq!(node.as_ref().map(|n| n.kind()), Some("close"));
	}

	#[test]
	fn standalone_parent_walks_to_a_line_starting_ancestor() {
		let doc = RopeDocument::new(TEXT);
		let root = root();
		let args = root.child(1).expect("args");
		let arg = args.child(1).expect("arg");
		// args starts mid-line; call starts its own line
		let anchor = resolve_anchor(
			&Anchor::<TestNode>::StandaloneParent,
			&doc,
			Some(&arg),
			Some(&args),
			6,
		);
		assert_eq!(anchor, Some(0));
	}

	#[test]
	fn batch_region_matches_sequential_line_indentation() {
		let engine = IndentEngine::new(arg_rules(), IndentOptions::default());

		// line at a time, refetching the tree after every mutation
		let mut sequential = RopeDocument::new(TEXT);
		for token in ["arg1", "arg2", ")"] {
			let pos = sequential.contents().find(token).expect("token") as u32;
			let root = parse(&sequential);
			engine.indent_line(&mut sequential, &root, &lang(), pos);
		}

		let mut batched = RopeDocument::new(TEXT);
		let len = batched.len();
		engine.indent_region(&mut batched, parse, &lang(), Range::new(0, len));
		assert_eq!(batched.contents(), sequential.contents());
		assert_eq!(batched.contents(), "call(\n  arg1\n  arg2\n)");
	}

	#[test]
	fn tiny_batches_still_cover_the_region() {
		let engine = IndentEngine::new(arg_rules(), IndentOptions { batch_lines: 1 });
		let mut doc = RopeDocument::new(TEXT);
		let len = doc.len();
		engine.indent_region(&mut doc, parse, &lang(), Range::new(0, len));
		assert_eq!(doc.contents(), "call(\n  arg1\n  arg2\n)");
	}
}
