//! Range synchronization for embedded-grammar regions.
//!
//! Maintains, per grammar, the document spans its parser is scoped to, and
//! owns the lifecycle of parsers created for injection regions: one shared
//! parser per embedded grammar for non-local rules, one dedicated parser per
//! region for local rules. `synchronize` is idempotent and may be called
//! arbitrarily often without leaking parsers.

use std::collections::hash_map::Entry;

use arbor_engine::{
	CompiledQuery, Document, GrammarId, Range, SpanId, SyntaxEngine, SyntaxNode, SyntaxParser,
	is_sorted_disjoint,
};
use rustc_hash::FxHashMap;
use slab::Slab;
use tracing::{debug, trace};

use crate::config::{RangeRule, RangeRuleKind};
use crate::error::SyntaxError;

/// One dedicated embedded parser serving a single local injection region.
struct LocalBinding<E: SyntaxEngine> {
	rule: usize,
	span: SpanId,
	parser: E::Parser,
	/// Pass stamp; bindings not refreshed by the latest pass over their
	/// region are garbage.
	epoch: u64,
}

pub struct RangeSynchronizer<E: SyntaxEngine> {
	primary: E::Parser,
	rules: Vec<RangeRule<E>>,
	shared: FxHashMap<GrammarId, E::Parser>,
	locals: Slab<LocalBinding<E>>,
	epoch: u64,
}

impl<E: SyntaxEngine> RangeSynchronizer<E> {
	/// Creates the synchronizer and the primary parser for `grammar`. The
	/// primary parser keeps whole-document scope by convention; rules must
	/// name `grammar` as their host.
	pub fn new(engine: &E, grammar: &GrammarId, rules: Vec<RangeRule<E>>) -> Result<Self, SyntaxError> {
		if let Some(rule) = rules.iter().find(|r| r.host() != grammar) {
			return Err(SyntaxError::Config(format!(
				"range rule hosted by `{}` installed on a `{grammar}` synchronizer",
				rule.host()
			)));
		}
		let primary = engine.create_parser(grammar)?;
		Ok(Self {
			primary,
			rules,
			shared: FxHashMap::default(),
			locals: Slab::new(),
			epoch: 0,
		})
	}

	pub fn grammar(&self) -> &GrammarId {
		self.primary.grammar()
	}

	pub fn primary(&self) -> &E::Parser {
		&self.primary
	}

	/// Current pass counter.
	pub fn epoch(&self) -> u64 {
		self.epoch
	}

	/// Parser responsible for `grammar`: the primary or a shared embedded
	/// parser. Absence is a [`SyntaxError::MissingParser`], distinct from the
	/// non-error "no node here" outcome.
	pub fn parser_for(&self, grammar: &GrammarId) -> Result<&E::Parser, SyntaxError> {
		if self.primary.grammar() == grammar {
			return Ok(&self.primary);
		}
		self.shared
			.get(grammar)
			.ok_or_else(|| SyntaxError::MissingParser(grammar.clone()))
	}

	/// All parsers (primary, shared, and local) whose scope intersects
	/// `region`. The primary spans the whole document and is always included.
	pub fn parsers_intersecting(&self, region: Range) -> Vec<&E::Parser> {
		let mut out = vec![&self.primary];
		out.extend(
			self.shared
				.values()
				.filter(|p| p.included_ranges().iter().any(|r| r.intersects(region))),
		);
		out.extend(
			self.locals
				.iter()
				.filter(|(_, b)| b.parser.included_ranges().iter().any(|r| r.intersects(region)))
				.map(|(_, b)| &b.parser),
		);
		out
	}

	/// Recomputes every rule's ranges inside `window`; ranges outside the
	/// window are left as they were. Stale embedded parsers whose region was
	/// not refreshed by this pass are torn down.
	pub fn synchronize<D: Document>(
		&mut self,
		engine: &E,
		doc: &mut D,
		window: Range,
	) -> Result<(), SyntaxError> {
		self.epoch += 1;
		let window = window.clamp_to(Range::new(0, doc.len()));
		trace!(epoch = self.epoch, window = ?window, "synchronizing ranges");

		// Rules are detached so rule closures and queries can run while the
		// parser tables are mutated.
		let mut rules = std::mem::take(&mut self.rules);
		let result = self.run_rules(engine, doc, window, &mut rules);
		self.rules = rules;
		result?;

		self.collect_stale(doc, window);
		Ok(())
	}

	fn run_rules<D: Document>(
		&mut self,
		engine: &E,
		doc: &mut D,
		window: Range,
		rules: &mut [RangeRule<E>],
	) -> Result<(), SyntaxError> {
		let root = self.primary.root();
		for (idx, rule) in rules.iter_mut().enumerate() {
			match &mut rule.kind {
				RangeRuleKind::Custom(f) => f(window),
				RangeRuleKind::Query { query, embedded, local, offset } => {
					let mut spans: Vec<Range> = query
						.captures(&root, Some(window))
						.into_iter()
						.map(|c| offset.apply(c.node.range(), doc.len()))
						.filter(|r| !r.is_empty() && r.intersects(window))
						.collect();
					normalize(&mut spans);
					if *local {
						self.sync_local(engine, doc, idx, embedded, &spans)?;
					} else {
						self.sync_shared(engine, embedded, spans, window)?;
					}
				}
			}
		}
		Ok(())
	}

	/// Non-local rule: all regions share one parser whose included-range
	/// list is the union of the regions, merged with what was there before.
	fn sync_shared(
		&mut self,
		engine: &E,
		embedded: &GrammarId,
		spans: Vec<Range>,
		window: Range,
	) -> Result<(), SyntaxError> {
		let parser = match self.shared.entry(embedded.clone()) {
			Entry::Occupied(e) => e.into_mut(),
			Entry::Vacant(v) => v.insert(engine.create_parser(embedded)?),
		};
		let merged = merge_ranges(&parser.included_ranges(), spans, window);
		debug_assert!(is_sorted_disjoint(&merged));
		trace!(grammar = %embedded, ranges = ?merged, "shared parser ranges updated");
		parser.set_included_ranges(&merged);
		Ok(())
	}

	/// Local rule: each region keeps a dedicated parser, matched to existing
	/// bindings by overlap and stamped with the current pass.
	fn sync_local<D: Document>(
		&mut self,
		engine: &E,
		doc: &mut D,
		rule: usize,
		embedded: &GrammarId,
		spans: &[Range],
	) -> Result<(), SyntaxError> {
		for &span in spans {
			let existing = self.locals.iter_mut().find(|(_, b)| {
				b.rule == rule
					&& doc.resolve(b.span).is_some_and(|r| touches(r, span))
			});
			match existing {
				Some((_, binding)) => {
					doc.retrack(binding.span, span);
					binding.parser.set_included_ranges(&[span]);
					binding.epoch = self.epoch;
				}
				None => {
					let mut parser = engine.create_parser(embedded)?;
					parser.set_included_ranges(&[span]);
					let tracked = doc.track(span);
					debug!(grammar = %embedded, region = ?span, "created local embedded parser");
					self.locals.insert(LocalBinding { rule, span: tracked, parser, epoch: self.epoch });
				}
			}
		}
		Ok(())
	}

	/// Tears down bindings inside the window that this pass did not refresh:
	/// their source text disappeared or moved out of the rule's match set.
	fn collect_stale<D: Document>(&mut self, doc: &mut D, window: Range) {
		let stale: Vec<usize> = self
			.locals
			.iter()
			.filter(|(_, b)| {
				b.epoch < self.epoch
					&& doc.resolve(b.span).is_none_or(|r| touches(r, window))
			})
			.map(|(key, _)| key)
			.collect();
		for key in stale {
			let binding = self.locals.remove(key);
			debug!(grammar = %binding.parser.grammar(), "tearing down stale embedded parser");
			doc.release(binding.span);
		}
	}

	#[cfg(test)]
	pub(crate) fn local_count(&self) -> usize {
		self.locals.len()
	}
}

/// Positional overlap that also counts zero-width ranges sitting inside the
/// other range.
fn touches(a: Range, b: Range) -> bool {
	if a.is_empty() {
		b.contains(a.start)
	} else if b.is_empty() {
		a.contains(b.start)
	} else {
		a.intersects(b)
	}
}

/// Sorts spans and unions any that overlap. Touching spans are kept
/// separate; a duplicated boundary is harmless.
fn normalize(spans: &mut Vec<Range>) {
	spans.sort_by_key(|r| (r.start, r.end));
	let mut out: Vec<Range> = Vec::with_capacity(spans.len());
	for &span in spans.iter() {
		match out.last_mut() {
			Some(last) if span.start < last.end => last.end = last.end.max(span.end),
			_ => out.push(span),
		}
	}
	*spans = out;
}

/// Three-way interval merge: old ranges intersecting the recompute window
/// are stale and dropped, old ranges outside it survive, and the window's
/// coverage becomes `new`. New spans may extend past the window; wherever
/// they overlap a surviving old range, the new span wins and the old range
/// keeps only the uncovered remainder. An empty result degenerates to a
/// zero-width placeholder at the window start, because an unset range list
/// would mean whole-document scope.
fn merge_ranges(old: &[Range], new: Vec<Range>, window: Range) -> Vec<Range> {
	let mut out: Vec<Range> = Vec::new();
	for &range in old {
		if touches(range, window) {
			continue;
		}
		out.extend(subtract_all(range, &new));
	}
	out.extend(new);
	out.sort_by_key(|r| (r.start, r.end));
	if out.is_empty() {
		out.push(Range::point(window.start));
	}
	out
}

/// Pieces of `range` not covered by any of `spans`.
fn subtract_all(range: Range, spans: &[Range]) -> Vec<Range> {
	let mut pieces = vec![range];
	for &span in spans {
		pieces = pieces
			.into_iter()
			.flat_map(|piece| {
				let mut kept = Vec::new();
				match piece.intersection(span) {
					Some(cut) => {
						if piece.start < cut.start {
							kept.push(Range::new(piece.start, cut.start));
						}
						if cut.end < piece.end {
							kept.push(Range::new(cut.end, piece.end));
						}
					}
					None => kept.push(piece),
				}
				kept
			})
			.collect();
	}
	pieces
}
