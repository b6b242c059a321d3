//! Per-document session façade.
//!
//! Bundles the engine adapter, the synchronizer, the scheduler, and the
//! navigation/indentation tables for one document, and exposes the host
//! surface. Everything here runs on the host's single thread; ordering, not
//! locking, keeps the components consistent (ranges are synchronized before
//! anything queries them).

use arbor_engine::{Document, GrammarId, Range, SyntaxEngine, SyntaxParser};

use crate::config::{CaptureTable, HighlightRule, RangeRule};
use crate::error::SyntaxError;
use crate::fontify::{FontificationScheduler, FontifyOptions, PaintSpan};
use crate::indent::{IndentEngine, IndentEvaluator, IndentOptions};
use crate::navigate::{Side, Tactic, navigate};
use crate::ranges::RangeSynchronizer;
use crate::things::{Thing, ThingTable, thing_at, thing_next, thing_prev};

/// Everything a session is configured with, installed once per document or
/// mode activation.
pub struct SessionConfig<E: SyntaxEngine> {
	pub grammar: GrammarId,
	pub range_rules: Vec<RangeRule<E>>,
	pub highlight_rules: Vec<HighlightRule<E>>,
	pub captures: CaptureTable<E>,
	pub fontify: FontifyOptions,
	pub things: ThingTable<E::Node>,
	pub indent: IndentEvaluator<E::Node>,
	pub indent_options: IndentOptions,
}

pub struct SyntaxSession<E: SyntaxEngine> {
	engine: E,
	sync: RangeSynchronizer<E>,
	scheduler: FontificationScheduler<E>,
	things: ThingTable<E::Node>,
	indenter: IndentEngine<E::Node>,
}

impl<E: SyntaxEngine> SyntaxSession<E> {
	pub fn new(engine: E, config: SessionConfig<E>) -> Result<Self, SyntaxError> {
		let sync = RangeSynchronizer::new(&engine, &config.grammar, config.range_rules)?;
		let scheduler =
			FontificationScheduler::new(config.highlight_rules, config.captures, config.fontify);
		let indenter = IndentEngine::new(config.indent, config.indent_options);
		Ok(Self { engine, sync, scheduler, things: config.things, indenter })
	}

	pub fn grammar(&self) -> &GrammarId {
		self.sync.grammar()
	}

	pub fn engine(&self) -> &E {
		&self.engine
	}

	pub fn indent_mut(&mut self) -> &mut IndentEvaluator<E::Node> {
		self.indenter.evaluator_mut()
	}

	/// Recomputes embedded-grammar ranges inside `window`.
	pub fn synchronize_ranges<D: Document>(
		&mut self,
		doc: &mut D,
		window: Range,
	) -> Result<(), SyntaxError> {
		self.sync.synchronize(&self.engine, doc, window)
	}

	/// Recolors `region`, synchronizing ranges first.
	pub fn fontify<D: Document>(
		&mut self,
		doc: &mut D,
		region: Range,
	) -> Result<(Range, Vec<PaintSpan>), SyntaxError> {
		self.scheduler.fontify(&self.engine, &mut self.sync, doc, region)
	}

	pub fn recompute_features(&mut self, add: &[&str], remove: &[&str]) -> Result<(), SyntaxError> {
		self.scheduler.recompute_features(add, remove)
	}

	/// Smallest node of the named thing enclosing `pos`.
	pub fn thing_at(&self, pos: u32, thing: &str, strict: bool) -> Result<Option<E::Node>, SyntaxError> {
		let thing = self.thing(thing)?;
		Ok(thing_at(&self.sync.primary().root(), pos, thing, strict))
	}

	/// Nearest instance of the named thing ending at or before `pos`.
	pub fn thing_prev(&self, pos: u32, thing: &str) -> Result<Option<E::Node>, SyntaxError> {
		let thing = self.thing(thing)?;
		Ok(thing_prev(&self.sync.primary().root(), pos, thing))
	}

	/// Nearest instance of the named thing starting at or after `pos`.
	pub fn thing_next(&self, pos: u32, thing: &str) -> Result<Option<E::Node>, SyntaxError> {
		let thing = self.thing(thing)?;
		Ok(thing_next(&self.sync.primary().root(), pos, thing))
	}

	/// Steps `pos` across boundaries of the named thing.
	pub fn navigate(
		&self,
		pos: u32,
		count: i32,
		side: Side,
		thing: &str,
		tactic: Tactic,
	) -> Result<Option<u32>, SyntaxError> {
		let thing = self.thing(thing)?;
		Ok(navigate(&self.sync.primary().root(), pos, count, side, thing, tactic))
	}

	/// Reindents the line containing `pos`. Returns whether a rule fired.
	pub fn indent_line<D: Document>(&self, doc: &mut D, pos: u32) -> bool {
		let root = self.sync.primary().root();
		self.indenter.indent_line(doc, &root, self.sync.grammar(), pos)
	}

	/// Reindents every line of `region` in batches. `reparse` runs before
	/// each batch so the primary tree reflects the edits the earlier batches
	/// applied; the host reparses its engine there.
	pub fn indent_region<D: Document>(
		&self,
		doc: &mut D,
		mut reparse: impl FnMut(&D),
		region: Range,
	) {
		let sync = &self.sync;
		self.indenter.indent_region(
			doc,
			|doc| {
				reparse(doc);
				sync.primary().root()
			},
			sync.grammar(),
			region,
		);
	}

	fn thing(&self, name: &str) -> Result<&Thing<E::Node>, SyntaxError> {
		self.things
			.get(self.sync.grammar(), name)
			.ok_or_else(|| SyntaxError::Config(format!("no thing named `{name}` for `{}`", self.sync.grammar())))
	}
}
