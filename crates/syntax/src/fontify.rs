//! Fontification scheduling.
//!
//! Drives highlighting queries over a requested region and produces the
//! repaint set for exactly that region. Pathological trees (error-recovery
//! towers, generated one-liners with thousands of siblings) latch the
//! affected grammar into a fast mode that queries bounded subtrees instead
//! of the whole root, trading cross-subtree patterns for bounded cost.

use arbor_engine::{CompiledQuery, Document, GrammarId, Range, SyntaxEngine, SyntaxNode, SyntaxParser};
use kstring::KString;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace};

use crate::config::{CaptureTable, CaptureTarget, HighlightRule, OverridePolicy, StyleId};
use crate::error::SyntaxError;
use crate::ranges::RangeSynchronizer;

/// Tuning knobs for the fontification scheduler.
#[derive(Debug, Clone, Copy)]
pub struct FontifyOptions {
	/// Symmetric query expansion around the requested region, to catch
	/// multi-token constructs whose start or end lies outside it.
	pub left_expand: u32,
	pub right_expand: u32,
	/// Sampled tree depth beyond which a grammar latches into fast mode.
	pub max_depth: u32,
	/// Sampled node breadth beyond which a grammar latches into fast mode.
	pub max_width: u32,
	/// Typical redraw chunk size; fast mode queries subtrees spanning at
	/// most four chunks.
	pub chunk_size: u32,
}

impl Default for FontifyOptions {
	fn default() -> Self {
		Self {
			left_expand: 0,
			right_expand: 0,
			max_depth: 100,
			max_width: 4000,
			chunk_size: 1500,
		}
	}
}

/// A styled span produced by one fontification pass. `styles` is ordered
/// innermost-first when policies stacked styles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintSpan {
	pub range: Range,
	pub styles: SmallVec<[StyleId; 2]>,
}

pub struct FontificationScheduler<E: SyntaxEngine> {
	rules: Vec<HighlightRule<E>>,
	captures: CaptureTable<E>,
	options: FontifyOptions,
	active_features: FxHashSet<KString>,
	/// Latched once per grammar per session from a single sample.
	fast_mode: FxHashMap<GrammarId, bool>,
}

impl<E: SyntaxEngine> FontificationScheduler<E> {
	pub fn new(rules: Vec<HighlightRule<E>>, captures: CaptureTable<E>, options: FontifyOptions) -> Self {
		let active_features = rules
			.iter()
			.filter(|r| r.enabled)
			.map(|r| r.feature.clone())
			.collect();
		Self {
			rules,
			captures,
			options,
			active_features,
			fast_mode: FxHashMap::default(),
		}
	}

	/// Adjusts the active feature set. A feature named in both lists is a
	/// configuration error.
	pub fn recompute_features(&mut self, add: &[&str], remove: &[&str]) -> Result<(), SyntaxError> {
		if let Some(both) = add.iter().find(|a| remove.contains(a)) {
			return Err(SyntaxError::Config(format!(
				"feature `{both}` appears in both add and remove lists"
			)));
		}
		for feature in add {
			self.active_features.insert(KString::from_ref(feature));
		}
		for feature in remove {
			self.active_features.remove(*feature);
		}
		Ok(())
	}

	/// Recolors exactly `region`: synchronizes ranges first, then runs every
	/// active rule over the parsers intersecting the region. Returns the
	/// bounds actually painted and the repaint set; nothing outside
	/// `region` is ever painted.
	pub fn fontify<D: Document>(
		&mut self,
		engine: &E,
		sync: &mut RangeSynchronizer<E>,
		doc: &mut D,
		region: Range,
	) -> Result<(Range, Vec<PaintSpan>), SyntaxError> {
		// stale ranges must never be queried
		sync.synchronize(engine, doc, region)?;

		let region = region.clamp_to(Range::new(0, doc.len()));
		if region.is_empty() {
			return Ok((region, Vec::new()));
		}
		let window = region.expand(self.options.left_expand, self.options.right_expand, doc.len());

		let roots: Vec<(GrammarId, E::Node)> = sync
			.parsers_intersecting(region)
			.into_iter()
			.map(|p| (p.grammar().clone(), p.root()))
			.collect();

		let mut buffer = PaintBuffer::new(region);
		let options = self.options;
		for rule in &self.rules {
			if !self.active_features.contains(&rule.feature) {
				continue;
			}
			for (grammar, root) in &roots {
				if grammar != &rule.grammar {
					continue;
				}
				let fast = *self.fast_mode.entry(grammar.clone()).or_insert_with(|| {
					let stats = engine.subtree_stats(root);
					let fast = stats.max_depth > options.max_depth || stats.max_width > options.max_width;
					if fast {
						debug!(
							%grammar,
							depth = stats.max_depth,
							width = stats.max_width,
							"degenerate tree, latching grammar into fast mode"
						);
					}
					fast
				});

				let targets = if fast {
					let mut out = Vec::new();
					collect_bounded_subtrees(root, options.chunk_size * 4, options.max_depth, &mut out);
					out.retain(|n| n.range().intersects(window));
					out
				} else {
					vec![root.clone()]
				};

				for target in &targets {
					for capture in rule.query.captures(target, Some(window)) {
						match self.captures.get(&capture.name) {
							Some(CaptureTarget::Style(style)) => {
								let span = capture.node.range();
								// returned only because its enclosing pattern
								// intersected the region
								if !span.intersects(region) {
									continue;
								}
								buffer.apply(span.clamp_to(region), *style, rule.policy);
							}
							Some(CaptureTarget::Callback(callback)) => {
								callback(&capture.node, rule.policy, region);
							}
							// auxiliary match constraint, not a paint target
							None => trace!(capture = %capture.name, "unmapped capture ignored"),
						}
					}
				}
			}
		}

		let spans = buffer.into_spans();
		let affected = match (spans.first(), spans.last()) {
			(Some(first), Some(last)) => Range::new(first.range.start, last.range.end),
			_ => Range::point(region.start),
		};
		Ok((affected, spans))
	}
}

/// Collects the largest subtrees spanning at most `cap`, descending at most
/// `budget` levels. An oversized node is taken as-is once the budget runs
/// out or it has no children: best-effort beats unbounded recursion.
fn collect_bounded_subtrees<N: SyntaxNode>(node: &N, cap: u32, budget: u32, out: &mut Vec<N>) {
	if node.range().len() <= cap || budget == 0 || node.child_count() == 0 {
		out.push(node.clone());
		return;
	}
	for i in 0..node.child_count() {
		if let Some(child) = node.child(i) {
			collect_bounded_subtrees(&child, cap, budget - 1, out);
		}
	}
}

/// Region-local style accumulation implementing the override policies.
///
/// Segments stay sorted, disjoint, and non-empty; everything not covered by
/// a segment is unstyled.
struct PaintBuffer {
	region: Range,
	segments: Vec<PaintSpan>,
}

impl PaintBuffer {
	fn new(region: Range) -> Self {
		Self { region, segments: Vec::new() }
	}

	fn apply(&mut self, span: Range, style: StyleId, policy: OverridePolicy) {
		let span = span.clamp_to(self.region);
		if span.is_empty() {
			return;
		}
		match policy {
			OverridePolicy::ReplaceAlways => {
				self.carve(span);
				self.insert(span, smallvec![style]);
			}
			OverridePolicy::Replace => {
				if !self.segments.iter().any(|s| s.range.intersects(span)) {
					self.insert(span, smallvec![style]);
				}
			}
			OverridePolicy::FillGapsOnly => {
				for gap in self.gaps(span) {
					self.insert(gap, smallvec![style]);
				}
			}
			OverridePolicy::Append | OverridePolicy::Prepend => {
				self.split_at(span.start);
				self.split_at(span.end);
				let gaps = self.gaps(span);
				for segment in &mut self.segments {
					if span.contains_range(segment.range) {
						match policy {
							OverridePolicy::Append => segment.styles.push(style),
							_ => segment.styles.insert(0, style),
						}
					}
				}
				for gap in gaps {
					self.insert(gap, smallvec![style]);
				}
			}
		}
	}

	/// Splits the segment strictly containing `pos`, if any.
	fn split_at(&mut self, pos: u32) {
		if let Some(idx) = self
			.segments
			.iter()
			.position(|s| s.range.start < pos && pos < s.range.end)
		{
			let tail_range = Range::new(pos, self.segments[idx].range.end);
			self.segments[idx].range.end = pos;
			let styles = self.segments[idx].styles.clone();
			self.segments.insert(idx + 1, PaintSpan { range: tail_range, styles });
		}
	}

	/// Removes all coverage inside `span`.
	fn carve(&mut self, span: Range) {
		self.split_at(span.start);
		self.split_at(span.end);
		self.segments.retain(|s| !span.contains_range(s.range));
	}

	/// Uncovered sub-spans of `span`, in order.
	fn gaps(&self, span: Range) -> Vec<Range> {
		let mut gaps = Vec::new();
		let mut cursor = span.start;
		for segment in &self.segments {
			if segment.range.end <= span.start {
				continue;
			}
			if segment.range.start >= span.end {
				break;
			}
			if segment.range.start > cursor {
				gaps.push(Range::new(cursor, segment.range.start.min(span.end)));
			}
			cursor = cursor.max(segment.range.end);
		}
		if cursor < span.end {
			gaps.push(Range::new(cursor, span.end));
		}
		gaps
	}

	fn insert(&mut self, range: Range, styles: SmallVec<[StyleId; 2]>) {
		debug_assert!(!range.is_empty());
		let idx = self.segments.partition_point(|s| s.range.start < range.start);
		self.segments.insert(idx, PaintSpan { range, styles });
	}

	/// Final repaint set, coalescing contiguous equal-styled segments.
	fn into_spans(self) -> Vec<PaintSpan> {
		let mut out: Vec<PaintSpan> = Vec::with_capacity(self.segments.len());
		for segment in self.segments {
			match out.last_mut() {
				Some(last) if last.range.end == segment.range.start && last.styles == segment.styles => {
					last.range.end = segment.range.end;
				}
				_ => out.push(segment),
			}
		}
		out
	}
}
