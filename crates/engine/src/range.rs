//! Half-open spans in document coordinates.

use std::fmt;

/// A `[start, end)` interval of document positions.
///
/// Zero-width ranges are legal; the range synchronizer uses them as
/// placeholders for embedded grammars that currently match nothing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Range {
	pub start: u32,
	pub end: u32,
}

impl Range {
	pub fn new(start: u32, end: u32) -> Self {
		debug_assert!(start <= end, "inverted range {start}..{end}");
		Self { start, end }
	}

	/// Zero-width range at `pos`.
	pub const fn point(pos: u32) -> Self {
		Self { start: pos, end: pos }
	}

	pub fn len(&self) -> u32 {
		self.end - self.start
	}

	pub fn is_empty(&self) -> bool {
		self.start >= self.end
	}

	pub fn contains(&self, pos: u32) -> bool {
		self.start <= pos && pos < self.end
	}

	pub fn contains_range(&self, other: Range) -> bool {
		self.start <= other.start && other.end <= self.end
	}

	/// Strict interior overlap; empty ranges never intersect anything.
	pub fn intersects(&self, other: Range) -> bool {
		self.start < other.end && other.start < self.end
	}

	pub fn intersection(&self, other: Range) -> Option<Range> {
		self.intersects(other)
			.then(|| Range::new(self.start.max(other.start), self.end.min(other.end)))
	}

	/// Clamps both endpoints into `bounds`. May produce an empty range.
	pub fn clamp_to(&self, bounds: Range) -> Range {
		let start = self.start.clamp(bounds.start, bounds.end);
		let end = self.end.clamp(start, bounds.end);
		Range::new(start, end)
	}

	/// Widens the range by `left`/`right`, saturating at zero and `max_end`.
	pub fn expand(&self, left: u32, right: u32, max_end: u32) -> Range {
		Range::new(
			self.start.saturating_sub(left),
			self.end.saturating_add(right).min(max_end),
		)
	}
}

impl fmt::Debug for Range {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}..{}", self.start, self.end)
	}
}

impl From<std::ops::Range<u32>> for Range {
	fn from(r: std::ops::Range<u32>) -> Self {
		Range::new(r.start, r.end)
	}
}

impl From<Range> for std::ops::Range<u32> {
	fn from(r: Range) -> Self {
		r.start..r.end
	}
}

/// True when `ranges` is sorted by start and pairwise non-overlapping.
///
/// This is the invariant every included-range list handed to a parser must
/// uphold. Touching boundaries are allowed.
pub fn is_sorted_disjoint(ranges: &[Range]) -> bool {
	ranges.windows(2).all(|w| w[0].end <= w[1].start)
}
