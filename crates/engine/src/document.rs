//! Host document model: text access, mutation, and position-tracking spans.
//!
//! Embedded-parser bindings and batch indentation both need positions that
//! survive document edits. Rather than holding raw offsets, they hold
//! [`SpanId`] handles; the document adjusts the tracked spans whenever its
//! text changes, the same way editor markers do.

use ropey::Rope;
use rustc_hash::FxHashMap;

use crate::Range;

/// Handle to a position-tracking span owned by a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

/// The document surface consumed by the syntax services layer.
///
/// All positions are char offsets; one char is one column. Hosts with
/// different column rules (tabs, wide glyphs) implement this trait over
/// their own buffer type.
pub trait Document {
	fn len(&self) -> u32;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Start offset of the line containing `pos`.
	fn line_start(&self, pos: u32) -> u32;

	/// End offset of the line containing `pos`, excluding the newline.
	fn line_end(&self, pos: u32) -> u32;

	/// Offset of the first non-blank char on the line starting at
	/// `line_start`, or the line end if the line is all blanks.
	fn first_non_blank(&self, line_start: u32) -> u32;

	fn column(&self, pos: u32) -> u32;

	fn char_at(&self, pos: u32) -> Option<char>;

	/// Starts tracking `range` through subsequent edits.
	fn track(&mut self, range: Range) -> SpanId;

	/// Current position of a tracked span, or `None` if it was released.
	fn resolve(&self, span: SpanId) -> Option<Range>;

	/// Moves an existing tracked span to a new range.
	fn retrack(&mut self, span: SpanId, range: Range);

	fn release(&mut self, span: SpanId);

	/// Replaces the leading whitespace of the line at `line_start` so the
	/// first non-blank char sits at `columns`.
	fn set_line_indent(&mut self, line_start: u32, columns: u32);
}

/// Reference [`Document`] over a [`ropey::Rope`] with an explicit span table.
pub struct RopeDocument {
	text: Rope,
	spans: FxHashMap<SpanId, Range>,
	next_span: u64,
}

impl RopeDocument {
	pub fn new(text: &str) -> Self {
		Self {
			text: Rope::from_str(text),
			spans: FxHashMap::default(),
			next_span: 0,
		}
	}

	pub fn text(&self) -> &Rope {
		&self.text
	}

	pub fn contents(&self) -> String {
		self.text.to_string()
	}

	/// Splices `replacement` over `range` and adjusts all tracked spans:
	/// positions past the edit shift by the length delta, positions inside
	/// the replaced range collapse to its start.
	pub fn edit(&mut self, range: Range, replacement: &str) {
		let range = range.clamp_to(Range::new(0, self.len()));
		self.text.remove(range.start as usize..range.end as usize);
		self.text.insert(range.start as usize, replacement);

		let new_len = replacement.chars().count() as u32;
		let adjust = |pos: u32| -> u32 {
			if pos <= range.start {
				pos
			} else if pos >= range.end {
				pos - range.len() + new_len
			} else {
				range.start
			}
		};
		for span in self.spans.values_mut() {
			let start = adjust(span.start);
			let end = adjust(span.end).max(start);
			*span = Range::new(start, end);
		}
	}

	fn line_of(&self, pos: u32) -> usize {
		self.text.char_to_line((pos as usize).min(self.text.len_chars()))
	}
}

impl Document for RopeDocument {
	fn len(&self) -> u32 {
		self.text.len_chars() as u32
	}

	fn line_start(&self, pos: u32) -> u32 {
		self.text.line_to_char(self.line_of(pos)) as u32
	}

	fn line_end(&self, pos: u32) -> u32 {
		let line = self.line_of(pos);
		let next = if line + 1 >= self.text.len_lines() {
			self.text.len_chars()
		} else {
			self.text.line_to_char(line + 1)
		};
		// exclude the newline itself
		if next > 0 && self.text.get_char(next - 1) == Some('\n') {
			(next - 1) as u32
		} else {
			next as u32
		}
	}

	fn first_non_blank(&self, line_start: u32) -> u32 {
		let end = self.line_end(line_start);
		let mut pos = line_start;
		while pos < end {
			match self.text.get_char(pos as usize) {
				Some(' ' | '\t') => pos += 1,
				_ => break,
			}
		}
		pos
	}

	fn column(&self, pos: u32) -> u32 {
		pos - self.line_start(pos)
	}

	fn char_at(&self, pos: u32) -> Option<char> {
		self.text.get_char(pos as usize)
	}

	fn track(&mut self, range: Range) -> SpanId {
		let id = SpanId(self.next_span);
		self.next_span += 1;
		self.spans.insert(id, range);
		id
	}

	fn resolve(&self, span: SpanId) -> Option<Range> {
		self.spans.get(&span).copied()
	}

	fn retrack(&mut self, span: SpanId, range: Range) {
		if let Some(slot) = self.spans.get_mut(&span) {
			*slot = range;
		}
	}

	fn release(&mut self, span: SpanId) {
		self.spans.remove(&span);
	}

	fn set_line_indent(&mut self, line_start: u32, columns: u32) {
		let first = self.first_non_blank(line_start);
		let indent = " ".repeat(columns as usize);
		self.edit(Range::new(line_start, first), &indent);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn line_geometry() {
		let doc = RopeDocument::new("fn main() {\n    body\n}\n");
		assert_eq!(doc.line_start(0), 0);
		assert_eq!(doc.line_end(0), 11);
		assert_eq!(doc.line_start(14), 12);
		assert_eq!(doc.first_non_blank(12), 16);
		assert_eq!(doc.column(16), 4);
	}

	#[test]
	fn last_line_without_newline() {
		let doc = RopeDocument::new("ab\ncd");
		assert_eq!(doc.line_end(3), 5);
		assert_eq!(doc.line_start(5), 3);
	}

	#[test]
	fn spans_shift_and_collapse() {
		let mut doc = RopeDocument::new("hello world");
		let before = doc.track(Range::new(0, 5));
		let after = doc.track(Range::new(6, 11));
		let inside = doc.track(Range::new(2, 4));

		doc.edit(Range::new(1, 4), "EYLLO");
		assert_eq!(doc.contents(), "hEYLLOo world");
		assert_eq!(doc.resolve(before), Some(Range::new(0, 7)));
		assert_eq!(doc.resolve(after), Some(Range::new(8, 13)));
		// collapsed to the edit start
		assert_eq!(doc.resolve(inside), Some(Range::point(1)));

		doc.release(after);
		assert_eq!(doc.resolve(after), None);
	}

	#[test]
	fn set_line_indent_rewrites_leading_blanks() {
		let mut doc = RopeDocument::new("a\n\t  b\nc");
		let marker = doc.track(Range::point(7));
		doc.set_line_indent(2, 4);
		assert_eq!(doc.contents(), "a\n    b\nc");
		assert_eq!(doc.resolve(marker), Some(Range::point(8)));
	}
}
