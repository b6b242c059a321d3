//! Per-session configuration tables.
//!
//! Rule tables are plain data installed once per document/session; all
//! validation happens in the constructors here so malformed rules fail fast
//! instead of surfacing mid-operation.

use arbor_engine::{GrammarId, Range, SyntaxEngine};
use kstring::KString;
use rustc_hash::FxHashMap;

use crate::error::SyntaxError;

/// Opaque style identifier; the host resolves it against its theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleId(pub u32);

/// How a style capture combines with styling already present in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePolicy {
	/// Apply only when the captured span is entirely unstyled.
	#[default]
	Replace,
	/// Always apply, replacing anything underneath.
	ReplaceAlways,
	/// Stack under existing styles.
	Append,
	/// Stack over existing styles.
	Prepend,
	/// Style only the currently unstyled sub-spans.
	FillGapsOnly,
}

/// Start/end adjustment applied to spans captured by a range rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeOffset {
	pub start: i32,
	pub end: i32,
}

impl RangeOffset {
	pub fn new(start: i32, end: i32) -> Self {
		Self { start, end }
	}

	/// Applies the adjustment, clamped into the document.
	pub fn apply(&self, range: Range, doc_len: u32) -> Range {
		let start = (i64::from(range.start) + i64::from(self.start)).clamp(0, i64::from(doc_len));
		let end = (i64::from(range.end) + i64::from(self.end)).clamp(start, i64::from(doc_len));
		Range::new(start as u32, end as u32)
	}
}

/// Derives, from one host grammar's tree, the regions belonging to another
/// grammar.
pub struct RangeRule<E: SyntaxEngine> {
	pub(crate) host: GrammarId,
	pub(crate) kind: RangeRuleKind<E>,
}

pub(crate) enum RangeRuleKind<E: SyntaxEngine> {
	Query {
		query: E::Query,
		embedded: GrammarId,
		/// Each matched region gets its own dedicated parser instead of all
		/// regions sharing one parser's included-range list.
		local: bool,
		offset: RangeOffset,
	},
	/// Host-supplied multi-pass logic; invoked with the recompute window and
	/// free to set ranges itself.
	Custom(Box<dyn FnMut(Range)>),
}

impl<E: SyntaxEngine> RangeRule<E> {
	/// Compiles a query-driven rule. Every captured span of `pattern` in the
	/// host tree becomes (after `offset`) a region of `embedded`.
	pub fn query(
		engine: &E,
		host: &GrammarId,
		pattern: &str,
		embedded: &GrammarId,
		local: bool,
		offset: RangeOffset,
	) -> Result<Self, SyntaxError> {
		if host == embedded && !local {
			return Err(SyntaxError::Config(format!(
				"range rule embeds `{host}` into itself without :local"
			)));
		}
		let query = engine
			.compile_query(host, pattern)
			.map_err(|source| SyntaxError::Query { grammar: host.clone(), source })?;
		Ok(Self {
			host: host.clone(),
			kind: RangeRuleKind::Query { query, embedded: embedded.clone(), local, offset },
		})
	}

	/// Wraps an opaque range-setting callback.
	pub fn custom(host: &GrammarId, f: impl FnMut(Range) + 'static) -> Self {
		Self { host: host.clone(), kind: RangeRuleKind::Custom(Box::new(f)) }
	}

	pub fn host(&self) -> &GrammarId {
		&self.host
	}
}

/// One highlighting query with its feature tag and override policy.
pub struct HighlightRule<E: SyntaxEngine> {
	pub(crate) grammar: GrammarId,
	pub(crate) query: E::Query,
	pub(crate) enabled: bool,
	pub(crate) feature: KString,
	pub(crate) policy: OverridePolicy,
}

impl<E: SyntaxEngine> HighlightRule<E> {
	pub fn new(
		engine: &E,
		grammar: &GrammarId,
		pattern: &str,
		feature: &str,
		policy: OverridePolicy,
	) -> Result<Self, SyntaxError> {
		if feature.is_empty() {
			return Err(SyntaxError::Config("highlight rule with empty feature name".into()));
		}
		let query = engine
			.compile_query(grammar, pattern)
			.map_err(|source| SyntaxError::Query { grammar: grammar.clone(), source })?;
		Ok(Self {
			grammar: grammar.clone(),
			query,
			enabled: true,
			feature: KString::from_ref(feature),
			policy,
		})
	}

	/// Marks the rule disabled by default; it only runs if its feature is
	/// explicitly added later.
	pub fn disabled(mut self) -> Self {
		self.enabled = false;
		self
	}

	pub fn feature(&self) -> &str {
		&self.feature
	}
}

/// What a recognized capture name paints or invokes.
///
/// Capture names absent from the table are auxiliary match constraints and
/// are silently ignored.
pub enum CaptureTarget<E: SyntaxEngine> {
	Style(StyleId),
	/// Trusted to restrict its own side effects to the requested region;
	/// receives the full node because it may need sibling context.
	Callback(Box<dyn Fn(&E::Node, OverridePolicy, Range)>),
}

/// Capture-name table shared by all highlight rules of a session.
pub struct CaptureTable<E: SyntaxEngine> {
	map: FxHashMap<KString, CaptureTarget<E>>,
}

impl<E: SyntaxEngine> CaptureTable<E> {
	pub fn new() -> Self {
		Self { map: FxHashMap::default() }
	}

	pub fn style(mut self, name: &str, style: StyleId) -> Self {
		self.map.insert(KString::from_ref(name), CaptureTarget::Style(style));
		self
	}

	pub fn callback(mut self, name: &str, f: impl Fn(&E::Node, OverridePolicy, Range) + 'static) -> Self {
		self.map.insert(KString::from_ref(name), CaptureTarget::Callback(Box::new(f)));
		self
	}

	pub(crate) fn get(&self, name: &str) -> Option<&CaptureTarget<E>> {
		self.map.get(name)
	}
}

impl<E: SyntaxEngine> Default for CaptureTable<E> {
	fn default() -> Self {
		Self::new()
	}
}
