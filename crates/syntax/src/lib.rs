//! Syntax services over an incremental parsing engine
//!
//! This crate turns parse trees into editor behavior: which grammar owns
//! which document region, what gets highlighted, where structural movement
//! lands, and how lines are indented. It is engine-agnostic; hosts plug in
//! their parsing engine through the `arbor-engine` adapter traits.
//!
//! # Architecture
//!
//! * [`config`]: rule tables installed once per document session
//! * [`ranges`]: embedded-grammar range synchronization and parser lifecycle
//! * [`fontify`]: highlighting scheduler with degenerate-tree fast mode
//! * [`things`]: named node predicates and positional lookup
//! * [`navigate`]: generalized movement across things
//! * [`indent`]: table-driven indentation, single-line and batched
//! * [`session`]: per-document façade bundling the above
//!
//! All components are single-threaded and run to completion; consistency
//! comes from ordering (ranges synchronize before anything queries them),
//! not locks.

pub mod config;
mod error;
pub mod fontify;
pub mod indent;
pub mod navigate;
pub mod ranges;
pub mod session;
pub mod things;

#[cfg(test)]
mod tests;

pub use config::{CaptureTable, CaptureTarget, HighlightRule, OverridePolicy, RangeOffset, RangeRule, StyleId};
pub use error::SyntaxError;
pub use fontify::{FontificationScheduler, FontifyOptions, PaintSpan};
pub use indent::{Anchor, IndentEngine, IndentEvaluator, IndentOptions, Matcher, Offset};
pub use navigate::{Side, Tactic, navigate};
pub use ranges::RangeSynchronizer;
pub use session::{SessionConfig, SyntaxSession};
pub use things::{Thing, ThingExpr, ThingTable, thing_at, thing_next, thing_prev};
