//! Error taxonomy for the syntax services layer.

use arbor_engine::{EngineError, GrammarId, QueryError};
use thiserror::Error;

/// Errors surfaced by the syntax services layer.
///
/// "No node at this position" is deliberately not an error: lookups and
/// navigation return `None`/empty results for it. Degenerate parse trees are
/// not errors either; they switch the fontification scheduler into fast mode.
#[derive(Debug, Error)]
pub enum SyntaxError {
	/// Malformed rule handed to a validating constructor. Raised at table
	/// build time, never mid-operation.
	#[error("invalid configuration: {0}")]
	Config(String),

	/// The engine rejected a query pattern.
	#[error("query for `{grammar}` failed: {source}")]
	Query {
		grammar: GrammarId,
		#[source]
		source: QueryError,
	},

	/// An operation needed a parser for this grammar and none exists nor can
	/// be created. Distinct from the non-error "no node here" outcome.
	#[error("no parser for grammar `{0}`")]
	MissingParser(GrammarId),

	#[error(transparent)]
	Engine(#[from] EngineError),
}
