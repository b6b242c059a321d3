//! Generalized movement across instances of a thing.
//!
//! One entry point, [`navigate`], steps a position across begins or ends of
//! matching nodes. Backward motion resolves the enclosing thing strictly
//! (the enclosing match must start before the position), so standing exactly
//! on a begin never counts that node as enclosing and every step makes
//! progress.

use arbor_engine::SyntaxNode;

use crate::things::{Thing, contains_matching_descendant, thing_at, thing_next, thing_prev};

/// Which boundary of a thing a step lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	Begin,
	End,
}

/// Whether movement crosses nesting levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tactic {
	/// Step through begins and ends at every nesting level.
	#[default]
	Nested,
	/// Only outermost things count.
	TopLevel,
	/// Never leave the enclosing thing.
	Restricted,
}

/// Moves `pos` by `count` steps (negative is backward) onto the `side`
/// boundary of things. All-or-nothing: if any step finds no target the whole
/// operation returns `None` and partial progress is discarded.
pub fn navigate<N: SyntaxNode>(
	root: &N,
	pos: u32,
	count: i32,
	side: Side,
	thing: &Thing<N>,
	tactic: Tactic,
) -> Option<u32> {
	let forward = count > 0;
	let mut pos = pos;
	for _ in 0..count.unsigned_abs() {
		pos = step(root, pos, forward, side, thing, tactic)?;
	}
	Some(pos)
}

fn step<N: SyntaxNode>(
	root: &N,
	pos: u32,
	forward: bool,
	side: Side,
	thing: &Thing<N>,
	tactic: Tactic,
) -> Option<u32> {
	let (mut prev, mut next, mut parent) = things_around(root, pos, thing, forward);

	// When no thing encloses pos, prev/next are already outermost (an
	// enclosing match of theirs would itself be the parent), so only a real
	// parent needs lifting.
	if tactic == Tactic::TopLevel && parent.is_some() {
		parent = parent.map(|p| top_level_of(p, thing));
		prev = None;
		next = None;
	}

	if tactic == Tactic::Restricted {
		let target = match (&prev, &next) {
			(None, None) => {
				// stepping to the parent's own boundary only makes sense when
				// nothing inside it could have been the target
				parent.filter(|p| !contains_matching_descendant(p, thing))
			}
			_ if forward => next,
			_ => prev,
		};
		return target.map(|t| match side {
			Side::Begin => t.start(),
			Side::End => t.end(),
		});
	}

	match (forward, side) {
		(true, Side::Begin) => match next {
			Some(next) if next.start() != pos => Some(next.start()),
			// standing exactly on the begin (or only a parent left): skip
			// through to the thing after this one
			_ => {
				let springboard = next.or(parent)?;
				step(root, springboard.end(), forward, side, thing, tactic)
			}
		},
		(true, Side::End) => next.map(|n| n.end()).or_else(|| parent.map(|p| p.end())),
		(false, Side::Begin) => prev.map(|p| p.start()).or_else(|| parent.map(|p| p.start())),
		(false, Side::End) => match prev {
			Some(prev) if prev.end() != pos => Some(prev.end()),
			Some(prev) => {
				// standing exactly on this thing's end: the previous stop is
				// the last close inside it, or skip through to before it
				match innermost_prev(&prev, pos, thing) {
					Some(inner) if inner.end() != pos => Some(inner.end()),
					_ => step(root, prev.start(), forward, side, thing, tactic),
				}
			}
			None => {
				let springboard = parent?;
				step(root, springboard.start(), forward, side, thing, tactic)
			}
		},
	}
}

/// The matching siblings and enclosing match around `pos`. When an
/// enclosing match exists, prev/next outside it are discarded so a step
/// never leaves the current nesting level inadvertently.
fn things_around<N: SyntaxNode>(
	root: &N,
	pos: u32,
	thing: &Thing<N>,
	forward: bool,
) -> (Option<N>, Option<N>, Option<N>) {
	let parent = thing_at(root, pos, thing, !forward);
	let prev = thing_prev(root, pos, thing);
	let mut next = thing_next(root, pos, thing);
	if let Some(p) = &parent {
		// the outermost match at pos may be the parent itself; the sibling
		// we want then is the nearest match inside it
		if next.as_ref() == Some(p) {
			next = innermost_next(p, pos, thing);
		}
		let enclosed = |n: &N| p.range().contains_range(n.range());
		return (prev.filter(enclosed), next.filter(enclosed), parent);
	}
	(prev, next, parent)
}

/// Nearest match after `pos` strictly inside `node`.
fn innermost_next<N: SyntaxNode>(node: &N, pos: u32, thing: &Thing<N>) -> Option<N> {
	(0..node.child_count()).find_map(|i| thing_next(&node.child(i)?, pos, thing))
}

/// Nearest match before `pos` strictly inside `node`.
fn innermost_prev<N: SyntaxNode>(node: &N, pos: u32, thing: &Thing<N>) -> Option<N> {
	(0..node.child_count())
		.rev()
		.find_map(|i| thing_prev(&node.child(i)?, pos, thing))
}

/// Outermost ancestor-or-self of `node` that still matches.
fn top_level_of<N: SyntaxNode>(node: N, thing: &Thing<N>) -> N {
	let mut outermost = node.clone();
	let mut cursor = node.parent();
	while let Some(n) = cursor {
		if thing.matches(&n) {
			outermost = n.clone();
		}
		cursor = n.parent();
	}
	outermost
}
