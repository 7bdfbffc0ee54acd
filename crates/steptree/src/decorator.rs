//! Decorator node resolution rules.
//!
//! Decorators wrap a single child and transform its state:
//! - root and branch pass the child state through unchanged
//! - flip swaps `Succeeded` and `Failed` (NOT logic)
//! - succeed and fail force any resolved child result to a fixed outcome
//! - repeat and retry re-run the child a number of times chosen on activation

use tracing::debug;

use crate::assemble;
use crate::definition::Bounds;
use crate::error::{DefinitionError, Result, TreeError};
use crate::node::{self, Arena, NodeId, NodeKind, TickContext, UpdateOutcome, settle};
use crate::registry;
use crate::State;

/// Mirrors the child state.
pub(crate) fn update_passthrough(
    arena: &mut Arena,
    child: NodeId,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    let state = settle!(node::update(arena, child, ctx));
    Ok(UpdateOutcome::Settled(state))
}

/// Maps the child state through `map`; used by flip, succeed and fail.
pub(crate) fn update_mapped(
    arena: &mut Arena,
    child: NodeId,
    ctx: &mut TickContext<'_>,
    map: impl FnOnce(State) -> State,
) -> Result<UpdateOutcome> {
    let state = settle!(node::update(arena, child, ctx));
    Ok(UpdateOutcome::Settled(map(state)))
}

/// A reference to a named subtree, instantiated on first update.
pub(crate) struct Branch {
    pub(crate) reference: String,
    pub(crate) child: Option<NodeId>,
    /// Names of the subtrees this branch is nested in.
    pub(crate) ancestry: Vec<String>,
}

impl Branch {
    pub(crate) fn new(reference: String, ancestry: Vec<String>) -> Self {
        Self {
            reference,
            child: None,
            ancestry,
        }
    }
}

/// Expands the branch if needed, then mirrors the subtree root.
///
/// The name is resolved against the tree's own named roots first, then the
/// registry. A missing name fails this step but leaves the branch
/// unexpanded, so a later step can succeed once the subtree is registered.
pub(crate) fn update_branch(
    arena: &mut Arena,
    id: NodeId,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    let child = match branch(arena, id).child {
        Some(child) => child,
        None => expand(arena, id, ctx)?,
    };

    update_passthrough(arena, child, ctx)
}

fn expand(arena: &mut Arena, id: NodeId, ctx: &mut TickContext<'_>) -> Result<NodeId> {
    let Branch {
        reference,
        ancestry,
        ..
    } = branch(arena, id);

    if ancestry.contains(reference) {
        return Err(DefinitionError::SubtreeCycle(reference.clone()).into());
    }

    let definition = match ctx.subtrees.get(reference) {
        Some(definition) => definition.clone(),
        None => registry::subtree(reference)?.ok_or_else(|| TreeError::SubtreeLookup {
            name: reference.clone(),
        })?,
    };

    let mut nested = ancestry.clone();
    nested.push(reference.clone());

    let child = assemble::instantiate(arena, &definition, &nested)?;
    arena.adopt(Some(id), child);
    branch_mut(arena, id).child = Some(child);

    debug!(
        node = id.index(),
        subtree = %nested[nested.len() - 1],
        root = child.index(),
        nodes = arena.len(),
        "expanded branch"
    );

    Ok(child)
}

fn branch(arena: &Arena, id: NodeId) -> &Branch {
    match &arena[id].kind {
        NodeKind::Branch(branch) => branch,
        other => unreachable!("branch update dispatched to {} node", other.node_type()),
    }
}

fn branch_mut(arena: &mut Arena, id: NodeId) -> &mut Branch {
    match &mut arena[id].kind {
        NodeKind::Branch(branch) => branch,
        other => unreachable!("branch update dispatched to {} node", other.node_type()),
    }
}

/// Shared bookkeeping for repeat and retry.
pub(crate) struct Iterations {
    pub(crate) child: NodeId,
    /// Count bounds from the definition; unbounded when `None`.
    pub(crate) bounds: Option<Bounds>,
    /// Count chosen for the current activation.
    pub(crate) target: Option<u64>,
    pub(crate) completed: u64,
}

impl Iterations {
    pub(crate) fn new(child: NodeId, bounds: Option<Bounds>) -> Self {
        Self {
            child,
            bounds,
            target: None,
            completed: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.target = None;
        self.completed = 0;
    }

    fn exhausted(&self) -> bool {
        self.target.is_some_and(|target| self.completed >= target)
    }
}

/// Re-runs its child until a number of successful iterations complete.
pub(crate) type Repeat = Iterations;

/// Re-runs its child until it succeeds or the failed attempts run out.
pub(crate) type Retry = Iterations;

/// # Semantics
///
/// - On activation the child is reset and the target count is chosen once
/// - Each child success counts one iteration; the child is reset and re-run
///   on the following step
/// - `Failed` immediately if the child fails
/// - `Succeeded` on the step after the target count is reached
/// - Without a count the node runs until something external stops it
pub(crate) fn update_repeat(
    arena: &mut Arena,
    id: NodeId,
    activating: bool,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    update_iterations(arena, id, activating, ctx, State::Succeeded)
}

/// The mirror of [`update_repeat`]: counts failed attempts and succeeds as
/// soon as the child does.
pub(crate) fn update_retry(
    arena: &mut Arena,
    id: NodeId,
    activating: bool,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    update_iterations(arena, id, activating, ctx, State::Failed)
}

/// `counted` is the child outcome that consumes one iteration; the other
/// resolved outcome ends the node immediately.
fn update_iterations(
    arena: &mut Arena,
    id: NodeId,
    activating: bool,
    ctx: &mut TickContext<'_>,
    counted: State,
) -> Result<UpdateOutcome> {
    if activating {
        let child = iterations(arena, id).child;
        node::reset(arena, child);

        let state = iterations_mut(arena, id);
        state.completed = 0;
        state.target = None;
    }

    // Unset until a draw succeeds.
    let state = iterations(arena, id);
    if let (None, Some(bounds)) = (state.target, state.bounds) {
        let target = ctx.sample(bounds)?;
        iterations_mut(arena, id).target = Some(target);
    }

    let state = iterations(arena, id);
    let child = state.child;
    if state.exhausted() {
        return Ok(UpdateOutcome::Settled(counted));
    }

    if arena[child].state == counted {
        node::reset(arena, child);
    }

    let result = settle!(node::update(arena, child, ctx));
    if result == counted {
        iterations_mut(arena, id).completed += 1;
        Ok(UpdateOutcome::Settled(State::Running))
    } else if result.is_resolved() {
        Ok(UpdateOutcome::Settled(result))
    } else {
        Ok(UpdateOutcome::Settled(State::Running))
    }
}

fn iterations(arena: &Arena, id: NodeId) -> &Iterations {
    match &arena[id].kind {
        NodeKind::Repeat(state) | NodeKind::Retry(state) => state,
        other => unreachable!("iteration update dispatched to {} node", other.node_type()),
    }
}

fn iterations_mut(arena: &mut Arena, id: NodeId) -> &mut Iterations {
    match &mut arena[id].kind {
        NodeKind::Repeat(state) | NodeKind::Retry(state) => state,
        other => unreachable!("iteration update dispatched to {} node", other.node_type()),
    }
}
