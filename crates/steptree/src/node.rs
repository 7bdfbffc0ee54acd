//! Node arena and the shared node state machine.
//!
//! The tree is an arena of [`Node`]s. Composites and decorators own their
//! children by index; nothing is reference-counted and the tree never
//! contains cycles. Node behaviour is a closed [`NodeKind`] variant
//! dispatched by a single match, and the update/reset/abort contract is a
//! set of free functions over the arena.
//!
//! # Update Contract
//!
//! [`update`] on a node:
//! 1. returns immediately if the node is already resolved
//! 2. evaluates the node's guard path, root first
//! 3. fires `entry` if the node is activating from READY
//! 4. runs the node-specific resolution step
//! 5. fires `step`, then `exit` if the node resolved
//!
//! A failing guard produces an [`Abort`] that travels back up the call chain
//! as [`UpdateOutcome::Aborted`] until it reaches the node that owns the
//! guard. That node aborts its active subtree and takes the abort state;
//! every ancestor above it resolves normally from the new child state.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::agent::{Agent, CallValue};
use crate::attribute::{Attributes, CallbackKind, ExitDetails, GuardPath};
use crate::composite::{self, Lotto};
use crate::decorator::{self, Branch, Repeat, Retry};
use crate::definition::{Bounds, NodeDefinition};
use crate::error::{ContractViolation, Result, TreeError};
use crate::leaf::{self, Action, Condition, Wait};
use crate::options::RandomFn;
use crate::registry;
use crate::State;

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeType {
    Root,
    Branch,
    Sequence,
    Selector,
    Parallel,
    Race,
    All,
    Lotto,
    Repeat,
    Retry,
    Flip,
    Succeed,
    Fail,
    Action,
    Condition,
    Wait,
}

/// Node-specific data and bookkeeping.
pub(crate) enum NodeKind {
    Root { child: NodeId },
    Branch(Branch),
    Sequence { children: Vec<NodeId> },
    Selector { children: Vec<NodeId> },
    Parallel { children: Vec<NodeId> },
    Race { children: Vec<NodeId> },
    All { children: Vec<NodeId> },
    Lotto(Lotto),
    Repeat(Repeat),
    Retry(Retry),
    Flip { child: NodeId },
    Succeed { child: NodeId },
    Fail { child: NodeId },
    Action(Action),
    Condition(Condition),
    Wait(Wait),
}

impl NodeKind {
    pub(crate) fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Root { .. } => NodeType::Root,
            NodeKind::Branch(_) => NodeType::Branch,
            NodeKind::Sequence { .. } => NodeType::Sequence,
            NodeKind::Selector { .. } => NodeType::Selector,
            NodeKind::Parallel { .. } => NodeType::Parallel,
            NodeKind::Race { .. } => NodeType::Race,
            NodeKind::All { .. } => NodeType::All,
            NodeKind::Lotto(_) => NodeType::Lotto,
            NodeKind::Repeat(_) => NodeType::Repeat,
            NodeKind::Retry(_) => NodeType::Retry,
            NodeKind::Flip { .. } => NodeType::Flip,
            NodeKind::Succeed { .. } => NodeType::Succeed,
            NodeKind::Fail { .. } => NodeType::Fail,
            NodeKind::Action(_) => NodeType::Action,
            NodeKind::Condition(_) => NodeType::Condition,
            NodeKind::Wait(_) => NodeType::Wait,
        }
    }

    pub(crate) fn children(&self) -> &[NodeId] {
        match self {
            NodeKind::Root { child }
            | NodeKind::Flip { child }
            | NodeKind::Succeed { child }
            | NodeKind::Fail { child } => std::slice::from_ref(child),
            NodeKind::Repeat(repeat) => std::slice::from_ref(&repeat.child),
            NodeKind::Retry(retry) => std::slice::from_ref(&retry.child),
            NodeKind::Branch(branch) => branch.child.as_slice(),
            NodeKind::Sequence { children }
            | NodeKind::Selector { children }
            | NodeKind::Parallel { children }
            | NodeKind::Race { children }
            | NodeKind::All { children } => children,
            NodeKind::Lotto(lotto) => &lotto.children,
            NodeKind::Action(_) | NodeKind::Condition(_) | NodeKind::Wait(_) => &[],
        }
    }

    /// Clears per-activation bookkeeping.
    fn reset(&mut self) {
        match self {
            NodeKind::Lotto(lotto) => lotto.reset(),
            NodeKind::Repeat(repeat) => repeat.reset(),
            NodeKind::Retry(retry) => retry.reset(),
            NodeKind::Action(action) => action.reset(),
            NodeKind::Wait(wait) => wait.reset(),
            _ => {}
        }
    }
}

pub(crate) struct Node {
    /// Optional id from the definition.
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) state: State,
    pub(crate) attributes: Attributes,
    pub(crate) guard_path: GuardPath,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn new(name: Option<String>, attributes: Attributes, kind: NodeKind) -> Self {
        Self {
            name,
            parent: None,
            state: State::Ready,
            attributes,
            guard_path: GuardPath::default(),
            kind,
        }
    }

    pub(crate) fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub(crate) fn children(&self) -> &[NodeId] {
        self.kind.children()
    }
}

#[derive(Default)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Attaches a freshly built subtree below `parent` and derives its guard paths.
    pub(crate) fn adopt(&mut self, parent: Option<NodeId>, child: NodeId) {
        self[child].parent = parent;
        let base = match parent {
            Some(parent) => self[parent].guard_path.clone(),
            None => GuardPath::default(),
        };
        self.apply_guard_paths(child, &base);
    }

    fn apply_guard_paths(&mut self, id: NodeId, base: &GuardPath) {
        let path = base.extended(id, &self[id].attributes);
        let children = self[id].children().to_vec();
        for child in children {
            self[child].parent = Some(id);
            self.apply_guard_paths(child, &path);
        }
        self[id].guard_path = path;
    }
}

impl Index<NodeId> for Arena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Arena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

/// Everything a single step needs besides the arena.
pub(crate) struct TickContext<'a> {
    pub(crate) agent: &'a mut dyn Agent,
    pub(crate) random: &'a mut RandomFn,
    /// Elapsed time since the previous step, sampled once per step.
    pub(crate) delta: Duration,
    /// Named roots local to the tree being stepped.
    pub(crate) subtrees: &'a HashMap<String, NodeDefinition>,
}

impl TickContext<'_> {
    /// Resolves `name` against the agent, then the registry.
    pub(crate) fn invoke(&mut self, name: &str, args: &[Value]) -> Result<CallValue> {
        if let Some(value) = self.agent.invoke(name, args) {
            return Ok(value);
        }

        match registry::function(name)? {
            Some(function) => Ok(function(args)),
            None => Err(TreeError::Lookup {
                name: name.to_string(),
            }),
        }
    }

    /// Draws a value in `[0, 1)` from the configured random source.
    pub(crate) fn random(&mut self) -> Result<f64> {
        let value = (self.random)();
        if (0.0..1.0).contains(&value) {
            Ok(value)
        } else {
            Err(ContractViolation::RandomOutOfRange(value).into())
        }
    }

    /// Picks a fixed amount, or draws one uniformly within inclusive bounds.
    pub(crate) fn sample(&mut self, bounds: Bounds) -> Result<u64> {
        match bounds {
            Bounds::Exact(value) => Ok(value.max(0) as u64),
            Bounds::Between(min, max) => {
                let (min, max) = (min.max(0) as u64, max.max(0) as u64);
                let span = (max - min + 1) as f64;
                let offset = (self.random()? * span).floor() as u64;
                Ok((min + offset).min(max))
            }
        }
    }
}

/// A guard failure travelling back to the node that owns the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Abort {
    pub(crate) source: NodeId,
    pub(crate) state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOutcome {
    /// The node's state after this update.
    Settled(State),
    /// A guard owned by an ancestor failed; unwind to `source`.
    Aborted(Abort),
}

/// Updates a node and, through it, its active subtree.
pub(crate) fn update(
    arena: &mut Arena,
    id: NodeId,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    let state = arena[id].state;
    if state.is_resolved() {
        return Ok(UpdateOutcome::Settled(state));
    }

    if let Some(abort) = evaluate_guard_path(arena, id, ctx)? {
        return unwind(arena, id, abort, ctx);
    }

    let activating = state.is_ready();
    if activating {
        fire_callback(arena, id, CallbackKind::Entry, None, ctx)?;
        arena[id].state = State::Running;
    }

    let next = match resolve(arena, id, activating, ctx)? {
        UpdateOutcome::Settled(next) => next,
        UpdateOutcome::Aborted(abort) => return unwind(arena, id, abort, ctx),
    };

    if next != state {
        trace!(node = id.index(), node_type = %arena[id].node_type(), from = %state, to = %next, "node transition");
    }
    arena[id].state = next;

    fire_callback(arena, id, CallbackKind::Step, None, ctx)?;
    if next.is_resolved() {
        let details = ExitDetails {
            succeeded: next.is_succeeded(),
            aborted: false,
        };
        fire_callback(arena, id, CallbackKind::Exit, Some(details), ctx)?;
    }

    Ok(UpdateOutcome::Settled(next))
}

/// Runs the node-specific resolution step.
fn resolve(
    arena: &mut Arena,
    id: NodeId,
    activating: bool,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    match &arena[id].kind {
        NodeKind::Root { child } => {
            let child = *child;
            decorator::update_passthrough(arena, child, ctx)
        }
        NodeKind::Branch(_) => decorator::update_branch(arena, id, ctx),
        NodeKind::Sequence { children } => {
            let children = children.clone();
            composite::update_sequence(arena, &children, ctx)
        }
        NodeKind::Selector { children } => {
            let children = children.clone();
            composite::update_selector(arena, &children, ctx)
        }
        NodeKind::Parallel { children } => {
            let children = children.clone();
            composite::update_parallel(arena, &children, ctx)
        }
        NodeKind::Race { children } => {
            let children = children.clone();
            composite::update_race(arena, &children, ctx)
        }
        NodeKind::All { children } => {
            let children = children.clone();
            composite::update_all(arena, &children, ctx)
        }
        NodeKind::Lotto(_) => composite::update_lotto(arena, id, activating, ctx),
        NodeKind::Repeat(_) => decorator::update_repeat(arena, id, activating, ctx),
        NodeKind::Retry(_) => decorator::update_retry(arena, id, activating, ctx),
        NodeKind::Flip { child } => {
            let child = *child;
            decorator::update_mapped(arena, child, ctx, State::invert)
        }
        NodeKind::Succeed { child } => {
            let child = *child;
            decorator::update_mapped(arena, child, ctx, |state| {
                if state.is_resolved() {
                    State::Succeeded
                } else {
                    state
                }
            })
        }
        NodeKind::Fail { child } => {
            let child = *child;
            decorator::update_mapped(arena, child, ctx, |state| {
                if state.is_resolved() {
                    State::Failed
                } else {
                    state
                }
            })
        }
        NodeKind::Action(_) => leaf::update_action(arena, id, ctx),
        NodeKind::Condition(_) => leaf::update_condition(arena, id, ctx),
        NodeKind::Wait(_) => leaf::update_wait(arena, id, activating, ctx),
    }
}

/// Finds the first unsatisfied guard on the node's path, scanning from the root.
fn evaluate_guard_path(
    arena: &Arena,
    id: NodeId,
    ctx: &mut TickContext<'_>,
) -> Result<Option<Abort>> {
    for link in arena[id].guard_path.links() {
        let Some(guard) = arena[link.node].attributes.guard(link.kind) else {
            continue;
        };

        if !guard.is_satisfied(ctx)? {
            let state = State::from_outcome(guard.succeed_on_abort);
            debug!(
                node = id.index(),
                source = link.node.index(),
                guard = %guard.kind,
                call = %guard.call,
                %state,
                "guard unsatisfied"
            );
            return Ok(Some(Abort {
                source: link.node,
                state,
            }));
        }
    }

    Ok(None)
}

/// Passes an abort up unless `id` is its source, in which case the abort lands here.
fn unwind(
    arena: &mut Arena,
    id: NodeId,
    abort: Abort,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    if abort.source != id {
        return Ok(UpdateOutcome::Aborted(abort));
    }

    self::abort(arena, id, abort.state.is_succeeded(), ctx)?;
    arena[id].state = abort.state;
    debug!(node = id.index(), node_type = %arena[id].node_type(), state = %abort.state, "node aborted by guard");

    Ok(UpdateOutcome::Settled(abort.state))
}

/// Forces an active node and its active descendants back to READY.
///
/// Descendants are aborted first, so exit callbacks fire deepest first, each
/// with `aborted: true`. Nodes that are not RUNNING are left untouched.
pub(crate) fn abort(
    arena: &mut Arena,
    id: NodeId,
    succeeded: bool,
    ctx: &mut TickContext<'_>,
) -> Result<()> {
    if !arena[id].state.is_running() {
        return Ok(());
    }

    let children = arena[id].children().to_vec();
    for child in children {
        abort(arena, child, succeeded, ctx)?;
    }

    // Still RUNNING until exit succeeds; a failed exit is retried next step.
    let details = ExitDetails {
        succeeded,
        aborted: true,
    };
    fire_callback(arena, id, CallbackKind::Exit, Some(details), ctx)?;

    reset(arena, id);
    Ok(())
}

/// Returns a node and its subtree to READY without firing callbacks.
pub(crate) fn reset(arena: &mut Arena, id: NodeId) {
    let node = &mut arena[id];
    node.state = State::Ready;
    node.kind.reset();

    let children = node.children().to_vec();
    for child in children {
        reset(arena, child);
    }
}

fn fire_callback(
    arena: &Arena,
    id: NodeId,
    kind: CallbackKind,
    exit: Option<ExitDetails>,
    ctx: &mut TickContext<'_>,
) -> Result<()> {
    match arena[id].attributes.callback(kind) {
        Some(callback) => callback.fire(ctx, exit),
        None => Ok(()),
    }
}

/// Runs a child update and hands back its settled state, or returns the abort.
macro_rules! settle {
    ($update:expr) => {
        match $update? {
            $crate::node::UpdateOutcome::Settled(state) => state,
            aborted @ $crate::node::UpdateOutcome::Aborted(_) => return Ok(aborted),
        }
    };
}

pub(crate) use settle;
