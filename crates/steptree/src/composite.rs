//! Composite node resolution rules.
//!
//! Composite nodes aggregate the states of several children:
//! - [`update_sequence`] (AND logic) and [`update_selector`] (OR logic) walk
//!   children left to right, stopping at the first child that blocks progress
//! - [`update_parallel`], [`update_race`] and [`update_all`] update every
//!   unresolved child each step, cooperatively and in order
//! - [`update_lotto`] picks one child per activation by weighted draw and
//!   mirrors it
//!
//! Children already resolved in earlier steps are skipped, not re-run.

use tracing::debug;

use crate::node::{self, Arena, NodeId, NodeKind, TickContext, UpdateOutcome, settle};
use crate::State;
use crate::error::Result;

/// Executes children in order until one fails.
///
/// # Semantics
///
/// - If a child is `Failed`, the sequence **stops** and is `Failed`
/// - If a child is `Running`, the sequence **stops** and is `Running`
/// - If a child is `Succeeded`, the sequence **continues** to the next child
/// - If every child is `Succeeded`, the sequence is `Succeeded`
///
/// Children left of a running child keep their `Succeeded` state across
/// steps and are not re-run.
pub(crate) fn update_sequence(
    arena: &mut Arena,
    children: &[NodeId],
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    for &child in children {
        match settle!(node::update(arena, child, ctx)) {
            State::Succeeded => continue,
            State::Failed => return Ok(UpdateOutcome::Settled(State::Failed)),
            State::Running | State::Ready => return Ok(UpdateOutcome::Settled(State::Running)),
        }
    }

    Ok(UpdateOutcome::Settled(State::Succeeded))
}

/// Executes children in order until one succeeds.
///
/// The mirror of [`update_sequence`]: `Succeeded` as soon as any child
/// succeeds, `Failed` only when every child failed.
pub(crate) fn update_selector(
    arena: &mut Arena,
    children: &[NodeId],
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    for &child in children {
        match settle!(node::update(arena, child, ctx)) {
            State::Failed => continue,
            State::Succeeded => return Ok(UpdateOutcome::Settled(State::Succeeded)),
            State::Running | State::Ready => return Ok(UpdateOutcome::Settled(State::Running)),
        }
    }

    Ok(UpdateOutcome::Settled(State::Failed))
}

/// Updates every unresolved child; a concurrent sequence.
///
/// `Failed` as soon as any child fails, aborting the children still running.
/// `Succeeded` once every child succeeded.
pub(crate) fn update_parallel(
    arena: &mut Arena,
    children: &[NodeId],
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    for &child in children {
        if settle!(node::update(arena, child, ctx)).is_failed() {
            abort_running(arena, children, ctx)?;
            return Ok(UpdateOutcome::Settled(State::Failed));
        }
    }

    let all_succeeded = children
        .iter()
        .all(|&child| arena[child].state.is_succeeded());

    Ok(UpdateOutcome::Settled(if all_succeeded {
        State::Succeeded
    } else {
        State::Running
    }))
}

/// Updates every unresolved child; the first to succeed wins.
///
/// `Succeeded` as soon as any child succeeds, aborting the children still
/// running. `Failed` once every child failed.
pub(crate) fn update_race(
    arena: &mut Arena,
    children: &[NodeId],
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    for &child in children {
        if settle!(node::update(arena, child, ctx)).is_succeeded() {
            abort_running(arena, children, ctx)?;
            return Ok(UpdateOutcome::Settled(State::Succeeded));
        }
    }

    let all_failed = children.iter().all(|&child| arena[child].state.is_failed());

    Ok(UpdateOutcome::Settled(if all_failed {
        State::Failed
    } else {
        State::Running
    }))
}

/// Updates every unresolved child until all of them resolve.
///
/// Once nothing is left running: `Succeeded` if at least one child
/// succeeded, otherwise `Failed`.
pub(crate) fn update_all(
    arena: &mut Arena,
    children: &[NodeId],
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    for &child in children {
        settle!(node::update(arena, child, ctx));
    }

    if children
        .iter()
        .any(|&child| arena[child].state.is_pending())
    {
        return Ok(UpdateOutcome::Settled(State::Running));
    }

    let any_succeeded = children
        .iter()
        .any(|&child| arena[child].state.is_succeeded());

    Ok(UpdateOutcome::Settled(State::from_outcome(any_succeeded)))
}

fn abort_running(arena: &mut Arena, children: &[NodeId], ctx: &mut TickContext<'_>) -> Result<()> {
    for &child in children {
        node::abort(arena, child, false, ctx)?;
    }
    Ok(())
}

/// A composite that delegates to one child chosen by weighted draw.
pub(crate) struct Lotto {
    pub(crate) children: Vec<NodeId>,
    /// Ticket counts, one per child. `None` means uniform.
    pub(crate) weights: Option<Vec<u64>>,
    pub(crate) selected: Option<NodeId>,
}

impl Lotto {
    pub(crate) fn new(children: Vec<NodeId>, weights: Option<Vec<u64>>) -> Self {
        Self {
            children,
            weights,
            selected: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.selected = None;
    }

    /// Maps a roll in `[0, 1)` onto the cumulative ticket buckets.
    pub(crate) fn draw(&self, roll: f64) -> NodeId {
        let weights = match &self.weights {
            Some(weights) => weights.clone(),
            None => vec![1; self.children.len()],
        };
        let total: u64 = weights.iter().sum();

        let mut ticket = ((roll * total as f64) as u64).min(total.saturating_sub(1));
        for (&child, weight) in self.children.iter().zip(weights) {
            if ticket < weight {
                return child;
            }
            ticket -= weight;
        }

        self.children[self.children.len() - 1]
    }
}

/// Selects a child on activation and mirrors its state.
///
/// Children that were not selected are never evaluated.
pub(crate) fn update_lotto(
    arena: &mut Arena,
    id: NodeId,
    activating: bool,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    let selected = match lotto(arena, id).selected {
        Some(selected) if !activating => selected,
        _ => {
            let roll = ctx.random()?;
            let lotto = lotto_mut(arena, id);
            let selected = lotto.draw(roll);
            lotto.selected = Some(selected);
            debug!(node = id.index(), selected = selected.index(), roll, "lotto selected child");
            selected
        }
    };

    let state = settle!(node::update(arena, selected, ctx));
    Ok(UpdateOutcome::Settled(state))
}

fn lotto(arena: &Arena, id: NodeId) -> &Lotto {
    match &arena[id].kind {
        NodeKind::Lotto(lotto) => lotto,
        other => unreachable!("lotto update dispatched to {} node", other.node_type()),
    }
}

fn lotto_mut(arena: &mut Arena, id: NodeId) -> &mut Lotto {
    match &mut arena[id].kind {
        NodeKind::Lotto(lotto) => lotto,
        other => unreachable!("lotto update dispatched to {} node", other.node_type()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::task::Poll;

    use super::*;
    use crate::builder::{action, all, condition, lotto as lotto_node, parallel, race, root, selector, sequence};
    use crate::{CallValue, FnAgent, Tree, TreeOptions};

    fn ids(values: &[usize]) -> Vec<NodeId> {
        values.iter().map(|&index| NodeId::new(index)).collect()
    }

    /// Agent whose actions report one scripted state per step of an activation.
    ///
    /// Leading `Running` entries become a pending handle that settles after
    /// that many steps; an all-`Running` script never resolves.
    fn scripted(script: &[(&str, &[State])]) -> FnAgent {
        let mut agent = FnAgent::new();
        for (name, states) in script {
            let running = states.iter().take_while(|state| state.is_running()).count();
            let outcome = states.get(running).copied();
            agent.insert(*name, move |_| match outcome {
                None => CallValue::None,
                Some(state) if running == 0 => CallValue::State(state),
                Some(state) => settles_after(running - 1, state),
            });
        }
        agent
    }

    fn settles_after(pending_polls: usize, state: State) -> CallValue {
        let mut remaining = pending_polls;
        CallValue::pending(futures::future::poll_fn(move |_| {
            if remaining == 0 {
                Poll::Ready(Ok::<_, anyhow::Error>(state))
            } else {
                remaining -= 1;
                Poll::Pending
            }
        }))
    }

    #[test]
    fn lotto_draw_maps_roll_to_weighted_bucket() {
        let lotto = Lotto::new(ids(&[1, 2, 3]), Some(vec![100, 100, 5]));

        assert_eq!(lotto.draw(0.0), NodeId::new(1));
        assert_eq!(lotto.draw(0.48), NodeId::new(1));
        assert_eq!(lotto.draw(0.6), NodeId::new(2));
        assert_eq!(lotto.draw(0.97), NodeId::new(2));
        assert_eq!(lotto.draw(0.99), NodeId::new(3));
    }

    #[test]
    fn lotto_draw_is_uniform_without_weights() {
        let lotto = Lotto::new(ids(&[4, 5]), None);

        assert_eq!(lotto.draw(0.25), NodeId::new(4));
        assert_eq!(lotto.draw(0.75), NodeId::new(5));
    }

    #[test]
    fn sequence_stops_at_running_child_and_does_not_rerun_succeeded_ones() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&calls);
        let mut agent = scripted(&[("Slow", &[State::Running, State::Succeeded])]).with(
            "Fast",
            move |_| {
                log.lock().unwrap().push("Fast");
                CallValue::State(State::Succeeded)
            },
        );

        let mut tree = Tree::new(
            root(sequence(vec![action("Fast"), action("Slow")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn selector_succeeds_on_first_success() {
        let mut agent = scripted(&[
            ("A", &[State::Failed]),
            ("B", &[State::Succeeded]),
            ("C", &[State::Failed]),
        ]);
        let mut tree = Tree::new(
            root(selector(vec![action("A"), action("B"), action("C")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);
        let states: Vec<State> = tree.inspect().iter().map(|node| node.state).collect();
        assert_eq!(
            states,
            vec![
                State::Succeeded,
                State::Succeeded,
                State::Failed,
                State::Succeeded,
                State::Ready
            ]
        );
    }

    #[test]
    fn selector_fails_when_all_fail() {
        let mut agent = FnAgent::new().with("No", |_| CallValue::Bool(false));
        let mut tree = Tree::new(
            root(selector(vec![condition("No"), condition("No")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Failed);
    }

    #[test]
    fn parallel_fails_fast_and_aborts_running_children() {
        let exits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&exits);
        let mut agent = scripted(&[
            ("Long", &[State::Running]),
            ("Broken", &[State::Running, State::Failed]),
        ])
        .with("OnExit", move |_| {
            *counter.lock().unwrap() += 1;
            CallValue::None
        });

        let mut tree = Tree::new(
            root(parallel(vec![
                action("Long").on_exit("OnExit"),
                action("Broken"),
            ])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Failed);
        assert_eq!(*exits.lock().unwrap(), 1);

        let details = tree.inspect();
        assert_eq!(details[2].state, State::Ready);
        assert_eq!(details[3].state, State::Failed);
    }

    #[test]
    fn parallel_succeeds_when_every_child_succeeds() {
        let mut agent = scripted(&[
            ("A", &[State::Running, State::Succeeded]),
            ("B", &[State::Succeeded]),
        ]);
        let mut tree = Tree::new(
            root(parallel(vec![action("A"), action("B")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);
    }

    #[test]
    fn race_succeeds_on_first_success_and_fails_only_when_all_fail() {
        let mut agent = scripted(&[
            ("Slow", &[State::Running]),
            ("Quick", &[State::Running, State::Succeeded]),
        ]);
        let mut tree = Tree::new(
            root(race(vec![action("Slow"), action("Quick")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);
        assert_eq!(tree.inspect()[2].state, State::Ready);

        let mut agent = scripted(&[
            ("A", &[State::Failed]),
            ("B", &[State::Running, State::Failed]),
        ]);
        let mut tree = Tree::new(
            root(race(vec![action("A"), action("B")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Failed);
    }

    #[test]
    fn all_waits_for_every_child_then_succeeds_if_any_succeeded() {
        let mut agent = scripted(&[
            ("A", &[State::Failed]),
            ("B", &[State::Running, State::Running, State::Succeeded]),
        ]);
        let mut tree = Tree::new(
            root(all(vec![action("A"), action("B")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);

        let mut agent = scripted(&[("A", &[State::Failed]), ("B", &[State::Failed])]);
        let mut tree = Tree::new(
            root(all(vec![action("A"), action("B")])),
            TreeOptions::default(),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Failed);
    }

    #[test]
    fn lotto_mirrors_selected_child_only() {
        let mut agent = scripted(&[
            ("First", &[State::Failed]),
            ("Second", &[State::Running, State::Succeeded]),
        ]);
        let mut tree = Tree::new(
            root(lotto_node(vec![action("First"), action("Second")])),
            TreeOptions::default().with_random(|| 0.9),
        )
        .unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);
        assert_eq!(tree.inspect()[2].state, State::Ready);
    }
}
