//! Leaf nodes: the only nodes that consult the agent or a clock.

use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::task::noop_waker_ref;
use serde_json::Value;
use tracing::debug;

use crate::agent::{CallValue, PendingAction};
use crate::definition::Bounds;
use crate::error::{ContractViolation, Result, TreeError};
use crate::node::{Arena, NodeId, NodeKind, TickContext, UpdateOutcome};
use crate::State;

/// Invokes a named function that may take several steps to finish.
pub(crate) struct Action {
    pub(crate) call: String,
    pub(crate) args: Vec<Value>,
    /// Set once the function has returned for the current activation.
    pub(crate) invoked: bool,
    /// Outstanding async result, polled once per step.
    pub(crate) pending: Option<PendingAction>,
}

impl Action {
    pub(crate) fn new(call: String, args: Vec<Value>) -> Self {
        Self {
            call,
            args,
            invoked: false,
            pending: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.invoked = false;
        self.pending = None;
    }
}

/// # Semantics
///
/// - The function is invoked once per activation; a lookup error leaves it
///   uninvoked so the next step tries again
/// - No value means `Running` until a guard or reset ends the activation
/// - A resolved state resolves the node on the same step
/// - A pending handle keeps the node `Running` and is polled on each later
///   step; the step that observes it settled resolves the node
pub(crate) fn update_action(
    arena: &mut Arena,
    id: NodeId,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    let action = action_mut(arena, id);
    if let Some(pending) = action.pending.as_mut() {
        let mut cx = Context::from_waker(noop_waker_ref());
        let Poll::Ready(settled) = pending.poll_unpin(&mut cx) else {
            return Ok(UpdateOutcome::Settled(State::Running));
        };

        action.pending = None;
        return match settled {
            Ok(state) if state.is_resolved() => Ok(UpdateOutcome::Settled(state)),
            Ok(state) => Err(ContractViolation::PendingState {
                call: action.call.clone(),
                state,
            }
            .into()),
            Err(source) => Err(TreeError::Action {
                call: action.call.clone(),
                source,
            }),
        };
    }

    if action.invoked {
        return Ok(UpdateOutcome::Settled(State::Running));
    }

    let Action { call, args, .. } = &*action;
    let value = ctx.invoke(call, args)?;
    let action = action_mut(arena, id);
    action.invoked = true;

    match value {
        CallValue::None | CallValue::State(State::Running) => {
            Ok(UpdateOutcome::Settled(State::Running))
        }
        CallValue::State(state) if state.is_resolved() => Ok(UpdateOutcome::Settled(state)),
        CallValue::Pending(pending) => {
            debug!(node = id.index(), call = %action.call, "action returned a pending handle");
            action.pending = Some(pending);
            Ok(UpdateOutcome::Settled(State::Running))
        }
        other => Err(ContractViolation::ActionReturn {
            call: action.call.clone(),
            found: other.describe(),
        }
        .into()),
    }
}

/// A synchronous boolean check; never `Running`.
pub(crate) struct Condition {
    pub(crate) call: String,
    pub(crate) args: Vec<Value>,
}

pub(crate) fn update_condition(
    arena: &mut Arena,
    id: NodeId,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    let NodeKind::Condition(Condition { call, args }) = &arena[id].kind else {
        unreachable!("condition update dispatched to {} node", arena[id].node_type());
    };

    match ctx.invoke(call, args)? {
        CallValue::Bool(value) => Ok(UpdateOutcome::Settled(State::from_outcome(value))),
        other => Err(ContractViolation::ConditionReturn {
            call: call.clone(),
            found: other.describe(),
        }
        .into()),
    }
}

/// Stays `Running` until a duration elapses.
pub(crate) struct Wait {
    /// Milliseconds; without a duration the wait never resolves by itself.
    pub(crate) duration: Option<Bounds>,
    pub(crate) target: Option<Duration>,
    pub(crate) elapsed: Duration,
}

impl Wait {
    pub(crate) fn new(duration: Option<Bounds>) -> Self {
        Self {
            duration,
            target: None,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.target = None;
        self.elapsed = Duration::ZERO;
    }
}

/// The target is chosen once per activation, on the first update that
/// manages to draw it; elapsed time accumulates the step delta on every
/// update, the activation step included.
pub(crate) fn update_wait(
    arena: &mut Arena,
    id: NodeId,
    activating: bool,
    ctx: &mut TickContext<'_>,
) -> Result<UpdateOutcome> {
    if activating {
        let wait = wait_mut(arena, id);
        wait.target = None;
        wait.elapsed = Duration::ZERO;
    }

    // A failed draw leaves the target unset so the next update draws again.
    let wait = wait_mut(arena, id);
    if let (None, Some(bounds)) = (wait.target, wait.duration) {
        let target = Duration::from_millis(ctx.sample(bounds)?);
        wait_mut(arena, id).target = Some(target);
    }

    let wait = wait_mut(arena, id);
    wait.elapsed = wait.elapsed.saturating_add(ctx.delta);

    Ok(UpdateOutcome::Settled(match wait.target {
        Some(target) if wait.elapsed >= target => State::Succeeded,
        _ => State::Running,
    }))
}

fn action_mut(arena: &mut Arena, id: NodeId) -> &mut Action {
    match &mut arena[id].kind {
        NodeKind::Action(action) => action,
        other => unreachable!("action update dispatched to {} node", other.node_type()),
    }
}

fn wait_mut(arena: &mut Arena, id: NodeId) -> &mut Wait {
    match &mut arena[id].kind {
        NodeKind::Wait(wait) => wait,
        other => unreachable!("wait update dispatched to {} node", other.node_type()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::channel::oneshot;

    use super::*;
    use crate::builder::{action, condition, root, wait, wait_between, wait_forever};
    use crate::{FnAgent, Tree, TreeOptions};

    fn fixed_delta(seconds: f64) -> TreeOptions {
        TreeOptions::default().with_delta_time(move || seconds)
    }

    #[test]
    fn condition_maps_booleans() {
        let mut agent = FnAgent::new()
            .with("Yes", |_| CallValue::Bool(true))
            .with("No", |_| CallValue::Bool(false));

        let mut tree = Tree::new(root(condition("Yes")), TreeOptions::default()).unwrap();
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);

        let mut tree = Tree::new(root(condition("No")), TreeOptions::default()).unwrap();
        assert_eq!(tree.step(&mut agent).unwrap(), State::Failed);
    }

    #[test]
    fn condition_rejects_non_boolean_results() {
        let mut agent = FnAgent::new().with("Maybe", |_| CallValue::State(State::Succeeded));
        let mut tree = Tree::new(root(condition("Maybe")), TreeOptions::default()).unwrap();

        assert!(matches!(
            tree.step(&mut agent),
            Err(TreeError::Contract(ContractViolation::ConditionReturn { .. }))
        ));
    }

    #[test]
    fn action_rejects_boolean_results() {
        let mut agent = FnAgent::new().with("Jump", |_| CallValue::Bool(true));
        let mut tree = Tree::new(root(action("Jump")), TreeOptions::default()).unwrap();

        assert!(matches!(
            tree.step(&mut agent),
            Err(TreeError::Contract(ContractViolation::ActionReturn { .. }))
        ));
    }

    #[test]
    fn action_is_invoked_once_per_activation() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut agent = FnAgent::new().with("Idle", move |_| {
            *counter.lock().unwrap() += 1;
            CallValue::None
        });
        let mut tree = Tree::new(root(action("Idle")), TreeOptions::default()).unwrap();

        for _ in 0..3 {
            assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        }
        assert_eq!(*calls.lock().unwrap(), 1);

        tree.reset();
        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn missing_action_is_invoked_once_defined() {
        let mut agent = FnAgent::new();
        let mut tree = Tree::new(root(action("Late")), TreeOptions::default()).unwrap();

        assert!(matches!(
            tree.step(&mut agent),
            Err(TreeError::Lookup { ref name }) if name == "Late"
        ));

        agent.insert("Late", |_| CallValue::State(State::Succeeded));
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);
    }

    #[test]
    fn pending_action_resolves_on_a_later_step_without_reinvoking() {
        let (sender, receiver) = oneshot::channel::<State>();
        let mut receiver = Some(receiver);
        let mut agent = FnAgent::new().with("Fetch", move |_| {
            let receiver = receiver.take().expect("Fetch invoked twice");
            CallValue::pending(async move { receiver.await.map_err(anyhow::Error::from) })
        });
        let mut tree = Tree::new(root(action("Fetch")), TreeOptions::default()).unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);

        sender.send(State::Succeeded).unwrap();
        assert_eq!(tree.step(&mut agent).unwrap(), State::Succeeded);
    }

    #[test]
    fn pending_action_errors_surface_to_the_caller() {
        let (sender, receiver) = oneshot::channel::<State>();
        let mut receiver = Some(receiver);
        let mut agent = FnAgent::new().with("Fetch", move |_| {
            let receiver = receiver.take().expect("Fetch invoked twice");
            CallValue::pending(async move { receiver.await.map_err(anyhow::Error::from) })
        });
        let mut tree = Tree::new(root(action("Fetch")), TreeOptions::default()).unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        drop(sender);

        let error = tree.step(&mut agent).unwrap_err();
        assert!(matches!(error, TreeError::Action { ref call, .. } if call == "Fetch"));
        assert_eq!(tree.state(), State::Running);
    }

    #[test]
    fn pending_action_must_settle_to_a_resolved_state() {
        let mut agent = FnAgent::new().with("Odd", |_| {
            CallValue::pending(async { Ok::<_, anyhow::Error>(State::Ready) })
        });
        let mut tree = Tree::new(root(action("Odd")), TreeOptions::default()).unwrap();

        assert_eq!(tree.step(&mut agent).unwrap(), State::Running);
        assert!(matches!(
            tree.step(&mut agent),
            Err(TreeError::Contract(ContractViolation::PendingState { .. }))
        ));
    }

    #[test]
    fn wait_accumulates_step_deltas() {
        let mut tree = Tree::new(root(wait(250)), fixed_delta(0.1)).unwrap();

        assert_eq!(tree.step(&mut ()).unwrap(), State::Running);
        assert_eq!(tree.step(&mut ()).unwrap(), State::Running);
        assert_eq!(tree.step(&mut ()).unwrap(), State::Succeeded);
    }

    #[test]
    fn wait_draws_duration_between_bounds() {
        // 0.0 over [100, 300] picks the minimum.
        let options = fixed_delta(0.1).with_random(|| 0.0);
        let mut tree = Tree::new(root(wait_between(100, 300)), options).unwrap();

        assert_eq!(tree.step(&mut ()).unwrap(), State::Succeeded);
    }

    #[test]
    fn wait_without_duration_never_resolves() {
        let mut tree = Tree::new(root(wait_forever()), fixed_delta(60.0)).unwrap();

        for _ in 0..10 {
            assert_eq!(tree.step(&mut ()).unwrap(), State::Running);
        }
    }

    #[test]
    fn negative_delta_time_is_a_contract_violation() {
        let mut tree = Tree::new(root(wait(10)), fixed_delta(-1.0)).unwrap();

        assert!(matches!(
            tree.step(&mut ()),
            Err(TreeError::Contract(ContractViolation::InvalidDeltaTime(_)))
        ));
    }

    #[test]
    fn delta_too_large_for_a_duration_is_a_contract_violation() {
        let mut tree = Tree::new(root(wait(10)), fixed_delta(1e20)).unwrap();

        assert!(matches!(
            tree.step(&mut ()),
            Err(TreeError::Contract(ContractViolation::InvalidDeltaTime(seconds))) if seconds == 1e20
        ));
    }

    #[test]
    fn elapsed_time_saturates_instead_of_overflowing() {
        let mut tree = Tree::new(root(wait_forever()), fixed_delta(1e19)).unwrap();

        for _ in 0..3 {
            assert_eq!(tree.step(&mut ()).unwrap(), State::Running);
        }
        assert_eq!(
            tree.inspect()[1].args["elapsedMs"],
            Value::from(u64::MAX)
        );
    }

    #[test]
    fn wait_draws_again_after_a_failed_draw() {
        let mut rolls = vec![1.0].into_iter();
        let options = fixed_delta(0.05).with_random(move || rolls.next().unwrap_or(0.0));
        let mut tree = Tree::new(root(wait_between(100, 300)), options).unwrap();

        assert!(matches!(
            tree.step(&mut ()),
            Err(TreeError::Contract(ContractViolation::RandomOutOfRange(roll))) if roll == 1.0
        ));
        // The second roll picks 100ms, reached after two 50ms steps.
        assert_eq!(tree.step(&mut ()).unwrap(), State::Running);
        assert_eq!(tree.step(&mut ()).unwrap(), State::Succeeded);
    }
}
