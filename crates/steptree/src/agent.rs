//! Agent capability interface.
//!
//! This module defines the [`Agent`] trait, the single seam through which
//! leaves, guards and callbacks reach the outside world. Function names are
//! resolved against the agent first and the process-wide
//! [`registry`](crate::registry) second; a name missing from both is a lookup
//! error raised when it is first invoked, so trees can be built before every
//! function is wired up.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::State;

/// A deferred action result polled once per step.
pub type PendingAction = Pin<Box<dyn Future<Output = anyhow::Result<State>> + Send>>;

/// Value returned by an agent or registry function.
///
/// Each caller accepts a subset:
/// - conditions and guards accept only [`CallValue::Bool`]
/// - actions accept [`CallValue::None`] (still running), a resolved
///   [`CallValue::State`] or [`CallValue::Pending`]
/// - callbacks ignore the value entirely
pub enum CallValue {
    /// The function produced no value.
    None,
    Bool(bool),
    State(State),
    Pending(PendingAction),
    /// Anything else, kept for error reporting.
    Other(Value),
}

impl CallValue {
    /// Wraps a future as a pending action result.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<State>> + Send + 'static,
    {
        CallValue::Pending(Box::pin(future))
    }

    /// Short description used in contract violation messages.
    pub fn describe(&self) -> String {
        match self {
            CallValue::None => "no value".to_string(),
            CallValue::Bool(value) => format!("boolean {value}"),
            CallValue::State(state) => format!("state {state}"),
            CallValue::Pending(_) => "a pending handle".to_string(),
            CallValue::Other(value) => format!("value {value}"),
        }
    }
}

impl fmt::Debug for CallValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<bool> for CallValue {
    fn from(value: bool) -> Self {
        CallValue::Bool(value)
    }
}

impl From<State> for CallValue {
    fn from(state: State) -> Self {
        CallValue::State(state)
    }
}

impl From<()> for CallValue {
    fn from(_: ()) -> Self {
        CallValue::None
    }
}

impl From<Value> for CallValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CallValue::None,
            Value::Bool(flag) => CallValue::Bool(flag),
            other => CallValue::Other(other),
        }
    }
}

/// The object a tree makes decisions for.
pub trait Agent {
    /// Invokes the named function with the declared arguments.
    ///
    /// Returns `None` when the agent has no function with this name, which
    /// makes the tree fall back to the registry.
    fn invoke(&mut self, name: &str, args: &[Value]) -> Option<CallValue>;
}

/// An agent that exposes no functions; every call goes to the registry.
impl Agent for () {
    fn invoke(&mut self, _name: &str, _args: &[Value]) -> Option<CallValue> {
        None
    }
}

impl<A: Agent + ?Sized> Agent for &mut A {
    #[inline]
    fn invoke(&mut self, name: &str, args: &[Value]) -> Option<CallValue> {
        (**self).invoke(name, args)
    }
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    #[inline]
    fn invoke(&mut self, name: &str, args: &[Value]) -> Option<CallValue> {
        (**self).invoke(name, args)
    }
}

type AgentFn = Box<dyn FnMut(&[Value]) -> CallValue + Send>;

/// An agent backed by a table of named closures.
///
/// # Example
///
/// ```rust
/// use steptree::{Agent, CallValue, FnAgent};
///
/// let mut agent = FnAgent::new()
///     .with("IsHungry", |_| CallValue::Bool(true))
///     .with("Eat", |_| CallValue::None);
///
/// assert!(agent.invoke("IsHungry", &[]).is_some());
/// assert!(agent.invoke("Sleep", &[]).is_none());
/// ```
#[derive(Default)]
pub struct FnAgent {
    functions: HashMap<String, AgentFn>,
}

impl FnAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function, replacing any previous one with the same name.
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: FnMut(&[Value]) -> CallValue + Send + 'static,
    {
        self.insert(name, function);
        self
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: FnMut(&[Value]) -> CallValue + Send + 'static,
    {
        self.functions.insert(name.into(), Box::new(function));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl Agent for FnAgent {
    fn invoke(&mut self, name: &str, args: &[Value]) -> Option<CallValue> {
        self.functions.get_mut(name).map(|function| function(args))
    }
}

impl fmt::Debug for FnAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAgent")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}
