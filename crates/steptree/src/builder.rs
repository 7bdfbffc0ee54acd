//! Builder utilities for ergonomic tree definitions.
//!
//! This module provides helper functions to reduce boilerplate when writing
//! definitions in Rust. Instead of spelling out
//! `NodeDefinition::Sequence(CompositeDefinition { .. })`, you can write
//! `sequence(vec![...])` and attach attributes with chained methods:
//!
//! ```rust
//! use steptree::builder::{action, condition, root, sequence};
//!
//! let tree = root(
//!     sequence(vec![condition("IsHungry"), action("Eat")])
//!         .with_while("IsAwake")
//!         .on_exit("Burp"),
//! );
//! ```

use serde_json::Value;

use crate::definition::{
    Bounds, BranchDefinition, CallDefinition, CallbackDefinition, CommonDefinition,
    CompositeDefinition, DecoratorDefinition, GuardDefinition, LottoDefinition, NodeDefinition,
    RepeatDefinition, RetryDefinition, WaitDefinition,
};

fn decorator(child: NodeDefinition) -> DecoratorDefinition {
    DecoratorDefinition {
        common: CommonDefinition::default(),
        child: Box::new(child),
    }
}

fn composite(children: Vec<NodeDefinition>) -> CompositeDefinition {
    CompositeDefinition {
        common: CommonDefinition::default(),
        children,
    }
}

fn call(name: &str, args: Vec<Value>) -> CallDefinition {
    CallDefinition {
        common: CommonDefinition::default(),
        call: name.to_string(),
        args,
    }
}

/// Creates the unnamed main root.
#[inline]
pub fn root(child: NodeDefinition) -> NodeDefinition {
    NodeDefinition::Root(decorator(child))
}

/// Creates a root named `name`, usable as a subtree.
#[inline]
pub fn subtree(name: &str, child: NodeDefinition) -> NodeDefinition {
    root(child).with_id(name)
}

/// Creates a reference to the subtree named `name`.
#[inline]
pub fn branch(name: &str) -> NodeDefinition {
    NodeDefinition::Branch(BranchDefinition {
        common: CommonDefinition::default(),
        reference: name.to_string(),
    })
}

#[inline]
pub fn sequence(children: Vec<NodeDefinition>) -> NodeDefinition {
    NodeDefinition::Sequence(composite(children))
}

#[inline]
pub fn selector(children: Vec<NodeDefinition>) -> NodeDefinition {
    NodeDefinition::Selector(composite(children))
}

#[inline]
pub fn parallel(children: Vec<NodeDefinition>) -> NodeDefinition {
    NodeDefinition::Parallel(composite(children))
}

#[inline]
pub fn race(children: Vec<NodeDefinition>) -> NodeDefinition {
    NodeDefinition::Race(composite(children))
}

#[inline]
pub fn all(children: Vec<NodeDefinition>) -> NodeDefinition {
    NodeDefinition::All(composite(children))
}

/// Creates a lotto that picks uniformly among its children.
#[inline]
pub fn lotto(children: Vec<NodeDefinition>) -> NodeDefinition {
    NodeDefinition::Lotto(LottoDefinition {
        common: CommonDefinition::default(),
        children,
        weights: None,
    })
}

/// Creates a lotto with one ticket count per child.
#[inline]
pub fn weighted_lotto(weights: Vec<i64>, children: Vec<NodeDefinition>) -> NodeDefinition {
    NodeDefinition::Lotto(LottoDefinition {
        common: CommonDefinition::default(),
        children,
        weights: Some(weights),
    })
}

fn repeat_with(iterations: Option<Bounds>, child: NodeDefinition) -> NodeDefinition {
    NodeDefinition::Repeat(RepeatDefinition {
        common: CommonDefinition::default(),
        child: Box::new(child),
        iterations,
    })
}

#[inline]
pub fn repeat(iterations: i64, child: NodeDefinition) -> NodeDefinition {
    repeat_with(Some(Bounds::Exact(iterations)), child)
}

#[inline]
pub fn repeat_between(min: i64, max: i64, child: NodeDefinition) -> NodeDefinition {
    repeat_with(Some(Bounds::Between(min, max)), child)
}

#[inline]
pub fn repeat_forever(child: NodeDefinition) -> NodeDefinition {
    repeat_with(None, child)
}

fn retry_with(attempts: Option<Bounds>, child: NodeDefinition) -> NodeDefinition {
    NodeDefinition::Retry(RetryDefinition {
        common: CommonDefinition::default(),
        child: Box::new(child),
        attempts,
    })
}

#[inline]
pub fn retry(attempts: i64, child: NodeDefinition) -> NodeDefinition {
    retry_with(Some(Bounds::Exact(attempts)), child)
}

#[inline]
pub fn retry_between(min: i64, max: i64, child: NodeDefinition) -> NodeDefinition {
    retry_with(Some(Bounds::Between(min, max)), child)
}

#[inline]
pub fn retry_forever(child: NodeDefinition) -> NodeDefinition {
    retry_with(None, child)
}

#[inline]
pub fn flip(child: NodeDefinition) -> NodeDefinition {
    NodeDefinition::Flip(decorator(child))
}

#[inline]
pub fn succeed(child: NodeDefinition) -> NodeDefinition {
    NodeDefinition::Succeed(decorator(child))
}

#[inline]
pub fn fail(child: NodeDefinition) -> NodeDefinition {
    NodeDefinition::Fail(decorator(child))
}

#[inline]
pub fn action(name: &str) -> NodeDefinition {
    NodeDefinition::Action(call(name, Vec::new()))
}

#[inline]
pub fn action_with(name: &str, args: Vec<Value>) -> NodeDefinition {
    NodeDefinition::Action(call(name, args))
}

#[inline]
pub fn condition(name: &str) -> NodeDefinition {
    NodeDefinition::Condition(call(name, Vec::new()))
}

#[inline]
pub fn condition_with(name: &str, args: Vec<Value>) -> NodeDefinition {
    NodeDefinition::Condition(call(name, args))
}

fn wait_with(duration: Option<Bounds>) -> NodeDefinition {
    NodeDefinition::Wait(WaitDefinition {
        common: CommonDefinition::default(),
        duration,
    })
}

/// Creates a wait of `millis` milliseconds.
#[inline]
pub fn wait(millis: i64) -> NodeDefinition {
    wait_with(Some(Bounds::Exact(millis)))
}

#[inline]
pub fn wait_between(min_millis: i64, max_millis: i64) -> NodeDefinition {
    wait_with(Some(Bounds::Between(min_millis, max_millis)))
}

#[inline]
pub fn wait_forever() -> NodeDefinition {
    wait_with(None)
}

impl GuardDefinition {
    pub fn new(call: impl Into<String>) -> Self {
        Self {
            call: call.into(),
            args: Vec::new(),
            succeed_on_abort: false,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Resolve the guarded node as SUCCEEDED when this guard aborts it.
    pub fn succeeding_on_abort(mut self) -> Self {
        self.succeed_on_abort = true;
        self
    }
}

impl From<&str> for GuardDefinition {
    fn from(call: &str) -> Self {
        GuardDefinition::new(call)
    }
}

impl CallbackDefinition {
    pub fn new(call: impl Into<String>) -> Self {
        Self {
            call: call.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

impl From<&str> for CallbackDefinition {
    fn from(call: &str) -> Self {
        CallbackDefinition::new(call)
    }
}

impl NodeDefinition {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.common_mut().id = Some(id.into());
        self
    }

    pub fn with_while(mut self, guard: impl Into<GuardDefinition>) -> Self {
        self.common_mut().while_guard = Some(guard.into());
        self
    }

    pub fn with_until(mut self, guard: impl Into<GuardDefinition>) -> Self {
        self.common_mut().until_guard = Some(guard.into());
        self
    }

    pub fn on_entry(mut self, callback: impl Into<CallbackDefinition>) -> Self {
        self.common_mut().entry = Some(callback.into());
        self
    }

    pub fn on_exit(mut self, callback: impl Into<CallbackDefinition>) -> Self {
        self.common_mut().exit = Some(callback.into());
        self
    }

    pub fn on_step(mut self, callback: impl Into<CallbackDefinition>) -> Self {
        self.common_mut().step = Some(callback.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn helpers_match_parsed_json() {
        let built = root(
            sequence(vec![
                condition("IsHungry"),
                action_with("Eat", vec![json!("apple")]),
            ])
            .with_while(GuardDefinition::new("IsAwake").succeeding_on_abort())
            .on_exit("Burp"),
        );

        let parsed: NodeDefinition = serde_json::from_value(json!({
            "type": "root",
            "child": {
                "type": "sequence",
                "while": { "call": "IsAwake", "succeedOnAbort": true },
                "exit": { "call": "Burp" },
                "children": [
                    { "type": "condition", "call": "IsHungry" },
                    { "type": "action", "call": "Eat", "args": ["apple"] }
                ]
            }
        }))
        .unwrap();

        assert_eq!(built, parsed);
    }

    #[test]
    fn subtree_is_a_named_root() {
        let named = subtree("Idle", wait_forever());
        assert_eq!(named.common().id.as_deref(), Some("Idle"));
        assert!(matches!(named, NodeDefinition::Root(_)));
    }
}
