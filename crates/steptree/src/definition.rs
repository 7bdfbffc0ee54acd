//! Structured tree definitions.
//!
//! These types are the validated, already-structured input the engine
//! consumes. They deserialize from JSON with the node kind in a `"type"` tag:
//!
//! ```json
//! {
//!     "type": "root",
//!     "child": {
//!         "type": "sequence",
//!         "while": { "call": "IsAlive" },
//!         "children": [
//!             { "type": "condition", "call": "IsHungry" },
//!             { "type": "action", "call": "Eat", "args": ["apple"] }
//!         ]
//!     }
//! }
//! ```
//!
//! Shape checks that serde cannot express (empty child lists, bad weights,
//! inverted ranges) are performed when the tree is assembled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DefinitionError;
use crate::node::NodeType;

/// A full tree: one main root, optionally followed by named subtree roots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeDefinition {
    Single(NodeDefinition),
    Multiple(Vec<NodeDefinition>),
}

impl TreeDefinition {
    /// Parses a definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Iterates over every top-level definition.
    pub fn roots(&self) -> impl Iterator<Item = &NodeDefinition> {
        match self {
            TreeDefinition::Single(root) => std::slice::from_ref(root).iter(),
            TreeDefinition::Multiple(roots) => roots.iter(),
        }
    }
}

impl From<NodeDefinition> for TreeDefinition {
    fn from(root: NodeDefinition) -> Self {
        TreeDefinition::Single(root)
    }
}

impl From<Vec<NodeDefinition>> for TreeDefinition {
    fn from(roots: Vec<NodeDefinition>) -> Self {
        TreeDefinition::Multiple(roots)
    }
}

/// A single node definition, tagged by node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeDefinition {
    Root(DecoratorDefinition),
    Branch(BranchDefinition),
    Sequence(CompositeDefinition),
    Selector(CompositeDefinition),
    Parallel(CompositeDefinition),
    Race(CompositeDefinition),
    All(CompositeDefinition),
    Lotto(LottoDefinition),
    Repeat(RepeatDefinition),
    Retry(RetryDefinition),
    Flip(DecoratorDefinition),
    Succeed(DecoratorDefinition),
    Fail(DecoratorDefinition),
    Action(CallDefinition),
    Condition(CallDefinition),
    Wait(WaitDefinition),
}

impl NodeDefinition {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeDefinition::Root(_) => NodeType::Root,
            NodeDefinition::Branch(_) => NodeType::Branch,
            NodeDefinition::Sequence(_) => NodeType::Sequence,
            NodeDefinition::Selector(_) => NodeType::Selector,
            NodeDefinition::Parallel(_) => NodeType::Parallel,
            NodeDefinition::Race(_) => NodeType::Race,
            NodeDefinition::All(_) => NodeType::All,
            NodeDefinition::Lotto(_) => NodeType::Lotto,
            NodeDefinition::Repeat(_) => NodeType::Repeat,
            NodeDefinition::Retry(_) => NodeType::Retry,
            NodeDefinition::Flip(_) => NodeType::Flip,
            NodeDefinition::Succeed(_) => NodeType::Succeed,
            NodeDefinition::Fail(_) => NodeType::Fail,
            NodeDefinition::Action(_) => NodeType::Action,
            NodeDefinition::Condition(_) => NodeType::Condition,
            NodeDefinition::Wait(_) => NodeType::Wait,
        }
    }

    pub fn common(&self) -> &CommonDefinition {
        match self {
            NodeDefinition::Root(def)
            | NodeDefinition::Flip(def)
            | NodeDefinition::Succeed(def)
            | NodeDefinition::Fail(def) => &def.common,
            NodeDefinition::Branch(def) => &def.common,
            NodeDefinition::Sequence(def)
            | NodeDefinition::Selector(def)
            | NodeDefinition::Parallel(def)
            | NodeDefinition::Race(def)
            | NodeDefinition::All(def) => &def.common,
            NodeDefinition::Lotto(def) => &def.common,
            NodeDefinition::Repeat(def) => &def.common,
            NodeDefinition::Retry(def) => &def.common,
            NodeDefinition::Action(def) | NodeDefinition::Condition(def) => &def.common,
            NodeDefinition::Wait(def) => &def.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonDefinition {
        match self {
            NodeDefinition::Root(def)
            | NodeDefinition::Flip(def)
            | NodeDefinition::Succeed(def)
            | NodeDefinition::Fail(def) => &mut def.common,
            NodeDefinition::Branch(def) => &mut def.common,
            NodeDefinition::Sequence(def)
            | NodeDefinition::Selector(def)
            | NodeDefinition::Parallel(def)
            | NodeDefinition::Race(def)
            | NodeDefinition::All(def) => &mut def.common,
            NodeDefinition::Lotto(def) => &mut def.common,
            NodeDefinition::Repeat(def) => &mut def.common,
            NodeDefinition::Retry(def) => &mut def.common,
            NodeDefinition::Action(def) | NodeDefinition::Condition(def) => &mut def.common,
            NodeDefinition::Wait(def) => &mut def.common,
        }
    }
}

/// Fields every node may carry: an optional id plus guard and callback attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonDefinition {
    /// Optional node id. On a top-level root this names the subtree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "while", default, skip_serializing_if = "Option::is_none")]
    pub while_guard: Option<GuardDefinition>,

    #[serde(rename = "until", default, skip_serializing_if = "Option::is_none")]
    pub until_guard: Option<GuardDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<CallbackDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<CallbackDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<CallbackDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardDefinition {
    pub call: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Resolve the guarded node as SUCCEEDED instead of FAILED when aborting.
    #[serde(default)]
    pub succeed_on_abort: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackDefinition {
    pub call: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

/// Root, flip, succeed and fail: a single child and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoratorDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    pub child: Box<NodeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    #[serde(default)]
    pub children: Vec<NodeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LottoDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    #[serde(default)]
    pub children: Vec<NodeDefinition>,
    /// One positive ticket count per child; uniform when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    pub child: Box<NodeDefinition>,
    /// Successful iterations to complete; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<Bounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    pub child: Box<NodeDefinition>,
    /// Failed attempts allowed; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<Bounds>,
}

/// Action and condition leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    pub call: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitDefinition {
    #[serde(flatten)]
    pub common: CommonDefinition,
    /// Duration in milliseconds; never resolves when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Bounds>,
}

/// A fixed amount, or inclusive bounds for a value drawn once per activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bounds {
    Exact(i64),
    Between(i64, i64),
}

impl Bounds {
    /// Checks both ends are non-negative and ordered.
    pub(crate) fn validate(
        self,
        node_type: NodeType,
        field: &'static str,
    ) -> Result<Self, DefinitionError> {
        let (min, max) = match self {
            Bounds::Exact(value) => (value, value),
            Bounds::Between(min, max) => (min, max),
        };

        for value in [min, max] {
            if value < 0 {
                return Err(DefinitionError::NegativeValue {
                    node_type,
                    field,
                    value,
                });
            }
        }

        if min > max {
            return Err(DefinitionError::InvertedRange {
                node_type,
                field,
                min,
                max,
            });
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_nested_definition_with_attributes() {
        let definition = TreeDefinition::from_json(
            r#"{
                "type": "root",
                "child": {
                    "type": "sequence",
                    "while": { "call": "IsAlive", "succeedOnAbort": true },
                    "children": [
                        { "type": "condition", "call": "IsHungry" },
                        { "type": "action", "call": "Eat", "args": ["apple", 2] },
                        { "type": "wait", "duration": [100, 200] }
                    ]
                }
            }"#,
        )
        .unwrap();

        let TreeDefinition::Single(NodeDefinition::Root(root)) = definition else {
            panic!("expected a single root");
        };
        let NodeDefinition::Sequence(sequence) = root.child.as_ref() else {
            panic!("expected a sequence");
        };

        let guard = sequence.common.while_guard.as_ref().unwrap();
        assert_eq!(guard.call, "IsAlive");
        assert!(guard.succeed_on_abort);
        assert_eq!(sequence.children.len(), 3);

        match &sequence.children[1] {
            NodeDefinition::Action(action) => {
                assert_eq!(action.args, vec![json!("apple"), json!(2)]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &sequence.children[2] {
            NodeDefinition::Wait(wait) => {
                assert_eq!(wait.duration, Some(Bounds::Between(100, 200)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_multiple_roots() {
        let definition = TreeDefinition::from_json(
            r#"[
                { "type": "root", "child": { "type": "branch", "ref": "Idle" } },
                { "type": "root", "id": "Idle", "child": { "type": "wait" } }
            ]"#,
        )
        .unwrap();

        assert_eq!(definition.roots().count(), 2);
    }

    #[test]
    fn decorator_without_child_is_malformed() {
        let result = TreeDefinition::from_json(r#"{ "type": "flip" }"#);
        assert!(matches!(result, Err(DefinitionError::Malformed(_))));
    }

    #[test]
    fn bounds_reject_negative_and_inverted_ranges() {
        assert!(matches!(
            Bounds::Exact(-1).validate(NodeType::Repeat, "iterations"),
            Err(DefinitionError::NegativeValue { value: -1, .. })
        ));
        assert!(matches!(
            Bounds::Between(5, 2).validate(NodeType::Wait, "duration"),
            Err(DefinitionError::InvertedRange { min: 5, max: 2, .. })
        ));
        assert!(Bounds::Between(2, 2).validate(NodeType::Wait, "duration").is_ok());
    }
}
