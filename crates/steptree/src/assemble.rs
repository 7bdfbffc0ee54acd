//! Instantiation of definitions into the node arena.
//!
//! Shape checks run here, once, so that a tree which builds successfully
//! never meets a malformed node at step time. Guard paths are derived
//! afterwards by [`Arena::adopt`], when the instantiated subtree is attached
//! to its parent.

use std::collections::HashSet;

use crate::attribute::Attributes;
use crate::composite::Lotto;
use crate::decorator::{Branch, Iterations};
use crate::definition::{CommonDefinition, NodeDefinition};
use crate::error::DefinitionError;
use crate::leaf::{Action, Condition, Wait};
use crate::node::{Arena, Node, NodeId, NodeKind, NodeType};

/// Builds `definition` into `arena` and returns the id of its top node.
///
/// `ancestry` lists the named subtrees the new nodes are nested in, so that
/// branches inside can detect reference cycles when they expand.
pub(crate) fn instantiate(
    arena: &mut Arena,
    definition: &NodeDefinition,
    ancestry: &[String],
) -> Result<NodeId, DefinitionError> {
    Assembler {
        arena,
        ancestry,
        ids: HashSet::new(),
    }
    .build(definition)
}

/// Runs every shape check without keeping the result.
pub(crate) fn validate(definition: &NodeDefinition) -> Result<(), DefinitionError> {
    instantiate(&mut Arena::default(), definition, &[]).map(|_| ())
}

struct Assembler<'a> {
    arena: &'a mut Arena,
    ancestry: &'a [String],
    /// Node ids seen in this instantiation.
    ids: HashSet<String>,
}

impl Assembler<'_> {
    fn build(&mut self, definition: &NodeDefinition) -> Result<NodeId, DefinitionError> {
        let node_type = definition.node_type();
        let common = definition.common();
        self.check_common(node_type, common)?;

        let kind = match definition {
            NodeDefinition::Root(def) => NodeKind::Root {
                child: self.build(&def.child)?,
            },
            NodeDefinition::Branch(def) => {
                require_name(node_type, &def.reference)?;
                NodeKind::Branch(Branch::new(def.reference.clone(), self.ancestry.to_vec()))
            }
            NodeDefinition::Sequence(def) => NodeKind::Sequence {
                children: self.build_children(node_type, &def.children)?,
            },
            NodeDefinition::Selector(def) => NodeKind::Selector {
                children: self.build_children(node_type, &def.children)?,
            },
            NodeDefinition::Parallel(def) => NodeKind::Parallel {
                children: self.build_children(node_type, &def.children)?,
            },
            NodeDefinition::Race(def) => NodeKind::Race {
                children: self.build_children(node_type, &def.children)?,
            },
            NodeDefinition::All(def) => NodeKind::All {
                children: self.build_children(node_type, &def.children)?,
            },
            NodeDefinition::Lotto(def) => {
                let children = self.build_children(node_type, &def.children)?;
                let weights = match &def.weights {
                    Some(weights) => Some(check_weights(weights, children.len())?),
                    None => None,
                };
                NodeKind::Lotto(Lotto::new(children, weights))
            }
            NodeDefinition::Repeat(def) => {
                let bounds = def
                    .iterations
                    .map(|bounds| bounds.validate(node_type, "iterations"))
                    .transpose()?;
                NodeKind::Repeat(Iterations::new(self.build(&def.child)?, bounds))
            }
            NodeDefinition::Retry(def) => {
                let bounds = def
                    .attempts
                    .map(|bounds| bounds.validate(node_type, "attempts"))
                    .transpose()?;
                NodeKind::Retry(Iterations::new(self.build(&def.child)?, bounds))
            }
            NodeDefinition::Flip(def) => NodeKind::Flip {
                child: self.build(&def.child)?,
            },
            NodeDefinition::Succeed(def) => NodeKind::Succeed {
                child: self.build(&def.child)?,
            },
            NodeDefinition::Fail(def) => NodeKind::Fail {
                child: self.build(&def.child)?,
            },
            NodeDefinition::Action(def) => {
                require_name(node_type, &def.call)?;
                NodeKind::Action(Action::new(def.call.clone(), def.args.clone()))
            }
            NodeDefinition::Condition(def) => {
                require_name(node_type, &def.call)?;
                NodeKind::Condition(Condition {
                    call: def.call.clone(),
                    args: def.args.clone(),
                })
            }
            NodeDefinition::Wait(def) => {
                let duration = def
                    .duration
                    .map(|bounds| bounds.validate(node_type, "duration"))
                    .transpose()?;
                NodeKind::Wait(Wait::new(duration))
            }
        };

        Ok(self.arena.push(Node::new(
            common.id.clone(),
            Attributes::from_definition(common),
            kind,
        )))
    }

    fn build_children(
        &mut self,
        node_type: NodeType,
        children: &[NodeDefinition],
    ) -> Result<Vec<NodeId>, DefinitionError> {
        if children.is_empty() {
            return Err(DefinitionError::NoChildren { node_type });
        }
        children.iter().map(|child| self.build(child)).collect()
    }

    fn check_common(
        &mut self,
        node_type: NodeType,
        common: &CommonDefinition,
    ) -> Result<(), DefinitionError> {
        if let Some(id) = &common.id
            && !self.ids.insert(id.clone())
        {
            return Err(DefinitionError::DuplicateNodeId(id.clone()));
        }

        let guards = [&common.while_guard, &common.until_guard];
        for guard in guards.into_iter().flatten() {
            require_name(node_type, &guard.call)?;
        }

        let callbacks = [&common.entry, &common.exit, &common.step];
        for callback in callbacks.into_iter().flatten() {
            require_name(node_type, &callback.call)?;
        }

        Ok(())
    }
}

fn require_name(node_type: NodeType, name: &str) -> Result<(), DefinitionError> {
    if name.trim().is_empty() {
        Err(DefinitionError::EmptyName { node_type })
    } else {
        Ok(())
    }
}

fn check_weights(weights: &[i64], children: usize) -> Result<Vec<u64>, DefinitionError> {
    if weights.len() != children {
        return Err(DefinitionError::WeightCount {
            children,
            weights: weights.len(),
        });
    }

    weights
        .iter()
        .enumerate()
        .map(|(index, &weight)| {
            if weight > 0 {
                Ok(weight as u64)
            } else {
                Err(DefinitionError::NonPositiveWeight { index, weight })
            }
        })
        .collect()
}
