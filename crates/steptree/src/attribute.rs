//! Guard and callback attributes, and the precomputed guard path.
//!
//! Guards decide whether a node may stay active; callbacks are side-effect
//! hooks fired on state transitions and never affect state.

use serde::Serialize;
use serde_json::{Value, json};

use crate::definition::{CallbackDefinition, CommonDefinition, GuardDefinition};
use crate::error::{ContractViolation, Result};
use crate::node::{NodeId, TickContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GuardKind {
    /// Satisfied while the predicate returns `true`.
    While,
    /// Satisfied while the predicate returns `false`.
    Until,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CallbackKind {
    Entry,
    Exit,
    Step,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guard {
    #[serde(skip)]
    pub kind: GuardKind,
    pub call: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub succeed_on_abort: bool,
}

impl Guard {
    fn from_definition(kind: GuardKind, definition: &GuardDefinition) -> Self {
        Self {
            kind,
            call: definition.call.clone(),
            args: definition.args.clone(),
            succeed_on_abort: definition.succeed_on_abort,
        }
    }

    /// Invokes the predicate and applies the guard polarity.
    pub(crate) fn is_satisfied(&self, ctx: &mut TickContext<'_>) -> Result<bool> {
        match ctx.invoke(&self.call, &self.args)? {
            crate::CallValue::Bool(value) => Ok(match self.kind {
                GuardKind::While => value,
                GuardKind::Until => !value,
            }),
            other => Err(ContractViolation::GuardReturn {
                call: self.call.clone(),
                found: other.describe(),
            }
            .into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Callback {
    #[serde(skip)]
    pub kind: CallbackKind,
    pub call: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl Callback {
    fn from_definition(kind: CallbackKind, definition: &CallbackDefinition) -> Self {
        Self {
            kind,
            call: definition.call.clone(),
            args: definition.args.clone(),
        }
    }

    /// Fires the callback; exit callbacks get a leading `{succeeded, aborted}` object.
    pub(crate) fn fire(&self, ctx: &mut TickContext<'_>, exit: Option<ExitDetails>) -> Result<()> {
        match exit {
            Some(details) => {
                let mut args = Vec::with_capacity(self.args.len() + 1);
                args.push(details.to_value());
                args.extend(self.args.iter().cloned());
                ctx.invoke(&self.call, &args)?;
            }
            None => {
                ctx.invoke(&self.call, &self.args)?;
            }
        }
        Ok(())
    }
}

/// How a node left the active state, passed to its exit callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDetails {
    pub succeeded: bool,
    pub aborted: bool,
}

impl ExitDetails {
    pub fn to_value(self) -> Value {
        json!({ "succeeded": self.succeeded, "aborted": self.aborted })
    }
}

/// Every attribute attached to one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attributes {
    #[serde(rename = "while", skip_serializing_if = "Option::is_none")]
    pub while_guard: Option<Guard>,
    #[serde(rename = "until", skip_serializing_if = "Option::is_none")]
    pub until_guard: Option<Guard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<Callback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<Callback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Callback>,
}

impl Attributes {
    pub(crate) fn from_definition(definition: &CommonDefinition) -> Self {
        Self {
            while_guard: definition
                .while_guard
                .as_ref()
                .map(|guard| Guard::from_definition(GuardKind::While, guard)),
            until_guard: definition
                .until_guard
                .as_ref()
                .map(|guard| Guard::from_definition(GuardKind::Until, guard)),
            entry: definition
                .entry
                .as_ref()
                .map(|callback| Callback::from_definition(CallbackKind::Entry, callback)),
            exit: definition
                .exit
                .as_ref()
                .map(|callback| Callback::from_definition(CallbackKind::Exit, callback)),
            step: definition
                .step
                .as_ref()
                .map(|callback| Callback::from_definition(CallbackKind::Step, callback)),
        }
    }

    pub fn guard(&self, kind: GuardKind) -> Option<&Guard> {
        match kind {
            GuardKind::While => self.while_guard.as_ref(),
            GuardKind::Until => self.until_guard.as_ref(),
        }
    }

    pub fn callback(&self, kind: CallbackKind) -> Option<&Callback> {
        match kind {
            CallbackKind::Entry => self.entry.as_ref(),
            CallbackKind::Exit => self.exit.as_ref(),
            CallbackKind::Step => self.step.as_ref(),
        }
    }

    /// Guards in evaluation order: `while` before `until`.
    pub fn guards(&self) -> impl Iterator<Item = &Guard> {
        self.while_guard.iter().chain(self.until_guard.iter())
    }

    pub fn callbacks(&self) -> impl Iterator<Item = &Callback> {
        self.entry
            .iter()
            .chain(self.exit.iter())
            .chain(self.step.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.guards().next().is_none() && self.callbacks().next().is_none()
    }
}

/// One `(node, guard)` pair in a guard path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardLink {
    pub node: NodeId,
    pub kind: GuardKind,
}

/// Root-first chain of every guard above and on a node.
///
/// The links are plain arena indices; a guard path never owns the nodes it
/// refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardPath {
    links: Vec<GuardLink>,
}

impl GuardPath {
    /// Returns this path followed by the guards declared on `node`.
    pub(crate) fn extended(&self, node: NodeId, attributes: &Attributes) -> Self {
        let mut links = self.links.clone();
        links.extend(attributes.guards().map(|guard| GuardLink {
            node,
            kind: guard.kind,
        }));
        Self { links }
    }

    pub fn links(&self) -> &[GuardLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::GuardDefinition;

    fn guard(call: &str) -> GuardDefinition {
        GuardDefinition {
            call: call.to_string(),
            args: Vec::new(),
            succeed_on_abort: false,
        }
    }

    #[test]
    fn extended_path_appends_while_before_until() {
        let attributes = Attributes::from_definition(&CommonDefinition {
            while_guard: Some(guard("IsAlive")),
            until_guard: Some(guard("IsDone")),
            ..Default::default()
        });

        let base = GuardPath::default().extended(NodeId::new(0), &Attributes::default());
        assert!(base.is_empty());

        let path = base.extended(NodeId::new(3), &attributes);
        assert_eq!(
            path.links(),
            &[
                GuardLink {
                    node: NodeId::new(3),
                    kind: GuardKind::While
                },
                GuardLink {
                    node: NodeId::new(3),
                    kind: GuardKind::Until
                },
            ]
        );
    }

    #[test]
    fn exit_details_serialize_as_object() {
        let value = ExitDetails {
            succeeded: false,
            aborted: true,
        }
        .to_value();
        assert_eq!(value, json!({ "succeeded": false, "aborted": true }));
    }
}
