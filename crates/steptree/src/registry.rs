//! Process-wide registry of named functions and subtree definitions.
//!
//! The registry is the fallback for every name an agent does not define.
//! It is shared by all trees in the process and is safe for concurrent reads,
//! so independent trees may be stepped on separate threads.
//!
//! # Design
//!
//! - **Functions**: `Arc`-wrapped closures, cloned out of the lock before they
//!   run so a registered function may itself use the registry
//! - **Subtrees**: validated root definitions, instantiated by branch nodes
//! - **Lifetime**: entries live until explicitly unregistered;
//!   [`unregister_all`] exists mainly for test isolation

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::agent::CallValue;
use crate::assemble;
use crate::definition::NodeDefinition;
use crate::error::{DefinitionError, RegistryError};

/// A function callable from any tree by name.
pub type RegisteredFn = Arc<dyn Fn(&[Value]) -> CallValue + Send + Sync>;

#[derive(Default)]
struct Registry {
    functions: HashMap<String, RegisteredFn>,
    subtrees: HashMap<String, NodeDefinition>,
}

static REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(Default::default);

fn read<T>(f: impl FnOnce(&Registry) -> T) -> Result<T, RegistryError> {
    let registry = REGISTRY.read().map_err(|_| RegistryError::LockPoisoned)?;
    Ok(f(&registry))
}

fn write<T>(f: impl FnOnce(&mut Registry) -> T) -> Result<T, RegistryError> {
    let mut registry = REGISTRY.write().map_err(|_| RegistryError::LockPoisoned)?;
    Ok(f(&mut registry))
}

fn check_name(name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        Err(RegistryError::EmptyName)
    } else {
        Ok(())
    }
}

/// Registers a function under `name`, replacing any previous one.
pub fn register_function<F>(name: impl Into<String>, function: F) -> Result<(), RegistryError>
where
    F: Fn(&[Value]) -> CallValue + Send + Sync + 'static,
{
    let name = name.into();
    check_name(&name)?;
    debug!(%name, "registering function");
    write(|registry| {
        registry.functions.insert(name, Arc::new(function));
    })
}

/// Registers a root definition as a subtree named `name`.
///
/// The definition is validated up front, so a branch that later expands it
/// cannot meet a shape error.
pub fn register_subtree(
    name: impl Into<String>,
    definition: NodeDefinition,
) -> Result<(), RegistryError> {
    let name = name.into();
    check_name(&name)?;
    if !matches!(definition, NodeDefinition::Root(_)) {
        return Err(DefinitionError::RootExpected {
            node_type: definition.node_type(),
        }
        .into());
    }
    assemble::validate(&definition)?;

    debug!(%name, "registering subtree");
    write(|registry| {
        registry.subtrees.insert(name, definition);
    })
}

/// Removes the function and subtree registered under `name`.
///
/// Returns `true` if anything was removed.
pub fn unregister(name: &str) -> Result<bool, RegistryError> {
    write(|registry| {
        let function = registry.functions.remove(name).is_some();
        let subtree = registry.subtrees.remove(name).is_some();
        function || subtree
    })
}

/// Removes every function and subtree.
pub fn unregister_all() -> Result<(), RegistryError> {
    write(|registry| {
        registry.functions.clear();
        registry.subtrees.clear();
    })
}

/// Returns `true` if a function or subtree is registered under `name`.
pub fn is_registered(name: &str) -> Result<bool, RegistryError> {
    read(|registry| registry.functions.contains_key(name) || registry.subtrees.contains_key(name))
}

pub(crate) fn function(name: &str) -> Result<Option<RegisteredFn>, RegistryError> {
    read(|registry| registry.functions.get(name).cloned())
}

pub(crate) fn subtree(name: &str) -> Result<Option<NodeDefinition>, RegistryError> {
    read(|registry| registry.subtrees.get(name).cloned())
}
