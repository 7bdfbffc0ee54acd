//! Demo functions registered for trees run from the command line.
//!
//! | Name      | Used as            | Behaviour                                   |
//! |-----------|--------------------|---------------------------------------------|
//! | `Succeed` | action             | resolves SUCCEEDED immediately              |
//! | `Fail`    | action             | resolves FAILED immediately                 |
//! | `Sleep`   | action             | SUCCEEDED after `args[0]` milliseconds      |
//! | `Idle`    | action             | RUNNING until a guard or reset ends it      |
//! | `Is`      | condition or guard | returns `args[0]` as a boolean              |
//! | `Log`     | callback           | logs its arguments at info level            |

use std::time::Duration;

use serde_json::Value;
use steptree::registry::register_function;
use steptree::{CallValue, RegistryError, State};
use tracing::info;

const DEFAULT_SLEEP_MS: u64 = 100;

/// Registers every demo function in the process-wide registry.
pub fn register() -> Result<(), RegistryError> {
    register_function("Succeed", |_| CallValue::State(State::Succeeded))?;
    register_function("Fail", |_| CallValue::State(State::Failed))?;
    register_function("Idle", |_| CallValue::None)?;
    register_function("Sleep", sleep)?;
    register_function("Is", |args| match args.first() {
        Some(Value::Bool(value)) => CallValue::Bool(*value),
        Some(other) => CallValue::Other(other.clone()),
        None => CallValue::None,
    })?;
    register_function("Log", |args| {
        info!(args = %serde_json::Value::from(args.to_vec()), "log callback");
        CallValue::None
    })?;
    Ok(())
}

/// Starts a tokio timer and hands it back as a pending action.
///
/// The deadline is fixed at invocation. Must be invoked from within a tokio
/// runtime.
fn sleep(args: &[Value]) -> CallValue {
    let millis = args
        .first()
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_SLEEP_MS);
    let timer = tokio::time::sleep(Duration::from_millis(millis));

    CallValue::pending(async move {
        timer.await;
        Ok::<_, anyhow::Error>(State::Succeeded)
    })
}
