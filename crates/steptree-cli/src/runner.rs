//! Loads a tree definition from disk and drives it on a timer.

use std::path::Path;

use anyhow::{Context, Result};
use steptree::{State, Tree, TreeOptions};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RunConfig;

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: usize,
    pub state: State,
}

/// Reads and builds the tree at `path`.
pub fn load_tree(path: &Path, config: &RunConfig) -> Result<Tree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tree definition: {}", path.display()))?;

    let options = match config.seed {
        Some(seed) => TreeOptions::default().with_seed(seed),
        None => TreeOptions::default(),
    };

    Tree::from_json(&text, options)
        .with_context(|| format!("Invalid tree definition: {}", path.display()))
}

/// Steps `tree` until it resolves or the step limit is reached.
///
/// `on_step` sees the step number (from 1) and the root state after each step.
pub async fn run(
    tree: &mut Tree,
    config: &RunConfig,
    mut on_step: impl FnMut(usize, State),
) -> Result<RunSummary> {
    let mut interval = time::interval(config.step_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = RunSummary {
        steps: 0,
        state: tree.state(),
    };

    while summary.steps < config.max_steps {
        interval.tick().await;

        summary.steps += 1;
        summary.state = tree
            .step(&mut ())
            .with_context(|| format!("Step {} failed", summary.steps))?;

        debug!(step = summary.steps, state = %summary.state, "step complete");
        on_step(summary.steps, summary.state);

        if summary.state.is_resolved() {
            info!(steps = summary.steps, state = %summary.state, "tree resolved");
            return Ok(summary);
        }
    }

    warn!(steps = summary.steps, "step limit reached with tree still running");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    fn definition_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    fn fast(max_steps: usize) -> RunConfig {
        RunConfig {
            max_steps,
            step_interval: Duration::from_millis(5),
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn runs_until_the_tree_resolves() {
        crate::demo::register().unwrap();
        let file = definition_file(
            r#"{
                "type": "root",
                "child": {
                    "type": "sequence",
                    "children": [
                        { "type": "action", "call": "Sleep", "args": [10] },
                        { "type": "action", "call": "Succeed" }
                    ]
                }
            }"#,
        );

        let config = fast(200);
        let mut tree = load_tree(file.path(), &config).unwrap();
        let mut seen = Vec::new();
        let summary = run(&mut tree, &config, |step, state| seen.push((step, state)))
            .await
            .unwrap();

        assert_eq!(summary.state, State::Succeeded);
        assert!(summary.steps >= 2);
        assert_eq!(seen.len(), summary.steps);
        assert_eq!(seen[0], (1, State::Running));
    }

    #[tokio::test]
    async fn stops_at_the_step_limit() {
        crate::demo::register().unwrap();
        let file = definition_file(r#"{ "type": "root", "child": { "type": "action", "call": "Idle" } }"#);

        let config = fast(3);
        let mut tree = load_tree(file.path(), &config).unwrap();
        let summary = run(&mut tree, &config, |_, _| {}).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                steps: 3,
                state: State::Running
            }
        );
    }

    #[tokio::test]
    async fn bundled_patrol_tree_succeeds() {
        crate::demo::register().unwrap();
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("trees/patrol.json");

        let config = fast(500);
        let mut tree = load_tree(&path, &config).unwrap();
        let summary = run(&mut tree, &config, |_, _| {}).await.unwrap();

        assert_eq!(summary.state, State::Succeeded);
        assert!(tree.find("walk").is_some());
    }

    #[test]
    fn invalid_definitions_are_reported_with_the_path() {
        let file = definition_file(r#"{ "type": "root", "child": { "type": "sequence", "children": [] } }"#);
        let error = load_tree(file.path(), &fast(1)).err().unwrap();

        assert!(error.to_string().contains("Invalid tree definition"));
        assert!(format!("{error:#}").contains("at least one child"));
    }
}
