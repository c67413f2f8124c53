//! Rendering operation outcomes.

use capability::{CapabilityProvider, ScriptedProvider};
use runtime::{Outcome, TaskError, TaskState, TaskSummary};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Serializable summary of a run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub operation: TaskSummary,
    pub executed: bool,
    pub succeeded: bool,
    pub errors: Vec<String>,
    pub dependencies: Vec<DependencyReport>,
    pub capabilities: Vec<CapabilityReport>,
}

#[derive(Debug, Serialize)]
pub struct DependencyReport {
    pub task: TaskSummary,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CapabilityReport {
    pub name: String,
    pub status: String,
    pub calls: usize,
}

fn messages(errors: &[TaskError]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}

impl Report {
    pub fn new(outcome: &Outcome, providers: &[Arc<ScriptedProvider>]) -> Self {
        Self {
            operation: outcome.summary.clone(),
            executed: outcome.executed,
            succeeded: outcome.succeeded(),
            errors: messages(&outcome.errors),
            dependencies: outcome
                .dependencies
                .iter()
                .map(|dependency| DependencyReport {
                    task: dependency.summary.clone(),
                    errors: messages(&dependency.errors),
                })
                .collect(),
            capabilities: providers
                .iter()
                .map(|provider| CapabilityReport {
                    name: provider.name().to_string(),
                    status: provider.status().to_string(),
                    calls: provider.calls().len(),
                })
                .collect(),
        }
    }

    /// Human-readable rendering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let verdict = match (self.succeeded, self.operation.cancelled) {
            (true, _) => "completed",
            (false, true) => "cancelled",
            (false, false) => "failed",
        };
        let _ = writeln!(out, "{}: {verdict}", self.operation.name);

        for dependency in &self.dependencies {
            let state = if dependency.task.cancelled {
                "cancelled"
            } else if dependency.task.state == TaskState::Finished {
                "finished"
            } else {
                "pending"
            };
            let _ = writeln!(out, "  dependency {}: {state}", dependency.task.name);
            for error in &dependency.errors {
                let _ = writeln!(out, "    - {error}");
            }
        }
        for error in &self.errors {
            let _ = writeln!(out, "  - {error}");
        }
        if !self.capabilities.is_empty() {
            let _ = writeln!(out, "\n{:<24}  {:<16}  CALLS", "CAPABILITY", "STATUS");
            for capability in &self.capabilities {
                let _ = writeln!(
                    out,
                    "{:<24}  {:<16}  {}",
                    capability.name, capability.status, capability.calls
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capability::CapabilityStatus;
    use runtime::{CapabilityCondition, Engine, EngineConfig, FnTask, Operation};

    async fn run(provider: Arc<ScriptedProvider>) -> Report {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let work = FnTask::new("upload", |_| async { Ok::<(), TaskError>(()) });
        let condition = CapabilityCondition::new(Arc::clone(&provider));
        let operation = Operation::new(Arc::new(work)).with_condition(Arc::new(condition));
        let outcome = engine.run(operation).await;
        Report::new(&outcome, &[provider])
    }

    #[tokio::test]
    async fn test_report_success() {
        let provider = ScriptedProvider::new("report-ok", CapabilityStatus::NotDetermined);
        let report = run(Arc::new(provider)).await;

        assert!(report.succeeded);
        assert_eq!(report.dependencies.len(), 1);
        assert_eq!(report.capabilities[0].calls, 3);

        let text = report.render();
        assert!(text.starts_with("upload: completed\n"));
        let dependency = "dependency AuthorizeCapability<report-ok>: finished";
        assert!(text.contains(dependency));
    }

    #[tokio::test]
    async fn test_report_denied_serializes() {
        let provider = Arc::new(
            ScriptedProvider::new("report-denied", CapabilityStatus::NotDetermined)
                .authorizes_to(CapabilityStatus::Denied),
        );
        let report = run(provider).await;
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["succeeded"], false);
        assert_eq!(json["executed"], false);
        assert_eq!(json["operation"]["cancelled"], true);
        assert_eq!(json["errors"][0], "capability report-denied denied");
        assert!(report.render().starts_with("upload: cancelled\n"));
    }
}
