//! Minimal host driver.
//!
//! The [`Engine`] runs one [`Operation`] at a time per call: it materializes
//! the dependency tasks its conditions offer, runs them to completion,
//! evaluates every condition and then either executes the work or cancels
//! the host task with the collected errors.

use crate::condition::{Condition, ConditionError, Verdict};
use crate::coordinator::Coordinator;
use crate::exclusion::{ExclusionGuard, ExclusionRegistry};
use crate::task::{Observer, Task, TaskHandle, TaskState, TaskSummary, run_task};
use crate::timeout::TimeoutGuard;
use crate::{Error, Result, TaskError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline applied to every operation's work, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Log the full diagnostic context of failed conditions.
    pub log_context: bool,
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == Some(0) {
            let message = "timeout_ms must be greater than zero";
            return Err(Error::Config(message.to_string()));
        }
        Ok(())
    }
}

/// A unit of work gated by conditions.
pub struct Operation {
    name: String,
    work: Arc<dyn Task>,
    conditions: Vec<Arc<dyn Condition>>,
    observers: Vec<Arc<dyn Observer>>,
}

impl Operation {
    pub fn new(work: Arc<dyn Task>) -> Self {
        Self {
            name: work.name(),
            work,
            conditions: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Arc<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Cancel the work if it is still running `timeout` after it started.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_observer(Arc::new(TimeoutGuard::new(timeout)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conditions(&self) -> &[Arc<dyn Condition>] {
        &self.conditions
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conditions: Vec<String> = self.conditions.iter().map(|c| c.name()).collect();
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("conditions", &conditions)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// How a dependency task ended.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyOutcome {
    pub summary: TaskSummary,
    pub errors: Vec<TaskError>,
}

/// How an operation ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub summary: TaskSummary,
    /// Whether the work was started.
    pub executed: bool,
    pub errors: Vec<TaskError>,
    pub dependencies: Vec<DependencyOutcome>,
}

impl Outcome {
    pub fn succeeded(&self) -> bool {
        self.executed && !self.summary.cancelled && self.errors.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.summary.cancelled
    }
}

/// Drives operations through dependency, evaluation and execution.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    coordinator: Coordinator,
    exclusion: &'static ExclusionRegistry,
}

impl Engine {
    /// Create an engine and its coordination context.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            coordinator: Coordinator::spawn(),
            exclusion: ExclusionRegistry::global(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// A fresh host task bound to this engine's coordination context.
    pub fn task(&self, name: impl Into<String>) -> TaskHandle {
        TaskHandle::new(name, self.coordinator.clone())
    }

    /// Run `operation` on a new host task.
    pub async fn run(&self, operation: Operation) -> Outcome {
        let host = self.task(operation.name());
        self.run_with(operation, host).await
    }

    /// Run `operation` on `host`, which callers may keep to cancel it.
    ///
    /// Observers hear about a cancellation as soon as it happens, before the
    /// host has stopped.
    pub async fn run_with(&self, operation: Operation, host: TaskHandle) -> Outcome {
        let Operation {
            work,
            conditions,
            mut observers,
            ..
        } = operation;
        if let Some(timeout) = self.config.timeout() {
            observers.push(Arc::new(TimeoutGuard::new(timeout)));
        }
        info!(
            task = %host.name(),
            id = %host.id(),
            conditions = conditions.len(),
            "operation submitted"
        );

        let drive = self.drive(&host, work, &conditions, &observers);
        tokio::pin!(drive);
        let early = tokio::select! {
            biased;
            _ = host.cancelled() => None,
            executed = &mut drive => Some(executed),
        };
        let executed = match early {
            Some(executed) => {
                if host.is_cancelled() {
                    notify_cancelled(&observers, &host);
                }
                executed
            }
            None => {
                notify_cancelled(&observers, &host);
                drive.await
            }
        };
        host.finish(Vec::new());

        let errors = host.errors();
        for observer in &observers {
            observer.did_finish(&host, &errors);
        }
        info!(
            task = %host.name(),
            id = %host.id(),
            executed,
            cancelled = host.is_cancelled(),
            errors = errors.len(),
            "operation finished"
        );

        Outcome {
            summary: host.summary(),
            executed,
            errors,
            dependencies: host
                .dependencies()
                .iter()
                .map(|dependency| DependencyOutcome {
                    summary: dependency.summary(),
                    errors: dependency.errors(),
                })
                .collect(),
        }
    }

    /// Dependencies, exclusion domains, evaluation and then the work itself.
    ///
    /// Returns whether the work was started.
    async fn drive(
        &self,
        host: &TaskHandle,
        work: Arc<dyn Task>,
        conditions: &[Arc<dyn Condition>],
        observers: &[Arc<dyn Observer>],
    ) -> bool {
        if !self.run_dependencies(host, conditions).await {
            return false;
        }
        let _domains = self.acquire_domains(host, conditions).await;
        if host.is_cancelled() || !self.evaluate(host, conditions).await {
            return false;
        }

        host.set_state(TaskState::Executing);
        for observer in observers {
            observer.did_start(host);
        }
        run_task(host.clone(), work).await;
        true
    }

    /// Build and run the dependency tasks offered by `conditions`.
    ///
    /// Returns `false` if the host was cancelled, either from outside or
    /// because a dependency failed.
    async fn run_dependencies(&self, host: &TaskHandle, conditions: &[Arc<dyn Condition>]) -> bool {
        let mut running = JoinSet::new();
        for condition in conditions {
            if let Some(dependency) = condition.dependency(host) {
                let handle = TaskHandle::new(dependency.name(), host.coordinator().clone());
                debug!(task = %host.name(), dependency = %handle.name(), "dependency added");
                host.add_dependency(handle.clone());
                running.spawn(run_task(handle, dependency));
            }
        }

        let cancelled = tokio::select! {
            _ = drain(&mut running) => false,
            _ = host.cancelled() => true,
        };
        if cancelled {
            for dependency in host.dependencies() {
                dependency.cancel();
            }
            drain(&mut running).await;
            return false;
        }

        let failures: Vec<TaskError> = host
            .dependencies()
            .iter()
            .flat_map(TaskHandle::errors)
            .collect();
        if !failures.is_empty() {
            for failure in &failures {
                warn!(task = %host.name(), error = %failure, "dependency failed");
            }
            host.cancel_with_errors(failures);
            return false;
        }
        !host.is_cancelled()
    }

    async fn acquire_domains(
        &self,
        host: &TaskHandle,
        conditions: &[Arc<dyn Condition>],
    ) -> Vec<ExclusionGuard> {
        let names: Vec<String> = conditions
            .iter()
            .filter(|condition| condition.is_mutually_exclusive())
            .map(|condition| condition.name())
            .collect();
        if names.is_empty() {
            return Vec::new();
        }

        tokio::select! {
            guards = self.exclusion.acquire_all(names) => guards,
            _ = host.cancelled() => Vec::new(),
        }
    }

    /// Evaluate every condition concurrently; cancel the host on any failure.
    ///
    /// Returns whether all conditions were satisfied.
    async fn evaluate(&self, host: &TaskHandle, conditions: &[Arc<dyn Condition>]) -> bool {
        host.set_state(TaskState::Evaluating);

        let names: Vec<String> = conditions
            .iter()
            .map(|condition| condition.name())
            .collect();
        let mut evaluations = JoinSet::new();
        for (index, condition) in conditions.iter().enumerate() {
            let condition = Arc::clone(condition);
            let task = host.clone();
            evaluations.spawn(async move { (index, condition.evaluate(&task).await) });
        }

        let verdicts = tokio::select! {
            verdicts = collect(&mut evaluations, conditions.len()) => verdicts,
            // Late verdicts are discarded with the join set.
            _ = host.cancelled() => return false,
        };

        let failures: Vec<ConditionError> = verdicts
            .into_iter()
            .zip(names)
            .filter_map(|(verdict, name)| match verdict {
                Some(Verdict::Satisfied) => None,
                Some(Verdict::Failed(error)) => Some(error),
                None => Some(ConditionError::new(name)),
            })
            .collect();
        if failures.is_empty() {
            return true;
        }

        for failure in &failures {
            if self.config.log_context {
                warn!(
                    task = %host.name(),
                    condition = %failure.condition_name,
                    context = ?failure.context,
                    "condition failed"
                );
            } else {
                warn!(
                    task = %host.name(),
                    condition = %failure.condition_name,
                    error = %failure,
                    "condition failed"
                );
            }
        }
        host.cancel_with_errors(failures.into_iter().map(TaskError::from).collect());
        false
    }
}

fn notify_cancelled(observers: &[Arc<dyn Observer>], host: &TaskHandle) {
    for observer in observers {
        observer.did_cancel(host);
    }
}

async fn drain(running: &mut JoinSet<()>) {
    while let Some(result) = running.join_next().await {
        if let Err(error) = result {
            warn!(%error, "dependency task aborted");
        }
    }
}

/// Gather verdicts in condition order. A slot stays `None` if its
/// evaluation panicked.
async fn collect(
    evaluations: &mut JoinSet<(usize, Verdict)>,
    count: usize,
) -> Vec<Option<Verdict>> {
    let mut verdicts = vec![None; count];
    while let Some(result) = evaluations.join_next().await {
        match result {
            Ok((index, verdict)) => verdicts[index] = Some(verdict),
            Err(error) => warn!(%error, "condition evaluation aborted"),
        }
    }
    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::tests::fixed;
    use crate::condition::{
        CANCELLED_DEPENDENCIES, CAPABILITY_ERROR, CapabilityCondition, Negated,
        NoCancelledDependencies,
    };
    use crate::task::FnTask;
    use crate::timeout::TimeoutError;
    use async_trait::async_trait;
    use capability::{CapabilityError, CapabilityStatus, ProviderCall, Reason, ScriptedProvider};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn work() -> Arc<dyn Task> {
        let work = FnTask::new("work", |_| async { Ok::<(), TaskError>(()) });
        Arc::new(work)
    }

    fn slow_work(duration: Duration) -> Arc<dyn Task> {
        let work = FnTask::new("slow", move |_| async move {
            tokio::time::sleep(duration).await;
            Ok::<(), TaskError>(())
        });
        Arc::new(work)
    }

    fn scripted(name: &str, status: CapabilityStatus) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::new(name, status))
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.timeout(), None);
        assert!(!config.log_context);
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let config = EngineConfig {
            timeout_ms: Some(0),
            ..Default::default()
        };

        assert!(matches!(Engine::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unconditioned_operation_executes() {
        let outcome = engine().run(Operation::new(work())).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.summary.name, "work");
        assert_eq!(outcome.summary.state, TaskState::Finished);
        assert!(outcome.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_authorize_then_execute() {
        let provider = scripted("engine-granted", CapabilityStatus::NotDetermined);
        let condition = CapabilityCondition::new(Arc::clone(&provider));
        let operation = Operation::new(work()).with_condition(Arc::new(condition));

        let outcome = engine().run(operation).await;

        assert!(outcome.succeeded());
        assert_eq!(
            provider.calls(),
            vec![
                ProviderCall::RequestStatus,
                ProviderCall::Authorize,
                ProviderCall::RequestStatus,
            ]
        );
        assert_eq!(outcome.dependencies.len(), 1);
        assert_eq!(
            outcome.dependencies[0].summary.name,
            "AuthorizeCapability<engine-granted>"
        );
        assert!(outcome.dependencies[0].errors.is_empty());
    }

    #[tokio::test]
    async fn test_denied_authorization_short_circuits() {
        let provider = Arc::new(
            ScriptedProvider::new("engine-denied", CapabilityStatus::NotDetermined)
                .authorizes_to(CapabilityStatus::Denied),
        );
        let condition = CapabilityCondition::new(Arc::clone(&provider));
        let operation = Operation::new(work()).with_condition(Arc::new(condition));

        let outcome = engine().run(operation).await;
        let expected = CapabilityError::new("engine-denied", Reason::Denied);

        assert!(!outcome.executed);
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.errors, vec![TaskError::Capability(expected)]);
        // Evaluation is never reached.
        assert_eq!(
            provider.calls(),
            vec![ProviderCall::RequestStatus, ProviderCall::Authorize]
        );
    }

    #[tokio::test]
    async fn test_check_only_failure_cancels_host() {
        let provider = scripted("engine-unasked", CapabilityStatus::NotDetermined);
        let condition = CapabilityCondition::check(Arc::clone(&provider));
        let operation = Operation::new(work()).with_condition(Arc::new(condition));

        let outcome = engine().run(operation).await;
        let expected = ConditionError::new("Capability<engine-unasked>");

        assert!(!outcome.executed);
        assert_eq!(outcome.errors, vec![TaskError::Condition(expected)]);
        let TaskError::Condition(error) = &outcome.errors[0] else {
            panic!("expected a condition error");
        };
        assert_eq!(
            error.get(&CAPABILITY_ERROR).map(|e| e.reason.clone()),
            Some(Reason::NotDetermined)
        );
        assert_eq!(provider.calls(), vec![ProviderCall::RequestStatus]);
    }

    #[tokio::test]
    async fn test_all_failures_are_attached() {
        let operation = Operation::new(work())
            .with_condition(fixed("A", false))
            .with_condition(fixed("B", true))
            .with_condition(fixed("C", false));
        assert_eq!(operation.conditions().len(), 3);

        let outcome = engine().run(operation).await;

        assert_eq!(
            outcome.errors,
            vec![
                TaskError::Condition(ConditionError::new("A")),
                TaskError::Condition(ConditionError::new("C")),
            ]
        );
    }

    #[tokio::test]
    async fn test_negated_capability() {
        let provider = scripted("engine-negated", CapabilityStatus::Denied);
        let condition = Negated::new(CapabilityCondition::check(provider));
        let operation = Operation::new(work()).with_condition(Arc::new(condition));

        assert!(engine().run(operation).await.succeeded());
    }

    struct SelfCancelling;

    #[async_trait]
    impl Condition for SelfCancelling {
        fn name(&self) -> String {
            "SelfCancelling".to_string()
        }

        fn dependency(&self, _task: &TaskHandle) -> Option<Arc<dyn Task>> {
            let quitter = FnTask::new("quitter", |task: TaskHandle| async move {
                task.cancel();
                std::future::pending::<()>().await;
                Ok::<(), TaskError>(())
            });
            Some(Arc::new(quitter))
        }

        async fn evaluate(&self, _task: &TaskHandle) -> Verdict {
            Verdict::Satisfied
        }
    }

    #[tokio::test]
    async fn test_cancelled_dependency_fails_no_cancelled_dependencies() {
        let operation = Operation::new(work())
            .with_condition(Arc::new(SelfCancelling))
            .with_condition(Arc::new(NoCancelledDependencies));

        let outcome = engine().run(operation).await;

        assert!(!outcome.executed);
        let TaskError::Condition(error) = &outcome.errors[0] else {
            panic!("expected a condition error");
        };
        assert_eq!(error.condition_name, "NoCancelledDependencies");
        let cancelled = error.get(&CANCELLED_DEPENDENCIES).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].name, "quitter");
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_timeout_cancels_work() {
        let config = EngineConfig {
            timeout_ms: Some(100),
            log_context: true,
        };
        let engine = Engine::new(config).unwrap();
        let expected = TimeoutError {
            timeout: Duration::from_millis(100),
        };
        assert_eq!(engine.config().timeout(), Some(expected.timeout));

        let operation = Operation::new(slow_work(Duration::from_secs(10)));
        let outcome = engine.run(operation).await;

        assert!(outcome.executed);
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.errors, vec![TaskError::Timeout(expected)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_within_timeout_succeeds() {
        let engine = engine();
        let work = slow_work(Duration::from_millis(50));
        let operation = Operation::new(work).with_timeout(Duration::from_millis(100));
        let host = engine.task("quick");

        let outcome = engine.run_with(operation, host.clone()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(outcome.succeeded());
        assert!(!host.is_cancelled());
        assert!(host.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_cancel_cancels_dependency() {
        let engine = engine();
        let provider = Arc::new(
            ScriptedProvider::new("engine-abandoned", CapabilityStatus::NotDetermined)
                .with_prompt_latency(Duration::from_secs(60)),
        );
        let condition = CapabilityCondition::new(provider);
        let operation = Operation::new(work()).with_condition(Arc::new(condition));
        let host = engine.task("host");

        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            host.cancel();
        };
        let (outcome, _) = tokio::join!(engine.run_with(operation, host.clone()), cancel);

        assert!(!outcome.executed);
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.dependencies.len(), 1);
        assert!(outcome.dependencies[0].summary.cancelled);
        assert_eq!(outcome.dependencies[0].summary.state, TaskState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_hosts_serialize() {
        let engine = engine();
        let provider = scripted("engine-exclusive", CapabilityStatus::Authorized);
        let operation = || {
            let work = slow_work(Duration::from_secs(1));
            let condition = CapabilityCondition::check(Arc::clone(&provider));
            Operation::new(work).with_condition(Arc::new(condition))
        };
        let started = Instant::now();

        let (first, second) = tokio::join!(engine.run(operation()), engine.run(operation()));

        assert!(first.succeeded());
        assert!(second.succeeded());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_exclusive_hosts_overlap() {
        let engine = engine();
        let operation = || {
            let work = slow_work(Duration::from_secs(1));
            Operation::new(work).with_condition(fixed("Shared", true))
        };
        let started = Instant::now();

        tokio::join!(engine.run(operation()), engine.run(operation()));

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Observer for Recorder {
        fn did_start(&self, task: &TaskHandle) {
            self.record(format!("start {:?}", task.state()));
        }

        fn did_cancel(&self, task: &TaskHandle) {
            self.record(format!("cancel {:?}", task.state()));
        }

        fn did_finish(&self, _task: &TaskHandle, errors: &[TaskError]) {
            self.record(format!("finish {}", errors.len()));
        }
    }

    #[tokio::test]
    async fn test_observers_see_lifecycle() {
        let executed = Arc::new(Recorder::default());
        let operation = Operation::new(work()).with_observer(executed.clone());
        engine().run(operation).await;

        let rejected = Arc::new(Recorder::default());
        let operation = Operation::new(work())
            .with_condition(fixed("No", false))
            .with_observer(rejected.clone());
        engine().run(operation).await;

        assert_eq!(executed.events(), vec!["start Executing", "finish 0"]);
        assert_eq!(rejected.events(), vec!["cancel Evaluating", "finish 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_did_cancel_fires_while_work_is_running() {
        let recorder = Arc::new(Recorder::default());
        let operation = Operation::new(slow_work(Duration::from_secs(10)))
            .with_timeout(Duration::from_millis(100))
            .with_observer(recorder.clone());

        let outcome = engine().run(operation).await;

        assert!(outcome.is_cancelled());
        assert_eq!(
            recorder.events(),
            vec!["start Executing", "cancel Executing", "finish 1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_did_cancel_fires_once_for_external_cancel() {
        let engine = engine();
        let recorder = Arc::new(Recorder::default());
        let work = slow_work(Duration::from_secs(10));
        let operation = Operation::new(work).with_observer(recorder.clone());
        let host = engine.task("host");

        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            host.cancel();
        };
        let (outcome, _) = tokio::join!(engine.run_with(operation, host.clone()), cancel);

        assert!(outcome.executed);
        assert_eq!(
            recorder.events(),
            vec!["start Executing", "cancel Executing", "finish 0"]
        );
    }
}
