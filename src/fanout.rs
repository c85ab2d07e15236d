//! Scatter/gather of one prompt across provider targets.
//!
//! A submission spawns one task per enabled target into a [`JoinSet`]. Each
//! task owns its outcome slot and reports back on its own schedule, so
//! outcomes surface in completion order and a failing or panicking target
//! never holds up its siblings. The history store is written exactly once,
//! before anything is dispatched.
//!
//! Dropping a [`Submission`] early detaches its tasks instead of aborting
//! them: a request that has been sent always runs to its own end.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tokio::time::Instant;

use crate::history::{HistoryLog, HistoryStore};
use crate::providers::{Credentials, Dispatcher, ProviderTarget};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Please enter a prompt first.")]
    EmptyPrompt,
    #[error("Please enable at least one model.")]
    NoTargets,
    #[error("Target '{target}' needs {key_env}, which is not set in the environment.")]
    MissingCredential {
        target: String,
        key_env: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Ready,
    Pending,
    Succeeded,
    Failed,
}

impl TargetState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Success { text: String, elapsed: Duration },
    Failure { message: String, elapsed: Duration },
}

impl ProviderOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Success { elapsed, .. } | Self::Failure { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn state(&self) -> TargetState {
        match self {
            Self::Success { .. } => TargetState::Succeeded,
            Self::Failure { .. } => TargetState::Failed,
        }
    }
}

/// Terminal result for one target of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub target: ProviderTarget,
    pub outcome: ProviderOutcome,
}

/// Wire form of a [`TargetOutcome`], shared by the CLI and the server.
#[derive(Debug, Serialize)]
pub struct OutcomeReport<'a> {
    pub target: &'a str,
    pub name: &'a str,
    pub model: &'a str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    pub elapsed_ms: u64,
}

impl<'a> From<&'a TargetOutcome> for OutcomeReport<'a> {
    fn from(value: &'a TargetOutcome) -> Self {
        let (status, text, error) = match &value.outcome {
            ProviderOutcome::Success { text, .. } => ("success", Some(text.as_str()), None),
            ProviderOutcome::Failure { message, .. } => ("error", None, Some(message.as_str())),
        };
        Self {
            target: &value.target.id,
            name: &value.target.name,
            model: &value.target.model,
            status,
            text,
            error,
            elapsed_ms: value.outcome.elapsed().as_millis() as u64,
        }
    }
}

/// Checks the prompt and target selection; returns the trimmed prompt.
///
/// Credentials are not looked at, so dry runs can use this on its own.
pub fn validate<'a>(prompt: &'a str, targets: &[ProviderTarget]) -> Result<&'a str, SubmitError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(SubmitError::EmptyPrompt);
    }
    if !targets.iter().any(|target| target.enabled) {
        return Err(SubmitError::NoTargets);
    }
    Ok(prompt)
}

pub struct Aggregator {
    dispatcher: Arc<dyn Dispatcher>,
    history: Arc<HistoryStore>,
    credentials: Credentials,
}

impl Aggregator {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        history: Arc<HistoryStore>,
        credentials: Credentials,
    ) -> Self {
        Self {
            dispatcher,
            history,
            credentials,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Validates, records the prompt, and dispatches every enabled target.
    ///
    /// Must be called from within a Tokio runtime. Rejections happen before
    /// any history write or network activity.
    pub fn submit(
        &self,
        prompt: &str,
        targets: &[ProviderTarget],
    ) -> Result<Submission, SubmitError> {
        let prompt = validate(prompt, targets)?;
        if let Some(target) = targets
            .iter()
            .find(|target| target.enabled && !self.credentials.covers(target.kind))
        {
            return Err(SubmitError::MissingCredential {
                target: target.id.clone(),
                key_env: target.kind.credential_env().unwrap_or_default(),
            });
        }

        let history = self.history.record(prompt);

        let shared_prompt: Arc<str> = Arc::from(prompt);
        let mut tasks = JoinSet::new();
        let mut slots = Vec::with_capacity(targets.len());
        for target in targets {
            let index = slots.len();
            let mut slot = Slot {
                target: target.clone(),
                state: TargetState::Ready,
                task: None,
                dispatched: None,
            };
            if target.enabled {
                slot.dispatched = Some(Instant::now());
                slot.task = Some(spawn_target(
                    &mut tasks,
                    index,
                    Arc::clone(&self.dispatcher),
                    target.clone(),
                    Arc::clone(&shared_prompt),
                ));
                slot.state = TargetState::Pending;
            }
            slots.push(slot);
        }

        tracing::info!(targets = tasks.len(), "prompt dispatched");

        Ok(Submission {
            prompt: prompt.to_string(),
            slots,
            tasks,
            history,
            started: Instant::now(),
        })
    }
}

fn spawn_target(
    tasks: &mut JoinSet<(usize, ProviderOutcome)>,
    index: usize,
    dispatcher: Arc<dyn Dispatcher>,
    target: ProviderTarget,
    prompt: Arc<str>,
) -> AbortHandle {
    tasks.spawn(async move {
        let started = Instant::now();
        let result = AssertUnwindSafe(dispatcher.dispatch(&target, &prompt))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();
        let outcome = match result {
            Ok(Ok(text)) => ProviderOutcome::Success { text, elapsed },
            Ok(Err(err)) => ProviderOutcome::Failure {
                message: err.to_string(),
                elapsed,
            },
            Err(_) => ProviderOutcome::Failure {
                message: format!("{} dispatch panicked", target.name),
                elapsed,
            },
        };
        (index, outcome)
    })
}

#[derive(Debug)]
struct Slot {
    target: ProviderTarget,
    state: TargetState,
    task: Option<AbortHandle>,
    dispatched: Option<Instant>,
}

/// An accepted submission whose outcomes arrive as each target finishes.
#[derive(Debug)]
pub struct Submission {
    prompt: String,
    slots: Vec<Slot>,
    tasks: JoinSet<(usize, ProviderOutcome)>,
    history: HistoryLog,
    started: Instant,
}

impl Submission {
    /// The trimmed prompt that was dispatched.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// History as it stood right after this prompt was recorded.
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn targets(&self) -> impl Iterator<Item = (&ProviderTarget, TargetState)> {
        self.slots.iter().map(|slot| (&slot.target, slot.state))
    }

    pub fn state(&self, id: &str) -> Option<TargetState> {
        self.slots
            .iter()
            .find(|slot| slot.target.id == id)
            .map(|slot| slot.state)
    }

    pub fn pending(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == TargetState::Pending)
            .count()
    }

    /// Waits for the next target to finish. `None` once all are terminal.
    pub async fn next_outcome(&mut self) -> Option<TargetOutcome> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => return Some(self.settle(index, outcome)),
                Err(err) => {
                    tracing::error!(error = %err, "provider task ended without an outcome");
                    if let Some(lost) = self.lost(&err) {
                        return Some(lost);
                    }
                }
            }
        }

        let index = self
            .slots
            .iter()
            .position(|slot| slot.state == TargetState::Pending)?;
        let outcome = ProviderOutcome::Failure {
            message: "provider task ended without reporting an outcome".to_string(),
            elapsed: self.started.elapsed(),
        };
        Some(self.settle(index, outcome))
    }

    /// Drains the remaining outcomes in completion order.
    pub async fn finish(mut self) -> Vec<TargetOutcome> {
        let mut outcomes = Vec::with_capacity(self.pending());
        while let Some(outcome) = self.next_outcome().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Settles the slot whose task died with `err`, timed from its dispatch.
    fn lost(&mut self, err: &JoinError) -> Option<TargetOutcome> {
        let index = self.slots.iter().position(|slot| {
            slot.state == TargetState::Pending
                && slot.task.as_ref().is_some_and(|task| task.id() == err.id())
        })?;
        let slot = &self.slots[index];
        let message = if err.is_cancelled() {
            format!("{} dispatch was cancelled", slot.target.name)
        } else {
            format!("{} dispatch panicked", slot.target.name)
        };
        let elapsed = slot.dispatched.unwrap_or(self.started).elapsed();
        Some(self.settle(index, ProviderOutcome::Failure { message, elapsed }))
    }

    fn settle(&mut self, index: usize, outcome: ProviderOutcome) -> TargetOutcome {
        let slot = &mut self.slots[index];
        slot.state = outcome.state();
        let elapsed_ms = outcome.elapsed().as_millis() as u64;
        match &outcome {
            ProviderOutcome::Success { .. } => {
                tracing::info!(target_id = %slot.target.id, elapsed_ms, "provider succeeded");
            }
            ProviderOutcome::Failure { message, .. } => {
                tracing::warn!(target_id = %slot.target.id, elapsed_ms, error = %message, "provider failed");
            }
        }
        TargetOutcome {
            target: slot.target.clone(),
            outcome,
        }
    }
}

impl Drop for Submission {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            tracing::debug!(
                running = self.tasks.len(),
                "submission dropped, letting in-flight requests finish"
            );
            self.tasks.detach_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tokio::time::sleep;

    use super::*;
    use crate::providers::{EndpointKind, ProviderError};

    #[derive(Clone)]
    enum Behavior {
        Answer(&'static str),
        Status(StatusCode),
        TimeOut,
        Panic,
    }

    #[derive(Default)]
    struct ScriptedDispatcher {
        scripts: HashMap<String, (Duration, Behavior)>,
        calls: AtomicUsize,
        completed: AtomicUsize,
    }

    impl ScriptedDispatcher {
        fn script(mut self, id: &str, delay_ms: u64, behavior: Behavior) -> Self {
            self.scripts
                .insert(id.to_string(), (Duration::from_millis(delay_ms), behavior));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            target: &ProviderTarget,
            prompt: &str,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, behavior) = self
                .scripts
                .get(&target.id)
                .cloned()
                .unwrap_or((Duration::ZERO, Behavior::Answer("default")));
            sleep(delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            match behavior {
                Behavior::Answer(text) => Ok(format!("{text}: {prompt}")),
                Behavior::Status(status) => {
                    Err(ProviderError::status(target.kind, status, "upstream exploded"))
                }
                Behavior::TimeOut => Err(ProviderError::TimedOut {
                    kind: target.kind,
                    after: delay,
                }),
                Behavior::Panic => panic!("scripted panic"),
            }
        }
    }

    fn local(id: &str) -> ProviderTarget {
        ProviderTarget::new(id, id.to_uppercase(), EndpointKind::Local, "m")
    }

    fn aggregator(dispatcher: Arc<ScriptedDispatcher>) -> Aggregator {
        Aggregator::new(
            dispatcher,
            Arc::new(HistoryStore::in_memory(10)),
            Credentials::default(),
        )
    }

    #[tokio::test]
    async fn rejected_submissions_make_no_calls() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let aggregator = aggregator(Arc::clone(&dispatcher));

        assert_eq!(
            aggregator.submit("", &[local("a")]).unwrap_err(),
            SubmitError::EmptyPrompt
        );
        assert_eq!(
            aggregator.submit(" \n\t", &[local("a")]).unwrap_err(),
            SubmitError::EmptyPrompt
        );
        assert_eq!(
            aggregator.submit("hello", &[]).unwrap_err(),
            SubmitError::NoTargets
        );
        assert_eq!(
            aggregator
                .submit("hello", &[local("a").enabled(false)])
                .unwrap_err(),
            SubmitError::NoTargets
        );

        tokio::task::yield_now().await;
        assert_eq!(dispatcher.calls(), 0);
        assert!(aggregator.history().snapshot().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_rejected_up_front() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let aggregator = aggregator(Arc::clone(&dispatcher));
        let targets = [
            local("ollama"),
            ProviderTarget::new("claude", "Claude", EndpointKind::Anthropic, "claude-sonnet"),
        ];

        let err = aggregator.submit("hello", &targets).unwrap_err();
        assert_eq!(
            err,
            SubmitError::MissingCredential {
                target: "claude".to_string(),
                key_env: "ANTHROPIC_API_KEY",
            }
        );
        assert_eq!(dispatcher.calls(), 0);
        assert!(aggregator.history().snapshot().is_empty());
    }

    #[tokio::test]
    async fn disabled_target_without_credential_is_ignored() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let aggregator = aggregator(Arc::clone(&dispatcher));
        let targets = [
            local("ollama"),
            ProviderTarget::new("claude", "Claude", EndpointKind::Anthropic, "c").enabled(false),
        ];

        let submission = aggregator.submit("hello", &targets).unwrap();
        assert_eq!(submission.state("claude"), Some(TargetState::Ready));
        let outcomes = submission.finish().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(dispatcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_arrive_in_completion_order() {
        let dispatcher = Arc::new(
            ScriptedDispatcher::default()
                .script("a", 10, Behavior::Answer("A"))
                .script("b", 5, Behavior::Status(StatusCode::INTERNAL_SERVER_ERROR))
                .script("c", 1_000, Behavior::TimeOut),
        );
        let aggregator = aggregator(Arc::clone(&dispatcher));
        let targets = [local("a"), local("b"), local("c")];

        let wall = Instant::now();
        let mut submission = aggregator.submit("  hello  ", &targets).unwrap();
        assert_eq!(submission.pending(), 3);
        assert_eq!(submission.state("a"), Some(TargetState::Pending));

        let first = submission.next_outcome().await.unwrap();
        assert_eq!(first.target.id, "b");
        assert!(matches!(
            &first.outcome,
            ProviderOutcome::Failure { message, .. } if message.contains("500 Internal Server Error")
        ));
        assert_eq!(submission.state("b"), Some(TargetState::Failed));
        assert_eq!(submission.state("a"), Some(TargetState::Pending));

        let second = submission.next_outcome().await.unwrap();
        assert_eq!(second.target.id, "a");
        assert_eq!(
            second.outcome,
            ProviderOutcome::Success {
                text: "A: hello".to_string(),
                elapsed: second.outcome.elapsed(),
            }
        );
        assert!(second.outcome.elapsed() >= Duration::from_millis(10));
        assert!(second.outcome.elapsed() < Duration::from_millis(1_000));

        let third = submission.next_outcome().await.unwrap();
        assert_eq!(third.target.id, "c");
        assert!(!third.outcome.is_success());
        assert!(submission.next_outcome().await.is_none());

        let total = wall.elapsed();
        assert!(total >= Duration::from_millis(1_000));
        assert!(total < Duration::from_millis(1_015));
        assert!(submission.targets().all(|(_, state)| state.is_terminal()));
        assert_eq!(dispatcher.calls(), 3);
    }

    #[tokio::test]
    async fn prompt_is_recorded_once_before_dispatch() {
        let dispatcher = Arc::new(ScriptedDispatcher::default().script(
            "a",
            0,
            Behavior::Status(StatusCode::BAD_GATEWAY),
        ));
        let aggregator = aggregator(Arc::clone(&dispatcher));

        let submission = aggregator.submit("  tell me a joke ", &[local("a")]).unwrap();
        assert_eq!(submission.prompt(), "tell me a joke");
        assert_eq!(submission.history().oldest_first(), ["tell me a joke"]);

        let outcomes = submission.finish().await;
        assert!(!outcomes[0].outcome.is_success());
        // Failed submissions stay in history.
        assert_eq!(aggregator.history().snapshot().oldest_first(), ["tell me a joke"]);
    }

    #[tokio::test]
    async fn panicking_dispatch_fails_only_its_own_target() {
        let dispatcher = Arc::new(
            ScriptedDispatcher::default()
                .script("boom", 0, Behavior::Panic)
                .script("fine", 5, Behavior::Answer("ok")),
        );
        let aggregator = aggregator(Arc::clone(&dispatcher));

        let outcomes = aggregator
            .submit("hi", &[local("boom"), local("fine")])
            .unwrap()
            .finish()
            .await;

        let by_id: HashMap<&str, &ProviderOutcome> = outcomes
            .iter()
            .map(|outcome| (outcome.target.id.as_str(), &outcome.outcome))
            .collect();
        assert!(matches!(
            by_id["boom"],
            ProviderOutcome::Failure { message, .. } if message == "BOOM dispatch panicked"
        ));
        assert!(by_id["fine"].is_success());
    }

    #[tokio::test]
    async fn dropping_a_submission_lets_dispatched_requests_finish() {
        let dispatcher = Arc::new(
            ScriptedDispatcher::default()
                .script("a", 50, Behavior::Answer("A"))
                .script("b", 50, Behavior::Answer("B")),
        );
        let aggregator = aggregator(Arc::clone(&dispatcher));

        let submission = aggregator.submit("hi", &[local("a"), local("b")]).unwrap();
        tokio::task::yield_now().await;
        drop(submission);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(dispatcher.calls(), 2);
        assert_eq!(dispatcher.completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_settles_its_own_target_right_away() {
        let dispatcher = Arc::new(
            ScriptedDispatcher::default()
                .script("quick", 5, Behavior::Answer("Q"))
                .script("stuck", 10_000, Behavior::Answer("S"))
                .script("slow", 100, Behavior::Answer("L")),
        );
        let aggregator = aggregator(Arc::clone(&dispatcher));
        let mut submission = aggregator
            .submit("hi", &[local("quick"), local("stuck"), local("slow")])
            .unwrap();

        let first = submission.next_outcome().await.unwrap();
        assert_eq!(first.target.id, "quick");

        submission.slots[1].task.as_ref().unwrap().abort();
        let second = submission.next_outcome().await.unwrap();
        assert_eq!(second.target.id, "stuck");
        assert!(matches!(
            &second.outcome,
            ProviderOutcome::Failure { message, elapsed }
                if message == "STUCK dispatch was cancelled" && *elapsed < Duration::from_millis(100)
        ));
        assert_eq!(submission.state("stuck"), Some(TargetState::Failed));
        assert_eq!(submission.state("slow"), Some(TargetState::Pending));

        let third = submission.next_outcome().await.unwrap();
        assert_eq!(third.target.id, "slow");
        assert!(third.outcome.is_success());
        assert!(submission.next_outcome().await.is_none());
    }
}
