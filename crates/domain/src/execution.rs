use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::DomainResult;
use crate::error::DomainError;

/// How a service call runs. Both modes execute the same future; they differ only
/// in when the caller gets control back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run to completion before returning.
    #[default]
    Inline,
    /// Spawn on the runtime and return immediately.
    Detached,
}

impl ExecutionMode {
    pub const ALL: [ExecutionMode; 2] = [ExecutionMode::Inline, ExecutionMode::Detached];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Detached => "detached",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(Self::Inline),
            "detached" | "async" => Ok(Self::Detached),
            other => Err(DomainError::Validation(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }
}

type AbortMapper = Box<dyn FnOnce(String) -> DomainError + Send>;

enum CompletionState<T> {
    Ready(DomainResult<T>),
    Pending {
        handle: JoinHandle<DomainResult<T>>,
        on_abort: AbortMapper,
    },
}

/// Outcome of a call made under an [`ExecutionMode`]. Await it with [`Completion::wait`]
/// or hand it a callback with [`Completion::on_complete`].
pub struct Completion<T> {
    state: CompletionState<T>,
}

impl<T> Completion<T>
where
    T: Send + 'static,
{
    /// `on_abort` builds the error reported when a detached task panics or is
    /// cancelled before producing a result.
    pub async fn run<F, A>(mode: ExecutionMode, work: F, on_abort: A) -> Self
    where
        F: Future<Output = DomainResult<T>> + Send + 'static,
        A: FnOnce(String) -> DomainError + Send + 'static,
    {
        match mode {
            ExecutionMode::Inline => Self::ready(work.await),
            ExecutionMode::Detached => Self {
                state: CompletionState::Pending {
                    handle: tokio::spawn(work),
                    on_abort: Box::new(on_abort),
                },
            },
        }
    }

    pub fn ready(result: DomainResult<T>) -> Self {
        Self {
            state: CompletionState::Ready(result),
        }
    }

    pub fn is_ready(&self) -> bool {
        match &self.state {
            CompletionState::Ready(_) => true,
            CompletionState::Pending { handle, .. } => handle.is_finished(),
        }
    }

    pub async fn wait(self) -> DomainResult<T> {
        match self.state {
            CompletionState::Ready(result) => result,
            CompletionState::Pending { handle, on_abort } => match handle.await {
                Ok(result) => result,
                Err(err) => Err(on_abort(err.to_string())),
            },
        }
    }

    /// Delivers the outcome to `callback` exactly once. Ready outcomes are delivered
    /// on the calling task; pending ones from a follow-up task.
    pub fn on_complete<C>(self, callback: C)
    where
        C: FnOnce(DomainResult<T>) + Send + 'static,
    {
        match self.state {
            CompletionState::Ready(result) => callback(result),
            state @ CompletionState::Pending { .. } => {
                let completion = Self { state };
                tokio::spawn(async move {
                    callback(completion.wait().await);
                });
            }
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            CompletionState::Ready(_) => "ready",
            CompletionState::Pending { .. } => "pending",
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn aborted(message: String) -> DomainError {
        DomainError::QueryFailure {
            operation: "test",
            key: "k".into(),
            message,
        }
    }

    #[test]
    fn execution_mode_parses_known_names() {
        assert_eq!("inline".parse::<ExecutionMode>().unwrap(), ExecutionMode::Inline);
        assert_eq!("ASYNC".parse::<ExecutionMode>().unwrap(), ExecutionMode::Detached);
        assert!("eventually".parse::<ExecutionMode>().is_err());
    }

    #[tokio::test]
    async fn inline_completion_is_ready_on_return() {
        let completion =
            Completion::run(ExecutionMode::Inline, async { Ok::<_, DomainError>(7) }, aborted)
                .await;
        assert!(completion.is_ready());
        assert_eq!(completion.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn detached_completion_delivers_same_result() {
        let completion = Completion::run(
            ExecutionMode::Detached,
            async { Err::<u8, _>(DomainError::Parse("bad row".into())) },
            aborted,
        )
        .await;
        assert!(matches!(
            completion.wait().await,
            Err(DomainError::Parse(message)) if message == "bad row"
        ));
    }

    #[tokio::test]
    async fn callback_receives_detached_outcome() {
        let (tx, rx) = oneshot::channel();
        Completion::run(ExecutionMode::Detached, async { Ok::<_, DomainError>("done") }, aborted)
            .await
            .on_complete(move |result| {
                let _ = tx.send(result);
            });
        assert_eq!(rx.await.unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn panicking_task_maps_to_abort_error() {
        let completion = Completion::run(
            ExecutionMode::Detached,
            async {
                if true {
                    panic!("boom");
                }
                Ok::<u8, DomainError>(1)
            },
            aborted,
        )
        .await;
        assert!(matches!(
            completion.wait().await,
            Err(DomainError::QueryFailure { operation: "test", .. })
        ));
    }
}
