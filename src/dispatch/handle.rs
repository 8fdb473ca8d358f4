use std::sync::Arc;

use tokio::{sync::Notify, task::JoinHandle};

use super::DispatchError;
use crate::topic::TopicInfo;

/// Handle to a running consumption task.
///
/// Dropping the handle detaches the task, which then keeps consuming until its
/// source ends or an error stops it.
pub struct ConsumptionHandle {
    topic: TopicInfo,
    trace_id: String,
    shutdown: Arc<Notify>,
    task: JoinHandle<Result<u64, DispatchError>>,
    /// Set once the task has been joined: the processed count, or `None` if it failed.
    joined: Option<Option<u64>>,
}

impl ConsumptionHandle {
    pub(super) fn new(
        topic: TopicInfo,
        trace_id: String,
        shutdown: Arc<Notify>,
        task: JoinHandle<Result<u64, DispatchError>>,
    ) -> Self {
        Self {
            topic,
            trace_id,
            shutdown,
            task,
            joined: None,
        }
    }

    pub fn topic(&self) -> &TopicInfo {
        &self.topic
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the task to stop before it takes the next record. A record that is
    /// already being processed is finished first.
    pub fn request_stop(&self) {
        self.shutdown.notify_one();
    }

    /// Cancels the task at its next await point.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the task to end and returns the number of records it processed.
    ///
    /// Later calls return the same count, or [`DispatchError::Ended`] if the first
    /// call reported an error.
    pub async fn wait(&mut self) -> Result<u64, DispatchError> {
        if let Some(joined) = self.joined {
            return joined.ok_or(DispatchError::Ended);
        }
        let outcome = match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(error) => Err(error.into()),
        };
        self.joined = Some(outcome.as_ref().ok().copied());
        outcome
    }

    pub async fn stop(mut self) -> Result<u64, DispatchError> {
        self.request_stop();
        self.wait().await
    }
}
