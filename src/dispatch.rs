//! Background delivery of decoded messages to a business process.

mod handle;

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    decode::{DecodeError, Decoder},
    kafka::KafkaConsumer,
    process::BusinessProcess,
    source::MessageSource,
    topic::{TopicFilter, TopicInfo},
    Record,
};

pub use handle::ConsumptionHandle;

/// What the consumption task does when a record cannot be decoded or processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// End the task and report the error through its handle.
    #[default]
    Stop,
    /// Log the error and continue with the next record.
    Skip,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to subscribe with filter {filter}")]
    Subscribe {
        filter: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to receive message")]
    Receive(#[source] anyhow::Error),
    #[error("failed to decode message at {topic}/{partition}@{offset}")]
    Decode {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: DecodeError,
    },
    #[error("business process failed on message at {topic}/{partition}@{offset}")]
    Process {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: anyhow::Error,
    },
    #[error("consumption task was aborted")]
    Aborted,
    #[error("consumption task panicked")]
    Panicked(#[source] tokio::task::JoinError),
    #[error("consumption task already ended with an error")]
    Ended,
}

impl From<tokio::task::JoinError> for DispatchError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Aborted
        } else {
            Self::Panicked(error)
        }
    }
}

/// Subscribes a message source to one topic and hands every decoded record to a
/// business process, strictly in the order the source yields them.
pub struct Dispatcher<D, P> {
    topic: TopicInfo,
    filter: TopicFilter,
    decoder: D,
    process: P,
    trace_id: String,
    on_error: ErrorPolicy,
}

impl<D, P> Dispatcher<D, P>
where
    D: Decoder,
    P: BusinessProcess<D::Output> + 'static,
{
    pub fn new(
        topic: TopicInfo,
        decoder: D,
        process: P,
        trace_id: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let filter = topic
            .whitelist()
            .with_context(|| format!("invalid topic name {:?}", topic.topic_name))?;

        Ok(Self {
            topic,
            filter,
            decoder,
            process,
            trace_id: trace_id.into(),
            on_error: ErrorPolicy::default(),
        })
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Starts consuming in a background task and returns without waiting for messages.
    pub fn spawn<S: MessageSource>(self, source: S) -> ConsumptionHandle {
        let shutdown = Arc::new(Notify::new());
        let topic = self.topic.clone();
        let trace_id = self.trace_id.clone();
        let task = tokio::spawn(self.run(source, Arc::clone(&shutdown)));

        ConsumptionHandle::new(topic, trace_id, shutdown, task)
    }

    /// Consumes until the source is exhausted, `shutdown` is notified or an error
    /// ends the loop. Returns the number of records processed successfully.
    #[instrument(
        name = "consume",
        skip_all,
        fields(trace_id = %self.trace_id, topic = %self.topic.topic_name, group = %self.topic.group_name)
    )]
    pub async fn run<S: MessageSource>(
        self,
        mut source: S,
        shutdown: Arc<Notify>,
    ) -> Result<u64, DispatchError> {
        info!("group name: {}", self.topic.group_name);
        info!("topic name: {}", self.topic.topic_name);
        source
            .subscribe(&self.filter)
            .await
            .map_err(|source| DispatchError::Subscribe {
                filter: self.filter.to_string(),
                source,
            })?;
        debug!(handler = std::any::type_name::<P>(), "consumption started");

        let notified = shutdown.notified();
        tokio::pin!(notified);
        let mut processed: u64 = 0;

        loop {
            let record = tokio::select! {
                biased;
                _ = &mut notified => {
                    info!(processed, "shutdown requested, consumption stopped");
                    break;
                }
                next = source.next_record() => match next {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        info!(processed, "message source exhausted");
                        break;
                    }
                    Err(error) => {
                        error!("receiving message failed: {error:#}");
                        return Err(DispatchError::Receive(error));
                    }
                },
            };

            if !self.filter.matches(&record.topic) {
                warn!(
                    topic = %record.topic,
                    offset = record.offset,
                    "skipping message from topic outside the whitelist"
                );
                continue;
            }

            match self.deliver(record).await {
                Ok(()) => processed += 1,
                Err(error) => match self.on_error {
                    ErrorPolicy::Stop => {
                        error!(
                            error = &error as &dyn std::error::Error,
                            processed,
                            "consumption stopped"
                        );
                        return Err(error);
                    }
                    ErrorPolicy::Skip => {
                        warn!(error = &error as &dyn std::error::Error, "skipping message")
                    }
                },
            }
        }

        Ok(processed)
    }

    async fn deliver(&self, record: Record) -> Result<(), DispatchError> {
        let message = self
            .decoder
            .decode(record.payload.as_deref().unwrap_or_default())
            .map_err(|source| DispatchError::Decode {
                topic: record.topic.clone(),
                partition: record.partition,
                offset: record.offset,
                source,
            })?;
        debug!(
            trace_id = %self.trace_id,
            topic = %record.topic,
            offset = record.offset,
            key = ?record.key_lossy(),
            partition = record.partition,
            ?message,
            "message to consumer"
        );

        self.process
            .process(message)
            .await
            .map_err(|source| DispatchError::Process {
                topic: record.topic,
                partition: record.partition,
                offset: record.offset,
                source,
            })?;
        debug!("business done");

        Ok(())
    }
}

/// Builds a Kafka consumer for the topic and starts dispatching its messages.
///
/// `properties` are librdkafka client properties; `group.id` is taken from the topic
/// descriptor. Subscription happens inside the spawned task, so failures there are
/// reported through the returned handle.
pub fn launch<D, P>(
    properties: HashMap<String, String>,
    topic: TopicInfo,
    decoder: D,
    process: P,
    trace_id: impl Into<String>,
    on_error: ErrorPolicy,
) -> anyhow::Result<ConsumptionHandle>
where
    D: Decoder,
    P: BusinessProcess<D::Output> + 'static,
{
    let consumer =
        KafkaConsumer::for_topic(&topic, properties).context("failed to build Kafka consumer")?;
    let dispatcher = Dispatcher::new(topic, decoder, process, trace_id)?.on_error(on_error);

    Ok(dispatcher.spawn(consumer))
}
