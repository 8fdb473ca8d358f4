use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use futures::{future::BoxFuture, FutureExt};
use rdkafka::{
    config::FromClientConfig,
    consumer::{Consumer, StreamConsumer},
    message::BorrowedMessage,
    ClientConfig, Message,
};
use tracing::info;

use crate::{
    source::MessageSource,
    topic::{TopicFilter, TopicInfo},
    Record,
};

pub struct KafkaConsumer {
    client: Arc<StreamConsumer>,
}

impl KafkaConsumer {
    pub fn new(properties: HashMap<String, String>) -> anyhow::Result<Self> {
        let config = ClientConfig::from_iter(properties);
        let client = StreamConsumer::from_config(&config)?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Builds a consumer joining the topic's consumer group.
    pub fn for_topic(
        topic: &TopicInfo,
        mut properties: HashMap<String, String>,
    ) -> anyhow::Result<Self> {
        properties.insert("group.id".to_string(), topic.group_name.clone());
        Self::new(properties)
    }

    pub async fn subscribe(&self, filter: &TopicFilter) -> anyhow::Result<()> {
        let client = self.client.clone();
        let subscription = filter.subscription();

        tokio::task::spawn_blocking(move || client.subscribe(&[&subscription]))
            .await
            .context("background task panicked")??;
        info!(%filter, "subscribed");

        Ok(())
    }

    pub async fn recv(&self) -> anyhow::Result<Record> {
        self.client
            .recv()
            .await
            .map(|message| Record::from(&message))
            .context("failed to receive message")
    }
}

impl MessageSource for KafkaConsumer {
    fn subscribe<'a>(&'a mut self, filter: &'a TopicFilter) -> BoxFuture<'a, anyhow::Result<()>> {
        KafkaConsumer::subscribe(self, filter).boxed()
    }

    fn next_record(&mut self) -> BoxFuture<'_, anyhow::Result<Option<Record>>> {
        async move { self.recv().await.map(Some) }.boxed()
    }
}

impl From<&BorrowedMessage<'_>> for Record {
    fn from(message: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
            timestamp: message.timestamp().to_millis(),
        }
    }
}
