use std::collections::HashMap;

use anyhow::Context;
use serde::Deserialize;

use crate::{decode::DecoderKind, dispatch::ErrorPolicy, topic::TopicInfo};

pub const ENV_PREFIX: &str = "DISPATCH_";

/// Properties applied to every consumer unless overridden.
const DEFAULT_PROPERTIES: [(&str, &str); 2] = [
    ("auto.offset.reset", "earliest"),
    ("enable.auto.commit", "true"),
];

/// Settings of a single consumption, read from `DISPATCH_*` environment variables.
///
/// Variables not mapped to a field become librdkafka properties, with `_` replaced by
/// `.`: `DISPATCH_BOOTSTRAP_SERVERS` sets `bootstrap.servers`.
#[derive(Debug, Deserialize)]
pub struct ConsumerSettings {
    pub topic: String,
    pub group: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    #[serde(default)]
    pub decoder: DecoderKind,
    #[serde(flatten)]
    pub consumer_props: HashMap<String, String>,
}

impl ConsumerSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .with_context(|| format!("failed to read {ENV_PREFIX}* settings"))
    }

    pub fn topic_info(&self) -> TopicInfo {
        TopicInfo::new(self.topic.clone(), self.group.clone())
    }

    pub fn trace_id(&self) -> String {
        self.trace_id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.group, self.topic))
    }

    pub fn client_properties(&self) -> HashMap<String, String> {
        let mut properties = DEFAULT_PROPERTIES
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        properties.extend(
            self.consumer_props
                .iter()
                .map(|(key, value)| (key.replace('_', "."), value.clone())),
        );
        properties.insert("group.id".to_string(), self.group.clone());

        properties
    }
}
