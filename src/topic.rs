use std::fmt;

use anyhow::Context;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

/// Topic to consume and the consumer group to join while doing it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TopicInfo {
    pub topic_name: String,
    pub group_name: String,
}

impl TopicInfo {
    pub fn new(topic_name: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            group_name: group_name.into(),
        }
    }

    /// Allow-list filter built from the topic name.
    pub fn whitelist(&self) -> anyhow::Result<TopicFilter> {
        TopicFilter::whitelist(&self.topic_name)
    }
}

/// Allow-list of topic names, either a single literal name or a regular expression.
///
/// The whitelist syntax follows the classic consumer one: surrounding quotes and all
/// whitespace are stripped and commas separate alternatives, so `"a, b"` allows `a`
/// and `b`. A whitelist consisting only of legal topic characters is treated as a
/// literal name. Regular expressions must match the whole topic name.
///
/// Patterns are handed to librdkafka's POSIX regex engine on subscription, so
/// lookaround, atomic groups and backreferences are rejected even though the local
/// matcher would accept them.
#[derive(Clone, Debug)]
pub enum TopicFilter {
    Literal(String),
    Regex { pattern: String, regex: Regex },
}

impl TopicFilter {
    pub fn whitelist(raw: &str) -> anyhow::Result<Self> {
        let pattern = raw
            .trim()
            .trim_matches(['"', '\''])
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == ',' { '|' } else { c })
            .collect::<String>();

        anyhow::ensure!(!pattern.is_empty(), "topic whitelist {raw:?} is empty");

        if pattern.chars().all(is_legal_topic_char) {
            return Ok(Self::Literal(pattern));
        }

        if let Some(construct) = backtracking_construct(&pattern) {
            anyhow::bail!(
                "topic whitelist {raw:?} uses {construct}, which librdkafka cannot subscribe with"
            );
        }

        let regex = Regex::new(&anchored(&pattern))
            .with_context(|| format!("failed to parse topic whitelist {raw:?}"))?;

        Ok(Self::Regex { pattern, regex })
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == topic,
            Self::Regex { regex, .. } => regex.is_match(topic).unwrap_or(false),
        }
    }

    /// Subscription string understood by librdkafka, where a leading `^` marks a pattern.
    pub fn subscription(&self) -> String {
        match self {
            Self::Literal(literal) => literal.clone(),
            Self::Regex { pattern, .. } => anchored(pattern),
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => f.write_str(literal),
            Self::Regex { pattern, .. } => write!(f, "re:{pattern}"),
        }
    }
}

fn anchored(pattern: &str) -> String {
    format!("^({pattern})$")
}

const BACKTRACKING_GROUPS: [(&str, &str); 5] = [
    ("(?=", "lookahead"),
    ("(?!", "negative lookahead"),
    ("(?<=", "lookbehind"),
    ("(?<!", "negative lookbehind"),
    ("(?>", "an atomic group"),
];

/// Names the first construct only a backtracking engine supports, if any.
fn backtracking_construct(pattern: &str) -> Option<&'static str> {
    if let Some((_, name)) = BACKTRACKING_GROUPS
        .iter()
        .find(|(group, _)| pattern.contains(group))
    {
        return Some(*name);
    }

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' && matches!(chars.next(), Some('1'..='9' | 'k')) {
            return Some("a backreference");
        }
    }
    None
}

fn is_legal_topic_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}
