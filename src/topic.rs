use crate::{
    types::{validate_qos, QoS, ValidationError},
    MULTI_LEVEL_WILDCARD_STR, SINGLE_LEVEL_WILDCARD_STR, TOPIC_SEPARATOR,
};
use std::{collections::HashMap, fmt, str::FromStr};

// Topic Names and Topic Filters
// MQTT v3.1.1 rules for topic strings:
// - A Topic must be at least 1 byte.
// - A Topic is case sensitive and may contain whitespace.
// - A leading forward slash creates an empty first level.
// - "/" is a valid Topic with two empty levels.
// - A Topic may contain an empty level (two forward slashes in a row).
// - A # (multi-level) wildcard may only appear as the last level.
// - A Topic may contain any number of + (single-level) wildcards.
// Only the first and the wildcard placement rule are enforced here.

/// An MQTT topic as an ordered list of levels. Topics built with
/// [`Topic::parse`] are guaranteed to be valid, topics built with
/// [`Topic::new`] are taken as-is.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topic {
    levels: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub enum TopicLevel<'a> {
    Concrete(&'a str),
    SingleLevelWildcard,
    MultiLevelWildcard,
}

fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    // Topics cannot be empty
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }

    // Multi-level wildcards can only be the last level
    let mut levels = topic.split(TOPIC_SEPARATOR).peekable();
    while let Some(level) = levels.next() {
        if level == MULTI_LEVEL_WILDCARD_STR && levels.peek().is_some() {
            return Err(ValidationError::MisplacedMultiLevelWildcard);
        }
    }

    Ok(())
}

impl Topic {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        validate_topic(raw)?;

        Ok(Topic { levels: raw.split(TOPIC_SEPARATOR).map(str::to_string).collect() })
    }

    /// Builds a topic from levels without validating them.
    pub fn new<I, L>(levels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Topic { levels: levels.into_iter().map(Into::into).collect() }
    }

    pub fn is_valid(&self) -> bool {
        validate_topic(&self.to_string()).is_ok()
    }

    pub fn as_levels(&self) -> &[String] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn has_wildcards(&self) -> bool {
        self.levels().any(|level| !matches!(level, TopicLevel::Concrete(_)))
    }

    pub fn levels(&self) -> TopicLevels<'_> {
        TopicLevels { levels_iter: self.levels.iter() }
    }

    /// Returns a new topic made of the levels before `index` followed by a
    /// multi-level wildcard, e.g. `a/b/c` at index 1 becomes `a/#`.
    ///
    /// Returns `None` if `index` is not a level of this topic.
    pub fn with_wildcard_at(&self, index: usize) -> Option<Topic> {
        if index >= self.levels.len() {
            return None;
        }

        let mut levels = self.levels[..index].to_vec();
        levels.push(MULTI_LEVEL_WILDCARD_STR.to_string());

        Some(Topic { levels })
    }

    /// In-place form of [`Topic::with_wildcard_at`]: overwrites the level at
    /// `index` with `#` and drops every level after it.
    ///
    /// Returns `false` and leaves the topic untouched if `index` is out of
    /// range.
    pub fn truncate_at_wildcard(&mut self, index: usize) -> bool {
        match self.levels.get_mut(index) {
            Some(level) => {
                *level = MULTI_LEVEL_WILDCARD_STR.to_string();
                self.levels.truncate(index + 1);
                true
            },
            None => false,
        }
    }
}

impl FromStr for Topic {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Topic::parse(raw)
    }
}

impl From<Vec<String>> for Topic {
    fn from(levels: Vec<String>) -> Self {
        Topic { levels }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut levels = self.levels.iter();

        if let Some(first) = levels.next() {
            f.write_str(first)?;
        }

        for level in levels {
            write!(f, "{}{}", TOPIC_SEPARATOR, level)?;
        }

        Ok(())
    }
}

pub struct TopicLevels<'a> {
    levels_iter: std::slice::Iter<'a, String>,
}

impl<'a> Iterator for TopicLevels<'a> {
    type Item = TopicLevel<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.levels_iter.next().map(String::as_str) {
            Some(MULTI_LEVEL_WILDCARD_STR) => Some(TopicLevel::MultiLevelWildcard),
            Some(SINGLE_LEVEL_WILDCARD_STR) => Some(TopicLevel::SingleLevelWildcard),
            Some(level) => Some(TopicLevel::Concrete(level)),
            None => None,
        }
    }
}

pub fn validate_topic_and_qos(topic: &str, qos: u8) -> Result<QoS, ValidationError> {
    validate_topic(topic)?;
    validate_qos(qos)
}

/// Validates every (topic, QoS) pair of a subscribe request.
///
/// On success returns parallel vectors: `topics[i]` was requested with
/// `qoss[i]`. Their order follows the map's iteration order, which is
/// unspecified. The first invalid pair aborts the whole set.
pub fn validate_subscription_set(
    subscriptions: &HashMap<String, u8>,
) -> Result<(Vec<String>, Vec<QoS>), ValidationError> {
    let mut topics = Vec::with_capacity(subscriptions.len());
    let mut qoss = Vec::with_capacity(subscriptions.len());

    for (topic, qos) in subscriptions {
        let qos = validate_topic_and_qos(topic, *qos)?;
        topics.push(topic.clone());
        qoss.push(qos);
    }

    Ok((topics, qoss))
}

#[cfg(test)]
mod tests {
    use crate::{
        topic::{validate_subscription_set, validate_topic_and_qos, Topic, TopicLevel},
        types::{QoS, ValidationError},
    };
    use std::collections::HashMap;

    #[test]
    fn test_topic_parse_empty_topic() {
        assert_eq!("".parse::<Topic>().unwrap_err(), ValidationError::EmptyTopic);
        assert_eq!(Topic::parse("").unwrap_err(), ValidationError::EmptyTopic);
    }

    #[test]
    fn test_topic_parse_concrete() {
        assert_eq!(Topic::parse("/").unwrap(), Topic::new(vec!["", ""]));
        assert_eq!(Topic::parse("a").unwrap(), Topic::new(vec!["a"]));
        assert_eq!(Topic::parse("home/kitchen").unwrap(), Topic::new(vec!["home", "kitchen"]));
        assert_eq!(
            Topic::parse("Accounts payable").unwrap(),
            Topic::new(vec!["Accounts payable"])
        );
        assert_eq!(Topic::parse("a//b").unwrap(), Topic::new(vec!["a", "", "b"]));
        assert_eq!(Topic::parse("/finance").unwrap(), Topic::new(vec!["", "finance"]));
    }

    #[test]
    fn test_topic_parse_multi_level_wildcard() {
        assert_eq!(Topic::parse("#").unwrap(), Topic::new(vec!["#"]));
        assert_eq!(Topic::parse("/#").unwrap(), Topic::new(vec!["", "#"]));
        assert_eq!(Topic::parse("a/b/#").unwrap(), Topic::new(vec!["a", "b", "#"]));

        assert_eq!(
            Topic::parse("a/#/b").unwrap_err(),
            ValidationError::MisplacedMultiLevelWildcard
        );
        assert_eq!(Topic::parse("#/").unwrap_err(), ValidationError::MisplacedMultiLevelWildcard);
        assert_eq!(
            Topic::parse("sport/#/stats").unwrap_err(),
            ValidationError::MisplacedMultiLevelWildcard
        );
    }

    #[test]
    fn test_topic_parse_accepts_unchecked_patterns() {
        // Only whole-level '#' placement is checked
        assert!(Topic::parse("sport/tennis#").is_ok());
        assert!(Topic::parse("sport/++").is_ok());
        assert!(Topic::parse("a+/b").is_ok());
        assert!(Topic::parse("#a/b").is_ok());
        assert!(Topic::parse("+/+/#").is_ok());
    }

    #[test]
    fn test_topic_round_trip() {
        for raw in &["/", "a", "a/b/#", "//", "+/tennis/#", "$SYS/broker/load", " a / b "] {
            let topic = Topic::parse(raw).unwrap();
            assert_eq!(topic.to_string(), *raw);
            assert_eq!(Topic::parse(&topic.to_string()).unwrap(), topic);
        }
    }

    #[test]
    fn test_topic_is_valid() {
        assert!(Topic::parse("sport/tennis/player1/#").unwrap().is_valid());
        assert!(Topic::new(vec!["a", "+", "#"]).is_valid());
        assert!(!Topic::new(vec!["a", "#", "b"]).is_valid());
        assert!(!Topic::new(Vec::<String>::new()).is_valid());
        assert!(!Topic::new(vec![""]).is_valid());
    }

    #[test]
    fn test_topic_with_wildcard_at() {
        let topic = Topic::new(vec!["a", "b", "c"]);

        assert_eq!(topic.with_wildcard_at(1).unwrap(), Topic::new(vec!["a", "#"]));
        assert_eq!(topic.with_wildcard_at(0).unwrap(), Topic::new(vec!["#"]));
        assert_eq!(topic.with_wildcard_at(2).unwrap(), Topic::new(vec!["a", "b", "#"]));
        assert_eq!(topic.with_wildcard_at(3), None);

        // The source topic is left alone
        assert_eq!(topic, Topic::new(vec!["a", "b", "c"]));
    }

    #[test]
    fn test_topic_truncate_at_wildcard() {
        let mut topic = Topic::new(vec!["a", "b", "c"]);
        assert!(topic.truncate_at_wildcard(1));
        assert_eq!(topic.as_levels(), &["a".to_string(), "#".to_string()]);
        assert_eq!(topic.to_string(), "a/#");

        let mut topic = Topic::new(vec!["a", "b", "c"]);
        assert!(!topic.truncate_at_wildcard(3));
        assert_eq!(topic, Topic::new(vec!["a", "b", "c"]));
    }

    #[test]
    fn test_topic_level_iterator() {
        let topic = Topic::parse("home/+/+/temperature/#").unwrap();
        let mut levels = topic.levels();

        assert_eq!(levels.next(), Some(TopicLevel::Concrete("home")));
        assert_eq!(levels.next(), Some(TopicLevel::SingleLevelWildcard));
        assert_eq!(levels.next(), Some(TopicLevel::SingleLevelWildcard));
        assert_eq!(levels.next(), Some(TopicLevel::Concrete("temperature")));
        assert_eq!(levels.next(), Some(TopicLevel::MultiLevelWildcard));
        assert_eq!(levels.next(), None);

        assert_eq!(topic.level_count(), 5);
        assert!(topic.has_wildcards());
        assert!(!Topic::parse("home/kitchen").unwrap().has_wildcards());
    }

    #[test]
    fn test_topic_level_iterator_empty_levels() {
        let topic = Topic::parse("/").unwrap();
        let mut levels = topic.levels();

        assert_eq!(levels.next(), Some(TopicLevel::Concrete("")));
        assert_eq!(levels.next(), Some(TopicLevel::Concrete("")));
        assert_eq!(levels.next(), None);
    }

    #[test]
    fn test_validate_topic_and_qos() {
        assert_eq!(validate_topic_and_qos("a/b", 1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(validate_topic_and_qos("a/b", 3).unwrap_err(), ValidationError::InvalidQos(3));

        // Topic errors win over QoS errors
        assert_eq!(validate_topic_and_qos("", 7).unwrap_err(), ValidationError::EmptyTopic);
        assert_eq!(
            validate_topic_and_qos("#/a", 7).unwrap_err(),
            ValidationError::MisplacedMultiLevelWildcard
        );
    }

    #[test]
    fn test_validate_subscription_set() {
        let mut subscriptions = HashMap::new();
        subscriptions.insert("a/b".to_string(), 0);
        subscriptions.insert("c/#".to_string(), 1);

        let (topics, qoss) = validate_subscription_set(&subscriptions).unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(qoss.len(), 2);

        let rebuilt: HashMap<String, u8> =
            topics.into_iter().zip(qoss.into_iter().map(u8::from)).collect();
        assert_eq!(rebuilt, subscriptions);
    }

    #[test]
    fn test_validate_subscription_set_invalid() {
        let mut subscriptions = HashMap::new();
        subscriptions.insert("a/#/b".to_string(), 0);
        assert_eq!(
            validate_subscription_set(&subscriptions).unwrap_err(),
            ValidationError::MisplacedMultiLevelWildcard
        );

        let mut subscriptions = HashMap::new();
        subscriptions.insert("a/b".to_string(), 0);
        subscriptions.insert("c/d".to_string(), 9);
        assert_eq!(
            validate_subscription_set(&subscriptions).unwrap_err(),
            ValidationError::InvalidQos(9)
        );
    }

    #[test]
    fn test_validate_subscription_set_empty() {
        let (topics, qoss) = validate_subscription_set(&HashMap::new()).unwrap();
        assert!(topics.is_empty());
        assert!(qoss.is_empty());
    }
}
