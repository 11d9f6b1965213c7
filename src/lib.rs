//! MQTT topic validation plus `std::io` byte streams backed by an
//! external publish/subscribe client.
//!
//! [`TopicReader`] subscribes to topics and exposes the payloads it receives
//! as a [`std::io::Read`] byte stream. [`TopicWriter`] publishes each
//! [`std::io::Write::write`] call as one message. The client itself is
//! reached through the [`Subscriber`] and [`Publisher`] traits.

pub const TOPIC_SEPARATOR: char = '/';

pub const MULTI_LEVEL_WILDCARD_STR: &str = "#";

pub const SINGLE_LEVEL_WILDCARD_STR: &str = "+";

pub mod client;
pub mod reader;
pub mod topic;
pub mod types;
pub mod writer;

pub use client::{ClientError, Message, MessageHandler, Publisher, Subscriber, Token};
pub use reader::{Overflow, ReaderCloser, ReaderOptions, TopicReader};
pub use topic::{
    validate_subscription_set, validate_topic_and_qos, Topic, TopicLevel, TopicLevels,
};
pub use types::{validate_qos, DeliveryError, Error, QoS, ValidationError};
pub use writer::TopicWriter;
