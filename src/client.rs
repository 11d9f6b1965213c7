//! The publish/subscribe capability the streams are built on.
//!
//! Nothing in this crate speaks the MQTT wire protocol. A real client is
//! wrapped in a type implementing [`Subscriber`] and/or [`Publisher`], and
//! each operation hands back a [`Token`] the streams block on.

use crate::types::QoS;
use bytes::Bytes;
use std::sync::Arc;

/// Failure reported by the underlying client, passed through untouched.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Called by the client for every message received on a subscription.
/// It may be invoked from any thread the client owns.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retained: bool,
}

/// Handle to an in-flight client operation.
pub trait Token {
    /// Blocks until the operation has completed.
    fn wait(&self);

    /// The reason the operation failed, if it did. Only meaningful once
    /// [`Token::wait`] has returned.
    fn error(&self) -> Option<ClientError>;

    fn result(&self) -> Result<(), ClientError> {
        self.wait();

        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub trait Subscriber {
    type Token: Token;

    fn subscribe(&self, topic: &str, qos: QoS, handler: MessageHandler) -> Self::Token;

    fn unsubscribe(&self, topics: &[&str]) -> Self::Token;
}

pub trait Publisher {
    type Token: Token;

    fn publish(&self, topic: &str, qos: QoS, retained: bool, payload: Bytes) -> Self::Token;
}

impl<S: Subscriber + ?Sized> Subscriber for Arc<S> {
    type Token = S::Token;

    fn subscribe(&self, topic: &str, qos: QoS, handler: MessageHandler) -> Self::Token {
        (**self).subscribe(topic, qos, handler)
    }

    fn unsubscribe(&self, topics: &[&str]) -> Self::Token {
        (**self).unsubscribe(topics)
    }
}

impl<S: Subscriber + ?Sized> Subscriber for &S {
    type Token = S::Token;

    fn subscribe(&self, topic: &str, qos: QoS, handler: MessageHandler) -> Self::Token {
        (**self).subscribe(topic, qos, handler)
    }

    fn unsubscribe(&self, topics: &[&str]) -> Self::Token {
        (**self).unsubscribe(topics)
    }
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    type Token = P::Token;

    fn publish(&self, topic: &str, qos: QoS, retained: bool, payload: Bytes) -> Self::Token {
        (**self).publish(topic, qos, retained, payload)
    }
}

impl<P: Publisher + ?Sized> Publisher for &P {
    type Token = P::Token;

    fn publish(&self, topic: &str, qos: QoS, retained: bool, payload: Bytes) -> Self::Token {
        (**self).publish(topic, qos, retained, payload)
    }
}
