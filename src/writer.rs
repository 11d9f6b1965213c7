use crate::{
    client::{Publisher, Token},
    topic::Topic,
    types::{Error, QoS},
};
use bytes::Bytes;
use log::debug;
use std::io;

/// Publishes every `write` as one message on a fixed topic.
///
/// Each write blocks until the client acknowledges the publish. There is no
/// buffering, so a successful write always consumes the whole buffer.
pub struct TopicWriter<P: Publisher> {
    publisher: P,
    topic: String,
    qos: QoS,
    retained: bool,
}

impl<P: Publisher> TopicWriter<P> {
    pub fn new(publisher: P, qos: QoS, retained: bool, topic: &str) -> Result<Self, Error> {
        Topic::parse(topic)?;

        Ok(Self { publisher, topic: topic.to_string(), qos, retained })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    pub fn retained(&self) -> bool {
        self.retained
    }

    pub fn publish(&self, payload: impl Into<Bytes>) -> Result<(), Error> {
        let payload = payload.into();

        debug!(
            "Publishing {} bytes to {} with {:?} (retained: {})",
            payload.len(),
            self.topic,
            self.qos,
            self.retained
        );

        self.publisher.publish(&self.topic, self.qos, self.retained, payload).result()?;

        Ok(())
    }
}

impl<P: Publisher> io::Write for TopicWriter<P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.publish(Bytes::copy_from_slice(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
