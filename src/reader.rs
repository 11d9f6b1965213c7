use crate::{
    client::{Message, MessageHandler, Subscriber, Token},
    topic::{validate_subscription_set, Topic},
    types::{DeliveryError, Error, QoS},
};
use bytes::Bytes;
use futures::{
    executor::block_on,
    future::{select, Either},
    pin_mut,
};
use log::{debug, trace, warn};
use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::{
    mpsc::{
        self,
        error::{TryRecvError, TrySendError},
        Receiver, Sender, WeakSender,
    },
    Semaphore,
};

const DEFAULT_PIPE_CAPACITY: usize = 64;

/// What the message handler does when the reader has fallen `capacity`
/// messages behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    /// Block the client's delivery thread until the reader catches up. The
    /// client must not run handlers on an async runtime thread.
    Block,
    /// Drop the message and fail the stream. The next read returns the error.
    Fail,
}

#[derive(Clone, Debug)]
pub struct ReaderOptions {
    capacity: usize,
    overflow: Overflow,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { capacity: DEFAULT_PIPE_CAPACITY, overflow: Overflow::Block }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of undelivered messages the pipe holds, clamped to
    /// `1..=Semaphore::MAX_PERMITS`.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = overflow;
        self
    }
}

#[derive(Debug)]
struct PipeState {
    closed: AtomicBool,
    failure: Mutex<Option<DeliveryError>>,
    // Never holds permits. Closing it releases handlers blocked on a full pipe.
    release: Semaphore,
}

impl PipeState {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            failure: Mutex::new(None),
            release: Semaphore::new(0),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns true for the caller that actually closed the pipe.
    fn begin_close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.release.close();
        first
    }

    fn failure(&self) -> Option<DeliveryError> {
        *self.failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fail(&self, err: DeliveryError) {
        let mut failure = self.failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        failure.get_or_insert(err);
    }
}

fn payload_handler(
    tx: Sender<Bytes>,
    state: Arc<PipeState>,
    options: &ReaderOptions,
) -> MessageHandler {
    let overflow = options.overflow;
    let capacity = options.capacity;

    Arc::new(move |msg: &Message| {
        if state.is_closed() || state.failure().is_some() {
            debug!("Dropping message on {}, stream is no longer readable", msg.topic);
            return;
        }

        trace!("Delivering {} bytes from {}", msg.payload.len(), msg.topic);

        let sent = match overflow {
            Overflow::Block => {
                let send = tx.send(msg.payload.clone());
                let released = state.release.acquire();
                pin_mut!(send, released);

                match block_on(select(send, released)) {
                    Either::Left((sent, _)) => sent.map_err(|_| None),
                    Either::Right(_) => Err(None),
                }
            },
            Overflow::Fail => tx.try_send(msg.payload.clone()).map_err(|err| match err {
                TrySendError::Full(_) => Some(DeliveryError::PipeFull { capacity }),
                TrySendError::Closed(_) => None,
            }),
        };

        match sent {
            Ok(()) => {},
            Err(Some(err)) => {
                warn!("Failed to deliver message on {}: {}", msg.topic, err);
                state.fail(err);

                // Wakes a reader that drained the pipe before the failure was recorded
                let _ = tx.try_send(Bytes::new());
            },
            Err(None) => debug!("Reader is gone, dropping message on {}", msg.topic),
        }
    })
}

fn unsubscribe<S: Subscriber>(subscriber: &S, topics: &[String]) -> Result<(), Error> {
    if topics.is_empty() {
        return Ok(());
    }

    let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
    debug!("Unsubscribing from {:?}", topics);
    subscriber.unsubscribe(&topics).result()?;

    Ok(())
}

/// A byte stream made of the payloads received on a set of subscriptions.
///
/// Payloads are concatenated in delivery order with no framing. Reads block
/// until a payload arrives or the stream is closed, so `read` must not be
/// called from inside an async runtime. With the `stream` feature the reader
/// is also a [`futures::Stream`] of whole payloads.
pub struct TopicReader<S: Subscriber> {
    subscriber: S,
    topics: Arc<Vec<String>>,
    rx: Receiver<Bytes>,
    wake: WeakSender<Bytes>,
    pending: Bytes,
    state: Arc<PipeState>,
    terminated: bool,
}

impl<S: Subscriber> TopicReader<S> {
    /// Subscribes to every topic with the same QoS.
    pub fn new(subscriber: S, qos: QoS, topics: &[&str]) -> Result<Self, Error> {
        Self::with_options(subscriber, qos, topics, ReaderOptions::default())
    }

    pub fn with_options(
        subscriber: S,
        qos: QoS,
        topics: &[&str],
        options: ReaderOptions,
    ) -> Result<Self, Error> {
        let subscriptions = topics
            .iter()
            .map(|topic| Topic::parse(topic).map(|_| (topic.to_string(), qos)))
            .collect::<Result<Vec<_>, _>>()?;

        Self::subscribe_all(subscriber, subscriptions, options)
    }

    /// Subscribes to each topic of a subscription set with its own QoS.
    pub fn from_subscriptions(
        subscriber: S,
        subscriptions: &HashMap<String, u8>,
        options: ReaderOptions,
    ) -> Result<Self, Error> {
        let (topics, qoss) = validate_subscription_set(subscriptions)?;

        Self::subscribe_all(subscriber, topics.into_iter().zip(qoss).collect(), options)
    }

    fn subscribe_all(
        subscriber: S,
        subscriptions: Vec<(String, QoS)>,
        options: ReaderOptions,
    ) -> Result<Self, Error> {
        let (tx, rx) = mpsc::channel(options.capacity);
        let wake = tx.downgrade();
        let state = Arc::new(PipeState::new());
        let handler = payload_handler(tx, state.clone(), &options);

        let mut subscribed = Vec::with_capacity(subscriptions.len());

        for (topic, qos) in subscriptions {
            debug!("Subscribing to {} with {:?}", topic, qos);

            if let Err(err) = subscriber.subscribe(&topic, qos, handler.clone()).result() {
                warn!(
                    "Subscribing to {} failed, rolling back {} subscription(s)",
                    topic,
                    subscribed.len()
                );

                if let Err(rollback_err) = unsubscribe(&subscriber, &subscribed) {
                    warn!("Rollback unsubscribe failed - {}", rollback_err);
                }

                return Err(Error::Client(err));
            }

            subscribed.push(topic);
        }

        Ok(TopicReader {
            subscriber,
            topics: Arc::new(subscribed),
            rx,
            wake,
            pending: Bytes::new(),
            state,
            terminated: false,
        })
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// A handle that closes this reader from another thread, waking a
    /// blocked `read`.
    pub fn closer(&self) -> ReaderCloser<S>
    where
        S: Clone,
    {
        ReaderCloser {
            subscriber: self.subscriber.clone(),
            topics: self.topics.clone(),
            state: self.state.clone(),
            wake: self.wake.clone(),
        }
    }

    /// Signals end-of-stream and unsubscribes from all topics. Closing an
    /// already closed reader does nothing.
    pub fn close(&mut self) -> Result<(), Error> {
        if !self.state.begin_close() {
            return Ok(());
        }

        // Releases a handler blocked on a full pipe before unsubscribing
        self.rx.close();
        unsubscribe(&self.subscriber, &self.topics)
    }

    /// Moves the next non-empty payload into `pending` without blocking. A
    /// recorded delivery failure is only returned once everything the pipe
    /// accepted before it has been read.
    fn fill_pending(&mut self) -> Result<Pipe, Error> {
        if self.state.is_closed() {
            self.rx.close();
            return Ok(Pipe::Ended);
        }

        while self.pending.is_empty() {
            let drained = match self.rx.try_recv() {
                Ok(payload) => {
                    self.pending = payload;
                    continue;
                },
                Err(TryRecvError::Empty) => Pipe::Empty,
                Err(TryRecvError::Disconnected) => Pipe::Ended,
            };

            return match self.state.failure() {
                Some(err) => Err(err.into()),
                None => Ok(drained),
            };
        }

        Ok(Pipe::Ready)
    }
}

enum Pipe {
    /// `pending` holds bytes.
    Ready,
    Empty,
    Ended,
}

impl<S: Subscriber> io::Read for TopicReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.fill_pending()? {
                Pipe::Ready => {
                    let n = buf.len().min(self.pending.len());
                    buf[..n].copy_from_slice(&self.pending.split_to(n));
                    return Ok(n);
                },
                Pipe::Ended => return Ok(0),
                Pipe::Empty => match self.rx.blocking_recv() {
                    Some(payload) => self.pending = payload,
                    None => return Ok(0),
                },
            }
        }
    }
}

#[cfg(feature = "stream")]
impl<S: Subscriber + Unpin> futures::Stream for TopicReader<S> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        let this = self.get_mut();

        loop {
            if this.terminated {
                return Poll::Ready(None);
            }

            match this.fill_pending() {
                Ok(Pipe::Ready) => {
                    let payload = std::mem::take(&mut this.pending);
                    return Poll::Ready(Some(Ok(payload)));
                },
                Ok(Pipe::Ended) => {
                    this.terminated = true;
                    return Poll::Ready(None);
                },
                Err(err) => {
                    this.terminated = true;
                    return Poll::Ready(Some(Err(err.into())));
                },
                Ok(Pipe::Empty) => match this.rx.poll_recv(cx) {
                    Poll::Ready(Some(payload)) => this.pending = payload,
                    Poll::Ready(None) => {
                        this.terminated = true;
                        return Poll::Ready(None);
                    },
                    Poll::Pending => return Poll::Pending,
                },
            }
        }
    }
}

impl<S: Subscriber> Drop for TopicReader<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Failed to unsubscribe from {:?} while dropping reader - {}", self.topics, err);
        }
    }
}

/// Closes a [`TopicReader`] from outside the thread reading it.
pub struct ReaderCloser<S: Subscriber> {
    subscriber: S,
    topics: Arc<Vec<String>>,
    state: Arc<PipeState>,
    wake: WeakSender<Bytes>,
}

impl<S: Subscriber> ReaderCloser<S> {
    pub fn close(&self) -> Result<(), Error> {
        if !self.state.begin_close() {
            return Ok(());
        }

        // An empty payload wakes a reader parked in `read`, which then sees
        // the closed flag. A full pipe means nobody is parked, and handlers
        // blocked on it were already released by `begin_close`.
        if let Some(tx) = self.wake.upgrade() {
            let _ = tx.try_send(Bytes::new());
        }

        unsubscribe(&self.subscriber, &self.topics)
    }
}
