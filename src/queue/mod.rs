//! A bounded message queue connecting a parser running on a producer thread with the thread
//! that consumes its events.
//!
//! The producer appends events with [`MessageQueue::emit`], which blocks while the ring is
//! full. Callbacks that need an answer (entity resolution, error reports) use
//! [`MessageQueue::request`]: the producer waits until the ring is drained, enqueues the
//! request and blocks until the consumer calls [`MessageQueue::reply`].
//!
//! Records are reused. The consumer swaps the head record with a spare one, so the strings
//! held by the slots keep their allocations across messages.

mod consumer;
mod producer;

pub(crate) use consumer::{Consumer, dispatch};
pub(crate) use producer::QueueSink;

use std::sync::{
    Arc, Condvar, Mutex,
    atomic::{AtomicBool, Ordering},
};

use log::trace;

use crate::{
    dtd::Dtd,
    error::XMLError,
    sax::{
        AttributeType, ContentSpec, DefaultDecl, LocatorSnapshot, attributes::Attributes,
        error::SAXParseError, source::InputSource,
    },
};

pub(crate) const SLOT_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum MessageKind {
    #[default]
    Empty,
    StartDocument,
    EndDocument,
    Declaration,
    StartElement,
    EndElement,
    Characters,
    IgnorableWhitespace,
    ProcessingInstruction,
    StartPrefixMapping,
    EndPrefixMapping,
    SkippedEntity,
    AttributeDecl,
    ElementDecl,
    ExternalEntityDecl,
    InternalEntityDecl,
    NotationDecl,
    UnparsedEntityDecl,
    Comment,
    StartCdata,
    EndCdata,
    StartDtd,
    EndDtd,
    StartEntity,
    EndEntity,
    // requests
    ResolveEntity,
    GetExternalSubset,
    Warning,
    Error,
    FatalError,
}

/// A reusable string slot.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    text: String,
    present: bool,
}

impl Slot {
    pub(crate) fn set(&mut self, value: &str) {
        self.text.clear();
        self.text.push_str(value);
        self.present = true;
    }

    pub(crate) fn set_opt(&mut self, value: Option<&str>) {
        self.text.clear();
        if let Some(value) = value {
            self.text.push_str(value);
        }
        self.present = value.is_some();
    }

    pub(crate) fn get(&self) -> &str {
        &self.text
    }

    pub(crate) fn get_opt(&self) -> Option<&str> {
        self.present.then_some(self.text.as_str())
    }
}

/// Typed values that do not fit into string slots.
#[derive(Debug, Default)]
pub(crate) enum Payload {
    #[default]
    None,
    Standalone(Option<bool>),
    AttributeDecl(AttributeType, DefaultDecl),
    ContentSpec(ContentSpec),
    Report(SAXParseError),
}

#[derive(Debug, Default)]
pub(crate) struct Message {
    pub(crate) kind: MessageKind,
    pub(crate) slots: [Slot; SLOT_COUNT],
    pub(crate) attributes: Attributes,
    pub(crate) payload: Payload,
    pub(crate) locator: LocatorSnapshot,
}

/// The answer to a request.
#[derive(Debug)]
pub(crate) enum Reply {
    Ack,
    Resolved(Option<InputSource>),
    Failed(XMLError),
}

struct QueueState {
    ring: Vec<Message>,
    head: usize,
    len: usize,
    reply: Option<Reply>,
    outcome: Option<Result<(), XMLError>>,
    /// The DTD built by the producer.
    dtd: Option<Arc<Dtd>>,
}

pub(crate) struct MessageQueue {
    state: Mutex<QueueState>,
    /// The consumer waits for messages or the outcome.
    not_empty: Condvar,
    /// The producer waits for free records or a reply.
    not_full: Condvar,
    closed: AtomicBool,
}

impl MessageQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                ring: (0..capacity).map(|_| Message::default()).collect(),
                head: 0,
                len: 0,
                reply: None,
                outcome: None,
                dtd: None,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark this queue closed and wake up both sides.
    ///
    /// Subsequent `emit` and `request` fail with [`XMLError::QueueClosed`].
    pub(crate) fn close(&self) {
        let _state = self.state.lock().unwrap();
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Append a message filled by `fill`. Blocks while the ring is full.
    pub(crate) fn emit(
        &self,
        kind: MessageKind,
        fill: impl FnOnce(&mut Message),
    ) -> Result<(), XMLError> {
        let mut state = self.state.lock().unwrap();
        while state.len == state.ring.len() && !self.is_closed() {
            state = self.not_full.wait(state).unwrap();
        }
        if self.is_closed() {
            return Err(XMLError::QueueClosed);
        }
        Self::push(&mut state, kind, fill);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Send a request and wait for its reply.
    ///
    /// All messages emitted before are consumed before the request is seen.
    pub(crate) fn request(
        &self,
        kind: MessageKind,
        fill: impl FnOnce(&mut Message),
    ) -> Result<Reply, XMLError> {
        let mut state = self.state.lock().unwrap();
        while state.len > 0 && !self.is_closed() {
            state = self.not_full.wait(state).unwrap();
        }
        if self.is_closed() {
            return Err(XMLError::QueueClosed);
        }
        state.reply = None;
        Self::push(&mut state, kind, fill);
        self.not_empty.notify_one();
        trace!("request {kind:?}");
        loop {
            if let Some(reply) = state.reply.take() {
                break Ok(reply);
            }
            if self.is_closed() {
                break Err(XMLError::QueueClosed);
            }
            state = self.not_full.wait(state).unwrap();
        }
    }

    fn push(state: &mut QueueState, kind: MessageKind, fill: impl FnOnce(&mut Message)) {
        let capacity = state.ring.len();
        let tail = (state.head + state.len) % capacity;
        let record = &mut state.ring[tail];
        record.kind = kind;
        record.payload = Payload::None;
        fill(record);
        state.len += 1;
        trace!("emit {kind:?} (queued: {})", state.len);
    }

    /// Record the terminal outcome of the producer.
    pub(crate) fn finish(&self, result: Result<(), XMLError>) {
        let mut state = self.state.lock().unwrap();
        if state.outcome.is_none() {
            state.outcome = Some(result);
        }
        self.not_empty.notify_all();
    }

    /// Hand the producer's DTD to the consumer. Must be called before `finish`.
    pub(crate) fn set_dtd(&self, dtd: Option<Arc<Dtd>>) {
        self.state.lock().unwrap().dtd = dtd;
    }

    pub(crate) fn dtd(&self) -> Option<Arc<Dtd>> {
        self.state.lock().unwrap().dtd.clone()
    }

    pub(crate) fn reply(&self, reply: Reply) {
        let mut state = self.state.lock().unwrap();
        state.reply = Some(reply);
        self.not_full.notify_all();
    }

    /// Swap the head message into `record`.
    ///
    /// Blocks while the ring is empty. Returns `Some` with the outcome of the producer after
    /// all messages have been consumed.
    pub(crate) fn swap_head(&self, record: &mut Message) -> Option<Result<(), XMLError>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.len > 0 {
                let head = state.head;
                std::mem::swap(record, &mut state.ring[head]);
                state.head = (head + 1) % state.ring.len();
                state.len -= 1;
                self.not_full.notify_all();
                return None;
            }
            if let Some(outcome) = state.outcome.take() {
                // keep the terminal state observable
                state.outcome = Some(outcome.clone());
                return Some(outcome);
            }
            if self.is_closed() {
                return Some(Err(XMLError::QueueClosed));
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn fifo_order_with_small_ring() {
        let queue = Arc::new(MessageQueue::new(2));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    queue
                        .emit(MessageKind::Characters, |m| m.slots[0].set(&i.to_string()))
                        .unwrap();
                }
                queue.finish(Ok(()));
            })
        };
        let mut record = Message::default();
        let mut seen = vec![];
        while queue.swap_head(&mut record).is_none() {
            seen.push(record.slots[0].get().parse::<usize>().unwrap());
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn request_waits_for_reply() {
        let queue = Arc::new(MessageQueue::new(4));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue
                    .emit(MessageKind::StartDocument, |_| {})
                    .unwrap();
                let reply = queue
                    .request(MessageKind::ResolveEntity, |m| m.slots[0].set("e"))
                    .unwrap();
                queue.finish(Ok(()));
                matches!(reply, Reply::Ack)
            })
        };
        let mut record = Message::default();
        assert!(queue.swap_head(&mut record).is_none());
        assert_eq!(record.kind, MessageKind::StartDocument);
        assert!(queue.swap_head(&mut record).is_none());
        assert_eq!(record.kind, MessageKind::ResolveEntity);
        queue.reply(Reply::Ack);
        assert!(matches!(queue.swap_head(&mut record), Some(Ok(()))));
        assert!(producer.join().unwrap());
    }

    #[test]
    fn close_unblocks_full_producer() {
        let queue = Arc::new(MessageQueue::new(1));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                loop {
                    if let Err(err) = queue.emit(MessageKind::Comment, |_| {}) {
                        break err;
                    }
                }
            })
        };
        let mut record = Message::default();
        assert!(queue.swap_head(&mut record).is_none());
        queue.close();
        assert!(matches!(producer.join().unwrap(), XMLError::QueueClosed));
    }

    #[test]
    fn failure_is_the_outcome() {
        let queue = MessageQueue::new(1);
        queue.finish(Err(XMLError::ParserUnexpectedEOF));
        queue.finish(Ok(()));
        let mut record = Message::default();
        assert!(matches!(
            queue.swap_head(&mut record),
            Some(Err(XMLError::ParserUnexpectedEOF))
        ));
    }

    #[test]
    fn slots_keep_optional_values() {
        let mut slot = Slot::default();
        slot.set_opt(None);
        assert_eq!(slot.get_opt(), None);
        slot.set("");
        assert_eq!(slot.get_opt(), Some(""));
    }
}
