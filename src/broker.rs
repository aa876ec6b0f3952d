//! Message broker: incremental message construction and local delivery
//!
//! Messages are built across any number of `append` calls and become
//! immutable on commit. Committed messages addressed to connections are
//! handed out as `Rc<Message>` so one broadcast can sit on many outbound
//! queues; messages of a local kind, or committed with no addressee, are
//! linked into the local delivery queue instead and reach the operator
//! through [`MessageBroker::drain_local`].

use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::error::{CastError, Result};
use crate::protocol::frame::{BroadcastWidth, FrameHeader, MessageKind, Ops, MAX_PAYLOAD};

/// A protocol message: payload buffer plus packed kind/width/flags
///
/// Mutable while uncommitted; committing sets the commit flag in `ops` and
/// freezes the payload.
#[derive(Debug)]
pub struct Message {
    ops: Ops,
    data: Vec<u8>,
    committed: bool,
}

impl Message {
    fn new(ops: Ops) -> Self {
        Self {
            ops,
            data: Vec::new(),
            committed: false,
        }
    }

    /// Append payload bytes, saturating at [`MAX_PAYLOAD`]
    ///
    /// Returns the number of bytes actually absorbed, which is less than
    /// `bytes.len()` when the frame limit truncates the chunk.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.committed {
            return Err(CastError::AlreadyCommitted);
        }
        let room = MAX_PAYLOAD - self.data.len();
        let take = bytes.len().min(room);
        self.data
            .try_reserve(take)
            .map_err(|e| CastError::allocation(e.to_string()))?;
        self.data.extend_from_slice(&bytes[..take]);
        Ok(take)
    }

    fn commit(&mut self) {
        self.ops = self.ops.with_commit();
        self.committed = true;
    }

    /// Packed kind/width/flags
    pub fn ops(&self) -> Ops {
        self.ops
    }

    /// Message kind sub-field
    pub fn kind(&self) -> MessageKind {
        self.ops.kind()
    }

    /// Whether the message was finalized
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Wire header for this message
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            ops: self.ops,
            len: self.data.len() as u16,
        }
    }
}

/// Owns the in-construction message and the local diagnostic queue
#[derive(Debug, Default)]
pub struct MessageBroker {
    /// Uncommitted pool tail, if any
    tail: Option<Message>,
    /// Committed local messages awaiting the diagnostic drain, FIFO
    local: VecDeque<Rc<Message>>,
}

impl MessageBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin-or-continue: append a chunk to the uncommitted tail message,
    /// allocating a new tail if none is in construction
    ///
    /// The tail adopts the most recent `ops`. Truncation at the frame limit
    /// surfaces as [`CastError::Truncated`] after absorbing what fits; an
    /// allocation failure discards the half-built tail.
    pub fn append(&mut self, ops: Ops, chunk: &[u8]) -> Result<()> {
        let msg = self.tail.get_or_insert_with(|| Message::new(ops));
        msg.ops = ops;
        match msg.append(chunk) {
            Ok(absorbed) if absorbed < chunk.len() => Err(CastError::Truncated {
                dropped: chunk.len() - absorbed,
            }),
            Ok(_) => Ok(()),
            Err(err @ CastError::Allocation(_)) => {
                self.tail = None;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Formatted-text convenience over [`MessageBroker::append`]
    pub fn append_fmt(&mut self, ops: Ops, args: std::fmt::Arguments<'_>) -> Result<()> {
        self.append(ops, args.to_string().as_bytes())
    }

    /// Commit the tail message
    ///
    /// Local kinds, and messages committed with no addressee, are linked into
    /// the local delivery queue and `None` is returned; otherwise the
    /// committed message is returned for enqueueing onto connection outbound
    /// queues. With no tail in construction this is a no-op.
    pub fn commit(&mut self, has_addressee: bool) -> Option<Rc<Message>> {
        let mut msg = self.tail.take()?;
        msg.commit();
        let msg = Rc::new(msg);
        if msg.kind().is_local() || !has_addressee {
            self.local.push_back(msg);
            None
        } else {
            Some(msg)
        }
    }

    /// Append one chunk and commit in one step
    pub fn post(&mut self, ops: Ops, text: &str, has_addressee: bool) -> Result<Option<Rc<Message>>> {
        self.append(ops, text.as_bytes())?;
        Ok(self.commit(has_addressee))
    }

    /// Queue a local informational message
    pub fn log_info(&mut self, text: impl AsRef<str>) {
        let ops = Ops::new(MessageKind::LocalInfo, BroadcastWidth::Active);
        // A truncated diagnostic still carries its prefix; commit what fits.
        if self.append(ops, text.as_ref().as_bytes()).is_ok() || self.tail.is_some() {
            self.commit(false);
        }
    }

    /// Queue a local error message
    pub fn log_error(&mut self, text: impl AsRef<str>) {
        let ops = Ops::new(MessageKind::LocalError, BroadcastWidth::Active);
        if self.append(ops, text.as_ref().as_bytes()).is_ok() || self.tail.is_some() {
            self.commit(false);
        }
    }

    /// Queue a local error message with the originating system error rendered
    /// as an ` (errno N: description)` suffix
    pub fn log_io_error(&mut self, text: impl AsRef<str>, err: &io::Error) {
        match err.raw_os_error() {
            Some(code) => self.log_error(format!("{} (errno {}: {})", text.as_ref(), code, err)),
            None => self.log_error(format!("{} ({})", text.as_ref(), err)),
        }
    }

    /// One-shot FIFO drain of committed local messages
    ///
    /// Lazy and destructive: each message is freed as it is consumed, and the
    /// sequence is not restartable.
    pub fn drain_local(&mut self) -> impl Iterator<Item = Rc<Message>> + '_ {
        self.local.drain(..)
    }

    /// Whether local messages are waiting to be drained
    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chat_ops() -> Ops {
        Ops::new(MessageKind::Chat, BroadcastWidth::Mates)
    }

    fn info_ops() -> Ops {
        Ops::new(MessageKind::ServerInfo, BroadcastWidth::Active)
    }

    #[test]
    fn test_append_chunks_concatenate() {
        let mut broker = MessageBroker::new();
        broker.append(chat_ops(), b"Hello").unwrap();
        broker.append(chat_ops(), b", ").unwrap();
        broker.append(chat_ops(), b"World!").unwrap();
        let msg = broker.commit(true).unwrap();
        assert_eq!(msg.payload(), b"Hello, World!");
        assert!(msg.is_committed());
        assert!(msg.ops().is_commit());
    }

    #[test]
    fn test_commit_starts_a_fresh_tail() {
        let mut broker = MessageBroker::new();
        broker.append(chat_ops(), b"first").unwrap();
        let first = broker.commit(true).unwrap();
        broker.append(chat_ops(), b"second").unwrap();
        let second = broker.commit(true).unwrap();
        assert_eq!(first.payload(), b"first");
        assert_eq!(second.payload(), b"second");
    }

    #[test]
    fn test_commit_without_tail_is_noop() {
        let mut broker = MessageBroker::new();
        assert!(broker.commit(true).is_none());
        assert!(!broker.has_local());
    }

    #[test]
    fn test_append_to_committed_message_fails() {
        let mut msg = Message::new(chat_ops());
        msg.append(b"data").unwrap();
        msg.commit();
        assert!(matches!(
            msg.append(b"more"),
            Err(CastError::AlreadyCommitted)
        ));
    }

    #[test]
    fn test_truncation_is_reported_not_silent() {
        let mut broker = MessageBroker::new();
        let oversized = vec![0x41u8; MAX_PAYLOAD + 4465];
        match broker.append(chat_ops(), &oversized) {
            Err(CastError::Truncated { dropped }) => assert_eq!(dropped, 4465),
            other => panic!("expected Truncated, got {:?}", other),
        }
        // The absorbed prefix is intact and the length saturates at the cap.
        let msg = broker.commit(true).unwrap();
        assert_eq!(msg.payload().len(), MAX_PAYLOAD);
        assert_eq!(msg.header().len as usize, MAX_PAYLOAD);
    }

    #[test]
    fn test_local_kind_goes_to_local_queue() {
        let mut broker = MessageBroker::new();
        broker.log_info("listener started");
        broker.log_error("accept failed");
        let drained: Vec<_> = broker.drain_local().collect();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind(), MessageKind::LocalInfo);
        assert_eq!(drained[0].payload(), b"listener started");
        assert_eq!(drained[1].kind(), MessageKind::LocalError);
        // Destructive drain: a second pass yields nothing.
        assert_eq!(broker.drain_local().count(), 0);
    }

    #[test]
    fn test_no_addressee_falls_back_to_local_queue() {
        let mut broker = MessageBroker::new();
        let handed = broker.post(info_ops(), "nobody is listening", false).unwrap();
        assert!(handed.is_none());
        let drained: Vec<_> = broker.drain_local().collect();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].payload(), b"nobody is listening");
    }

    #[test]
    fn test_addressed_message_skips_local_queue() {
        let mut broker = MessageBroker::new();
        let handed = broker.post(info_ops(), "welcome", true).unwrap();
        assert!(handed.is_some());
        assert!(!broker.has_local());
    }

    #[test]
    fn test_log_io_error_renders_errno() {
        let mut broker = MessageBroker::new();
        let err = io::Error::from_raw_os_error(13);
        broker.log_io_error("write to client failed", &err);
        let drained: Vec<_> = broker.drain_local().collect();
        assert_eq!(drained.len(), 1);
        let text = String::from_utf8_lossy(drained[0].payload()).into_owned();
        assert!(text.starts_with("write to client failed (errno 13:"), "{}", text);
    }

    #[test]
    fn test_tail_adopts_latest_ops() {
        let mut broker = MessageBroker::new();
        broker.append(info_ops(), b"status: ").unwrap();
        let fin = info_ops().with_fin();
        broker.append(fin, b"bye").unwrap();
        let msg = broker.commit(true).unwrap();
        assert!(msg.ops().is_fin());
        assert_eq!(msg.payload(), b"status: bye");
    }

    proptest! {
        /// Committed payload equals the concatenation of all appended chunks,
        /// capped at the frame limit.
        #[test]
        fn prop_commit_equals_chunk_concatenation(
            chunks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..512),
                1..16,
            ),
        ) {
            let mut broker = MessageBroker::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                let _ = broker.append(chat_ops(), chunk);
                expected.extend_from_slice(chunk);
            }
            expected.truncate(MAX_PAYLOAD);
            let msg = broker.commit(true).unwrap();
            prop_assert_eq!(msg.payload(), &expected[..]);
        }
    }
}
