//! Per-connection state: identity, partial-frame cursors, outbound queue

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

use tokio::io::Interest;
use tokio::net::TcpStream;

use crate::broker::Message;
use crate::protocol::codec::{self, FrameReader, ReadOutcome, TryRead, TryWrite, WriteOutcome};
use crate::protocol::frame::MAX_PAYLOAD;

/// Non-blocking adapter over a tokio stream for the frame codec
struct StreamIo<'a>(&'a TcpStream);

impl TryRead for StreamIo<'_> {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl TryWrite for StreamIo<'_> {
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }
}

/// One queued message plus its write cursor
struct Outbound {
    msg: Rc<Message>,
    cursor: usize,
}

/// Inbound accumulation across commit-delimited frames
///
/// Caps at [`MAX_PAYLOAD`]; overflow bytes are counted, not stored.
#[derive(Debug, Default)]
pub struct InboundBuffer {
    data: Vec<u8>,
    dropped: usize,
}

impl InboundBuffer {
    fn absorb(&mut self, payload: &[u8]) {
        let room_left = MAX_PAYLOAD - self.data.len();
        let take = payload.len().min(room_left);
        self.data.extend_from_slice(&payload[..take]);
        self.dropped += payload.len() - take;
    }

    fn take(&mut self) -> (Vec<u8>, usize) {
        (
            std::mem::take(&mut self.data),
            std::mem::take(&mut self.dropped),
        )
    }
}

/// Result of draining the outbound queue once
#[derive(Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// Nothing left to write
    Idle,
    /// The socket stopped accepting bytes mid-message
    Pending,
    /// A message carrying the FIN flag went out in full; close now
    FinSent,
}

/// A connected client
///
/// Identity starts out empty; `login` binds a roommate name and `join` a
/// room name. Both survive only as long as the connection itself.
pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    roommate: Option<String>,
    room: Option<String>,
    reader: FrameReader,
    inbound: InboundBuffer,
    outbound: VecDeque<Outbound>,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            roommate: None,
            room: None,
            reader: FrameReader::new(),
            inbound: InboundBuffer::default(),
            outbound: VecDeque::new(),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Readiness to wait for: writable only while the queue is non-empty
    pub fn interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    pub fn roommate(&self) -> Option<&str> {
        self.roommate.as_deref()
    }

    pub fn set_roommate(&mut self, name: Option<String>) {
        self.roommate = name;
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn set_room(&mut self, name: Option<String>) {
        self.room = name;
    }

    /// Advance inbound decoding as far as the socket allows
    pub fn read_step(&mut self) -> io::Result<ReadOutcome> {
        let Self { stream, reader, .. } = self;
        reader.read_from(&mut StreamIo(stream))
    }

    /// Absorb one frame's payload into the partial inbound message
    pub fn accumulate(&mut self, payload: &[u8]) {
        self.inbound.absorb(payload);
    }

    /// Take the accumulated message, returning `(payload, dropped_bytes)`
    pub fn take_inbound(&mut self) -> (Vec<u8>, usize) {
        self.inbound.take()
    }

    /// Queue a committed message for delivery
    pub fn enqueue(&mut self, msg: Rc<Message>) {
        self.outbound.push_back(Outbound { msg, cursor: 0 });
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Write queued messages until the socket pushes back or the queue drains
    pub fn write_step(&mut self) -> io::Result<WriteStatus> {
        while let Some(front) = self.outbound.front_mut() {
            let outcome = codec::write_frame(
                front.msg.header(),
                front.msg.payload(),
                &mut front.cursor,
                &mut StreamIo(&self.stream),
            )?;
            match outcome {
                WriteOutcome::Pending => return Ok(WriteStatus::Pending),
                WriteOutcome::Complete => {
                    let fin = front.msg.ops().is_fin();
                    self.outbound.pop_front();
                    if fin {
                        return Ok(WriteStatus::FinSent);
                    }
                }
            }
        }
        Ok(WriteStatus::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_buffer_caps_at_max_payload() {
        let mut buf = InboundBuffer::default();
        buf.absorb(&vec![0u8; MAX_PAYLOAD - 2]);
        buf.absorb(&[1, 2, 3, 4]);
        let (data, dropped) = buf.take();
        assert_eq!(data.len(), MAX_PAYLOAD);
        assert_eq!(dropped, 2);
        assert_eq!(&data[MAX_PAYLOAD - 2..], &[1, 2]);
    }

    #[test]
    fn test_inbound_buffer_take_resets() {
        let mut buf = InboundBuffer::default();
        buf.absorb(b"hello");
        let (data, dropped) = buf.take();
        assert_eq!(data, b"hello");
        assert_eq!(dropped, 0);
        let (data, _) = buf.take();
        assert!(data.is_empty());
    }
}
