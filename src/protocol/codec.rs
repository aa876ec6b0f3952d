//! Incremental frame I/O over non-blocking byte streams
//!
//! A frame may arrive or leave split across any number of short reads or
//! writes. Both directions keep an explicit cursor so a call can return
//! [`ReadOutcome::Pending`] / [`WriteOutcome::Pending`] and resume exactly
//! where it left off on the next readiness notification. No bytes are ever
//! re-parsed and the calling loop never blocks on a single connection.

use std::io;

use bytes::{Bytes, BytesMut};

use crate::protocol::frame::{Frame, FrameHeader, HEADER_SIZE};

/// Non-blocking byte source
///
/// `Ok(0)` means the peer shut down; an error of kind
/// [`io::ErrorKind::WouldBlock`] means no bytes are currently available.
pub trait TryRead {
    /// Read into `buf`, returning the number of bytes read
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Non-blocking byte sink with `WouldBlock` semantics mirroring [`TryRead`]
pub trait TryWrite {
    /// Write from `buf`, returning the number of bytes written
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Outcome of one incremental read call
#[derive(Debug)]
pub enum ReadOutcome {
    /// A full frame was decoded; the reader reset for the next frame
    Complete(Frame),
    /// More bytes are needed; state is preserved for the next call
    Pending,
    /// The peer shut down the connection
    PeerClosed,
}

/// Outcome of one incremental write call
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The frame is fully written
    Complete,
    /// The sink stopped accepting bytes; the cursor marks the resume point
    Pending,
}

/// Cursor-resumable frame decoder
///
/// Reads the 4-byte header first, then exactly `length` payload bytes.
#[derive(Debug, Default)]
pub struct FrameReader {
    header_buf: [u8; HEADER_SIZE],
    header: Option<FrameHeader>,
    payload: BytesMut,
    cursor: usize,
}

impl FrameReader {
    /// Create a reader with no partial frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive decoding forward as far as the source allows
    ///
    /// Invalid header bits surface as [`io::ErrorKind::InvalidData`]; the
    /// caller treats that like any other connection-level I/O error.
    pub fn read_from<R: TryRead>(&mut self, src: &mut R) -> io::Result<ReadOutcome> {
        let header = if let Some(header) = self.header {
            header
        } else {
            while self.cursor < HEADER_SIZE {
                match src.try_read(&mut self.header_buf[self.cursor..]) {
                    Ok(0) => return Ok(ReadOutcome::PeerClosed),
                    Ok(n) => self.cursor += n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(ReadOutcome::Pending)
                    }
                    Err(e) => return Err(e),
                }
            }
            let header = FrameHeader::decode(self.header_buf)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            self.payload.resize(header.len as usize, 0);
            self.header = Some(header);
            header
        };

        let want = header.len as usize;
        loop {
            let filled = self.cursor - HEADER_SIZE;
            if filled >= want {
                break;
            }
            match src.try_read(&mut self.payload[filled..want]) {
                Ok(0) => return Ok(ReadOutcome::PeerClosed),
                Ok(n) => self.cursor += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::Pending)
                }
                Err(e) => return Err(e),
            }
        }

        let payload = self.payload.split().freeze();
        self.header = None;
        self.cursor = 0;
        Ok(ReadOutcome::Complete(Frame { header, payload }))
    }
}

/// Write a frame incrementally, resuming from `cursor`
///
/// `cursor` counts bytes of the encoded frame already written (header
/// included) and persists across `Pending` returns. A sink that accepts zero
/// bytes is treated as not ready, the same as `WouldBlock`.
pub fn write_frame<W: TryWrite>(
    header: FrameHeader,
    payload: &[u8],
    cursor: &mut usize,
    dst: &mut W,
) -> io::Result<WriteOutcome> {
    let encoded_header = header.encode();
    let total = HEADER_SIZE + payload.len();
    while *cursor < total {
        let result = if *cursor < HEADER_SIZE {
            dst.try_write(&encoded_header[*cursor..])
        } else {
            dst.try_write(&payload[*cursor - HEADER_SIZE..])
        };
        match result {
            Ok(0) => return Ok(WriteOutcome::Pending),
            Ok(n) => *cursor += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(WriteOutcome::Pending),
            Err(e) => return Err(e),
        }
    }
    Ok(WriteOutcome::Complete)
}
