/*!
Message framing over the connection's read buffer.

A frame is `mtype:u8 | len:u32 | payload[len-4]`; the length covers itself
but not the tag byte. The framer reports exactly how many bytes it is
missing so the read loop never over-requests, and it refuses oversized
frames before any buffer of that size is reserved.
*/

use bytes::{Bytes, BytesMut};

use edgedb_errors::{Error, ErrorKind, ProtocolError};

/// Frames larger than this are rejected as malformed. A single socket read
/// never requests more than this either.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const HEADER_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// At least this many more bytes must be read.
    NeedsRead(usize),
    /// A full frame of this total size sits at the front of the buffer.
    Ready(usize),
}

#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    pub fn new() -> Framer {
        Framer::default()
    }

    /// The buffer the socket reads append into.
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn poll_frame(&self) -> Result<FrameStatus, Error> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(FrameStatus::NeedsRead(HEADER_SIZE - self.buf.len()));
        }
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if len < 4 {
            return Err(ProtocolError::with_message(format!(
                "frame length {len} is shorter than its own prefix"
            )));
        }
        let frame_size = 1 + len;
        if frame_size > MAX_FRAME_SIZE {
            return Err(ProtocolError::with_message(format!(
                "frame of {frame_size} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
            )));
        }
        if self.buf.len() < frame_size {
            return Ok(FrameStatus::NeedsRead(frame_size - self.buf.len()));
        }
        Ok(FrameStatus::Ready(frame_size))
    }

    /// Detaches the frame most recently reported [FrameStatus::Ready].
    pub fn take_frame(&mut self, size: usize) -> Bytes {
        debug_assert!(self.buf.len() >= size);
        self.buf.split_to(size).freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_of(stream: &[u8], chunk: usize) -> Vec<Bytes> {
        let mut framer = Framer::new();
        let mut frames = Vec::new();
        let mut rest = stream;
        loop {
            match framer.poll_frame().unwrap() {
                FrameStatus::Ready(size) => frames.push(framer.take_frame(size)),
                FrameStatus::NeedsRead(_) if rest.is_empty() => return frames,
                FrameStatus::NeedsRead(_) => {
                    let take = chunk.min(rest.len());
                    framer.buf_mut().extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                }
            }
        }
    }

    #[test]
    fn splits_consecutive_frames() {
        let stream = b"Z\0\0\0\x07\0\0IS\0\0\0\x04";
        let frames = frames_of(stream, stream.len());
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"Z\0\0\0\x07\0\0I");
        assert_eq!(&frames[1][..], b"S\0\0\0\x04");
    }

    #[test]
    fn byte_at_a_time_matches_whole_stream() {
        let stream = b"Z\0\0\0\x07\0\0IS\0\0\0\x04K\0\0\0\x08abcd";
        assert_eq!(frames_of(stream, 1), frames_of(stream, stream.len()));
    }

    #[test]
    fn reports_exact_deficit() {
        let mut framer = Framer::new();
        assert_eq!(framer.poll_frame().unwrap(), FrameStatus::NeedsRead(5));
        framer.buf_mut().extend_from_slice(b"Z\0\0");
        assert_eq!(framer.poll_frame().unwrap(), FrameStatus::NeedsRead(2));
        framer.buf_mut().extend_from_slice(b"\0\x07\0");
        assert_eq!(framer.poll_frame().unwrap(), FrameStatus::NeedsRead(2));
        framer.buf_mut().extend_from_slice(b"\0I");
        assert_eq!(framer.poll_frame().unwrap(), FrameStatus::Ready(8));
    }

    #[test]
    fn oversized_frame_is_rejected_without_allocation() {
        let mut framer = Framer::new();
        framer
            .buf_mut()
            .extend_from_slice(b"D\xff\xff\xff\xff");
        let err = framer.poll_frame().unwrap_err();
        assert!(err.is::<edgedb_errors::ProtocolError>());
        // only the header was ever buffered
        assert!(framer.buf_mut().capacity() < 1024);
    }

    #[test]
    fn undersized_length_is_rejected() {
        let mut framer = Framer::new();
        framer.buf_mut().extend_from_slice(b"D\0\0\0\x03");
        assert!(framer.poll_frame().is_err());
    }
}
