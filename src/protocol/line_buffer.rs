//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Bytes arrive in arbitrary
//! chunks from the transport; complete lines are handed to a [`Protocol`]
//! and removed, the unterminated tail stays buffered for the next push.
//!
//! Unparseable lines are skipped so that noise never blocks the lines
//! that follow it. A tail that grows past the maximum line length without
//! a terminator is discarded for the same reason.
//!
//! # Example
//!
//! ```
//! use alplink::codec::AlpProtocol;
//! use alplink::protocol::{Event, LineBuffer};
//!
//! let mut buffer = LineBuffer::new();
//!
//! let events = buffer.push(b"alp://ared/1/", &AlpProtocol);
//! assert!(events.is_empty());
//!
//! let events = buffer.push(b"42\n", &AlpProtocol);
//! assert_eq!(events, vec![Event::AnalogPinValueChanged { pin: 1, value: 42 }]);
//! ```

use bytes::{Buf, BytesMut};

use super::wire_format::DEFAULT_MAX_LINE_LENGTH;
use super::Event;
use crate::codec::{DecodeResult, Protocol};

/// Buffer for accumulating incoming bytes and extracting decoded events.
pub struct LineBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Longest unterminated tail kept before it is dropped as noise.
    max_line_length: usize,
    /// Lines skipped so far (unparseable or overlong).
    discarded: u64,
}

impl LineBuffer {
    /// Create a new line buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new line buffer with a custom maximum line length.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_line_length,
            discarded: 0,
        }
    }

    /// Push data into the buffer and decode all complete lines.
    ///
    /// Returns events in the order their lines appeared.
    pub fn push(&mut self, data: &[u8], protocol: &dyn Protocol) -> Vec<Event> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();

        loop {
            match protocol.decode(&self.buffer) {
                DecodeResult::Complete(event, consumed) => {
                    self.buffer.advance(consumed);
                    events.push(event);
                }
                DecodeResult::Unparseable(consumed) => {
                    tracing::warn!(
                        "Skipping unparseable line: {:?}",
                        String::from_utf8_lossy(&self.buffer[..consumed]).trim_end()
                    );
                    self.buffer.advance(consumed);
                    self.discarded += 1;
                }
                DecodeResult::Incomplete => {
                    if self.buffer.len() > self.max_line_length {
                        tracing::warn!(
                            "Dropping {} bytes without line terminator",
                            self.buffer.len()
                        );
                        self.buffer.clear();
                        self.discarded += 1;
                    }
                    break;
                }
            }
        }

        events
    }

    /// Number of buffered bytes (an unterminated tail).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of lines skipped since creation.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AlpProtocol;

    fn digital(pin: u32, value: bool) -> Event {
        Event::DigitalPinValueChanged { pin, value }
    }

    #[test]
    fn test_single_complete_line() {
        let mut buffer = LineBuffer::new();
        let events = buffer.push(b"alp://dred/3/1\n", &AlpProtocol);

        assert_eq!(events, vec![digital(3, true)]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_lines_in_one_push() {
        let mut buffer = LineBuffer::new();
        let events = buffer.push(
            b"alp://dred/1/1\nalp://ared/2/200\nalp://dred/3/0\n",
            &AlpProtocol,
        );

        assert_eq!(
            events,
            vec![
                digital(1, true),
                Event::AnalogPinValueChanged { pin: 2, value: 200 },
                digital(3, false),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = LineBuffer::new();
        let mut all = Vec::new();

        for byte in b"alp://ared/5/77\n" {
            all.extend(buffer.push(&[*byte], &AlpProtocol));
        }

        assert_eq!(all, vec![Event::AnalogPinValueChanged { pin: 5, value: 77 }]);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = LineBuffer::new();

        let events = buffer.push(b"alp://dred/1/1\nalp://dr", &AlpProtocol);
        assert_eq!(events, vec![digital(1, true)]);
        assert_eq!(buffer.len(), 8);

        let events = buffer.push(b"ed/2/1\n", &AlpProtocol);
        assert_eq!(events, vec![digital(2, true)]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unparseable_line_is_skipped() {
        let mut buffer = LineBuffer::new();
        let events = buffer.push(
            b"eXTRaoRdINARy dATa\nalp://dred/4/1\nalp://dred/4/1\n",
            &AlpProtocol,
        );

        assert_eq!(events, vec![digital(4, true), digital(4, true)]);
        assert_eq!(buffer.discarded(), 1);
    }

    #[test]
    fn test_overlong_tail_is_dropped() {
        let mut buffer = LineBuffer::with_max_line_length(16);

        let events = buffer.push(&[b'x'; 32], &AlpProtocol);
        assert!(events.is_empty());
        assert!(buffer.is_empty());
        assert_eq!(buffer.discarded(), 1);

        let events = buffer.push(b"alp://dred/0/0\n", &AlpProtocol);
        assert_eq!(events, vec![digital(0, false)]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"alp://", &AlpProtocol);
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
