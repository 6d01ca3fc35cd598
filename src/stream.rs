//! Outbound byte stream over the peripheral link
//!
//! Application bytes queue up here and drain opportunistically, one chunk
//! per radio tick (or activity trigger), sized to the link's MTU. If the
//! peer is not ready to receive - the stack reports "invalid state", which
//! means notifications are not enabled on the other side - the chunk and
//! everything queued behind it are dropped rather than retried forever.
//! Any other rejection keeps the chunk for the next tick.

use crate::constants::{STREAM_CHUNK_MAX, STREAM_PENDING_CAPACITY};
use crate::radio::RadioStack;
use bt_hci::param::ConnHandle;
use heapless::{Deque, Vec};

/// What one transmit attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Nothing queued, nothing sent
    Idle,
    /// One chunk was handed to the radio
    Sent,
    /// The peer is not receiving; the stream was flushed
    Dropped,
    /// The stack refused transiently; the chunk is kept for the next tick
    Deferred,
}

/// Bounded outbound stream buffer
#[derive(Debug, Default)]
pub struct TxStream {
    pending: Deque<u8, STREAM_PENDING_CAPACITY>,
    chunk: Vec<u8, STREAM_CHUNK_MAX>,
}

impl TxStream {
    /// Create an empty stream
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Deque::new(),
            chunk: Vec::new(),
        }
    }

    /// Queue bytes for transmission, returning how many were accepted
    pub fn write(&mut self, data: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in data {
            if self.pending.push_back(byte).is_err() {
                break;
            }
            accepted += 1;
        }
        accepted
    }

    /// Bytes waiting to go out (queued plus in-flight chunk)
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + self.chunk.len()
    }

    /// Is there nothing to send?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.chunk.is_empty()
    }

    /// Drop everything, queued and in-flight
    pub fn clear(&mut self) {
        self.pending.clear();
        self.chunk.clear();
    }

    /// Try to push one chunk out over `conn`.
    ///
    /// `mtu` bounds the chunk: at most `mtu - 3` bytes (the ATT notification
    /// overhead) and never more than [`STREAM_CHUNK_MAX`].
    pub fn transmit<R: RadioStack>(&mut self, radio: &mut R, conn: u16, mtu: u16) -> TxOutcome {
        if self.chunk.is_empty() {
            let max_len = STREAM_CHUNK_MAX.min(mtu.saturating_sub(3) as usize);
            while self.chunk.len() < max_len {
                match self.pending.pop_front() {
                    Some(byte) => self.chunk.push(byte).ok(),
                    None => break,
                };
            }
        }
        if self.chunk.is_empty() {
            return TxOutcome::Idle;
        }

        match radio.send_stream_data(ConnHandle::new(conn), &self.chunk) {
            Ok(()) => {
                self.chunk.clear();
                TxOutcome::Sent
            }
            Err(error) if error.is_invalid_state() => {
                // Peer is connected but not reading; keeping the data would
                // retry it forever
                self.clear();
                TxOutcome::Dropped
            }
            Err(_) => TxOutcome::Deferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{Call, MockRadio};
    use crate::radio::status;

    #[test]
    fn test_idle_stream_sends_nothing() {
        let mut radio = MockRadio::new();
        let mut stream = TxStream::new();
        assert_eq!(stream.transmit(&mut radio, 0x10, 23), TxOutcome::Idle);
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn test_chunking_respects_mtu() {
        let mut radio = MockRadio::new();
        let mut stream = TxStream::new();
        assert_eq!(stream.write(&[0xAB; 30]), 30);

        assert_eq!(stream.transmit(&mut radio, 0x10, 23), TxOutcome::Sent);
        // 23 - 3 = 20 bytes in the first chunk
        assert_eq!(
            radio.calls()[0],
            Call::SendStreamData(Vec::from_slice(&[0xAB; 20]).unwrap())
        );

        assert_eq!(stream.transmit(&mut radio, 0x10, 23), TxOutcome::Sent);
        assert_eq!(
            radio.calls()[1],
            Call::SendStreamData(Vec::from_slice(&[0xAB; 10]).unwrap())
        );
        assert!(stream.is_empty());
    }

    #[test]
    fn test_small_mtu_shrinks_chunk() {
        let mut radio = MockRadio::new();
        let mut stream = TxStream::new();
        stream.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        stream.transmit(&mut radio, 0x10, 8);
        assert_eq!(
            radio.calls()[0],
            Call::SendStreamData(Vec::from_slice(&[1, 2, 3, 4, 5]).unwrap())
        );
    }

    #[test]
    fn test_invalid_state_drops_everything() {
        let mut radio = MockRadio::new();
        let mut stream = TxStream::new();
        stream.write(&[0x11; 50]);

        radio.fail_next(status::INVALID_STATE);
        assert_eq!(stream.transmit(&mut radio, 0x10, 23), TxOutcome::Dropped);
        assert!(stream.is_empty());

        // Later writes start clean
        stream.write(&[1]);
        assert_eq!(stream.transmit(&mut radio, 0x10, 23), TxOutcome::Sent);
    }

    #[test]
    fn test_transient_error_keeps_chunk() {
        let mut radio = MockRadio::new();
        let mut stream = TxStream::new();
        stream.write(&[0x22; 10]);

        radio.fail_next(status::RESOURCES);
        assert_eq!(stream.transmit(&mut radio, 0x10, 23), TxOutcome::Deferred);
        assert_eq!(stream.len(), 10);

        assert_eq!(stream.transmit(&mut radio, 0x10, 23), TxOutcome::Sent);
        assert!(stream.is_empty());
    }

    #[test]
    fn test_write_is_bounded() {
        let mut stream = TxStream::new();
        let big = [0u8; STREAM_PENDING_CAPACITY + 10];
        assert_eq!(stream.write(&big), STREAM_PENDING_CAPACITY);
        assert_eq!(stream.write(&[1]), 0);
    }
}
