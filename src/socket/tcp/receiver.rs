use core::fmt;

use crate::storage::{ByteStream, StreamReassembler};
use crate::wire::{TcpSegment, TcpSeqNumber};

/// The receiving half of a connection, as seen from the outside.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReceiverState {
    /// The inbound stream suffered an error.
    Error,
    /// No SYN has arrived yet.
    Listen,
    /// The SYN arrived and the stream is still open.
    SynReceived,
    /// The whole stream, FIN included, has been assembled.
    FinReceived,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReceiverState::Error => write!(f, "error"),
            ReceiverState::Listen => write!(f, "listen"),
            ReceiverState::SynReceived => write!(f, "syn received"),
            ReceiverState::FinReceived => write!(f, "fin received"),
        }
    }
}

/// Turns inbound segments back into a byte stream, and decides what to
/// acknowledge and which window to advertise.
#[derive(Debug)]
pub struct Receiver<'a> {
    reassembler: StreamReassembler<'a>,
    isn: Option<TcpSeqNumber>,
}

impl<'a> Receiver<'a> {
    pub fn new(stream: ByteStream<'a>) -> Receiver<'a> {
        Receiver {
            reassembler: StreamReassembler::new(stream),
            isn: None,
        }
    }

    /// Accept a segment from the peer.
    ///
    /// Nothing is accepted before the SYN; the SYN fixes the peer's initial
    /// sequence number for the rest of the connection.
    pub fn segment_received(&mut self, segment: &TcpSegment) {
        let header = &segment.header;
        let isn = match self.isn {
            Some(isn) => isn,
            None if header.syn() => {
                tcp_trace!("receiver: peer isn={}", header.seqno);
                self.isn = Some(header.seqno);
                header.seqno
            }
            None => return,
        };

        // The first unassembled byte sits one past the SYN.
        let checkpoint = self.reassembler.stream_out().bytes_written() + 1;
        let abs_seqno = header.seqno.unwrap(isn, checkpoint);
        if abs_seqno == 0 && !header.syn() {
            // Claims the SYN's position without carrying it.
            return;
        }

        let index = abs_seqno + header.syn() as u64 - 1;
        self.reassembler.insert(&segment.payload, index, header.fin());
    }

    /// Return the acknowledgement number to send, or `None` before the SYN.
    pub fn ackno(&self) -> Option<TcpSeqNumber> {
        let isn = self.isn?;
        let stream = self.reassembler.stream_out();
        let abs = stream.bytes_written() + 1 + stream.input_ended() as u64;
        Some(TcpSeqNumber::wrap(abs, isn))
    }

    /// Return the window to advertise: the room left in the inbound stream.
    pub fn window_size(&self) -> usize {
        let stream = self.reassembler.stream_out();
        stream.capacity() - stream.buffer_size()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.reassembler.unassembled_bytes()
    }

    pub fn stream_out(&self) -> &ByteStream<'a> {
        self.reassembler.stream_out()
    }

    pub fn stream_out_mut(&mut self) -> &mut ByteStream<'a> {
        self.reassembler.stream_out_mut()
    }

    pub fn state(&self) -> ReceiverState {
        let stream = self.reassembler.stream_out();
        if stream.error() {
            ReceiverState::Error
        } else if self.isn.is_none() {
            ReceiverState::Listen
        } else if stream.input_ended() {
            ReceiverState::FinReceived
        } else {
            ReceiverState::SynReceived
        }
    }
}
