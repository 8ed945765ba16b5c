use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::{cmp, fmt};

use super::timer::RetransmissionTimer;
use crate::storage::ByteStream;
use crate::time::Duration;
use crate::wire::{TcpFlags, TcpHeader, TcpSegment, TcpSeqNumber};

/// The sending half of a connection, as seen from the outside.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SenderState {
    /// The outbound stream suffered an error.
    Error,
    /// Nothing has been sent, not even a SYN.
    Closed,
    /// The SYN is out but not acknowledged.
    SynSent,
    /// The SYN is acknowledged and the stream is still open.
    SynAcked,
    /// The FIN is out but not acknowledged.
    FinSent,
    /// Everything, FIN included, is acknowledged.
    FinAcked,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SenderState::Error => write!(f, "error"),
            SenderState::Closed => write!(f, "closed"),
            SenderState::SynSent => write!(f, "syn sent"),
            SenderState::SynAcked => write!(f, "syn acked"),
            SenderState::FinSent => write!(f, "fin sent"),
            SenderState::FinAcked => write!(f, "fin acked"),
        }
    }
}

/// Turns an outbound byte stream into segments, and retransmits them until
/// they are acknowledged.
///
/// Positions are tracked as absolute sequence numbers: 0 is the SYN, the
/// payload follows, and the FIN comes last.
#[derive(Debug)]
pub struct Sender<'a> {
    isn: TcpSeqNumber,
    stream: ByteStream<'a>,
    timer: RetransmissionTimer,
    max_payload_size: usize,
    /// Absolute sequence number of the next byte to send.
    next_seqno: u64,
    /// Highest cumulative acknowledgement received.
    ack_seqno: u64,
    /// Window last advertised by the peer.
    window_size: u16,
    bytes_in_flight: u64,
    /// Sent segments not yet fully acknowledged, keyed by absolute sequence number.
    outstanding: VecDeque<(u64, TcpSegment)>,
    segments_out: VecDeque<TcpSegment>,
}

impl<'a> Sender<'a> {
    pub fn new(
        stream: ByteStream<'a>,
        isn: TcpSeqNumber,
        rt_timeout: Duration,
        max_payload_size: usize,
    ) -> Sender<'a> {
        Sender {
            isn,
            stream,
            timer: RetransmissionTimer::new(rt_timeout),
            max_payload_size,
            next_seqno: 0,
            ack_seqno: 0,
            // Probe with a single byte until the peer says otherwise.
            window_size: 1,
            bytes_in_flight: 0,
            outstanding: VecDeque::new(),
            segments_out: VecDeque::new(),
        }
    }

    /// Send as much of the stream as the peer's window allows.
    pub fn fill_window(&mut self) {
        if self.next_seqno == 0 {
            self.send_segment(TcpFlags::SYN, Vec::new());
        }
        if self.ack_seqno == 0 {
            // The SYN is still unacknowledged.
            return;
        }

        // A closed window is probed one byte at a time.
        let window = cmp::max(self.window_size, 1) as u64;
        while window > self.next_seqno - self.ack_seqno {
            let remain = window - (self.next_seqno - self.ack_seqno);
            if self.stream.eof() {
                if self.next_seqno < self.stream.bytes_written() + 2 {
                    self.send_segment(TcpFlags::FIN, Vec::new());
                }
                return;
            }

            let size = cmp::min(remain, self.max_payload_size as u64) as usize;
            let payload = self.stream.read(size);
            let mut flags = TcpFlags::empty();
            if self.stream.eof() && remain > payload.len() as u64 {
                flags |= TcpFlags::FIN;
            }
            if payload.is_empty() && flags.is_empty() {
                return;
            }
            self.send_segment(flags, payload);
        }
    }

    fn send_segment(&mut self, flags: TcpFlags, payload: Vec<u8>) {
        let segment = TcpSegment {
            header: TcpHeader {
                seqno: TcpSeqNumber::wrap(self.next_seqno, self.isn),
                flags,
                ..TcpHeader::default()
            },
            payload: payload.into(),
        };
        let len = segment.length_in_sequence_space() as u64;
        tcp_trace!(
            "sender: sending abs={} len={} flags={:?}",
            self.next_seqno,
            len,
            flags
        );

        self.outstanding.push_back((self.next_seqno, segment.clone()));
        self.segments_out.push_back(segment);
        self.next_seqno += len;
        self.bytes_in_flight += len;
        if !self.timer.running() {
            self.timer.start();
        }
    }

    /// Process an acknowledgement and window advertisement from the peer.
    pub fn ack_received(&mut self, ackno: TcpSeqNumber, window_size: u16) {
        let ack_seqno = ackno.unwrap(self.isn, self.ack_seqno);
        if ack_seqno > self.next_seqno {
            net_debug!(
                "sender: ignoring ack of unsent data (ack={} next={})",
                ack_seqno,
                self.next_seqno
            );
            return;
        }
        self.window_size = window_size;
        if ack_seqno <= self.ack_seqno {
            return;
        }

        self.ack_seqno = ack_seqno;
        while let Some((seqno, segment)) = self.outstanding.front() {
            let len = segment.length_in_sequence_space() as u64;
            if seqno + len > ack_seqno {
                break;
            }
            self.bytes_in_flight -= len;
            self.outstanding.pop_front();
        }
        tcp_trace!(
            "sender: acked up to {}, {} bytes in flight",
            ack_seqno,
            self.bytes_in_flight
        );

        self.timer.reset(!self.outstanding.is_empty());
        self.fill_window();
    }

    /// Let `delta` of time pass, retransmitting the oldest outstanding
    /// segment if the timer expired.
    pub fn tick(&mut self, delta: Duration) {
        if !self.timer.tick(delta) {
            return;
        }

        match self.outstanding.front() {
            Some((seqno, segment)) => {
                tcp_trace!("sender: retransmitting abs={}", seqno);
                self.segments_out.push_back(segment.clone());
            }
            None => {
                self.timer.close();
                return;
            }
        }
        self.timer.back_off(self.window_size != 0);
    }

    /// Queue a segment that occupies no sequence space, for a bare acknowledgement.
    pub fn send_empty_segment(&mut self) {
        self.segments_out.push_back(TcpSegment::empty(TcpHeader {
            seqno: self.next_seqno(),
            ..TcpHeader::default()
        }));
    }

    /// Replace everything queued with a single reset segment, and give up
    /// on the outstanding data.
    pub fn send_reset(&mut self) {
        self.segments_out.clear();
        self.timer.close();
        self.segments_out.push_back(TcpSegment::empty(TcpHeader {
            seqno: self.next_seqno(),
            flags: TcpFlags::RST,
            ..TcpHeader::default()
        }));
    }

    pub fn consecutive_retransmissions(&self) -> u32 {
        self.timer.consecutive_retransmissions()
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn next_seqno_absolute(&self) -> u64 {
        self.next_seqno
    }

    pub fn next_seqno(&self) -> TcpSeqNumber {
        TcpSeqNumber::wrap(self.next_seqno, self.isn)
    }

    pub fn isn(&self) -> TcpSeqNumber {
        self.isn
    }

    /// Return the current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.timer.rto()
    }

    pub fn stream_in(&self) -> &ByteStream<'a> {
        &self.stream
    }

    pub fn stream_in_mut(&mut self) -> &mut ByteStream<'a> {
        &mut self.stream
    }

    /// Segments ready for the wire, oldest first.
    pub fn segments_out(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    pub fn state(&self) -> SenderState {
        let written = self.stream.bytes_written();
        if self.stream.error() {
            SenderState::Error
        } else if self.next_seqno == 0 {
            SenderState::Closed
        } else if self.next_seqno == self.bytes_in_flight {
            SenderState::SynSent
        } else if self.next_seqno < written + 2 {
            SenderState::SynAcked
        } else if self.bytes_in_flight > 0 {
            SenderState::FinSent
        } else {
            SenderState::FinAcked
        }
    }
}
