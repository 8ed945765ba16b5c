use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cmp;
use core::ops::Bound::{Excluded, Included};

use super::ByteStream;

/// Reassembles possibly overlapping, out-of-order substrings of a stream
/// into an in-order byte stream.
///
/// Every substring is tagged with the absolute index of its first byte.
/// Bytes that extend the contiguous prefix are written to the output stream
/// at once; the rest are held as pending ranges until the gap before them
/// fills. Pending ranges are kept merged: no two of them overlap or touch.
///
/// The output stream's capacity bounds the reassembler as a whole. Bytes
/// pending here plus bytes delivered but not yet read never exceed it; any
/// byte that would is dropped.
#[derive(Debug)]
pub struct StreamReassembler<'a> {
    output: ByteStream<'a>,
    pending: BTreeMap<u64, Vec<u8>>,
    unassembled: usize,
    next_index: u64,
    eof_index: Option<u64>,
}

impl<'a> StreamReassembler<'a> {
    /// Create a reassembler writing into `output`.
    pub fn new(output: ByteStream<'a>) -> StreamReassembler<'a> {
        StreamReassembler {
            output,
            pending: BTreeMap::new(),
            unassembled: 0,
            next_index: 0,
            eof_index: None,
        }
    }

    /// Create a reassembler with an owned output stream of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> StreamReassembler<'static> {
        StreamReassembler::new(ByteStream::with_capacity(capacity))
    }

    /// Accept the substring `data` starting at absolute `index`.
    ///
    /// When `is_last` is set, the last byte of `data` is the last byte of the
    /// stream, and the output is ended once everything before it arrived.
    pub fn insert(&mut self, data: &[u8], index: u64, is_last: bool) {
        if is_last {
            self.eof_index = Some(index + data.len() as u64);
        }

        let first_unacceptable = self.next_index + self.output.remaining_capacity() as u64;
        let start = cmp::max(index, self.next_index);
        let end = cmp::min(index + data.len() as u64, first_unacceptable);
        if start < end {
            let from = (start - index) as usize;
            let to = (end - index) as usize;
            self.store(start, &data[from..to]);
            self.assemble();
        }

        if self.eof_index == Some(self.next_index)
            && self.pending.is_empty()
            && !self.output.input_ended()
        {
            net_trace!("reassembler: stream complete at {}", self.next_index);
            self.output.end_input();
        }
    }

    fn store(&mut self, mut start: u64, data: &[u8]) {
        let mut end = start + data.len() as u64;
        let mut bytes = data.to_vec();

        let prev = self
            .pending
            .range(..=start)
            .next_back()
            .map(|(&key, data)| (key, key + data.len() as u64));
        if let Some((prev_start, prev_end)) = prev.filter(|&(_, prev_end)| prev_end >= start) {
            let mut merged = self.pending.remove(&prev_start).unwrap_or_default();
            self.unassembled -= merged.len();
            if prev_end < end {
                merged.extend_from_slice(&bytes[(prev_end - start) as usize..]);
            } else {
                end = prev_end;
            }
            start = prev_start;
            bytes = merged;
        }

        loop {
            let Some(next_start) = self
                .pending
                .range((Excluded(start), Included(end)))
                .next()
                .map(|(&key, _)| key)
            else {
                break;
            };
            let next = self.pending.remove(&next_start).unwrap_or_default();
            self.unassembled -= next.len();
            let next_end = next_start + next.len() as u64;
            if next_end > end {
                bytes.extend_from_slice(&next[(end - next_start) as usize..]);
                end = next_end;
            }
        }

        net_trace!("reassembler: pending [{}, {})", start, end);
        self.unassembled += bytes.len();
        self.pending.insert(start, bytes);
    }

    fn assemble(&mut self) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.next_index {
                break;
            }
            let written = self.output.write(entry.get());
            if written == 0 {
                break;
            }
            self.unassembled -= written;
            self.next_index += written as u64;

            let data = entry.remove();
            if written < data.len() {
                self.pending.insert(self.next_index, data[written..].to_vec());
                break;
            }
        }
    }

    /// Return the number of bytes held that are not yet part of the output.
    pub fn unassembled_bytes(&self) -> usize {
        self.unassembled
    }

    /// Query whether no bytes are waiting for a gap to be filled.
    pub fn is_empty(&self) -> bool {
        self.unassembled == 0
    }

    /// Return the absolute index of the first byte not yet written to the output.
    pub fn first_unassembled(&self) -> u64 {
        self.next_index
    }

    /// Return the reassembled stream.
    pub fn stream_out(&self) -> &ByteStream<'a> {
        &self.output
    }

    /// Return the reassembled stream, for reading.
    pub fn stream_out_mut(&mut self) -> &mut ByteStream<'a> {
        &mut self.output
    }
}
