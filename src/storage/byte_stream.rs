use alloc::vec;
use alloc::vec::Vec;
use core::cmp;

use managed::ManagedSlice;

/// A bounded, flow-controlled stream of bytes.
///
/// The writer appends to the back and the reader consumes from the front; the
/// stream never holds more than its capacity, and writes that do not fit are
/// truncated rather than blocking. The writer signals the end of the stream
/// with [end_input], after which further writes are refused. Either side may
/// put the stream into an error state, which is sticky.
///
/// The storage is a ring buffer, so bytes are never shifted when consumed.
///
/// [end_input]: #method.end_input
#[derive(Debug)]
pub struct ByteStream<'a> {
    storage: ManagedSlice<'a, u8>,
    read_at: usize,
    length: usize,
    bytes_written: u64,
    bytes_read: u64,
    input_ended: bool,
    error: bool,
}

impl<'a> ByteStream<'a> {
    /// Create a byte stream using the given storage.
    ///
    /// The capacity of the stream is the length of the storage.
    pub fn new<S>(storage: S) -> ByteStream<'a>
    where
        S: Into<ManagedSlice<'a, u8>>,
    {
        ByteStream {
            storage: storage.into(),
            read_at: 0,
            length: 0,
            bytes_written: 0,
            bytes_read: 0,
            input_ended: false,
            error: false,
        }
    }

    /// Create a byte stream owning a heap buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> ByteStream<'static> {
        ByteStream::new(vec![0u8; capacity])
    }

    /// Return the maximum number of bytes the stream can hold.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Return the number of bytes written but not yet read.
    pub fn buffer_size(&self) -> usize {
        self.length
    }

    /// Query whether there are no bytes waiting to be read.
    pub fn buffer_empty(&self) -> bool {
        self.length == 0
    }

    /// Return the number of bytes that can still be written.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.length
    }

    /// Write as many bytes from `data` as fit, and return how many were written.
    ///
    /// Nothing is written once the input has ended.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.input_ended {
            return 0;
        }
        let size = cmp::min(data.len(), self.remaining_capacity());
        if size == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let write_at = (self.read_at + self.length) % capacity;
        let first = cmp::min(size, capacity - write_at);
        self.storage[write_at..write_at + first].copy_from_slice(&data[..first]);
        self.storage[..size - first].copy_from_slice(&data[first..size]);

        self.length += size;
        self.bytes_written += size as u64;
        size
    }

    /// Copy bytes from the front of the stream into `data` without consuming
    /// them, and return how many were copied.
    pub fn peek_slice(&self, data: &mut [u8]) -> usize {
        let size = cmp::min(data.len(), self.length);
        if size == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = cmp::min(size, capacity - self.read_at);
        data[..first].copy_from_slice(&self.storage[self.read_at..self.read_at + first]);
        data[first..size].copy_from_slice(&self.storage[..size - first]);
        size
    }

    /// Return a copy of up to `len` bytes from the front of the stream.
    pub fn peek(&self, len: usize) -> Vec<u8> {
        let mut data = vec![0; cmp::min(len, self.length)];
        self.peek_slice(&mut data);
        data
    }

    /// Discard up to `len` bytes from the front of the stream, and return how
    /// many were discarded.
    pub fn pop(&mut self, len: usize) -> usize {
        let size = cmp::min(len, self.length);
        if size == 0 {
            return 0;
        }

        self.read_at = (self.read_at + size) % self.capacity();
        self.length -= size;
        self.bytes_read += size as u64;
        if self.length == 0 {
            // Keep the next write contiguous.
            self.read_at = 0;
        }
        size
    }

    /// Move bytes from the front of the stream into `data`, and return how
    /// many were moved.
    pub fn read_slice(&mut self, data: &mut [u8]) -> usize {
        let size = self.peek_slice(data);
        self.pop(size)
    }

    /// Remove and return up to `len` bytes from the front of the stream.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        let mut data = vec![0; cmp::min(len, self.length)];
        self.read_slice(&mut data);
        data
    }

    /// Signal that the writer has nothing more to write.
    pub fn end_input(&mut self) {
        self.input_ended = true;
    }

    /// Query whether the writer has ended the input.
    pub fn input_ended(&self) -> bool {
        self.input_ended
    }

    /// Query whether the input has ended and every byte has been read.
    pub fn eof(&self) -> bool {
        self.input_ended && self.length == 0
    }

    /// Return the total number of bytes ever written.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Return the total number of bytes ever read.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Put the stream into the error state.
    pub fn set_error(&mut self) {
        self.error = true;
    }

    /// Query whether the stream suffered an error.
    pub fn error(&self) -> bool {
        self.error
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_write_read() {
        let mut stream = ByteStream::with_capacity(15);
        assert_eq!(stream.write(b"cat"), 3);
        assert_eq!(stream.buffer_size(), 3);
        assert_eq!(stream.remaining_capacity(), 12);
        assert_eq!(stream.peek(2), b"ca");
        assert_eq!(stream.buffer_size(), 3);
        assert_eq!(stream.read(2), b"ca");
        assert_eq!(stream.bytes_read(), 2);
        assert_eq!(stream.bytes_written(), 3);
        assert_eq!(stream.read(10), b"t");
        assert!(stream.buffer_empty());
        assert!(!stream.eof());
    }

    #[test]
    fn test_write_truncates_at_capacity() {
        let mut stream = ByteStream::with_capacity(2);
        assert_eq!(stream.write(b"cat"), 2);
        assert_eq!(stream.remaining_capacity(), 0);
        assert_eq!(stream.write(b"t"), 0);
        assert_eq!(stream.pop(1), 1);
        assert_eq!(stream.write(b"tx"), 1);
        assert_eq!(stream.read(2), b"at");
        assert_eq!(stream.bytes_written(), 3);
    }

    #[test]
    fn test_wraparound() {
        let mut stream = ByteStream::with_capacity(5);
        assert_eq!(stream.write(b"abcd"), 4);
        assert_eq!(stream.read(3), b"abc");
        assert_eq!(stream.write(b"efgh"), 4);
        assert_eq!(stream.peek(5), b"defgh");
        let mut buf = [0; 3];
        assert_eq!(stream.read_slice(&mut buf), 3);
        assert_eq!(&buf, b"def");
        assert_eq!(stream.read(5), b"gh");
    }

    #[test]
    fn test_end_input() {
        let mut stream = ByteStream::with_capacity(8);
        stream.write(b"ab");
        stream.end_input();
        assert!(stream.input_ended());
        assert!(!stream.eof());
        assert_eq!(stream.write(b"c"), 0);
        assert_eq!(stream.read(2), b"ab");
        assert!(stream.eof());
    }

    #[test]
    fn test_borrowed_storage() {
        let mut storage = [0u8; 4];
        let mut stream = ByteStream::new(&mut storage[..]);
        assert_eq!(stream.capacity(), 4);
        assert_eq!(stream.write(b"hello"), 4);
        assert_eq!(stream.read(4), b"hell");
    }

    #[test]
    fn test_zero_capacity() {
        let mut stream = ByteStream::with_capacity(0);
        assert_eq!(stream.write(b"x"), 0);
        assert_eq!(stream.read(1), b"");
        assert_eq!(stream.pop(1), 0);
    }

    #[test]
    fn test_error_is_sticky() {
        let mut stream = ByteStream::with_capacity(4);
        assert!(!stream.error());
        stream.set_error();
        assert!(stream.error());
    }
}
