/*! Specialized containers.

The `storage` module provides the two buffers every TCP connection is built on:
a bounded, flow-controlled [ByteStream] and a [StreamReassembler] that turns
out-of-order substrings into an in-order stream.

The byte stream uses `managed` storage, so it can live either in a borrowed
slice or in a heap allocation owned by the stream.

[ByteStream]: struct.ByteStream.html
[StreamReassembler]: struct.StreamReassembler.html
*/

mod byte_stream;
mod reassembler;

pub use self::byte_stream::ByteStream;
pub use self::reassembler::StreamReassembler;
