use bytes::{Bytes, BytesMut};

/// The producing half of a byte stream.
/// The reassembler writes through this, and so does the application feeding a sender.
pub trait Writer {
    /// Append as much of `data` as currently fits. Silently does nothing once
    /// the stream is closed or has an error.
    fn push(&mut self, data: &[u8]);

    /// Signal that no more bytes will be pushed.
    fn close(&mut self);

    /// Mark the stream as aborted. Sticky.
    fn set_error(&mut self);

    fn is_closed(&self) -> bool;

    fn has_error(&self) -> bool;

    /// Bytes that can be pushed right now.
    fn available_capacity(&self) -> u64;

    /// Total bytes ever pushed.
    fn bytes_pushed(&self) -> u64;
}

/// The consuming half of a byte stream.
pub trait Reader {
    /// The next contiguous run of buffered bytes. May be shorter than
    /// `bytes_buffered()`; empty only if nothing is buffered.
    fn peek(&self) -> &[u8];

    /// Discard up to `len` bytes from the front of the buffer.
    fn pop(&mut self, len: u64);

    /// Closed and fully drained.
    fn is_finished(&self) -> bool;

    fn has_error(&self) -> bool;

    fn bytes_buffered(&self) -> u64;

    /// Total bytes ever popped.
    fn bytes_popped(&self) -> u64;

    /// Pop up to `len` bytes into an owned buffer.
    fn read(&mut self, len: u64) -> Bytes {
        let mut out = BytesMut::with_capacity(len.min(self.bytes_buffered()) as usize);
        while (out.len() as u64) < len {
            let chunk = self.peek();
            if chunk.is_empty() {
                break;
            }
            let take = chunk.len().min((len - out.len() as u64) as usize);
            out.extend_from_slice(&chunk[..take]);
            self.pop(take as u64);
        }
        out.freeze()
    }
}
