use std::collections::VecDeque;

use minitcp_abstract::{Reader, Writer};
use tracing::trace;

/// A bounded in-memory pipe.
///
/// Bytes pushed beyond the spare capacity are dropped, so the amount
/// buffered never exceeds `capacity`. Closing and erroring are one-way.
#[derive(Debug, Clone)]
pub struct ByteStream {
    capacity: u64,
    buffer: VecDeque<u8>,
    bytes_pushed: u64,
    bytes_popped: u64,
    closed: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            buffer: VecDeque::new(),
            bytes_pushed: 0,
            bytes_popped: 0,
            closed: false,
            error: false,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        if self.closed || self.error || data.is_empty() {
            return;
        }
        let len = (data.len() as u64).min(self.available_capacity()) as usize;
        if len < data.len() {
            trace!(
                offered = data.len(),
                accepted = len,
                "byte stream full, truncating push"
            );
        }
        self.buffer.extend(&data[..len]);
        self.bytes_pushed += len as u64;
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn available_capacity(&self) -> u64 {
        self.capacity - self.bytes_buffered()
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed
    }

    pub fn peek(&self) -> &[u8] {
        self.buffer.as_slices().0
    }

    pub fn pop(&mut self, len: u64) {
        let len = len.min(self.bytes_buffered());
        self.buffer.drain(..len as usize);
        self.bytes_popped += len;
    }

    pub fn is_finished(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }

    pub fn bytes_buffered(&self) -> u64 {
        self.bytes_pushed - self.bytes_popped
    }

    pub fn bytes_popped(&self) -> u64 {
        self.bytes_popped
    }
}

impl Writer for ByteStream {
    fn push(&mut self, data: &[u8]) {
        ByteStream::push(self, data)
    }

    fn close(&mut self) {
        ByteStream::close(self)
    }

    fn set_error(&mut self) {
        ByteStream::set_error(self)
    }

    fn is_closed(&self) -> bool {
        ByteStream::is_closed(self)
    }

    fn has_error(&self) -> bool {
        ByteStream::has_error(self)
    }

    fn available_capacity(&self) -> u64 {
        ByteStream::available_capacity(self)
    }

    fn bytes_pushed(&self) -> u64 {
        ByteStream::bytes_pushed(self)
    }
}

impl Reader for ByteStream {
    fn peek(&self) -> &[u8] {
        ByteStream::peek(self)
    }

    fn pop(&mut self, len: u64) {
        ByteStream::pop(self, len)
    }

    fn is_finished(&self) -> bool {
        ByteStream::is_finished(self)
    }

    fn has_error(&self) -> bool {
        ByteStream::has_error(self)
    }

    fn bytes_buffered(&self) -> u64 {
        ByteStream::bytes_buffered(self)
    }

    fn bytes_popped(&self) -> u64 {
        ByteStream::bytes_popped(self)
    }
}
