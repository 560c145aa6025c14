use std::collections::BTreeMap;

use minitcp_abstract::Writer;
use tracing::trace;

/// Bytes held back because something before them is still missing.
#[derive(Debug, Clone, Default)]
struct PendingSegment {
    payload: Vec<u8>,
    is_last: bool,
}

impl PendingSegment {
    fn end(&self, start: u64) -> u64 {
        start + self.payload.len() as u64
    }
}

/// Rebuilds a contiguous stream from indexed, possibly overlapping and
/// out-of-order substrings.
///
/// Buffered ranges live in a single map keyed by start index. Ranges in the
/// map never overlap and never touch: every insert merges with its
/// neighbours, so the map stays sorted and minimal.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: BTreeMap<u64, PendingSegment>,
    bytes_pending: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `data` starting at stream index `first_index`.
    ///
    /// Bytes the stream can take right away are pushed into `output`; bytes
    /// inside the stream's spare capacity are buffered; anything else is
    /// dropped. `is_last` marks the final byte of `data` as the end of the
    /// stream, which closes `output` once everything before it has arrived.
    pub fn insert(
        &mut self,
        first_index: u64,
        data: &[u8],
        is_last: bool,
        output: &mut dyn Writer,
    ) {
        let lower = output.bytes_pushed();
        let upper = lower + output.available_capacity();
        let end = first_index.saturating_add(data.len() as u64);

        let start = first_index.max(lower);
        let stop = end.min(upper);

        if start >= stop {
            // Nothing storable. An end-of-stream marker still counts if it
            // falls inside the window.
            if is_last && (lower..=upper).contains(&end) {
                if end == lower {
                    output.close();
                } else {
                    self.buffer(end, Vec::new(), true);
                }
            } else {
                trace!(
                    first_index,
                    len = data.len(),
                    lower,
                    upper,
                    "segment outside window, discarded"
                );
            }
        } else {
            let kept = &data[(start - first_index) as usize..(stop - first_index) as usize];
            let is_last = is_last && stop == end;
            if start == lower {
                output.push(kept);
                if is_last {
                    output.close();
                }
            } else {
                self.buffer(start, kept.to_vec(), is_last);
            }
        }

        self.flush(output);
    }

    /// Bytes buffered but not yet pushed.
    pub fn bytes_pending(&self) -> u64 {
        self.bytes_pending
    }

    fn buffer(&mut self, mut start: u64, mut payload: Vec<u8>, mut is_last: bool) {
        // A range starting at or before `start` that reaches it absorbs the
        // new bytes; its own bytes take precedence.
        let reaching = self
            .pending
            .range(..=start)
            .next_back()
            .filter(|(prev_start, prev)| prev.end(**prev_start) >= start)
            .map(|(prev_start, _)| *prev_start);
        if let Some(prev_start) = reaching {
            let prev = self.take(prev_start);
            let prev_end = prev.end(prev_start);
            let mut merged = prev.payload;
            let new_end = start + payload.len() as u64;
            if new_end > prev_end {
                merged.extend_from_slice(&payload[(prev_end - start) as usize..]);
            }
            is_last |= prev.is_last;
            start = prev_start;
            payload = merged;
        }

        // Later ranges that the merged bytes reach.
        loop {
            let end = start + payload.len() as u64;
            let Some(&next_start) = self.pending.range(start..=end).next().map(|(k, _)| k) else {
                break;
            };
            let next = self.take(next_start);
            let next_end = next.end(next_start);
            if next_end > end {
                payload.extend_from_slice(&next.payload[(end - next_start) as usize..]);
            }
            is_last |= next.is_last;
        }

        self.bytes_pending += payload.len() as u64;
        self.pending.insert(start, PendingSegment { payload, is_last });
    }

    fn take(&mut self, start: u64) -> PendingSegment {
        let segment = self.pending.remove(&start).unwrap_or_default();
        self.bytes_pending -= segment.payload.len() as u64;
        segment
    }

    /// Push every buffered range that the stream has caught up with.
    fn flush(&mut self, output: &mut dyn Writer) {
        while let Some(start) = self.pending.first_key_value().map(|(&k, _)| k) {
            let lower = output.bytes_pushed();
            if start > lower {
                break;
            }
            let segment = self.take(start);
            let end = segment.end(start);
            if end < lower {
                trace!(start, end, "buffered range already delivered, dropped");
                continue;
            }
            output.push(&segment.payload[(lower - start) as usize..]);
            if segment.is_last && output.bytes_pushed() == end {
                output.close();
            }
        }

        if output.is_closed() && !self.pending.is_empty() {
            self.pending.clear();
            self.bytes_pending = 0;
        }
    }
}
