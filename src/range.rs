//! Byte-range planning for chunked fetches.

/// Inclusive byte range `[start, end]`, as sent in a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    pub total_size: u64,
    pub ranges: Vec<ByteRange>,
}

impl RangePlan {
    /// Splits `[0, total_size)` into `min(concurrency, total_size)` contiguous ranges.
    ///
    /// Lengths differ by at most one byte; the first `total_size % n` ranges carry the
    /// extra byte. `concurrency` of 0 is treated as 1. An empty resource gets no ranges.
    pub fn new(total_size: u64, concurrency: usize) -> Self {
        if total_size == 0 {
            return Self {
                total_size,
                ranges: Vec::new(),
            };
        }

        let count = (concurrency.max(1) as u64).min(total_size);
        let base = total_size / count;
        let remainder = total_size % count;

        let mut ranges = Vec::with_capacity(count as usize);
        let mut offset = 0u64;
        for i in 0..count {
            let len = base + u64::from(i < remainder);
            ranges.push(ByteRange {
                start: offset,
                end: offset + len - 1,
            });
            offset += len;
        }

        Self { total_size, ranges }
    }

    pub fn chunk_count(&self) -> usize {
        self.ranges.len()
    }
}
