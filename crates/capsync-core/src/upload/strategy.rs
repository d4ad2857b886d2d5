//! Strategy selection and chunk planning.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One request carrying the whole payload.
    Simple,
    /// Session with fixed-size chunks sent in order, then finalized.
    Resumable,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Simple => "simple",
            Strategy::Resumable => "resumable",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure function of size: below `simple_threshold` is Simple, otherwise Resumable.
pub fn select_strategy(size: u64, simple_threshold: u64) -> Strategy {
    if size < simple_threshold {
        Strategy::Simple
    } else {
        Strategy::Resumable
    }
}

/// One chunk: byte range [start, end) (half-open) at position `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: u64,
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl Chunk {
    /// Length of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` value (inclusive end): `bytes start-(end-1)/total`.
    pub fn content_range(&self, total: u64) -> String {
        if self.start >= self.end {
            format!("bytes */{total}")
        } else {
            format!("bytes {}-{}/{}", self.start, self.end - 1, total)
        }
    }
}

/// Number of chunks needed for `total` bytes.
pub fn chunk_count(total: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total.div_ceil(chunk_size)
}

/// Chunk starting at `offset`, or None once `offset` reaches `total`.
pub fn chunk_at(offset: u64, total: u64, chunk_size: u64) -> Option<Chunk> {
    if offset >= total || chunk_size == 0 {
        return None;
    }
    Some(Chunk {
        index: offset / chunk_size,
        start: offset,
        end: (offset + chunk_size).min(total),
    })
}

/// Builds the chunk plan for `total` bytes.
///
/// Every chunk is `chunk_size` long except the last, which may be shorter.
/// Returns an empty vec if `total` is 0 or `chunk_size` is 0.
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<Chunk> {
    let mut out = Vec::with_capacity(chunk_count(total, chunk_size) as usize);
    let mut offset = 0u64;
    while let Some(chunk) = chunk_at(offset, total, chunk_size) {
        offset = chunk.end;
        out.push(chunk);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn strategy_follows_size_only() {
        assert_eq!(select_strategy(10 * MB, 50 * MB), Strategy::Simple);
        assert_eq!(select_strategy(100 * MB, 50 * MB), Strategy::Resumable);
        assert_eq!(select_strategy(50 * MB, 50 * MB), Strategy::Resumable);
        assert_eq!(select_strategy(50 * MB - 1, 50 * MB), Strategy::Simple);
        assert_eq!(select_strategy(0, 50 * MB), Strategy::Simple);
    }

    #[test]
    fn plan_chunks_even() {
        let chunks = plan_chunks(60 * MB, 5 * MB);
        assert_eq!(chunks.len(), 12);
        assert_eq!(chunks[0], Chunk { index: 0, start: 0, end: 5 * MB });
        assert_eq!(chunks[11].end, 60 * MB);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as u64);
            assert_eq!(c.len(), 5 * MB);
        }
    }

    #[test]
    fn plan_chunks_short_tail() {
        let chunks = plan_chunks(11, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], Chunk { index: 2, start: 8, end: 11 });
        assert_eq!(chunks.iter().map(Chunk::len).sum::<u64>(), 11);
    }

    #[test]
    fn plan_chunks_degenerate() {
        assert!(plan_chunks(0, 4).is_empty());
        assert!(plan_chunks(10, 0).is_empty());
        assert_eq!(chunk_count(10, 0), 0);
    }

    #[test]
    fn content_range_inclusive_end() {
        let c = Chunk { index: 1, start: 5, end: 10 };
        assert_eq!(c.content_range(12), "bytes 5-9/12");
    }
}
