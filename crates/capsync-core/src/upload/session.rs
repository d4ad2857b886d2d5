//! Per-upload session state.

use super::strategy::{chunk_at, chunk_count, Chunk, Strategy};

/// Tracks how many bytes the store has acknowledged. Chunks are confirmed
/// strictly in order, so `bytes_confirmed` is always a chunk boundary and
/// the next chunk to send is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    session_id: Option<String>,
    total_bytes: u64,
    chunk_size: u64,
    bytes_confirmed: u64,
    strategy: Strategy,
    thumbnail_path: Option<String>,
}

impl UploadSession {
    pub fn simple(total_bytes: u64, thumbnail_path: Option<String>) -> Self {
        Self {
            session_id: None,
            total_bytes,
            chunk_size: total_bytes,
            bytes_confirmed: 0,
            strategy: Strategy::Simple,
            thumbnail_path,
        }
    }

    pub fn resumable(
        session_id: impl Into<String>,
        total_bytes: u64,
        chunk_size: u64,
        thumbnail_path: Option<String>,
    ) -> Self {
        Self {
            session_id: Some(session_id.into()),
            total_bytes,
            chunk_size: chunk_size.max(1),
            bytes_confirmed: 0,
            strategy: Strategy::Resumable,
            thumbnail_path,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn bytes_confirmed(&self) -> u64 {
        self.bytes_confirmed
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn thumbnail_path(&self) -> Option<&str> {
        self.thumbnail_path.as_deref()
    }

    pub fn chunk_count(&self) -> u64 {
        match self.strategy {
            Strategy::Simple => 1,
            Strategy::Resumable => chunk_count(self.total_bytes, self.chunk_size),
        }
    }

    /// First chunk not yet confirmed.
    pub fn next_chunk(&self) -> Option<Chunk> {
        chunk_at(self.bytes_confirmed, self.total_bytes, self.chunk_size)
    }

    /// Record `chunk` as acknowledged. Returns false (and changes nothing)
    /// if it is not the next chunk in order.
    pub fn confirm(&mut self, chunk: &Chunk) -> bool {
        if chunk.start != self.bytes_confirmed || chunk.end > self.total_bytes {
            return false;
        }
        self.bytes_confirmed = chunk.end;
        true
    }

    /// Simple uploads are acknowledged as a whole.
    pub fn confirm_all(&mut self) {
        self.bytes_confirmed = self.total_bytes;
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_confirmed >= self.total_bytes
    }
}
