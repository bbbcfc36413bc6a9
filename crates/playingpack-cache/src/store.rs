//! Content-addressed cache store: persist and replay recorded upstream
//! responses, keyed by request fingerprint.

use crate::atomic_writer::AtomicWriter;
use crate::error::CacheResult;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A single chunk of a recorded response. The first chunk always has
/// `delay_ms == 0`; subsequent delays are the observed inter-arrival
/// time during recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedChunk {
    pub data: String,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRequest {
    pub model: Option<String>,
    pub messages: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponseBody {
    pub status: u16,
    pub chunks: Vec<CachedChunk>,
}

/// Persisted record for one fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub request: CachedRequest,
    pub response: CachedResponseBody,
}

/// Content-addressed file store. Files live under `dir` named
/// `<fingerprint>.json`.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }

    pub async fn exists(&self, fingerprint: &str) -> bool {
        let path = self.path_for(fingerprint);
        tokio::fs::metadata(path).await.is_ok()
    }

    /// Load a cached record. Corrupt JSON (or a missing file) returns
    /// `None` rather than an error — a cache miss, not a failure.
    pub async fn load(&self, fingerprint: &str) -> Option<CachedResponse> {
        let path = self.path_for(fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(_) => return None,
        };
        match serde_json::from_slice::<CachedResponse>(&bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(fingerprint, %err, "corrupt cache file, treating as miss");
                None
            }
        }
    }

    /// Begin writing a new record for `fingerprint`.
    pub fn writer(&self, fingerprint: &str, request: CachedRequest) -> CacheWriter {
        CacheWriter::new(self.path_for(fingerprint), fingerprint.to_string(), request)
    }
}

/// Accumulates chunks (capturing wall-clock inter-chunk delay) and
/// atomically persists the finished record on `save`.
pub struct CacheWriter {
    path: PathBuf,
    hash: String,
    request: CachedRequest,
    chunks: Vec<CachedChunk>,
    last_push: Option<Instant>,
}

impl CacheWriter {
    fn new(path: PathBuf, hash: String, request: CachedRequest) -> Self {
        Self {
            path,
            hash,
            request,
            chunks: Vec::new(),
            last_push: None,
        }
    }

    /// Record one chunk of response data, stamping it with the elapsed
    /// time since the previous chunk (0 for the first).
    pub fn push_chunk(&mut self, data: impl Into<String>) {
        let now = Instant::now();
        let delay_ms = match self.last_push {
            None => 0,
            Some(prev) => now.duration_since(prev).as_millis() as u64,
        };
        self.last_push = Some(now);
        self.chunks.push(CachedChunk {
            data: data.into(),
            delay_ms,
        });
    }

    /// Finalize the record with the given status and atomically write
    /// it as pretty JSON.
    pub fn save(self, status: u16) -> CacheResult<()> {
        let record = CachedResponse {
            hash: self.hash.clone(),
            timestamp: Utc::now(),
            request: self.request,
            response: CachedResponseBody {
                status,
                chunks: self.chunks,
            },
        };

        let bytes = serde_json::to_vec_pretty(&record)?;
        let mut writer = AtomicWriter::new(&self.path)?;
        writer.write(&bytes)?;
        writer.commit()?;
        debug!(hash = %self.hash, "cache record written");
        Ok(())
    }
}

/// Replay a cached record chunk-by-chunk. In paced mode each chunk is
/// preceded by a sleep for its recorded delay; in fast mode chunks are
/// yielded immediately (used when the caller has its own pacing, e.g.
/// the engine buffering the replay internally). `cancelled` is checked
/// both before the sleep and before the yield so an aborted consumer
/// stops within one chunk.
pub fn replay(
    record: CachedResponse,
    fast: bool,
    cancelled: Arc<AtomicBool>,
) -> impl Stream<Item = String> {
    let chunks = record.response.chunks.into_iter();
    futures::stream::unfold((chunks, cancelled, fast), move |(mut iter, cancelled, fast)| async move {
        if cancelled.load(Ordering::Relaxed) {
            return None;
        }
        let chunk = iter.next()?;
        if !fast && chunk.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        if cancelled.load(Ordering::Relaxed) {
            return None;
        }
        Some((chunk.data, (iter, cancelled, fast)))
    })
}
