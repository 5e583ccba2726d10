use std::sync::Arc;
use parking_lot::Mutex;
use super::store::MAX_IN_FLIGHT_PCT;
use super::traits::{ProgressCallback, ProgressInfo};
use super::types::Chunk;

/// Job-level progress derived from request byte counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    pub percentage: u8,
    pub bytes_sent: u64,
}

pub type ProgressSink = Arc<dyn Fn(JobProgress) + Send + Sync>;

/// `round(loaded / total * 100)`; a zero total reports 0
pub fn percentage(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }

    let pct = (loaded as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// 进度聚合器 - turns per-request counters into one monotonic job figure
#[derive(Debug)]
pub struct ProgressAggregator {
    size_bytes: u64,
    last: JobProgress,
}

impl ProgressAggregator {
    pub fn new(size_bytes: u64) -> Self {
        Self {
            size_bytes,
            last: JobProgress {
                percentage: 0,
                bytes_sent: 0,
            },
        }
    }

    /// Whole-file transfer: the request body is the entire asset
    pub fn whole(&mut self, info: ProgressInfo) -> Option<JobProgress> {
        let loaded = info.bytes_loaded.min(info.bytes_total);
        self.advance(percentage(loaded, info.bytes_total), loaded)
    }

    /// Chunked transfer: `(chunk.start + loaded_in_chunk) / size`
    pub fn chunked(&mut self, chunk: &Chunk, loaded_in_chunk: u64) -> Option<JobProgress> {
        let sent = chunk.start + loaded_in_chunk.min(chunk.length);
        self.advance(percentage(sent, self.size_bytes), sent)
    }

    pub fn current(&self) -> JobProgress {
        self.last
    }

    /// Only forward movement is reported
    fn advance(&mut self, pct: u8, bytes_sent: u64) -> Option<JobProgress> {
        let next = JobProgress {
            percentage: pct.min(MAX_IN_FLIGHT_PCT).max(self.last.percentage),
            bytes_sent: bytes_sent.max(self.last.bytes_sent),
        };

        if next == self.last {
            return None;
        }

        self.last = next;
        Some(next)
    }
}

/// Hands out transport callbacks that feed one job's aggregator
#[derive(Clone)]
pub struct ProgressReporter {
    aggregator: Arc<Mutex<ProgressAggregator>>,
    sink: ProgressSink,
}

impl ProgressReporter {
    pub fn new(size_bytes: u64, sink: ProgressSink) -> Self {
        Self {
            aggregator: Arc::new(Mutex::new(ProgressAggregator::new(size_bytes))),
            sink,
        }
    }

    /// Reporter whose updates go nowhere (secondary assets)
    pub fn detached() -> Self {
        Self::new(0, Arc::new(|_: JobProgress| {}))
    }

    pub fn whole_callback(&self) -> ProgressCallback {
        let reporter = self.clone();

        Arc::new(move |info: ProgressInfo| {
            let update = reporter.aggregator.lock().whole(info);
            if let Some(progress) = update {
                (reporter.sink)(progress);
            }
        })
    }

    pub fn chunk_callback(&self, chunk: Chunk) -> ProgressCallback {
        let reporter = self.clone();

        Arc::new(move |info: ProgressInfo| {
            let update = reporter.aggregator.lock().chunked(&chunk, info.bytes_loaded);
            if let Some(progress) = update {
                (reporter.sink)(progress);
            }
        })
    }
}
