use crate::core::{Chunk, ResourceType, SourceAsset, TransferConfig};

/// How one asset is sent to the provider
#[derive(Debug)]
pub enum TransferPlan {
    /// Single request with the whole file
    Whole,
    /// Sequential byte-range requests
    Chunked(ChunkPlan),
}

/// Images and assets below the threshold go in one request, everything else is chunked
pub fn plan_transfer(asset: &SourceAsset, resource_type: ResourceType, config: &TransferConfig) -> TransferPlan {
    if resource_type == ResourceType::Image || asset.size_bytes < config.chunk_threshold {
        TransferPlan::Whole
    } else {
        TransferPlan::Chunked(ChunkPlan::new(asset.size_bytes, config.chunk_size))
    }
}

/// Lazily yields the chunks of one file, front to back
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    size_bytes: u64,
    chunk_size: u64,
    cursor: u64,
    sequence: usize,
}

impl ChunkPlan {
    pub fn new(size_bytes: u64, chunk_size: u64) -> Self {
        Self {
            size_bytes,
            chunk_size,
            cursor: 0,
            sequence: 0,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Total chunks in the plan, regardless of how many were consumed
    pub fn chunk_count(&self) -> usize {
        if self.chunk_size == 0 {
            return 0;
        }
        self.size_bytes.div_ceil(self.chunk_size) as usize
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.chunk_size == 0 || self.cursor >= self.size_bytes {
            return None;
        }

        let start = self.cursor;
        let end = (start + self.chunk_size).min(self.size_bytes);
        let chunk = Chunk::new(self.sequence, start, end);

        self.cursor = end;
        self.sequence += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.chunk_count().saturating_sub(self.sequence);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MIB;

    fn asset(size: u64) -> SourceAsset {
        SourceAsset::new("/tmp/clip.mp4", size, "video/mp4", "clip.mp4")
    }

    #[test]
    fn test_small_and_image_assets_are_whole() {
        let config = TransferConfig::default();

        assert!(matches!(
            plan_transfer(&asset(5 * MIB), ResourceType::Video, &config),
            TransferPlan::Whole
        ));
        assert!(matches!(
            plan_transfer(&asset(50 * MIB), ResourceType::Image, &config),
            TransferPlan::Whole
        ));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = TransferConfig::default();
        match plan_transfer(&asset(20 * MIB), ResourceType::Video, &config) {
            TransferPlan::Chunked(plan) => assert_eq!(plan.chunk_count(), 1),
            TransferPlan::Whole => panic!("expected chunked plan"),
        }
    }

    #[test]
    fn test_chunks_partition_file() {
        let plan = ChunkPlan::new(45 * MIB, 20 * MIB);
        assert_eq!(plan.chunk_count(), 3);

        let chunks: Vec<_> = plan.collect();
        let ranges: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(
            ranges,
            vec![(0, 20 * MIB), (20 * MIB, 40 * MIB), (40 * MIB, 45 * MIB)]
        );
        assert_eq!(chunks.iter().map(|c| c.length).sum::<u64>(), 45 * MIB);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_eq!(pair[0].sequence + 1, pair[1].sequence);
        }
    }

    #[test]
    fn test_exact_multiple_ends_with_full_chunk() {
        let chunks: Vec<_> = ChunkPlan::new(40, 20).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].length, 20);
        assert_eq!(chunks[1].end, 40);
    }

    #[test]
    fn test_plan_is_not_restartable() {
        let mut plan = ChunkPlan::new(30, 20);
        assert_eq!(plan.len(), 2);
        plan.next();
        assert_eq!(plan.len(), 1);
        plan.next();
        assert_eq!(plan.next(), None);
        assert_eq!(plan.chunk_count(), 2);
    }
}
