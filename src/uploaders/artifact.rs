use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use crate::core::{Chunk, Result, UploadError, UploadId};

/// Temporary copy of one chunk's byte range.
///
/// The file is removed by [`ChunkArtifact::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct ChunkArtifact {
    path: PathBuf,
    len: u64,
    released: bool,
}

impl ChunkArtifact {
    pub fn path_for(cache_dir: &Path, upload_id: UploadId, chunk: &Chunk) -> PathBuf {
        cache_dir.join(format!("{}-chunk-{}", upload_id, chunk.start))
    }

    /// Copies `[chunk.start, chunk.end)` of `source` into `{cache_dir}/{upload_id}-chunk-{start}`
    pub async fn create(cache_dir: &Path, upload_id: UploadId, source: &Path, chunk: &Chunk) -> Result<Self> {
        fs::create_dir_all(cache_dir).await?;

        // 先创建守卫，写入失败时也会清理
        let artifact = Self {
            path: Self::path_for(cache_dir, upload_id, chunk),
            len: chunk.length,
            released: false,
        };

        let mut reader = File::open(source).await?;
        reader.seek(SeekFrom::Start(chunk.start)).await?;
        let mut reader = reader.take(chunk.length);

        let mut writer = BufWriter::new(File::create(&artifact.path).await?);
        let copied = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;

        if copied != chunk.length {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended after {} of {} bytes at offset {}",
                    copied, chunk.length, chunk.start
                ),
            )));
        }

        debug!(path = %artifact.path.display(), len = copied, "chunk artifact written");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Deletes the file; a file that is already gone is not an error
    pub async fn release(mut self) -> Result<()> {
        self.released = true;

        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for ChunkArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to remove chunk artifact");
            }
        }
    }
}
