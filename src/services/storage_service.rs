use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use std::io::{self, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{Error, Result};

const MAX_STORAGE_KEY_LEN: usize = 1024;

/// Local-filesystem payload store addressed by storage key. Metadata lives
/// in Postgres; this service only moves bytes.
#[derive(Clone)]
pub struct StorageService {
    root: PathBuf,
}

impl StorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rejects keys that could escape the media root.
    fn ensure_key_safe(&self, key: &str) -> Result<()> {
        if key.is_empty() || key.len() > MAX_STORAGE_KEY_LEN {
            return Err(Error::BadRequest("invalid storage key".to_string()));
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(Error::BadRequest("invalid storage key".to_string()));
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(Error::BadRequest("invalid storage key".to_string()));
        }
        Ok(())
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.push(key);
        path
    }

    /// Stream an upload to a temp file, fsync, then rename into place.
    /// Returns the byte count written.
    pub async fn store_stream<S>(&self, key: &str, stream: S) -> Result<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;
        let file_path = self.payload_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Internal("storage key has no parent directory".to_string()))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(Error::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(Error::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Io(err));
        }

        Ok(size_bytes)
    }

    /// Open the full payload for streaming out. The payload length comes
    /// from the filesystem, not the metadata row.
    pub async fn open_full(&self, key: &str) -> Result<(File, u64)> {
        self.ensure_key_safe(key)?;
        let path = self.payload_path(key);
        let file = File::open(&path).await.map_err(map_missing_payload)?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Open an inclusive byte span of the payload. The returned reader is
    /// already positioned at `start` and limited to the span length.
    pub async fn open_range(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<tokio::io::Take<File>> {
        self.ensure_key_safe(key)?;
        let path = self.payload_path(key);
        let mut file = File::open(&path).await.map_err(map_missing_payload)?;
        file.seek(SeekFrom::Start(start)).await?;
        Ok(tokio::io::AsyncReadExt::take(file, end - start + 1))
    }

    /// Remove the payload. A missing file is not an error; the metadata row
    /// may outlive the payload during sweeps.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.ensure_key_safe(key)?;
        let path = self.payload_path(key);
        match fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Io(err)),
        }
    }
}

fn map_missing_payload(err: io::Error) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::NotFound("media payload not found".to_string())
    } else {
        Error::Io(err)
    }
}
