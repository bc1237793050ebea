//! Byte sources for attachment payloads
//!
//! Payloads are referenced, not loaded: a file-backed source is only opened
//! when a byte range is requested, so a large video never has to fit in memory.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// File on disk, read lazily with positioned reads
    File(PathBuf),
    /// Buffer produced in-process by an upstream pipeline
    Memory(Arc<[u8]>),
}

impl PayloadSource {
    /// Read exactly `len` bytes starting at `start`
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` if the range extends past the end of the payload.
    pub async fn read_range(&self, start: u64, len: u64) -> std::io::Result<Vec<u8>> {
        match self {
            PayloadSource::File(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                let mut buf = vec![0u8; len as usize];
                file.read_exact(&mut buf).await?;
                Ok(buf)
            }
            PayloadSource::Memory(bytes) => {
                let end = start.checked_add(len).filter(|end| *end <= bytes.len() as u64);
                match end {
                    Some(end) => Ok(bytes[start as usize..end as usize].to_vec()),
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!(
                            "range {}+{} exceeds payload of {} bytes",
                            start,
                            len,
                            bytes.len()
                        ),
                    )),
                }
            }
        }
    }

    /// Read the whole payload (used for single-shot image uploads)
    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        match self {
            PayloadSource::File(path) => tokio::fs::read(path).await,
            PayloadSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// Path on disk, if the payload lives in a file
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            PayloadSource::File(path) => Some(path),
            PayloadSource::Memory(_) => None,
        }
    }
}
