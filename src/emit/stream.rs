//! Streams that emit reads from and writes to.
//!
//! Emit checks the capabilities of every stream against its role before doing any
//! work, so streams report what they support instead of failing late.
//!
//! # Key Components
//!
//! - [`OutputStream`] / [`InputStream`] - Capability-reporting stream seams
//! - [`MemoryStream`] - In-memory stream with configurable capabilities
//! - [`FileOutput`] - File sink that writes the finished image through a memory map
//!
//! # Usage Examples
//!
//! ```rust
//! use dotcompile::emit::{MemoryStream, OutputStream};
//!
//! let mut stream = MemoryStream::new();
//! stream.write_all(b"MZ")?;
//! assert_eq!(stream.position(), 2);
//! assert_eq!(stream.into_inner(), b"MZ");
//! # Ok::<(), dotcompile::Error>(())
//! ```

use std::path::{Path, PathBuf};

use memmap2::MmapOptions;

use crate::{Error, Result};

/// A stream emit writes into.
pub trait OutputStream: Send {
    /// `true` if [`OutputStream::write_all`] is supported.
    fn can_write(&self) -> bool;

    /// `true` if the stream can be read back.
    fn can_read(&self) -> bool {
        false
    }

    /// `true` if the stream supports random access.
    fn can_seek(&self) -> bool {
        false
    }

    /// Appends `data` at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the stream is not writable, or an I/O error.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Current write position.
    fn position(&self) -> u64;
}

/// A stream emit reads from.
pub trait InputStream: Send {
    /// `true` if the stream can be read.
    fn can_read(&self) -> bool;

    /// `true` if the stream supports random access.
    fn can_seek(&self) -> bool;

    /// Reads everything from the current position to the end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the stream is not readable, or an I/O error.
    fn read_to_end(&mut self) -> Result<Vec<u8>>;
}

/// A growable in-memory stream.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: usize,
    readable: bool,
    writable: bool,
    seekable: bool,
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStream {
    /// An empty readable, writable and seekable stream.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(Vec::new(), true, true, true)
    }

    /// A readable, seekable stream over `data` that rejects writes.
    #[must_use]
    pub fn read_only(data: impl Into<Vec<u8>>) -> Self {
        Self::with_capabilities(data.into(), true, false, true)
    }

    /// A stream over `data` with explicit capabilities.
    #[must_use]
    pub fn with_capabilities(data: Vec<u8>, readable: bool, writable: bool, seekable: bool) -> Self {
        MemoryStream {
            data,
            position: 0,
            readable,
            writable,
            seekable,
        }
    }

    /// Everything written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the stream and returns its bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl OutputStream for MemoryStream {
    fn can_write(&self) -> bool {
        self.writable
    }

    fn can_read(&self) -> bool {
        self.readable
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::InvalidOperation(
                "stream does not support writing".to_string(),
            ));
        }

        let end = self.position + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(data);
        self.position = end;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position as u64
    }
}

impl InputStream for MemoryStream {
    fn can_read(&self) -> bool {
        self.readable
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }

    fn read_to_end(&mut self) -> Result<Vec<u8>> {
        if !self.readable {
            return Err(Error::InvalidOperation(
                "stream does not support reading".to_string(),
            ));
        }
        let rest = self.data[self.position.min(self.data.len())..].to_vec();
        self.position = self.data.len();
        Ok(rest)
    }
}

/// A write-only file sink.
///
/// Bytes are buffered until [`FileOutput::finalize`], which sizes the file once and
/// copies the image through a writable memory map. A sink dropped without being
/// finalized removes its file.
pub struct FileOutput {
    buffer: Vec<u8>,
    target_path: PathBuf,
    finalized: bool,
}

impl FileOutput {
    /// Creates (or truncates) the file at `target_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(target_path: P) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target_path)?;

        Ok(FileOutput {
            buffer: Vec::new(),
            target_path,
            finalized: false,
        })
    }

    /// Path of the output file.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Writes the buffered bytes to disk and flushes them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be resized, mapped or flushed.
    pub fn finalize(mut self) -> Result<()> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.target_path)?;
        file.set_len(self.buffer.len() as u64)?;

        // Zero-length files cannot be mapped
        if !self.buffer.is_empty() {
            // SAFETY: the file was opened by this sink and is not shared while mapped.
            let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };
            mmap.copy_from_slice(&self.buffer);
            mmap.flush()?;
        }

        file.sync_all()?;
        self.finalized = true;
        Ok(())
    }
}

impl OutputStream for FileOutput {
    fn can_write(&self) -> bool {
        !self.finalized
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(Error::InvalidOperation(format!(
                "'{}' has already been finalized",
                self.target_path.display()
            )));
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = std::fs::remove_file(&self.target_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_stream_overwrites_and_extends() {
        let mut stream = MemoryStream::new();
        stream.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(stream.position(), 3);
        assert_eq!(stream.read_to_end().unwrap(), Vec::<u8>::new());
        assert_eq!(stream.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_read_only_stream_rejects_writes() {
        let mut stream = MemoryStream::read_only(vec![7u8; 4]);
        assert!(!OutputStream::can_write(&stream));
        assert!(matches!(
            stream.write_all(&[0]),
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(stream.read_to_end().unwrap(), vec![7u8; 4]);
        assert!(stream.read_to_end().unwrap().is_empty());
    }

    #[test]
    fn test_file_output_finalize_and_cleanup() {
        let dir = std::env::temp_dir();
        let kept = dir.join(format!("dotcompile-out-{}.bin", std::process::id()));
        let mut output = FileOutput::create(&kept).unwrap();
        output.write_all(b"MZ\x90\x00").unwrap();
        output.finalize().unwrap();
        assert_eq!(std::fs::read(&kept).unwrap(), b"MZ\x90\x00");
        std::fs::remove_file(&kept).unwrap();

        let dropped = dir.join(format!("dotcompile-drop-{}.bin", std::process::id()));
        {
            let mut output = FileOutput::create(&dropped).unwrap();
            output.write_all(b"partial").unwrap();
        }
        assert!(!dropped.exists());
    }
}
