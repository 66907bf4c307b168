//! Atomic artifact writes.
//!
//! Data goes to a uniquely named temp file beside the destination and is
//! renamed over it only after a successful flush, so a reader sees either the
//! old file or the complete new one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::codec;

/// Writes one artifact through a temp file.
pub struct ArtifactWriter {
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
    sync_on_write: bool,
}

impl ArtifactWriter {
    /// Opens a temp file next to `final_path` and writes the header.
    pub fn create(final_path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let file_name = final_path
            .file_name()
            .ok_or_else(|| IoError::new(ErrorKind::InvalidInput, "destination has no file name"))?;
        let mut temp_name = file_name.to_os_string();
        temp_name.push(format!(".tmp.{}", Uuid::new_v4()));
        let temp_path = final_path.with_file_name(temp_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer)?;

        Ok(Self {
            temp_path: Some(temp_path),
            final_path: final_path.to_path_buf(),
            writer: Some(writer),
            sync_on_write,
        })
    }

    /// Appends an encoded frame.
    pub fn write_frame(&mut self, frame: &[u8]) -> IoResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "writer already consumed"))?;
        writer.write_all(frame)
    }

    /// Flushes, optionally fsyncs, and renames over the destination.
    pub fn commit(mut self) -> IoResult<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "writer already consumed"))?;
        writer.flush()?;
        if self.sync_on_write {
            writer.get_ref().sync_all()?;
        }
        drop(writer);

        let temp_path = self
            .temp_path
            .take()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "temp path already consumed"))?;
        if let Err(e) = fs::rename(&temp_path, &self.final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        self.writer.take();
        if let Some(ref temp_path) = self.temp_path {
            if temp_path.exists() {
                let _ = fs::remove_file(temp_path);
            }
        }
    }
}
