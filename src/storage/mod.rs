//! Artifact persistence.
//!
//! Values are written as one JSON frame inside the binary envelope described
//! in [`codec`], through an [`ArtifactWriter`] so that saves are atomic.
//! Structural validation of what was loaded is the caller's job; this layer
//! only guarantees the bytes are intact and parse.

pub mod codec;
mod writer;

use std::fs::File;
use std::io::{BufReader, Error as IoError, ErrorKind, Read};
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

pub use writer::ArtifactWriter;

/// Persistence tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Whether to fsync the artifact before it replaces the destination.
    pub sync_on_write: bool,

    /// Largest JSON payload a save may write, in bytes.
    pub max_artifact_size: usize,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_artifact_size: codec::MAX_FRAME_SIZE,
        }
    }
}

impl PersistConfig {
    /// Smallest accepted `max_artifact_size` (4 KiB).
    pub const MIN_ARTIFACT_SIZE: usize = 4 * 1024;

    /// Validates configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `max_artifact_size` is below
    /// [`Self::MIN_ARTIFACT_SIZE`] or above what the codec can read back.
    pub fn validate(self) -> ModelResult<Self> {
        if self.max_artifact_size < Self::MIN_ARTIFACT_SIZE {
            return Err(ModelError::InvalidConfig {
                reason: format!(
                    "max_artifact_size must be at least {} bytes (got {})",
                    Self::MIN_ARTIFACT_SIZE,
                    self.max_artifact_size
                ),
            });
        }

        if self.max_artifact_size > codec::MAX_FRAME_SIZE {
            return Err(ModelError::InvalidConfig {
                reason: format!(
                    "max_artifact_size must be at most {} bytes (got {})",
                    codec::MAX_FRAME_SIZE,
                    self.max_artifact_size
                ),
            });
        }

        Ok(self)
    }
}

/// Frame overhead around the JSON payload: version, length and checksum.
const FRAME_OVERHEAD: usize = 1 + 4 + 4;

fn read_error(path: &Path, e: std::io::Error) -> ModelError {
    match e.kind() {
        ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
            ModelError::corrupt(format!("{}: {e}", path.display()))
        }
        _ => ModelError::io(format!("reading {}", path.display()), e),
    }
}

/// Atomically writes `value` to `path`. Returns the number of bytes written.
pub fn save_artifact<T: Serialize>(
    path: &Path,
    value: &T,
    config: PersistConfig,
) -> ModelResult<u64> {
    let config = config.validate()?;
    let frame = codec::encode(value).map_err(|e| match e.kind() {
        ErrorKind::InvalidData => ModelError::corrupt(e.to_string()),
        _ => ModelError::io("encoding artifact", e),
    })?;
    let context = || format!("writing {}", path.display());
    let payload = frame.len().saturating_sub(FRAME_OVERHEAD);
    if payload > config.max_artifact_size {
        return Err(ModelError::io(
            context(),
            IoError::new(
                ErrorKind::InvalidInput,
                format!(
                    "artifact payload of {payload} bytes exceeds max_artifact_size {}",
                    config.max_artifact_size
                ),
            ),
        ));
    }
    let mut writer = ArtifactWriter::create(path, config.sync_on_write)
        .map_err(|e| ModelError::io(context(), e))?;
    writer
        .write_frame(&frame)
        .map_err(|e| ModelError::io(context(), e))?;
    writer.commit().map_err(|e| ModelError::io(context(), e))?;
    Ok((codec::MAGIC.len() + 1 + frame.len()) as u64)
}

/// Reads a value written by [`save_artifact`].
///
/// # Errors
/// - `Io` if the file cannot be opened or read
/// - `CorruptArtifact` on a bad header, checksum, size, trailing bytes or
///   JSON that does not match `T`
pub fn load_artifact<T: DeserializeOwned>(path: &Path) -> ModelResult<T> {
    let file =
        File::open(path).map_err(|e| ModelError::io(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);
    codec::read_header(&mut reader).map_err(|e| read_error(path, e))?;
    let value = codec::decode(&mut reader).map_err(|e| read_error(path, e))?;

    let mut trailing = [0u8; 1];
    match reader.read(&mut trailing) {
        Ok(0) => Ok(value),
        Ok(_) => Err(ModelError::corrupt(format!(
            "{}: trailing bytes after artifact frame",
            path.display()
        ))),
        Err(e) => Err(read_error(path, e)),
    }
}

/// Pretty JSON rendering, for inspection.
pub fn to_json_pretty<T: Serialize>(value: &T) -> ModelResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ModelError::corrupt(format!("serialization failed: {e}")))
}

/// Parses JSON produced by [`to_json_pretty`].
pub fn from_json<T: DeserializeOwned>(json: &str) -> ModelResult<T> {
    serde_json::from_str(json).map_err(|e| ModelError::corrupt(format!("invalid JSON: {e}")))
}
