use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use geocoder_core::Artifact;
use geocoder_logging::ingest_debug;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::filename::sanitize_filename;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cannot use {dir:?} as output directory: {reason}")]
    OutputDir { dir: PathBuf, reason: String },
    #[error("writing {path:?} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Creates `dir` when missing and checks that files can be created in it.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    let unusable = |reason: String| PersistError::OutputDir {
        dir: dir.to_path_buf(),
        reason,
    };
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => return Err(unusable("not a directory".to_string())),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| unusable(e.to_string()))?;
        }
        Err(err) => return Err(unusable(err.to_string())),
    }
    NamedTempFile::new_in(dir).map_err(|e| unusable(format!("not writable: {e}")))?;
    Ok(())
}

/// Writes result files into one directory through a synced temp file that is
/// renamed over the target, so readers never observe a partial workbook.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replaces `{dir}/{filename}` with `content`.
    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;
        let target = self.dir.join(filename);
        let failed = |source: io::Error| PersistError::Write {
            path: target.clone(),
            source,
        };

        let mut staged = NamedTempFile::new_in(&self.dir).map_err(failed)?;
        staged.write_all(content).map_err(failed)?;
        staged.as_file_mut().sync_all().map_err(failed)?;
        staged.persist(&target).map_err(|e| failed(e.error))?;

        ingest_debug!("wrote {} bytes to {:?}", content.len(), target);
        Ok(target)
    }

    /// Saves an artifact under its sanitized suggested name.
    pub fn write_artifact(&self, artifact: &Artifact) -> Result<PathBuf, PersistError> {
        self.write(&sanitize_filename(artifact.filename()), artifact.bytes())
    }
}
