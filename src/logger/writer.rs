//! Size-rotating file writer.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

use crate::logger::config::{FileConfig, RotationConfig};
use crate::logger::error::LoggerError;

/// File writer with numbered size-based rotation. On write failure it
/// falls back to stderr for the rest of the process lifetime.
#[derive(Clone)]
pub struct RotatingFileWriter {
    state: Arc<Mutex<WriterState>>,
}

struct WriterState {
    path: PathBuf,
    rotation: RotationConfig,
    file: BufWriter<File>,
    current_size: u64,
    fallback_mode: bool,
}

impl RotatingFileWriter {
    pub fn new(config: &FileConfig) -> Result<Self, LoggerError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = open_log_file(&config.path, config.append)?;
        let current_size = if config.append {
            fs::metadata(&config.path).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            state: Arc::new(Mutex::new(WriterState {
                path: config.path.clone(),
                rotation: config.rotation.clone(),
                file,
                current_size,
                fallback_mode: false,
            })),
        })
    }

    pub fn is_in_fallback_mode(&self) -> bool {
        self.state.lock().map(|s| s.fallback_mode).unwrap_or(false)
    }
}

/// Path of the `index`-th rotated file, e.g. `courier.log.2`.
pub(crate) fn rotated_path(base: &Path, index: usize) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}", index));
    base.with_file_name(name)
}

/// Shifts `base.N-1 -> base.N ... base -> base.1`, dropping the oldest.
fn rotate_files(base: &Path, max_files: usize) -> Result<(), LoggerError> {
    let oldest = rotated_path(base, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)
            .map_err(|e| LoggerError::rotation(format!("remove {}: {}", oldest.display(), e)))?;
    }
    for index in (1..max_files).rev() {
        let from = rotated_path(base, index);
        if from.exists() {
            fs::rename(&from, rotated_path(base, index + 1))?;
        }
    }
    if base.exists() {
        fs::rename(base, rotated_path(base, 1))?;
    }
    Ok(())
}

impl WriterState {
    fn rotate(&mut self) -> Result<(), LoggerError> {
        self.file.flush()?;
        rotate_files(&self.path, self.rotation.max_files)?;
        self.file = open_log_file(&self.path, false)?;
        self.current_size = 0;
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriterGuard {
            state: self.state.clone(),
        }
    }
}

pub struct RotatingWriterGuard {
    state: Arc<Mutex<WriterState>>,
}

impl Write for RotatingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("Failed to acquire writer lock"))?;

        if state.fallback_mode {
            return io::stderr().write(buf);
        }

        if state.current_size >= state.rotation.max_size
            && let Err(e) = state.rotate()
        {
            state.fallback_mode = true;
            eprintln!("[Logger] Log rotation failed, falling back to stderr: {}", e);
            return io::stderr().write(buf);
        }

        match state.file.write(buf) {
            Ok(written) => {
                state.current_size += written as u64;
                Ok(written)
            }
            Err(e) => {
                state.fallback_mode = true;
                eprintln!("[Logger] File write failed, falling back to stderr: {}", e);
                io::stderr().write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("Failed to acquire writer lock"))?;
        if state.fallback_mode {
            return io::stderr().flush();
        }
        state.file.flush()
    }
}

impl Drop for RotatingWriterGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            let _ = state.file.flush();
        }
    }
}

fn open_log_file(path: &Path, append: bool) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::config::LogFormat;
    use tempfile::tempdir;

    fn config(path: PathBuf, max_size: u64, max_files: usize) -> FileConfig {
        FileConfig {
            enabled: true,
            path,
            append: true,
            format: LogFormat::Json,
            rotation: RotationConfig {
                max_size,
                max_files,
            },
        }
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/logs/courier.log");
        let writer = RotatingFileWriter::new(&config(path.clone(), 1024, 3)).unwrap();
        let mut guard = writer.make_writer();
        guard.write_all(b"hello\n").unwrap();
        guard.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert!(!writer.is_in_fallback_mode());
    }

    #[test]
    fn test_rotates_by_size_and_caps_file_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.log");
        let writer = RotatingFileWriter::new(&config(path.clone(), 10, 2)).unwrap();

        for line in ["first-line\n", "second-line\n", "third-line\n", "fourth-line\n"] {
            let mut guard = writer.make_writer();
            guard.write_all(line.as_bytes()).unwrap();
            guard.flush().unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "fourth-line\n");
        assert_eq!(fs::read_to_string(rotated_path(&path, 1)).unwrap(), "third-line\n");
        assert_eq!(fs::read_to_string(rotated_path(&path, 2)).unwrap(), "second-line\n");
        assert!(!rotated_path(&path, 3).exists());
    }

    #[test]
    fn test_rotated_path_naming() {
        assert_eq!(
            rotated_path(Path::new("logs/courier.log"), 3),
            PathBuf::from("logs/courier.log.3")
        );
    }
}
