use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only log file with single-generation size rotation.
///
/// Writers within the process are serialised by the mutex; each line is
/// written with one `write_all` on an `O_APPEND` handle.
pub struct FileSink {
    path: PathBuf,
    max_bytes: u64,
    file: Mutex<Option<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the current file is moved to on rotation: `app.log` -> `app.log.1`.
    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    pub fn append(&self, line: &str) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file mutex poisoned"))?;

        let mut file = match guard.take() {
            Some(f) => f,
            None => self.open()?,
        };

        let incoming = line.len() as u64 + 1;
        let len = file.metadata()?.len();
        if self.max_bytes > 0 && len > 0 && len + incoming > self.max_bytes {
            drop(file);
            fs::rename(&self.path, self.rotated_path())?;
            file = self.open()?;
        }

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        let res = file.write_all(buf.as_bytes());
        *guard = Some(file);
        res
    }
}
