//! File sink whose path is a strftime template
//!
//! The template is rendered against each record's timestamp. Whenever the
//! rendered path changes the old file is closed and the new one is opened on
//! the next write, so a template like `/jac_logs/%Y%m%d/TASK.log` rolls over
//! once per day and `%Y%m%d%H` once per hour.

use std::env;
use std::fmt::Write as FmtWrite;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};

use super::format::{is_valid_strftime, Formatter};
use super::record::LogRecord;
use super::sink::{Sink, SinkError};

/// Applies a permission mode to a freshly created directory
type ModeSetter = fn(&Path, u32) -> io::Result<()>;

#[cfg(unix)]
fn apply_dir_mode(dir: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_dir_mode(_dir: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Render `template` against `timestamp` in UTC or local time
pub fn resolve_path(
    template: &str,
    timestamp: &DateTime<Utc>,
    utc: bool,
) -> Result<String, SinkError> {
    if !is_valid_strftime(template) {
        return Err(SinkError::Template(template.to_string()));
    }

    let mut resolved = String::with_capacity(template.len() + 16);
    if utc {
        write!(resolved, "{}", timestamp.format(template))?;
    } else {
        write!(
            resolved,
            "{}",
            timestamp.with_timezone(&Local).format(template)
        )?;
    }
    Ok(resolved)
}

/// Directory part of `path`, or `.` for a bare file name
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Create `dir` if missing; `mode` is applied only to a directory created here
///
/// Losing a creation race to another process is fine. Failing to set the mode
/// is ignored: the directory may belong to someone else.
fn ensure_dir(dir: &Path, mode: Option<u32>, set_mode: ModeSetter) -> Result<(), SinkError> {
    if dir.is_dir() {
        return Ok(());
    }

    match fs::create_dir_all(dir) {
        Ok(()) => {
            if let Some(mode) = mode {
                let _ = set_mode(dir, mode);
            }
            Ok(())
        }
        Err(_) if dir.is_dir() => Ok(()),
        Err(source) => Err(SinkError::CreateDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

struct RotationState {
    path_template: String,
    use_utc: bool,
    dir_mode: Option<u32>,
    /// Last rendered template; `None` until the first record
    current_path: Option<String>,
    /// Absolute form of `current_path`, fixed at rollover
    file_path: Option<PathBuf>,
    /// Open handle for `file_path`, opened on first write
    file: Option<BufWriter<File>>,
}

impl RotationState {
    fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }
}

/// Appends records to a file whose path is derived from the record time
pub struct StrftimeFileSink {
    state: Mutex<RotationState>,
    formatter: Box<dyn Formatter>,
    set_mode: ModeSetter,
}

impl StrftimeFileSink {
    /// Sink rendering `path_template` in local time, without a directory mode
    pub fn new(path_template: impl Into<String>, formatter: Box<dyn Formatter>) -> Self {
        Self {
            state: Mutex::new(RotationState {
                path_template: path_template.into(),
                use_utc: false,
                dir_mode: None,
                current_path: None,
                file_path: None,
                file: None,
            }),
            formatter,
            set_mode: apply_dir_mode,
        }
    }

    /// Render the template in UTC instead of local time
    pub fn with_utc(mut self, utc: bool) -> Self {
        self.state_mut().use_utc = utc;
        self
    }

    /// Permission mode for directories this sink creates, e.g. `0o2777`
    pub fn with_dir_mode(mut self, mode: Option<u32>) -> Self {
        self.state_mut().dir_mode = mode;
        self
    }

    #[cfg(test)]
    fn with_mode_setter(mut self, set_mode: ModeSetter) -> Self {
        self.set_mode = set_mode;
        self
    }

    fn state_mut(&mut self) -> &mut RotationState {
        self.state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change the template; the next record rolls over if its path differs
    pub fn set_path_template(&self, path_template: impl Into<String>) {
        self.lock().path_template = path_template.into();
    }

    /// Switch between UTC and local time for the next record
    pub fn set_utc(&self, utc: bool) {
        self.lock().use_utc = utc;
    }

    /// Takes effect the next time a directory is created
    pub fn set_dir_mode(&self, mode: Option<u32>) {
        self.lock().dir_mode = mode;
    }

    /// The template currently in use
    pub fn path_template(&self) -> String {
        self.lock().path_template.clone()
    }

    /// Absolute path of the file currently written to, if any record was seen
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock().file_path.clone()
    }

    /// Flush and close the open file; the next record reopens it
    pub fn close(&self) {
        self.lock().close();
    }
}

impl Sink for StrftimeFileSink {
    fn name(&self) -> &str {
        "strftime-file"
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let resolved = resolve_path(&state.path_template, &record.timestamp, state.use_utc)?;
        if state.current_path.as_deref() != Some(resolved.as_str()) {
            state.close();

            let path = PathBuf::from(&resolved);
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                env::current_dir()
                    .map_err(|source| SinkError::Open {
                        path: path.clone(),
                        source,
                    })?
                    .join(&path)
            };
            state.current_path = Some(resolved);
            state.file_path = Some(absolute);

            ensure_dir(&parent_dir(&path), state.dir_mode, self.set_mode)?;
        }

        let text = self.formatter.format(record)?;

        if state.file.is_none() {
            if let Some(path) = &state.file_path {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| SinkError::Open {
                        path: path.clone(),
                        source,
                    })?;
                state.file = Some(BufWriter::new(file));
            }
        }

        if let Some(file) = state.file.as_mut() {
            writeln!(file, "{}", text)?;
            file.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        if let Some(file) = self.lock().file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for StrftimeFileSink {
    fn drop(&mut self) {
        self.state_mut().close();
    }
}
