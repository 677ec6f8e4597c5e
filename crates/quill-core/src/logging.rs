//! Log-file writer for the server binaries.
//!
//! Installs a [`log`] backend that appends
//! `[<iso_timestamp>] [<LEVEL>] [<component>] <message>` lines to a log
//! file and mirrors them to stderr. The coordinator and each storage node
//! own one log file each (`logs/name_server.log`,
//! `logs/storage_server.log`).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use log::{LevelFilter, Metadata, Record};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

struct FileLogger {
    component: &'static str,
    sink: Mutex<File>,
}

#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("failed to create log directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("failed to open log file: {0}")]
    OpenFile(#[source] std::io::Error),
    #[error(transparent)]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

/// Installs the file logger for this process. `component` is the tag
/// written into every line.
pub fn init_file_logger(component: &'static str, path: &Path) -> Result<(), LogInitError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(LogInitError::CreateDir)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(LogInitError::OpenFile)?;
    log::set_boxed_logger(Box::new(FileLogger {
        component,
        sink: Mutex::new(file),
    }))?;
    log::set_max_level(LevelFilter::Debug);
    Ok(())
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "-".to_string());
        let line = format!(
            "[{}] [{}] [{}] {}",
            timestamp,
            record.level(),
            self.component,
            record.args()
        );
        eprintln!("{line}");
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{line}");
        }
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
    }
}
