//! Backend for the `log` facade: colored console output plus an append-only
//! file sink under the state directory.

use crate::env;
use chrono::Local;
use console::style;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

struct Logger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = styled_level(record.level());
        eprintln!("{now} {level} {}", record.args());
        if let Some(file) = &self.file {
            let mut file = match file.lock() {
                Ok(f) => f,
                Err(poisoned) => poisoned.into_inner(),
            };
            let _ = writeln!(file, "{now} {:5} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

fn styled_level(level: Level) -> String {
    match level {
        Level::Error => style("ERROR").red().to_string(),
        Level::Warn => style("WARN ").yellow().to_string(),
        Level::Info => style("INFO ").green().to_string(),
        Level::Debug => style("DEBUG").blue().to_string(),
        Level::Trace => style("TRACE").dim().to_string(),
    }
}

fn open_log_file() -> Option<File> {
    let path = &*env::HELL_LOG_FILE;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().append(true).create(true).open(path).ok()
}

pub fn init() {
    let logger = Logger {
        level: *env::HELL_LOG,
        file: open_log_file().map(Mutex::new),
    };
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(*env::HELL_LOG);
    }
}
