//! Emulator log sink.

use log::{Log, Metadata, Record};


/// Install the stderr logger. `-v` raises the level from `Warn` to `Debug`.
pub fn init(verbose: bool) {
    match log::set_logger(&STDERR_LOGGER) {
        Ok(_) => {
            log::set_max_level(if verbose {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Warn
            });
        }
        Err(_) => eprintln!("vem: set logger failed"),
    }
}


struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            if record.level() < log::Level::Info {
                eprintln!(
                    "vem: [{}][{}:{}]: {}",
                    record.level(),
                    record.file().unwrap_or("<NONE>"),
                    record.line().unwrap_or_default(),
                    record.args()
                );
            } else {
                eprintln!("vem: [{}]: {}", record.level(), record.args());
            }
        }
    }

    fn flush(&self) {}
}

static STDERR_LOGGER: StderrLogger = StderrLogger;
