use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "beacon.log";

static INIT: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Installs the global subscriber once per process. Logs go to
/// `<data_dir>/beacon.log`, or stderr when the file can't be opened.
/// Never panics; a subscriber installed by someone else is left alone.
pub fn init_logging(data_dir: &str) {
    INIT.call_once(|| {
        let dir = Path::new(data_dir);
        let file = std::fs::create_dir_all(dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))
        });

        let installed = match file {
            Ok(file) => tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init(),
            Err(e) => {
                eprintln!("[beacon] log file unavailable ({e}); logging to stderr");
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter())
                    .with_writer(std::io::stderr)
                    .try_init()
            }
        };
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    });
}
