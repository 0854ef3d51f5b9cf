use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};
use std::thread::sleep;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static INIT_ONCE: Once = Once::new();

/// Install the global tracing subscriber once. `RUST_LOG` wins over the default `info`.
/// With `log_file`, events go to that file (no ANSI colours) instead of stderr.
pub fn init_tracing_once(log_file: Option<&Path>) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let file = log_file.and_then(|p| match File::create(p) {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("cannot open log file {}: {e}; logging to stderr", p.display());
                None
            }
        });
        let _ = match file {
            Some(f) => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(f))
                .try_init(),
            None => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        };
    });
}

/// Trimmed subreddit name without a leading `r/`, spelling kept. Used for file names.
pub fn corpus_name(s: &str) -> String {
    let s = s.trim();
    match s.get(..2) {
        Some(p) if p.eq_ignore_ascii_case("r/") => s[2..].to_string(),
        _ => s.to_string(),
    }
}

/// Case-insensitive comparison key for a subreddit name.
#[inline]
pub fn normalize_str(s: &str) -> String {
    corpus_name(s).to_lowercase()
}

/// Transient errors seen on network volumes and on Windows when AV/backup
/// filter drivers hold a handle (access denied, sharing/lock violation, device not ready).
fn is_retriable_io_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(5) | Some(21) | Some(32) | Some(33) | Some(1117) | Some(1224))
        || e.kind() == io::ErrorKind::Interrupted
}

/// Run a filesystem operation, retrying transient failures with linear backoff.
pub fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let tries = tries.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < tries && is_retriable_io_error(&e) => {
                attempt += 1;
                sleep(Duration::from_millis(delay_ms.saturating_mul(attempt as u64)));
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn open_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(16, 50, || File::open(path))
}

pub fn create_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(16, 50, || File::create(path))
}

/// Promote a finished staging file to `dest`, replacing any previous version.
/// Falls back to copy + remove when the rename is refused (cross-device or held open).
pub fn replace_file_atomic(tmp: &Path, dest: &Path) -> Result<()> {
    if with_backoff(20, 50, || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    with_backoff(20, 50, || fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    with_backoff(20, 50, || match fs::remove_file(tmp) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    })
    .with_context(|| format!("remove {}", tmp.display()))?;
    Ok(())
}
