//! Diagnostic dumps for failures that happen before any host exception can
//! be raised, i.e. while the library is being loaded.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rand::distributions::Alphanumeric;
use rand::Rng;

const DUMP_PREFIX: &str = "callgate_ERROR_";
const DUMP_ID_LEN: usize = 12;

/// Write `message` to a fresh dump file in `dir`.
///
/// Never fails: a dump that cannot be written is logged and dropped, since
/// the caller is already reporting a failure of its own.
pub fn dump_error(dir: &Path, message: &str) -> Option<PathBuf> {
    match write_dump(dir, message) {
        Ok(path) => {
            tracing::error!(path = %path.display(), "startup failure written to dump file");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "could not write startup dump");
            None
        }
    }
}

fn write_dump(dir: &Path, message: &str) -> anyhow::Result<PathBuf> {
    let id: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DUMP_ID_LEN)
        .map(char::from)
        .collect();
    let path = dir.join(format!("{DUMP_PREFIX}{id}.txt"));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("can't create {}", path.display()))?;
    file.write_all(message.as_bytes())?;
    file.flush()?;
    Ok(path)
}
