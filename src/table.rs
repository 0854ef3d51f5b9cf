//! Stage tables on disk: zstd-compressed newline-delimited JSON, one typed row per line.
//! Writes go to a `.inprogress` staging file and are promoted atomically, so a failed
//! stage never leaves a truncated table behind for the next stage to pick up.

use crate::util::{create_with_backoff, open_with_backoff, replace_file_atomic};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

const ZSTD_LEVEL: i32 = 9;
const IO_BUFFER: usize = 256 * 1024;

/// `{dir}/{corpus}_{stage}.jsonl.zst`
pub fn table_path(dir: &Path, corpus: &str, stage: &str) -> PathBuf {
    dir.join(format!("{corpus}_{stage}.jsonl.zst"))
}

/// `{dir}/{corpus}_author_network.json.zst`
pub fn graph_path(dir: &Path, corpus: &str) -> PathBuf {
    dir.join(format!("{corpus}_author_network.json.zst"))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".inprogress");
    path.with_file_name(name)
}

/// Write all rows, returning the number written.
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    write_compressed(path, |w| {
        for row in rows {
            serde_json::to_writer(&mut *w, row)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    })?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "table written");
    Ok(rows.len())
}

/// Read every row. A line that does not deserialize into `T` is a schema problem
/// and fails the read with its line number.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    for_each_line(path, |lineno, line| {
        let row: T = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: unexpected row shape", path.display(), lineno))?;
        rows.push(row);
        Ok(())
    })?;
    Ok(rows)
}

/// Serialize one value as a compressed JSON document.
pub fn write_json_zst<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_compressed(path, |w| {
        serde_json::to_writer(&mut *w, value)?;
        Ok(())
    })
}

pub fn read_json_zst<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = open_with_backoff(path).with_context(|| format!("open {}", path.display()))?;
    let decoder = Decoder::new(file)?;
    let value = serde_json::from_reader(BufReader::with_capacity(IO_BUFFER, decoder))
        .with_context(|| format!("decode {}", path.display()))?;
    Ok(value)
}

/// Stream the non-empty lines of a JSONL file, zstd-compressed when the name ends in `.zst`.
/// The callback receives the 1-based line number.
pub fn for_each_line(path: &Path, mut on_line: impl FnMut(usize, &str) -> Result<()>) -> Result<()> {
    let file = open_with_backoff(path).with_context(|| format!("open {}", path.display()))?;
    let reader: Box<dyn BufRead> = if path.extension().map_or(false, |e| e == "zst") {
        let mut decoder = Decoder::new(file)?;
        decoder.window_log_max(31)?;
        Box::new(BufReader::with_capacity(IO_BUFFER, decoder))
    } else {
        Box::new(BufReader::with_capacity(IO_BUFFER, file))
    };

    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("{}:{}: read failed", path.display(), i + 1))?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        on_line(i + 1, line)?;
    }
    Ok(())
}

fn write_compressed(path: &Path, body: impl FnOnce(&mut dyn Write) -> Result<()>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = staging_path(path);
    let staged = write_staged(&tmp, body).and_then(|()| replace_file_atomic(&tmp, path));
    if staged.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    staged
}

fn write_staged(tmp: &Path, body: impl FnOnce(&mut dyn Write) -> Result<()>) -> Result<()> {
    let file = create_with_backoff(tmp).with_context(|| format!("create {}", tmp.display()))?;
    let mut enc = Encoder::new(BufWriter::with_capacity(IO_BUFFER, file), ZSTD_LEVEL)?;
    body(&mut enc).with_context(|| format!("write {}", tmp.display()))?;
    let mut inner = enc.finish()?;
    inner.flush()?;
    Ok(())
}
