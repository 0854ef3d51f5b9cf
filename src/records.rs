//! Raw Reddit dumps → uniform post rows.
//!
//! Submissions and comments arrive as heterogeneous JSON objects. Both are reduced to
//! [`PostRow`] with fullname ids (`t3_` / `t1_`), a single `text` column and a UTC
//! `datetime`. Submissions are their own parent so every row carries a `parent_id`.

use crate::date::{created_utc_from_value, datetime_from_epoch};
use crate::error::SchemaError;
use crate::table::for_each_line;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use walkdir::WalkDir;

/// Placeholder Reddit writes for removed authors and bodies.
pub const DELETED: &str = "[deleted]";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Submission,
    Comment,
}

impl PostKind {
    fn table(self) -> &'static str {
        match self {
            PostKind::Submission => "submissions",
            PostKind::Comment => "comments",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            PostKind::Submission => "t3_",
            PostKind::Comment => "t1_",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: String,
    pub parent_id: String,
    pub author: String,
    pub subreddit: String,
    #[serde(with = "time::serde::rfc3339")]
    pub datetime: OffsetDateTime,
    pub text: String,
    pub kind: PostKind,
}

impl PostRow {
    pub fn is_submission(&self) -> bool {
        self.kind == PostKind::Submission
    }
}

pub fn normalize_submissions(records: &[Value]) -> Result<Vec<PostRow>> {
    records
        .iter()
        .enumerate()
        .map(|(i, v)| normalize_one(PostKind::Submission, i, v))
        .collect()
}

pub fn normalize_comments(records: &[Value]) -> Result<Vec<PostRow>> {
    records
        .iter()
        .enumerate()
        .map(|(i, v)| normalize_one(PostKind::Comment, i, v))
        .collect()
}

/// Submissions first, then comments, each in input order.
pub fn merge_submissions_and_comments(submissions: Vec<PostRow>, comments: Vec<PostRow>) -> Vec<PostRow> {
    let mut out = submissions;
    out.extend(comments);
    out
}

fn normalize_one(kind: PostKind, index: usize, v: &Value) -> Result<PostRow> {
    let table = kind.table();
    let obj = v.as_object().ok_or(SchemaError::NotAnObject { table, index })?;

    let id = with_prefix(&required_str(obj, table, index, "id")?, kind.prefix());
    let author = required_str(obj, table, index, "author")?;
    let subreddit = required_str(obj, table, index, "subreddit")?;
    let created = required(obj, table, index, "created_utc")?;
    let context = format!("{table} record {index}");
    let epoch = created_utc_from_value(created, &context)?;
    let datetime = datetime_from_epoch(epoch, &context)?;

    let (parent_id, text) = match kind {
        PostKind::Submission => {
            let title = text_field(obj, table, index, "title")?;
            let selftext = text_field(obj, table, index, "selftext")?;
            let text = match (title.is_empty(), selftext.is_empty()) {
                (false, false) => format!("{title} {selftext}"),
                (false, true) => title,
                _ => selftext,
            };
            (id.clone(), text)
        }
        PostKind::Comment => {
            let body = text_field(obj, table, index, "body")?;
            let parent = required_str(obj, table, index, "parent_id")?;
            (parent, body)
        }
    };

    Ok(PostRow { id, parent_id, author, subreddit, datetime, text, kind })
}

fn with_prefix(id: &str, prefix: &str) -> String {
    if id.starts_with(prefix) {
        id.to_string()
    } else {
        format!("{prefix}{id}")
    }
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    table: &'static str,
    index: usize,
    field: &'static str,
) -> Result<&'a Value, SchemaError> {
    obj.get(field).ok_or(SchemaError::MissingField { table, index, field })
}

fn required_str(
    obj: &Map<String, Value>,
    table: &'static str,
    index: usize,
    field: &'static str,
) -> Result<String, SchemaError> {
    match required(obj, table, index, field)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(SchemaError::NotAString { table, index, field }),
    }
}

/// Text columns: the key must exist, but `null` means an empty value and
/// the deleted placeholder is blanked.
fn text_field(
    obj: &Map<String, Value>,
    table: &'static str,
    index: usize,
    field: &'static str,
) -> Result<String, SchemaError> {
    match required(obj, table, index, field)? {
        Value::Null => Ok(String::new()),
        Value::String(s) if s == DELETED => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        _ => Err(SchemaError::NotAString { table, index, field }),
    }
}

/// One page of raw records on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFile {
    pub path: PathBuf,
    pub kind: PostKind,
    pub page: u32,
}

/// Find `{corpus}_submissions[_NNNN].jsonl[.zst]` and `{corpus}_comments…` directly
/// under `dir`, ordered by kind then page number. The corpus prefix matches in any case.
pub fn discover_raw_files(dir: &Path, corpus: &str) -> Result<Vec<RawFile>> {
    let re = Regex::new(&format!(
        r"^(?i:{})_(submissions|comments)(?:_(\d+))?\.jsonl(?:\.zst)?$",
        regex::escape(corpus)
    ))?;
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("scan {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(caps) = re.captures(&name) else { continue };
        let kind = if &caps[1] == "submissions" { PostKind::Submission } else { PostKind::Comment };
        let page = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        files.push(RawFile { path: entry.into_path(), kind, page });
    }
    files.sort_by(|a, b| {
        (a.kind == PostKind::Comment, a.page, &a.path).cmp(&(b.kind == PostKind::Comment, b.page, &b.path))
    });
    Ok(files)
}

/// Every JSON object in a raw page. A line that is not valid JSON stops the load.
pub fn load_raw_records(path: &Path) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for_each_line(path, |lineno, line| {
        let v: Value = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed JSON record", path.display(), lineno))?;
        out.push(v);
        Ok(())
    })?;
    Ok(out)
}

/// Load and normalize all raw pages for a corpus into one merged table.
pub fn load_corpus(dir: &Path, corpus: &str) -> Result<Vec<PostRow>> {
    let files = discover_raw_files(dir, corpus)?;
    if files.is_empty() {
        anyhow::bail!("no raw submission or comment files for corpus `{corpus}` in {}", dir.display());
    }
    let mut subs = Vec::new();
    let mut coms = Vec::new();
    for f in &files {
        let records = load_raw_records(&f.path)?;
        let rows = match f.kind {
            PostKind::Submission => normalize_submissions(&records),
            PostKind::Comment => normalize_comments(&records),
        }
        .with_context(|| format!("normalize {}", f.path.display()))?;
        tracing::debug!(path = %f.path.display(), rows = rows.len(), "raw page normalized");
        match f.kind {
            PostKind::Submission => subs.extend(rows),
            PostKind::Comment => coms.extend(rows),
        }
    }
    Ok(merge_submissions_and_comments(subs, coms))
}

/// Keep `n` randomly chosen submissions and the comments replying directly to them.
/// Row order is preserved. `n` at or above the submission count keeps everything.
pub fn sample_conversations(rows: Vec<PostRow>, n: usize, seed: u64) -> Vec<PostRow> {
    let submissions: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_submission())
        .map(|(i, _)| i)
        .collect();
    if n >= submissions.len() {
        return rows;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let picked: ahash::AHashSet<String> = sample(&mut rng, submissions.len(), n)
        .into_iter()
        .map(|k| rows[submissions[k]].id.clone())
        .collect();

    rows.into_iter()
        .filter(|r| if r.is_submission() { picked.contains(&r.id) } else { picked.contains(&r.parent_id) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefix_is_not_doubled() {
        assert_eq!(with_prefix("t3_abc", "t3_"), "t3_abc");
        assert_eq!(with_prefix("abc", "t1_"), "t1_abc");
    }

    #[test]
    fn title_only_submission_has_no_trailing_space() {
        let rows = normalize_submissions(&[json!({
            "id": "x", "author": "a", "subreddit": "s", "created_utc": 1,
            "title": "Hello", "selftext": DELETED,
        })])
        .unwrap();
        assert_eq!(rows[0].text, "Hello");
        assert_eq!(rows[0].parent_id, "t3_x");
    }
}
