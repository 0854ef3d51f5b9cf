#![allow(dead_code)]

use podnet::{InteractionRow, PostKind, PostRow, SentenceRow};
use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Epoch of the first fixture post (2006-01-01T00:00:00Z).
pub const T0: i64 = 1136073600;

/// Write plain JSONL lines (raw pages may be uncompressed).
pub fn write_jsonl_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
}

/// Write a compressed `.zst` file containing the provided JSONL lines.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Fresh temporary directory that outlives the test (removed by the OS).
pub fn tempdir() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// Build a tiny raw corpus `programming` under `{base}/input`:
/// - `programming_submissions.jsonl.zst`: s1 by "alice" (title + selftext, three sentences).
/// - `programming_comments_0001.jsonl`: c1 by "bob" replying to s1, c2 by "alice" replying
///   to c1, c3 by "[deleted]" replying to s1, c4 by "carol" replying to a post that is not
///   in the corpus (its parent author cannot be resolved).
///
/// Timestamps are T0, T0+100, T0+200, T0+300, T0+400.
pub fn make_raw_corpus(base: &Path) -> PathBuf {
    let input = base.join("input");
    let subs = vec![json!({
        "id": "s1", "author": "alice", "subreddit": "programming", "created_utc": T0,
        "title": "Rust news",
        "selftext": "The borrow checker is strict. It catches real bugs early! Ok.",
        "score": 10, "num_comments": 4
    })
    .to_string()];
    write_zst_lines(&input.join("programming_submissions.jsonl.zst"), &subs);

    let coms = vec![
        json!({
            "id": "c1", "author": "bob", "subreddit": "programming", "created_utc": T0 + 100,
            "parent_id": "t3_s1", "link_id": "t3_s1",
            "body": "I agree with that. Lifetimes took me a while to learn."
        })
        .to_string(),
        json!({
            "id": "c2", "author": "alice", "subreddit": "programming", "created_utc": (T0 + 200).to_string(),
            "parent_id": "t1_c1", "link_id": "t3_s1",
            "body": "Thanks for the reply.\nKeep at it, it gets easier."
        })
        .to_string(),
        json!({
            "id": "c3", "author": "[deleted]", "subreddit": "programming", "created_utc": T0 + 300,
            "parent_id": "t3_s1", "link_id": "t3_s1", "body": "[deleted]"
        })
        .to_string(),
        json!({
            "id": "c4", "author": "carol", "subreddit": "programming", "created_utc": T0 + 400,
            "parent_id": "t1_gone", "link_id": "t3_gone", "body": "Nobody knows who I answered here."
        })
        .to_string(),
    ];
    write_jsonl_lines(&input.join("programming_comments_0001.jsonl"), &coms);
    input
}

pub fn utc(epoch: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(epoch).unwrap()
}

pub fn post(id: &str, parent_id: &str, author: &str, epoch: i64, text: &str) -> PostRow {
    let kind = if id == parent_id { PostKind::Submission } else { PostKind::Comment };
    PostRow {
        id: id.to_string(),
        parent_id: parent_id.to_string(),
        author: author.to_string(),
        subreddit: "x".to_string(),
        datetime: utc(epoch),
        text: text.to_string(),
        kind,
    }
}

pub fn interaction(author: &str, post_id: &str, parent_id: &str, subreddit: &str, epoch: i64) -> InteractionRow {
    InteractionRow {
        author: author.to_string(),
        post_id: post_id.to_string(),
        parent_id: parent_id.to_string(),
        subreddit: subreddit.to_string(),
        datetime: utc(epoch),
    }
}

pub fn sentence(post_id: &str, index: usize, text: &str) -> SentenceRow {
    SentenceRow {
        id_sentence: format!("{post_id}_{index}"),
        sentence: text.to_string(),
        post_id: post_id.to_string(),
        sentence_position_in_post: index,
    }
}

/// Minimal config text for the fixture corpus.
pub fn config_toml(input: &Path, output: &Path) -> String {
    format!(
        r#"
analysis_id = "fixture"
subreddits = ["r/Programming"]

[paths]
input_dir = {input:?}
output_dir = {output:?}

[blockmodel]
refine = "none"
seed = 7
"#,
        input = input.display().to_string(),
        output = output.display().to_string(),
    )
}
