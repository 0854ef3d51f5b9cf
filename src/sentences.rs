//! Post text → sentence rows keyed by `"{post_id}_{index}"`.

use crate::records::PostRow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Byte range of one sentence inside the (line-break normalized) document text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Sentence boundary detection plus the token count used for the length filter.
pub trait SentenceSplitter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<Span>;
    fn count_tokens(&self, sentence: &str) -> usize;
}

/// Rule-based splitter: a run of `.`, `!` or `?`, optional closing quotes or brackets,
/// then whitespace, unless the next sentence would start in lowercase.
/// Tokens are words (with inner apostrophes) or single punctuation marks.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleSplitter;

static BOUNDARY: OnceLock<Regex> = OnceLock::new();
static TOKEN: OnceLock<Regex> = OnceLock::new();

fn boundary_re() -> &'static Regex {
    BOUNDARY.get_or_init(|| Regex::new(r#"[.!?]+["'”’)\]]*\s+"#).expect("static boundary regex"))
}

fn token_re() -> &'static Regex {
    TOKEN.get_or_init(|| Regex::new(r"\w+(?:['’]\w+)*|[^\w\s]").expect("static token regex"))
}

impl SentenceSplitter for RuleSplitter {
    fn segment(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut start = 0usize;
        for m in boundary_re().find_iter(text) {
            let next = text[m.end()..].chars().next();
            if next.map_or(false, char::is_lowercase) {
                continue;
            }
            // terminal punctuation and closing marks stay with the sentence
            let end = start.max(m.start() + text[m.start()..m.end()].trim_end().len());
            push_trimmed(text, start, end, &mut spans);
            start = m.end();
        }
        push_trimmed(text, start, text.len(), &mut spans);
        spans
    }

    fn count_tokens(&self, sentence: &str) -> usize {
        token_re().find_iter(sentence).count()
    }
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<Span>) {
    let piece = &text[start..end];
    let lead = piece.len() - piece.trim_start().len();
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        let s = start + lead;
        spans.push(Span { start: s, end: s + trimmed.len() });
    }
}

/// How `sentence_position_in_post` counts when short sentences are dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceIndexPolicy {
    /// Every candidate sentence is counted; dropped ones leave gaps.
    #[default]
    Candidate,
    /// Only kept sentences are counted, so indices are dense.
    Retained,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentOptions {
    pub min_tokens: usize,
    pub policy: SentenceIndexPolicy,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self { min_tokens: 3, policy: SentenceIndexPolicy::Candidate }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceRow {
    pub id_sentence: String,
    pub sentence: String,
    pub post_id: String,
    pub sentence_position_in_post: usize,
}

pub fn sentence_id(post_id: &str, index: usize) -> String {
    format!("{post_id}_{index}")
}

/// Inverse of [`sentence_id`]. Splits on the last `_`, so post ids that contain
/// underscores (every Reddit fullname does) come back intact.
pub fn parse_sentence_id(id: &str) -> Option<(&str, usize)> {
    let (post, idx) = id.rsplit_once('_')?;
    if post.is_empty() {
        return None;
    }
    Some((post, idx.parse().ok()?))
}

/// Segment `(id, text)` documents. Output order is document order, then sentence order.
pub fn split_documents<'a, I>(docs: I, splitter: &dyn SentenceSplitter, opts: SegmentOptions) -> Vec<SentenceRow>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = Vec::new();
    for (post_id, text) in docs {
        let text = text.replace(['\r', '\n'], " ");
        let mut kept = 0usize;
        for (candidate, span) in splitter.segment(&text).into_iter().enumerate() {
            let sentence = &text[span.start..span.end];
            if splitter.count_tokens(sentence) < opts.min_tokens {
                continue;
            }
            let index = match opts.policy {
                SentenceIndexPolicy::Candidate => candidate,
                SentenceIndexPolicy::Retained => kept,
            };
            kept += 1;
            out.push(SentenceRow {
                id_sentence: sentence_id(post_id, index),
                sentence: sentence.to_string(),
                post_id: post_id.to_string(),
                sentence_position_in_post: index,
            });
        }
    }
    out
}

pub fn split_posts(posts: &[PostRow], splitter: &dyn SentenceSplitter, opts: SegmentOptions) -> Vec<SentenceRow> {
    split_documents(posts.iter().map(|p| (p.id.as_str(), p.text.as_str())), splitter, opts)
}
