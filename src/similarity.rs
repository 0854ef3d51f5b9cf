//! Textual similarity between the two authors of every projected edge.

use crate::annotate::{Annotated, AnnotationFailure};
use crate::error::AnnotationError;
use crate::projection::EdgeRow;
use crate::records::PostRow;
use crate::sentences::SentenceRow;
use ahash::AHashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use time::OffsetDateTime;

/// Text → dense vector. Shared across rayon workers.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, AnnotationError>;
}

/// Signed feature hashing of lowercased word tokens into `dims` buckets, L2-normalized.
/// Tokens are hashed with BLAKE3, so vectors are identical on every machine.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dims: usize,
}

static WORD: OnceLock<Regex> = OnceLock::new();

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

/// First eight bytes of the BLAKE3 digest, little endian.
fn token_hash(token: &str) -> u64 {
    let digest = blake3::hash(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, AnnotationError> {
        let re = WORD.get_or_init(|| Regex::new(r"\w+").expect("static word regex"));
        let lower = text.to_lowercase();
        let mut v = vec![0f32; self.dims];
        for m in re.find_iter(&lower) {
            let h = token_hash(m.as_str());
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[(h % self.dims as u64) as usize] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoredSentence {
    pub author: String,
    pub sentence: String,
    #[serde(with = "time::serde::rfc3339")]
    pub datetime: OffsetDateTime,
}

/// Attach each sentence's post author and timestamp. Sentences of unknown posts are skipped.
pub fn authored_sentences(sentences: &[SentenceRow], posts: &[PostRow]) -> Vec<AuthoredSentence> {
    let by_id: AHashMap<&str, &PostRow> = posts.iter().map(|p| (p.id.as_str(), p)).collect();
    sentences
        .iter()
        .filter_map(|s| {
            let p = by_id.get(s.post_id.as_str())?;
            Some(AuthoredSentence { author: p.author.clone(), sentence: s.sentence.clone(), datetime: p.datetime })
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRow {
    pub source: usize,
    pub target: usize,
    pub source_author: String,
    pub target_author: String,
    pub etime: i64,
    pub datetime: String,
    pub similarity: f64,
    pub source_sentences: usize,
    pub target_sentences: usize,
}

struct AuthorTexts<'a> {
    by_author: AHashMap<&'a str, Vec<(i64, &'a str)>>,
    /// Embeddings keyed by author and number of sentences included.
    cache: Mutex<AHashMap<(&'a str, usize), Arc<Vec<f32>>>>,
}

impl<'a> AuthorTexts<'a> {
    fn new(texts: &'a [AuthoredSentence]) -> Self {
        let mut by_author: AHashMap<&str, Vec<(i64, &str)>> = AHashMap::new();
        for t in texts {
            by_author.entry(t.author.as_str()).or_default().push((t.datetime.unix_timestamp(), t.sentence.as_str()));
        }
        for list in by_author.values_mut() {
            list.sort_by_key(|&(t, _)| t);
        }
        Self { by_author, cache: Mutex::new(AHashMap::new()) }
    }

    /// Embedding of everything `author` wrote at or before `etime`, oldest first, joined by
    /// spaces, with the number of sentences it covers.
    fn embed_before(
        &self,
        author: &str,
        etime: i64,
        embedder: &dyn Embedder,
    ) -> Result<(Arc<Vec<f32>>, usize), AnnotationError> {
        let Some((&key, list)) = self.by_author.get_key_value(author) else { return Err(AnnotationError::EmptyText) };
        let upto = list.partition_point(|&(t, _)| t <= etime);
        if let Some(v) = self.cache.lock().get(&(key, upto)) {
            return Ok((Arc::clone(v), upto));
        }
        let joined = list[..upto].iter().map(|&(_, s)| s).collect::<Vec<_>>().join(" ");
        if joined.trim().is_empty() {
            return Err(AnnotationError::EmptyText);
        }
        let v = Arc::new(embedder.embed(&joined)?);
        self.cache.lock().insert((key, upto), Arc::clone(&v));
        Ok((v, upto))
    }
}

fn edge_similarity(e: &EdgeRow, texts: &AuthorTexts<'_>, embedder: &dyn Embedder) -> Result<SimilarityRow, AnnotationError> {
    let (Some(sa), Some(ta)) = (e.source_author.as_deref(), e.target_author.as_deref()) else {
        return Err(AnnotationError::EmptyText);
    };
    let (src, ns) = texts.embed_before(sa, e.etime, embedder)?;
    let (dst, nt) = texts.embed_before(ta, e.etime, embedder)?;
    Ok(SimilarityRow {
        source: e.source,
        target: e.target,
        source_author: sa.to_string(),
        target_author: ta.to_string(),
        etime: e.etime,
        datetime: e.datetime.clone(),
        similarity: cosine(&src, &dst),
        source_sentences: ns,
        target_sentences: nt,
    })
}

/// Cosine similarity of source and target author text written up to each edge's time.
/// Edges run in parallel; successes keep edge order.
pub fn ij_similarity(edges: &[EdgeRow], texts: &[AuthoredSentence], embedder: &dyn Embedder) -> Annotated<SimilarityRow> {
    let index = AuthorTexts::new(texts);
    let results: Vec<Result<SimilarityRow, AnnotationError>> =
        edges.par_iter().map(|e| edge_similarity(e, &index, embedder)).collect();

    let mut out = Annotated::default();
    for (i, (e, res)) in edges.iter().zip(results).enumerate() {
        match res {
            Ok(row) => out.rows.push(row),
            Err(error) => {
                let key = format!("{}->{}@{}", e.source, e.target, e.etime);
                tracing::warn!(stage = "ij_similarity", index = i, %key, %error, "edge similarity failed");
                let text = format!(
                    "{} -> {}",
                    e.source_author.as_deref().unwrap_or_default(),
                    e.target_author.as_deref().unwrap_or_default()
                );
                out.failures.push(AnnotationFailure { index: i, key, text, error });
            }
        }
    }
    out
}
