#[path = "common/mod.rs"]
mod common;

use common::*;
use podnet::{
    authored_sentences, cosine, ij_similarity, AnnotationError, AuthoredSentence, EdgeRow, EdgeType, Embedder,
    HashingEmbedder,
};

fn said(author: &str, epoch: i64, text: &str) -> AuthoredSentence {
    AuthoredSentence { author: author.to_string(), sentence: text.to_string(), datetime: utc(epoch) }
}

fn reply(source: usize, target: usize, sa: Option<&str>, ta: Option<&str>, etime: i64) -> EdgeRow {
    EdgeRow {
        source,
        target,
        etype: EdgeType::Reply,
        etime,
        datetime: String::new(),
        source_author: sa.map(str::to_string),
        target_author: ta.map(str::to_string),
    }
}

/// The hashing embedder is deterministic, unit length, and case-insensitive.
#[test]
fn hashing_embedder_basics() {
    let e = HashingEmbedder::new(64);
    assert_eq!(e.dims(), 64);
    let a = e.embed("Rust borrow checker").unwrap();
    let b = e.embed("rust BORROW checker").unwrap();
    assert_eq!(a, b);
    let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
    assert!((cosine(&a, &b) - 1.0).abs() < 1e-9);
    assert_eq!(cosine(&a, &vec![0.0; 64]), 0.0);
}

/// Only text written up to the edge time counts, so the same author pair can score
/// differently on two edges; edges whose author has no text yet fail with `EmptyText`.
#[test]
fn similarity_uses_text_up_to_edge_time() {
    let texts = vec![
        said("a", T0, "the borrow checker rejects my code"),
        said("b", T0 + 10, "the borrow checker rejects my code"),
        said("b", T0 + 20, "pizza tonight with friends downtown"),
        said("b", T0 + 20, "pizza again, pineapple this time"),
    ];
    let edges = vec![
        reply(1, 0, Some("b"), Some("a"), T0 + 10),
        reply(1, 0, Some("b"), Some("a"), T0 + 30),
        reply(0, 1, Some("a"), Some("b"), T0 + 5),
        reply(1, 2, Some("b"), None, T0 + 30),
    ];
    let out = ij_similarity(&edges, &texts, &HashingEmbedder::new(256));

    assert_eq!(out.rows.len(), 2);
    let early = &out.rows[0];
    assert!((early.similarity - 1.0).abs() < 1e-6, "{}", early.similarity);
    assert_eq!((early.source_sentences, early.target_sentences), (1, 1));
    let late = &out.rows[1];
    assert!(late.similarity < early.similarity);
    assert_eq!(late.source_sentences, 3);

    let failed: Vec<usize> = out.failures.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![2, 3]);
    assert!(out.failures.iter().all(|f| f.error == AnnotationError::EmptyText));
}

/// Embedder errors are recorded per edge and do not stop the others.
#[test]
fn embedder_failures_are_collected() {
    struct Picky;
    impl Embedder for Picky {
        fn embed(&self, text: &str) -> Result<Vec<f32>, AnnotationError> {
            if text.contains("secret") {
                Err(AnnotationError::Model("refused".into()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }
    let texts = vec![said("a", T0, "hello there"), said("b", T0, "top secret"), said("c", T0, "hi")];
    let edges = vec![reply(0, 1, Some("a"), Some("b"), T0), reply(0, 2, Some("a"), Some("c"), T0)];
    let out = ij_similarity(&edges, &texts, &Picky);
    assert_eq!(out.rows.len(), 1);
    assert_eq!(out.rows[0].target_author, "c");
    assert_eq!(out.failures[0].error, AnnotationError::Model("refused".into()));
    assert_eq!(out.failures[0].text, "a -> b");
}

/// Sentences inherit author and time from their post; orphans are skipped.
#[test]
fn sentences_are_attributed_to_post_authors() {
    let posts = vec![post("t3_s", "t3_s", "alice", T0, "x"), post("t1_c", "t3_s", "bob", T0 + 7, "y")];
    let sentences =
        vec![sentence("t1_c", 0, "first"), sentence("t3_s", 0, "second"), sentence("t1_missing", 0, "third")];
    let texts = authored_sentences(&sentences, &posts);
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0].author, "bob");
    assert_eq!(texts[0].datetime.unix_timestamp(), T0 + 7);
}

/// The same author text prefix is embedded once no matter how many edges use it.
#[test]
fn shared_prefixes_are_embedded_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    struct Counting(AtomicUsize);
    impl Embedder for Counting {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, AnnotationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0])
        }
    }
    let texts = vec![said("a", T0, "first words"), said("b", T0, "other words")];
    let edges: Vec<EdgeRow> = (0..5).map(|i| reply(1, 0, Some("b"), Some("a"), T0 + i)).collect();
    let counting = Counting(AtomicUsize::new(0));
    let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let out = pool.install(|| ij_similarity(&edges, &texts, &counting));
    assert_eq!(out.rows.len(), 5);
    assert_eq!(counting.0.load(Ordering::SeqCst), 2);
}
