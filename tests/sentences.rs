#[path = "common/mod.rs"]
mod common;

use common::*;
use podnet::{
    parse_sentence_id, sentence_id, split_documents, split_posts, RuleSplitter, SegmentOptions, SentenceIndexPolicy,
    SentenceSplitter, Span,
};

/// Short sentences are dropped but, by default, still count towards the position of
/// the sentences after them, so ids can have gaps.
#[test]
fn candidate_policy_leaves_gaps() {
    let docs = [("t3_a", "Ok. This sentence is long enough. Fine! Another one is kept here.")];
    let rows = split_documents(docs, &RuleSplitter, SegmentOptions::default());

    let ids: Vec<&str> = rows.iter().map(|r| r.id_sentence.as_str()).collect();
    assert_eq!(ids, vec!["t3_a_1", "t3_a_3"]);
    assert_eq!(rows[0].sentence, "This sentence is long enough.");
    assert_eq!(rows[1].sentence_position_in_post, 3);
    assert!(rows.iter().all(|r| r.post_id == "t3_a"));
}

/// With the retained policy the kept sentences are numbered densely from zero.
#[test]
fn retained_policy_is_dense() {
    let docs = [("t3_a", "Ok. This sentence is long enough. Fine! Another one is kept here.")];
    let opts = SegmentOptions { min_tokens: 3, policy: SentenceIndexPolicy::Retained };
    let rows = split_documents(docs, &RuleSplitter, opts);
    let positions: Vec<usize> = rows.iter().map(|r| r.sentence_position_in_post).collect();
    assert_eq!(positions, vec![0, 1]);
    assert_eq!(rows[1].id_sentence, "t3_a_1");
}

/// Line breaks become spaces before segmentation, so no sentence text carries them,
/// and empty or whitespace-only posts produce nothing.
#[test]
fn line_breaks_are_flattened_and_blank_posts_skipped() {
    let posts = vec![
        post("t1_c2", "t1_c1", "alice", T0, "Thanks for the reply.\r\nKeep at it, it gets easier."),
        post("t1_c3", "t3_s1", "bob", T0, "   \n  "),
    ];
    let rows = split_posts(&posts, &RuleSplitter, SegmentOptions::default());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| !r.sentence.contains(['\r', '\n'])));
    assert_eq!(rows[1].sentence, "Keep at it, it gets easier.");
}

/// Ids round-trip through the parser even though Reddit fullnames contain underscores.
#[test]
fn sentence_ids_parse_back() {
    let id = sentence_id("t1_abc", 12);
    assert_eq!(id, "t1_abc_12");
    assert_eq!(parse_sentence_id(&id), Some(("t1_abc", 12)));
    assert_eq!(parse_sentence_id("nounderscore"), None);
    assert_eq!(parse_sentence_id("_3"), None);
    assert_eq!(parse_sentence_id("t1_abc_x"), None);
}

/// Any splitter can be plugged in; the length filter uses the splitter's own token count.
#[test]
fn custom_splitter_is_honoured() {
    struct Lines;
    impl SentenceSplitter for Lines {
        fn segment(&self, text: &str) -> Vec<Span> {
            let mut out = Vec::new();
            let mut start = 0;
            for part in text.split('|') {
                out.push(Span { start, end: start + part.len() });
                start += part.len() + 1;
            }
            out
        }
        fn count_tokens(&self, sentence: &str) -> usize {
            sentence.chars().count()
        }
    }

    let opts = SegmentOptions { min_tokens: 2, policy: SentenceIndexPolicy::Candidate };
    let rows = split_documents([("p", "ab|c|def")], &Lines, opts);
    let texts: Vec<&str> = rows.iter().map(|r| r.sentence.as_str()).collect();
    assert_eq!(texts, vec!["ab", "def"]);
    assert_eq!(rows[1].id_sentence, "p_2");
}
