//! Interaction rows → typed author/subreddit multigraph.

use crate::date::epoch_seconds_utc;
use crate::error::TimestampError;
use crate::graph::{EdgeType, InteractionGraph, VertexType};
use crate::records::{PostRow, DELETED};
use crate::sentences::SentenceRow;
use ahash::{AHashMap, AHashSet};
use time::OffsetDateTime;

/// The columns the builder reads. One per post, or one per sentence when
/// sentence-level multi-edges are wanted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRow {
    pub author: String,
    pub post_id: String,
    pub parent_id: String,
    pub subreddit: String,
    pub datetime: OffsetDateTime,
}

impl From<&PostRow> for InteractionRow {
    fn from(p: &PostRow) -> Self {
        Self {
            author: p.author.clone(),
            post_id: p.id.clone(),
            parent_id: p.parent_id.clone(),
            subreddit: p.subreddit.clone(),
            datetime: p.datetime,
        }
    }
}

/// Join sentences to their posts, one interaction row per sentence.
/// Sentences whose post is unknown are skipped.
pub fn interaction_rows_from_sentences(sentences: &[SentenceRow], posts: &[PostRow]) -> Vec<InteractionRow> {
    let by_id: AHashMap<&str, &PostRow> = posts.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut missing = 0usize;
    let rows: Vec<InteractionRow> = sentences
        .iter()
        .filter_map(|s| match by_id.get(s.post_id.as_str()) {
            Some(p) => Some(InteractionRow::from(*p)),
            None => {
                missing += 1;
                None
            }
        })
        .collect();
    if missing > 0 {
        tracing::debug!(missing, "sentences without a matching post skipped");
    }
    rows
}

/// Build the multigraph.
///
/// Rows by `[deleted]` are dropped, then each row's parent author is looked up among the
/// remaining rows; rows whose parent cannot be resolved contribute nothing. Every kept row
/// yields one reply edge (author → parent author) and one membership edge
/// (author → subreddit), both stamped with the row's epoch. Replies are added first, then
/// memberships. Vertices appear in first-seen order over that edge list. A name that occurs
/// both as an author and as a subreddit is typed as an author. Self-loops (including every
/// submission's reply to itself) are removed at the end.
pub fn build_interaction_graph(rows: &[InteractionRow]) -> Result<InteractionGraph, TimestampError> {
    let kept: Vec<&InteractionRow> = rows.iter().filter(|r| r.author != DELETED).collect();

    let epochs = kept
        .iter()
        .map(|r| epoch_seconds_utc(&r.datetime, &format!("post {}", r.post_id)))
        .collect::<Result<Vec<i64>, _>>()?;

    let post_author: AHashMap<&str, &str> =
        kept.iter().map(|r| (r.post_id.as_str(), r.author.as_str())).collect();

    let resolved: Vec<(&InteractionRow, &str, i64)> = kept
        .iter()
        .zip(&epochs)
        .filter_map(|(r, &t)| post_author.get(r.parent_id.as_str()).map(|&to| (*r, to, t)))
        .collect();
    let dropped = kept.len() - resolved.len();
    if dropped > 0 {
        tracing::debug!(dropped, "rows with unresolvable parent author dropped");
    }

    let mut g = InteractionGraph::new();
    let mut authors: AHashSet<usize> = AHashSet::new();
    let mut subreddits: AHashSet<usize> = AHashSet::new();

    for &(r, to, t) in &resolved {
        let s = g.add_vertex(&r.author);
        let d = g.add_vertex(to);
        authors.insert(s);
        authors.insert(d);
        g.add_edge(s, d, EdgeType::Reply, t);
    }
    for &(r, _, t) in &resolved {
        let s = g.add_vertex(&r.author);
        let d = g.add_vertex(&r.subreddit);
        subreddits.insert(d);
        g.add_edge(s, d, EdgeType::Membership, t);
    }

    for v in subreddits {
        if !authors.contains(&v) {
            g.set_vtype(v, VertexType::Subreddit);
        }
    }

    let loops = g.remove_self_loops();
    tracing::debug!(
        vertices = g.num_vertices(),
        edges = g.num_edges(),
        self_loops = loops,
        "interaction graph built"
    );
    Ok(g)
}
