#[path = "common/mod.rs"]
mod common;

use common::*;
use podnet::{
    build_interaction_graph, interaction_rows_from_sentences, Edge, EdgeType, InteractionGraph, TimestampError,
    VertexType,
};
use time::UtcOffset;

fn edge(g: &InteractionGraph, s: &str, t: &str, etype: EdgeType, time: i64) -> Edge {
    Edge { source: g.vertex_id(s).unwrap(), target: g.vertex_id(t).unwrap(), etype, time }
}

/// A submission by `a` in `x` and a reply by `b`: three vertices, one reply edge
/// from the replier to the parent author, one membership edge per post, and the
/// submission's reply to itself is gone.
#[test]
fn reply_and_membership_edges() {
    let rows = vec![interaction("a", "p1", "p1", "x", T0), interaction("b", "p2", "p1", "x", T0 + 60)];
    let g = build_interaction_graph(&rows).unwrap();

    let names: Vec<&str> = g.vertices().map(|(_, n, _)| n).collect();
    assert_eq!(names, vec!["a", "b", "x"]);
    let types: Vec<VertexType> = g.vertices().map(|(_, _, t)| t).collect();
    assert_eq!(types, vec![VertexType::Author, VertexType::Author, VertexType::Subreddit]);

    assert_eq!(
        g.edges(),
        &[
            edge(&g, "b", "a", EdgeType::Reply, T0 + 60),
            edge(&g, "a", "x", EdgeType::Membership, T0),
            edge(&g, "b", "x", EdgeType::Membership, T0 + 60),
        ]
    );
    assert!(g.edges().iter().all(|e| e.source != e.target));
}

/// Deleted authors never become vertices, and rows whose parent is unknown add nothing,
/// not even a membership edge.
#[test]
fn deleted_and_unresolvable_rows_are_dropped() {
    let rows = vec![
        interaction("a", "p1", "p1", "x", T0),
        interaction("[deleted]", "p2", "p1", "x", T0 + 1),
        interaction("c", "p3", "p2", "x", T0 + 2),
        interaction("d", "p4", "gone", "x", T0 + 3),
    ];
    let g = build_interaction_graph(&rows).unwrap();
    assert_eq!(g.vertex_id("[deleted]"), None);
    assert_eq!(g.vertex_id("c"), None);
    assert_eq!(g.vertex_id("d"), None);
    assert_eq!(g.num_vertices(), 2);
    assert_eq!(g.edges(), &[edge(&g, "a", "x", EdgeType::Membership, T0)]);
}

/// With only submissions every reply is a self-loop, so only membership edges remain.
#[test]
fn submissions_only_give_membership_edges() {
    let rows = vec![interaction("a", "p1", "p1", "x", T0), interaction("b", "p2", "p2", "y", T0 + 5)];
    let g = build_interaction_graph(&rows).unwrap();
    assert_eq!(g.num_edges(), 2);
    assert!(g.edges().iter().all(|e| e.etype == EdgeType::Membership));
}

/// A name that is both an author and a subreddit is typed as an author.
#[test]
fn author_type_wins_over_subreddit() {
    let rows = vec![interaction("x", "p1", "p1", "x", T0), interaction("b", "p2", "p1", "x", T0 + 1)];
    let g = build_interaction_graph(&rows).unwrap();
    assert_eq!(g.vtype(g.vertex_id("x").unwrap()), VertexType::Author);
}

/// Timestamps carrying a non-UTC offset are rejected instead of being silently converted.
#[test]
fn non_utc_timestamps_are_rejected() {
    let mut row = interaction("a", "p1", "p1", "x", T0);
    row.datetime = row.datetime.to_offset(UtcOffset::from_hms(2, 0, 0).unwrap());
    let err = build_interaction_graph(&[row]).unwrap_err();
    assert!(matches!(err, TimestampError::NotUtc { .. }));
}

/// Sentence granularity yields one interaction per sentence, so a reply with two
/// sentences produces two parallel reply edges.
#[test]
fn sentence_granularity_makes_parallel_edges() {
    let posts = vec![post("t3_s", "t3_s", "a", T0, "Root."), post("t1_r", "t3_s", "b", T0 + 9, "One. Two.")];
    let sentences = vec![
        sentence("t3_s", 0, "Root post here."),
        sentence("t1_r", 0, "First reply sentence."),
        sentence("t1_r", 1, "Second reply sentence."),
        sentence("t1_unknown", 0, "Orphan sentence here."),
    ];
    let rows = interaction_rows_from_sentences(&sentences, &posts);
    assert_eq!(rows.len(), 3);

    let g = build_interaction_graph(&rows).unwrap();
    let replies = g.edges().iter().filter(|e| e.etype == EdgeType::Reply).count();
    assert_eq!(replies, 2);
}

/// Saved graphs load back identical, with the name index rebuilt.
#[test]
fn graph_round_trips_through_disk() {
    let rows = vec![interaction("a", "p1", "p1", "x", T0), interaction("b", "p2", "p1", "x", T0 + 60)];
    let g = build_interaction_graph(&rows).unwrap();
    let path = tempdir().join("net").join("x_author_network.json.zst");
    g.save(&path).unwrap();

    let back = InteractionGraph::load(&path).unwrap();
    assert_eq!(back, g);
    assert_eq!(back.vertex_id("x"), Some(2));
}

/// Filtering to authors and replies renumbers vertices densely and drops edges
/// that touch removed vertices.
#[test]
fn filtered_view_is_compacted() {
    let rows = vec![interaction("a", "p1", "p1", "x", T0), interaction("b", "p2", "p1", "x", T0 + 60)];
    let g = build_interaction_graph(&rows).unwrap();
    let view = g.filtered(Some(VertexType::Author), Some(EdgeType::Reply));
    assert_eq!(view.num_vertices(), 2);
    assert_eq!(view.edges(), &[Edge { source: 1, target: 0, etype: EdgeType::Reply, time: T0 + 60 }]);
}
