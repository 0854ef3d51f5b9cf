#[path = "common/mod.rs"]
mod common;

use common::*;
use podnet::{
    build_interaction_graph, infer_vertex_types, project, read_table, write_table, EdgeDedup, EdgeRow, EdgeType,
    InteractionGraph, VertexRow, VertexType,
};

/// `a` posts in `x` and `b` replies twice within the same second, once per sentence.
fn graph_with_parallel_edges() -> InteractionGraph {
    let rows = vec![
        interaction("a", "p1", "p1", "x", T0),
        interaction("b", "p2", "p1", "x", T0 + 60),
        interaction("b", "p2", "p1", "x", T0 + 60),
    ];
    build_interaction_graph(&rows).unwrap()
}

/// The unfiltered projection keeps graph vertex ids and types, and edge rows carry
/// epoch seconds, an RFC 3339 datetime and the endpoint names.
#[test]
fn full_projection_carries_names_and_times() {
    let g = graph_with_parallel_edges();
    let p = project(&g, None, None, EdgeDedup::Keep).unwrap();

    assert_eq!(
        p.vertices,
        vec![
            VertexRow { vid: 0, vtype: VertexType::Author, name: "a".into() },
            VertexRow { vid: 1, vtype: VertexType::Author, name: "b".into() },
            VertexRow { vid: 2, vtype: VertexType::Subreddit, name: "x".into() },
        ]
    );
    assert_eq!(p.edges.len(), 5);
    let first = &p.edges[0];
    assert_eq!((first.source, first.target, first.etype, first.etime), (1, 0, EdgeType::Reply, T0 + 60));
    assert_eq!(first.datetime, "2006-01-01T00:01:00Z");
    assert_eq!(first.source_author.as_deref(), Some("b"));
    assert_eq!(first.target_author.as_deref(), Some("a"));
}

/// Exact deduplication collapses identical edges but never edges of different types.
/// The legacy source/target/time key also merges across types.
#[test]
fn dedup_modes() {
    let g = graph_with_parallel_edges();
    assert_eq!(project(&g, None, None, EdgeDedup::Exact).unwrap().edges.len(), 3);

    let mut mixed = InteractionGraph::new();
    let a = mixed.add_vertex("a");
    let b = mixed.add_vertex("b");
    mixed.add_edge(a, b, EdgeType::Reply, T0);
    mixed.add_edge(a, b, EdgeType::Membership, T0);
    assert_eq!(project(&mixed, None, None, EdgeDedup::Exact).unwrap().edges.len(), 2);
    assert_eq!(project(&mixed, None, None, EdgeDedup::SourceTargetTime).unwrap().edges.len(), 1);
}

/// The author view keeps only author vertices and reply edges. Membership edges under a
/// vertex-only filter point at a removed subreddit and lose the target name.
#[test]
fn typed_views() {
    let g = graph_with_parallel_edges();

    let authors = project(&g, Some(VertexType::Author), Some(EdgeType::Reply), EdgeDedup::Exact).unwrap();
    assert_eq!(authors.vertices.len(), 2);
    assert_eq!(authors.edges.len(), 1);
    assert!(authors.edges.iter().all(|e| e.etype == EdgeType::Reply));

    let vonly = project(&g, Some(VertexType::Author), None, EdgeDedup::Exact).unwrap();
    let membership: Vec<&EdgeRow> = vonly.edges.iter().filter(|e| e.etype == EdgeType::Membership).collect();
    assert!(!membership.is_empty());
    assert!(membership.iter().all(|e| e.target_author.is_none() && e.source_author.is_some()));
}

/// Vertex and edge tables survive a write/read cycle with numeric type codes, and
/// vertex types can be recovered from the edge table alone.
#[test]
fn tables_round_trip_and_types_are_recoverable() {
    let g = graph_with_parallel_edges();
    let p = project(&g, None, None, EdgeDedup::Exact).unwrap();
    let dir = tempdir();
    let vpath = dir.join("x_vertices.jsonl.zst");
    let epath = dir.join("x_edges.jsonl.zst");
    write_table(&vpath, &p.vertices).unwrap();
    write_table(&epath, &p.edges).unwrap();

    let vertices: Vec<VertexRow> = read_table(&vpath).unwrap();
    let edges: Vec<EdgeRow> = read_table(&epath).unwrap();
    assert_eq!(vertices, p.vertices);
    assert_eq!(edges, p.edges);

    let line = serde_json::to_string(&vertices[2]).unwrap();
    assert!(line.contains("\"vtype\":1"), "{line}");

    let inferred = infer_vertex_types(&edges);
    for v in &vertices {
        assert_eq!(inferred.get(&v.name), Some(&v.vtype), "{}", v.name);
    }
}

/// A row that cannot be serialized fails the write, keeps the previous table and leaves
/// no staging file in the output directory.
#[test]
fn failed_table_write_leaves_no_staging_file() {
    struct Unwritable;
    impl serde::Serialize for Unwritable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unwritable row"))
        }
    }
    let g = graph_with_parallel_edges();
    let p = project(&g, None, None, EdgeDedup::Exact).unwrap();
    let dir = tempdir();
    let vpath = dir.join("x_vertices.jsonl.zst");
    write_table(&vpath, &p.vertices).unwrap();

    let err = write_table(&vpath, &[Unwritable]).unwrap_err();
    assert!(format!("{err:#}").contains("unwritable row"), "{err:#}");

    let names: Vec<String> =
        std::fs::read_dir(&dir).unwrap().map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec!["x_vertices.jsonl.zst".to_string()]);
    let kept: Vec<VertexRow> = read_table(&vpath).unwrap();
    assert_eq!(kept, p.vertices);
}
