//! End-to-end scenario and invariant tests driven entirely through the
//! public `tinytriple` API: ingest, store, SPARQL, serialization,
//! transactions. Each test is named after the scenario or invariant it
//! exercises.

use std::collections::HashMap;
use std::io::Read;

use tempfile::TempDir;

use tinytriple::persistence::PersistenceManager;
use tinytriple::rdf::{
    open_serializer, CancelToken, Cell, Cursor, Format, NamespaceManager, ParseErrorKind, RdfStore, ResourceId,
    SavepointOp, StoredObject, TransactionError, TransactionManager, TransactionState, TurtleParser, UpdateEngine,
    ValueType, VecCursor,
};
use tinytriple::sparql::SparqlEngine;

fn parse_into(engine: &mut UpdateEngine, text: &str, trig: bool) -> usize {
    let reader = std::io::Cursor::new(text.as_bytes().to_vec());
    let mut bnodes = HashMap::new();
    let cancel = CancelToken::new();
    if trig {
        let mut parser = TurtleParser::new_trig(reader);
        engine.load_from_deserializer(&mut parser, None, &mut bnodes, &cancel).unwrap()
    } else {
        let mut parser = TurtleParser::new(reader);
        engine.load_from_deserializer(&mut parser, None, &mut bnodes, &cancel).unwrap()
    }
}

/// Builds a quad-shaped cursor directly off a store's contents, independent
/// of any SPARQL CONSTRUCT semantics, so named-graph fidelity round-trips
/// can be checked without CONSTRUCT's default-graph-only result shape.
fn quads_cursor(store: &RdfStore) -> VecCursor {
    let names = vec![
        Some("subject".to_string()),
        Some("predicate".to_string()),
        Some("object".to_string()),
        Some("graph".to_string()),
    ];
    let mut rows = Vec::new();
    for quad in store.match_quads(None, None, None, None) {
        let subject = store.resource_key(quad.subject).unwrap();
        let subject_cell = if let Some(label) = subject.strip_prefix("_:") {
            Cell::BlankNode(label.to_string())
        } else {
            Cell::Iri(subject.to_string())
        };
        let predicate_cell = Cell::Iri(store.resource_key(quad.predicate).unwrap().to_string());
        let object_cell = match &quad.object {
            StoredObject::Resource(r) => {
                let key = store.resource_key(*r).unwrap();
                if let Some(label) = key.strip_prefix("_:") {
                    Cell::BlankNode(label.to_string())
                } else {
                    Cell::Iri(key.to_string())
                }
            }
            StoredObject::Literal { lexical, datatype, language } => Cell::Literal {
                lexical: lexical.clone(),
                datatype: datatype.clone(),
                language: language.clone(),
            },
        };
        let graph_cell = match quad.graph {
            Some(g) => Cell::Iri(store.resource_key(g).unwrap().to_string()),
            None => Cell::Unbound,
        };
        rows.push(vec![subject_cell, predicate_cell, object_cell, graph_cell]);
    }
    VecCursor::new(names, rows)
}

fn serialize_store(store: &RdfStore, format: Format) -> String {
    let cursor = Box::new(quads_cursor(store));
    let mut reader = open_serializer(format, cursor, NamespaceManager::new(), CancelToken::new());
    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    text
}

fn has_triple(store: &RdfStore, s: &str, p: &str, o: &str) -> bool {
    let Some(s) = store.lookup(s) else { return false };
    let Some(p) = store.lookup(p) else { return false };
    let Some(o) = store.lookup(o) else { return false };
    store.match_quads(Some(None), Some(s), Some(p), Some(&StoredObject::Resource(o))).next().is_some()
}

// -- S1: Turtle ingest -------------------------------------------------------

#[test]
fn s1_turtle_ingest_parses_a_single_triple() {
    let mut engine = UpdateEngine::new();
    let n = parse_into(&mut engine, "<http://e/s> <http://e/p> <http://e/o> .", false);
    assert_eq!(n, 1);
    let applied = engine.flush();
    assert_eq!(applied.len(), 1);
    assert!(has_triple(engine.store(), "http://e/s", "http://e/p", "http://e/o"));
}

// -- S2: nested blank node ----------------------------------------------------

#[test]
fn s2_nested_blank_node_produces_two_quads_sharing_a_fresh_resource() {
    let mut engine = UpdateEngine::new();
    let n = parse_into(&mut engine, r#"_:s <http://e/p> [ <http://e/q> "inner" ] ."#, false);
    assert_eq!(n, 2);
    let applied = engine.flush();
    assert_eq!(applied.len(), 2);

    let outer = applied.iter().find(|e| e.predicate == engine.store().lookup("http://e/p").unwrap()).unwrap();
    let inner_node = match &outer.object {
        StoredObject::Resource(r) => *r,
        other => panic!("expected a blank-node object, got {other:?}"),
    };
    let inner = applied.iter().find(|e| e.predicate == engine.store().lookup("http://e/q").unwrap()).unwrap();
    assert_eq!(inner.subject, inner_node);
    assert_eq!(inner.object, StoredObject::Literal {
        lexical: "inner".to_string(),
        datatype: "http://www.w3.org/2001/XMLSchema#string".to_string(),
        language: None,
    });
}

// -- S3: TriG graph blocks, both spellings ------------------------------------

#[test]
fn s3_trig_graph_keyword_form_tags_the_graph() {
    let mut engine = UpdateEngine::new();
    parse_into(&mut engine, r#"GRAPH <http://g/G1> { <http://s> <http://p> "x" }"#, true);
    engine.flush();
    let graph = engine.store().lookup("http://g/G1").unwrap();
    let s = engine.store().lookup("http://s").unwrap();
    let p = engine.store().lookup("http://p").unwrap();
    assert!(engine.store().match_quads(Some(Some(graph)), Some(s), Some(p), None).next().is_some());
}

#[test]
fn s3_trig_bare_graph_name_form_tags_the_graph() {
    let mut engine = UpdateEngine::new();
    parse_into(&mut engine, r#"<http://g/G1> { <http://s> <http://p> "x" }"#, true);
    engine.flush();
    let graph = engine.store().lookup("http://g/G1").unwrap();
    let s = engine.store().lookup("http://s").unwrap();
    let p = engine.store().lookup("http://p").unwrap();
    assert!(engine.store().match_quads(Some(Some(graph)), Some(s), Some(p), None).next().is_some());
}

// -- S4: language tag round-trips through SPARQL-JSON -------------------------

#[test]
fn s4_language_tagged_literal_round_trips_through_sparql_json() {
    let mut tx = TransactionManager::new(UpdateEngine::new());
    tx.begin().unwrap();
    SparqlEngine::update(tx.engine_mut(), r#"INSERT DATA { <http://e/s> <http://e/p> "bonjour"@fr }"#).unwrap();
    tx.commit().unwrap();

    let cancel = CancelToken::new();
    let query = "SELECT ?o WHERE { <http://e/s> <http://e/p> ?o }";
    let (mut cursor, _vars) = SparqlEngine::query_select(tx.engine().store(), query, &cancel).unwrap();
    assert!(cursor.next(&cancel).unwrap());
    let (lexical, language, _) = cursor.string(0).unwrap();
    assert_eq!(lexical, "bonjour");
    assert_eq!(language.as_deref(), Some("fr"));
    assert_eq!(cursor.value_type(0).unwrap(), ValueType::Literal);
    cursor.close();

    let (cursor, _vars) = SparqlEngine::query_select(tx.engine().store(), query, &cancel).unwrap();
    let mut reader = open_serializer(Format::SparqlJson, Box::new(cursor), NamespaceManager::new(), cancel.clone());
    let mut body = String::new();
    reader.read_to_string(&mut body).unwrap();
    assert!(body.contains("\"xml:lang\":\"fr\""));
    assert!(body.contains("\"value\":\"bonjour\""));
}

// -- S5: savepoint rollback ----------------------------------------------------

#[test]
fn s5_savepoint_rollback_discards_only_the_writes_since_it_was_set() {
    let mut tx = TransactionManager::new(UpdateEngine::new());
    let mut inserted = Vec::new();
    tx.add_statement_callback(Box::new(move |_kind, _g, s, _p, _o, _types| {
        inserted.push(s);
    }));

    tx.begin().unwrap();
    let a_s = tx.engine_mut().ensure_resource("http://e/a");
    let p = tx.engine_mut().ensure_resource("http://e/p");
    let a_o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/a-val"));
    tx.engine_mut().insert_statement(None, a_s, p, a_o);

    tx.savepoint(SavepointOp::Set, "s1").unwrap();

    let b_s = tx.engine_mut().ensure_resource("http://e/b");
    let b_o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/b-val"));
    tx.engine_mut().insert_statement(None, b_s, p, b_o);

    tx.savepoint(SavepointOp::Rollback, "s1").unwrap();
    let applied = tx.commit().unwrap();

    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].subject, a_s);
    assert!(has_triple(tx.engine().store(), "http://e/a", "http://e/p", "http://e/a-val"));
    assert!(!has_triple(tx.engine().store(), "http://e/b", "http://e/p", "http://e/b-val"));
}

// -- S6: unknown-prefix error position -----------------------------------------

#[test]
fn s6_unknown_prefix_reports_the_offending_tokens_position() {
    let mut parser = TurtleParser::new(std::io::Cursor::new(b"ex:alice ex:knows ex:bob .".to_vec()));
    let cancel = CancelToken::new();
    let err = Cursor::next(&mut parser, &cancel);
    assert!(err.is_err());
    let structured = parser.last_error().unwrap();
    assert_eq!(structured.kind, ParseErrorKind::UnknownPrefix);
    assert_eq!(structured.line, 1);
    assert!(structured.column >= 1);
}

// -- Invariant 1: namespace expand/compress symmetry ---------------------------

#[test]
fn invariant1_namespace_expand_and_compress_are_symmetric() {
    let mut ns = NamespaceManager::new();
    ns.add_prefix("ex", "http://example.org/").unwrap();
    let expanded = ns.expand("ex:alice").unwrap();
    assert_eq!(expanded, "http://example.org/alice");
    let compressed = ns.compress(&expanded).unwrap();
    assert_eq!(compressed, "ex:alice");
}

// -- Invariant 2: parser idempotence (Turtle) -----------------------------------

#[test]
fn invariant2_serialize_then_reparse_turtle_yields_an_equal_quad_set() {
    let mut engine = UpdateEngine::new();
    parse_into(
        &mut engine,
        r#"<http://e/s1> <http://e/p> <http://e/o1> .
           <http://e/s2> <http://e/p> "plain" ."#,
        false,
    );
    engine.flush();

    let turtle = serialize_store(engine.store(), Format::Turtle);

    let mut reparsed = UpdateEngine::new();
    let n = parse_into(&mut reparsed, &turtle, false);
    assert_eq!(n, 2);
    reparsed.flush();

    assert!(has_triple(reparsed.store(), "http://e/s1", "http://e/p", "http://e/o1"));
    let p = reparsed.store().lookup("http://e/p").unwrap();
    let s2 = reparsed.store().lookup("http://e/s2").unwrap();
    let plain = reparsed.store().match_quads(Some(None), Some(s2), Some(p), None).next().unwrap();
    assert_eq!(plain.object, StoredObject::Literal {
        lexical: "plain".to_string(),
        datatype: "http://www.w3.org/2001/XMLSchema#string".to_string(),
        language: None,
    });
}

// -- Invariant 3: TriG graph preservation under serialize-then-reparse ---------

#[test]
fn invariant3_serialize_then_reparse_trig_preserves_the_named_graph() {
    let mut engine = UpdateEngine::new();
    parse_into(&mut engine, r#"GRAPH <http://g/G1> { <http://s> <http://p> <http://o> }"#, true);
    engine.flush();

    let trig = serialize_store(engine.store(), Format::TriG);

    let mut reparsed = UpdateEngine::new();
    parse_into(&mut reparsed, &trig, true);
    reparsed.flush();

    let graph = reparsed.store().lookup("http://g/G1").unwrap();
    let s = reparsed.store().lookup("http://s").unwrap();
    let p = reparsed.store().lookup("http://p").unwrap();
    assert!(reparsed.store().match_quads(Some(Some(graph)), Some(s), Some(p), None).next().is_some());
}

// -- Invariant 4: transaction atomicity -----------------------------------------

#[test]
fn invariant4_a_failed_commit_leaves_no_partial_effect() {
    let temp_dir = TempDir::new().unwrap();
    let persistence = std::sync::Arc::new(PersistenceManager::open(temp_dir.path()).unwrap());
    std::fs::remove_dir_all(temp_dir.path().join("wal")).unwrap();

    let mut tx = TransactionManager::with_persistence(UpdateEngine::new(), persistence);
    tx.begin().unwrap();
    let s = tx.engine_mut().ensure_resource("http://e/s");
    let p = tx.engine_mut().ensure_resource("http://e/p");
    let o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o"));
    tx.engine_mut().insert_statement(None, s, p, o);

    assert!(tx.commit().is_err());
    assert!(!has_triple(tx.engine().store(), "http://e/s", "http://e/p", "http://e/o"));
    assert_eq!(tx.engine().store().len(), 0);
    assert_eq!(tx.state(), TransactionState::Failed);

    // A failed transaction is not resumable: `begin` rejects it until an
    // explicit `rollback` clears the flag.
    assert!(matches!(tx.begin(), Err(TransactionError::Failed)));
}

// -- Invariant 5: callback completeness ------------------------------------------

#[test]
fn invariant5_one_callback_fires_per_distinct_change_in_insertion_order() {
    let mut tx = TransactionManager::new(UpdateEngine::new());
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    tx.add_statement_callback(Box::new(move |_kind, _g, s, _p, _o, _types| {
        seen_cb.lock().unwrap().push(s);
    }));

    tx.begin().unwrap();
    let s1 = tx.engine_mut().ensure_resource("http://e/s1");
    let s2 = tx.engine_mut().ensure_resource("http://e/s2");
    let p = tx.engine_mut().ensure_resource("http://e/p");
    let o = StoredObject::Resource(tx.engine_mut().ensure_resource("http://e/o"));
    tx.engine_mut().insert_statement(None, s1, p, o.clone());
    tx.engine_mut().insert_statement(None, s1, p, o.clone()); // exact duplicate, deduped
    tx.engine_mut().insert_statement(None, s2, p, o);
    tx.commit().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![s1, s2]);
}

// -- Invariant 6: blank-node scoping across independent loads --------------------

#[test]
fn invariant6_independent_loads_assign_distinct_ids_to_the_same_label() {
    // Two documents, each using the blank-node label `_:x`, loaded into the
    // same engine through two independent calls (each gets its own,
    // document-local blank-node table) must not let the second load's `_:x`
    // resolve to the first load's resource.
    let mut engine = UpdateEngine::new();
    parse_into(&mut engine, r#"_:x <http://e/p> "one" ."#, false);
    parse_into(&mut engine, r#"_:x <http://e/p> "two" ."#, false);
    engine.flush();

    let p = engine.store().lookup("http://e/p").unwrap();
    let subjects: Vec<ResourceId> =
        engine.store().match_quads(Some(None), None, Some(p), None).map(|q| q.subject).collect();
    assert_eq!(subjects.len(), 2);
    assert_ne!(subjects[0], subjects[1], "independent loads must not share a blank-node's interned resource");
}

// -- Invariant 7: parser error position lies within the offending token ----------

#[test]
fn invariant7_syntax_error_position_lies_within_the_offending_token() {
    let mut parser = TurtleParser::new(std::io::Cursor::new(b"<http://e/s> <http://e/p> .".to_vec()));
    let cancel = CancelToken::new();
    assert!(Cursor::next(&mut parser, &cancel).is_err());
    let structured = parser.last_error().unwrap();
    assert_eq!(structured.line, 1);
    assert!(structured.column >= 1);
}
