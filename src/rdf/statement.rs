//! Prepared statement (§4.6): a reusable `(sparql_text, binding_map)` pair,
//! grounded on `examples/original_source/src/libtinysparql/tracker-statement.c`'s
//! bind-then-execute shape. The engine itself never holds a back-pointer to
//! the statement and the statement never holds the store — both sides meet
//! only as borrowed arguments at `execute`/`update` time, which is how §9's
//! design note ("cyclic object graphs... re-architect as disjoint owned
//! components") plays out here: no connection/statement/cursor cycle to
//! manage.
//!
//! Binding values are substituted into the SPARQL text as literal syntax
//! before parsing, so `~name` never needs its own grammar production —
//! `spargebra` parses ordinary SPARQL both before and after substitution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::rdf::cursor::{CancelToken, VecCursor};
use crate::rdf::parser::Format;
use crate::rdf::serialization::open_serializer;
use crate::rdf::store::RdfStore;
use crate::rdf::update::UpdateEngine;

use crate::sparql::{QueryOutcome, SparqlEngine, SparqlError, SparqlParser};

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("parameter ~{0} has no binding")]
    Unbound(String),
}

#[derive(Error, Debug)]
pub enum StatementError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("sparql error: {0}")]
    Sparql(#[from] SparqlError),

    #[error("update error: {0}")]
    Update(#[from] crate::rdf::update::UpdateError),

    #[error("wrong statement kind: expected {expected}, statement is a {actual}")]
    WrongKind { expected: &'static str, actual: &'static str },

    #[error("statement is already executing on another thread")]
    Busy,
}

pub type StatementResult<T> = Result<T, StatementError>;

/// A single bound parameter value (§3's binding map value kinds).
#[derive(Debug, Clone)]
enum BoundValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    DateTime(DateTime<Utc>),
    LangString(String, String),
}

impl BoundValue {
    /// Renders the value as SPARQL term syntax, suitable for substitution in
    /// place of its `~name` placeholder.
    fn render(&self) -> String {
        match self {
            BoundValue::Int(v) => format!("\"{v}\"^^<http://www.w3.org/2001/XMLSchema#integer>"),
            BoundValue::Double(v) => format!("\"{v}\"^^<http://www.w3.org/2001/XMLSchema#double>"),
            BoundValue::Bool(v) => v.to_string(),
            BoundValue::Str(v) => format!("\"{}\"", escape_string_literal(v)),
            BoundValue::DateTime(v) => format!("\"{}\"^^<http://www.w3.org/2001/XMLSchema#dateTime>", v.to_rfc3339()),
            BoundValue::LangString(v, lang) => format!("\"{}\"@{lang}", escape_string_literal(v)),
        }
    }
}

fn escape_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Releases the busy flag on every exit path, including early returns from
/// `?` inside `execute`/`update`/`serialize`.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A parameterized, bindable, re-executable SPARQL query or update (§4.6).
///
/// Bindings live behind a [`Mutex`] so a statement handle may be created on
/// one thread and bound/invoked from another (§5): the mutex only ever
/// guards the binding map itself, not the whole bind-then-execute sequence,
/// which callers are still responsible for serializing (concurrent
/// `execute`/`update` calls on the same handle return [`StatementError::Busy`]
/// rather than silently interleaving).
pub struct PreparedStatement {
    text: String,
    bindings: Mutex<HashMap<String, BoundValue>>,
    busy: AtomicBool,
}

impl PreparedStatement {
    pub fn new(sparql_text: impl Into<String>) -> Self {
        Self { text: sparql_text.into(), bindings: Mutex::new(HashMap::new()), busy: AtomicBool::new(false) }
    }

    pub fn bind_int(&self, name: &str, value: i64) {
        self.set(name, BoundValue::Int(value));
    }

    pub fn bind_double(&self, name: &str, value: f64) {
        self.set(name, BoundValue::Double(value));
    }

    pub fn bind_bool(&self, name: &str, value: bool) {
        self.set(name, BoundValue::Bool(value));
    }

    pub fn bind_string(&self, name: &str, value: impl Into<String>) {
        self.set(name, BoundValue::Str(value.into()));
    }

    pub fn bind_datetime(&self, name: &str, value: DateTime<Utc>) {
        self.set(name, BoundValue::DateTime(value));
    }

    pub fn bind_langstring(&self, name: &str, value: impl Into<String>, language: impl Into<String>) {
        self.set(name, BoundValue::LangString(value.into(), language.into()));
    }

    fn set(&self, name: &str, value: BoundValue) {
        self.bindings.lock().unwrap().insert(name.to_string(), value);
    }

    /// Drops every binding. The statement text itself is untouched.
    pub fn clear_bindings(&self) {
        self.bindings.lock().unwrap().clear();
    }

    fn acquire(&self) -> StatementResult<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| StatementError::Busy)
    }

    /// Replaces every `~name` placeholder with its bound value's SPARQL
    /// literal syntax. Scans by hand rather than via a regex crate: the
    /// placeholder grammar (`~` then an ASCII identifier) is simple enough
    /// that a single pass over characters is clearer than compiling a
    /// pattern. Operates on `char`s (not bytes) so multi-byte UTF-8 content
    /// elsewhere in the query text — e.g. non-ASCII text inside string
    /// literals — passes through unmodified.
    fn substitute(&self) -> StatementResult<String> {
        let bindings = self.bindings.lock().unwrap();
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(tilde_pos) = rest.find('~') {
            out.push_str(&rest[..tilde_pos]);
            let after = &rest[tilde_pos + 1..];
            let ident_len = after.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').count();
            if ident_len == 0 || !after.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false) {
                out.push('~');
                rest = after;
                continue;
            }
            let name = &after[..ident_len];
            let value = bindings.get(name).ok_or_else(|| BindingError::Unbound(name.to_string()))?;
            out.push_str(&value.render());
            rest = &after[ident_len..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Compiles (if needed) and runs the statement as a SELECT/ASK/
    /// CONSTRUCT/DESCRIBE query, returning a results cursor. Fails with
    /// [`StatementError::WrongKind`] if the text is actually an update.
    pub fn execute(&self, store: &RdfStore, cancel: &CancelToken) -> StatementResult<VecCursor> {
        let _guard = self.acquire()?;
        let text = self.substitute()?;
        match SparqlEngine::query(store, &text, cancel) {
            Ok(outcome) => Ok(outcome.into_cursor()),
            Err(err) => Err(reclassify_as_wrong_kind(&text, err, "query", "update")),
        }
    }

    /// Runs the statement as an INSERT/DELETE update against `engine`'s
    /// write buffer. Fails with [`StatementError::WrongKind`] if the text is
    /// actually a SELECT/ASK/CONSTRUCT/DESCRIBE.
    pub fn update(&self, engine: &mut UpdateEngine) -> StatementResult<()> {
        let _guard = self.acquire()?;
        let text = self.substitute()?;
        if SparqlParser::parse_query(&text).is_ok() {
            return Err(StatementError::WrongKind { expected: "update", actual: "query" });
        }
        SparqlEngine::update(engine, &text)?;
        Ok(())
    }

    /// Only valid on CONSTRUCT/DESCRIBE: executes the statement and wraps
    /// the resulting quad cursor in a serializer for `format`.
    pub fn serialize(&self, store: &RdfStore, format: Format, cancel: CancelToken) -> StatementResult<Box<dyn std::io::Read>> {
        let _guard = self.acquire()?;
        let text = self.substitute()?;
        match SparqlEngine::query(store, &text, &cancel) {
            Ok(QueryOutcome::Graph(cursor)) => {
                Ok(open_serializer(format, Box::new(cursor), crate::rdf::namespace::NamespaceManager::new(), cancel))
            }
            Ok(QueryOutcome::Select { .. }) => Err(StatementError::WrongKind { expected: "CONSTRUCT/DESCRIBE", actual: "SELECT" }),
            Ok(QueryOutcome::Ask(_)) => Err(StatementError::WrongKind { expected: "CONSTRUCT/DESCRIBE", actual: "ASK" }),
            Err(err) => Err(reclassify_as_wrong_kind(&text, err, "CONSTRUCT/DESCRIBE", "update")),
        }
    }
}

/// A query-shaped parse failure might actually be an update statement;
/// check before surfacing the raw parse error, so callers see `WrongKind`
/// instead of a confusing syntax error.
fn reclassify_as_wrong_kind(text: &str, err: SparqlError, expected: &'static str, other: &'static str) -> StatementError {
    if matches!(err, SparqlError::Parse(_)) && SparqlParser::parse_update(text).is_ok() {
        StatementError::WrongKind { expected, actual: other }
    } else {
        StatementError::Sparql(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::cursor::Cursor;
    use crate::rdf::store::StoredQuad;

    fn store_with_data() -> RdfStore {
        let mut store = RdfStore::new();
        let s = store.ensure_resource("http://e/alice");
        let p = store.ensure_resource("http://e/age");
        let o = crate::rdf::store::StoredObject::Literal {
            lexical: "30".to_string(),
            datatype: "http://www.w3.org/2001/XMLSchema#integer".to_string(),
            language: None,
        };
        store.insert_quad(StoredQuad { graph: None, subject: s, predicate: p, object: o });
        store
    }

    #[test]
    fn binds_and_substitutes_an_integer_parameter() {
        let store = store_with_data();
        let stmt = PreparedStatement::new("SELECT ?s WHERE { ?s <http://e/age> ~age }");
        stmt.bind_int("age", 30);
        let mut cursor = stmt.execute(&store, &CancelToken::new()).unwrap();
        assert!(cursor.next(&CancelToken::new()).unwrap());
        assert_eq!(cursor.string(0).unwrap().0, "http://e/alice");
    }

    #[test]
    fn rebinding_overwrites_the_previous_value() {
        let store = store_with_data();
        let stmt = PreparedStatement::new("SELECT ?s WHERE { ?s <http://e/age> ~age }");
        stmt.bind_int("age", 99);
        stmt.bind_int("age", 30);
        let mut cursor = stmt.execute(&store, &CancelToken::new()).unwrap();
        assert!(cursor.next(&CancelToken::new()).unwrap());
    }

    #[test]
    fn clear_bindings_makes_the_statement_fail_on_unbound_parameter() {
        let store = store_with_data();
        let stmt = PreparedStatement::new("SELECT ?s WHERE { ?s <http://e/age> ~age }");
        stmt.bind_int("age", 30);
        stmt.clear_bindings();
        let err = stmt.execute(&store, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, StatementError::Binding(BindingError::Unbound(name)) if name == "age"));
    }

    #[test]
    fn execute_on_an_update_only_statement_fails_wrong_kind() {
        let store = store_with_data();
        let stmt = PreparedStatement::new("INSERT DATA { <http://e/s> <http://e/p> <http://e/o> }");
        let err = stmt.execute(&store, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, StatementError::WrongKind { expected: "query", actual: "update" }));
    }

    #[test]
    fn update_on_a_select_statement_fails_wrong_kind() {
        let mut engine = UpdateEngine::new();
        let stmt = PreparedStatement::new("SELECT * WHERE { ?s ?p ?o }");
        let err = stmt.update(&mut engine).unwrap_err();
        assert!(matches!(err, StatementError::WrongKind { expected: "update", actual: "query" }));
    }

    #[test]
    fn update_applies_bound_literal_parameter() {
        let mut engine = UpdateEngine::new();
        let stmt = PreparedStatement::new("INSERT DATA { <http://e/s> <http://e/p> ~val }");
        stmt.bind_string("val", "hello");
        stmt.update(&mut engine).unwrap();
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn serialize_is_only_valid_for_construct_or_describe() {
        let store = store_with_data();
        let stmt = PreparedStatement::new("SELECT * WHERE { ?s ?p ?o }");
        let err = stmt.serialize(&store, Format::Turtle, CancelToken::new()).unwrap_err();
        assert!(matches!(err, StatementError::WrongKind { expected: "CONSTRUCT/DESCRIBE", .. }));
    }

    #[test]
    fn serialize_construct_renders_turtle_bytes() {
        let store = store_with_data();
        let stmt = PreparedStatement::new("CONSTRUCT { ?s <http://e/copy> ?o } WHERE { ?s <http://e/age> ?o }");
        let mut reader = stmt.serialize(&store, Format::Turtle, CancelToken::new()).unwrap();
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut reader, &mut buf).unwrap();
        assert!(buf.contains("http://e/copy") || buf.contains("copy"));
    }

    #[test]
    fn a_second_acquire_while_one_is_held_reports_busy() {
        let stmt = PreparedStatement::new("SELECT * WHERE { ?s ?p ?o }");
        let _guard = stmt.acquire().unwrap();
        assert!(matches!(stmt.acquire(), Err(StatementError::Busy)));
    }

    #[test]
    fn acquire_succeeds_again_once_the_guard_drops() {
        let stmt = PreparedStatement::new("SELECT * WHERE { ?s ?p ?o }");
        {
            let _guard = stmt.acquire().unwrap();
        }
        assert!(stmt.acquire().is_ok());
    }
}
