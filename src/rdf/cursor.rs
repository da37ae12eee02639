//! Pull-based tabular cursor over RDF terms.
//!
//! A cursor is the single abstraction shared by query results, file
//! deserializers, and in-memory resource adapters: a fixed set of typed
//! columns, advanced one row at a time, never rewound.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{BlankNode, Literal, NamedNode, RdfObject, RdfSubject};

/// Cursor errors.
#[derive(Error, Debug)]
pub enum CursorError {
    /// Cooperative cancellation fired at a suspension point.
    #[error("cancelled")]
    Cancelled,

    /// A typed extractor (`integer`/`double`/`boolean`/`datetime`) could not
    /// coerce the cell's lexical form.
    #[error("cannot coerce column {0} to the requested type: {1}")]
    Coercion(usize, String),

    /// Column index out of range.
    #[error("column {0} out of range (column_count = {1})")]
    OutOfRange(usize, usize),

    /// The underlying source failed.
    #[error("cursor source error: {0}")]
    Source(String),
}

pub type CursorResult<T> = Result<T, CursorError>;

/// The type tag of a cursor cell, mirroring §3's RDF term variants plus the
/// typed extractor kinds a backend may additionally report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Iri,
    Literal,
    BlankNode,
    Unbound,
    Integer,
    Double,
    Boolean,
    Datetime,
    String,
}

/// A single cooperative cancellation flag, checked at suspension points.
///
/// Cloning shares the same underlying flag; cancelling any clone cancels all.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Returns `Err(CursorError::Cancelled)` if the token has fired.
    pub fn check(&self) -> CursorResult<()> {
        if self.is_cancelled() {
            Err(CursorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One materialized row cell. Deserializer and in-memory cursors build rows
/// out of these; the SPARQL engine's bindings cursor does too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Iri(String),
    BlankNode(String),
    Literal { lexical: String, datatype: String, language: Option<String> },
    Integer(i64),
    Double(u64), // bits of an f64, to keep Cell: Eq
    Boolean(bool),
    Datetime(String), // RFC 3339 text; parsed lazily by `datetime()`
    Unbound,
}

impl Cell {
    pub fn double(v: f64) -> Self {
        Cell::Double(v.to_bits())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Cell::Iri(_) => ValueType::Iri,
            Cell::BlankNode(_) => ValueType::BlankNode,
            Cell::Literal { .. } => ValueType::Literal,
            Cell::Integer(_) => ValueType::Integer,
            Cell::Double(_) => ValueType::Double,
            Cell::Boolean(_) => ValueType::Boolean,
            Cell::Datetime(_) => ValueType::Datetime,
            Cell::Unbound => ValueType::Unbound,
        }
    }

    pub fn from_subject(s: &RdfSubject) -> Self {
        match s {
            RdfSubject::NamedNode(n) => Cell::Iri(n.as_str().to_string()),
            RdfSubject::BlankNode(b) => Cell::BlankNode(b.as_str().to_string()),
        }
    }

    pub fn from_predicate(p: &super::types::RdfPredicate) -> Self {
        Cell::Iri(p.as_named_node().as_str().to_string())
    }

    pub fn from_object(o: &RdfObject) -> Self {
        match o {
            RdfObject::NamedNode(n) => Cell::Iri(n.as_str().to_string()),
            RdfObject::BlankNode(b) => Cell::BlankNode(b.as_str().to_string()),
            RdfObject::Literal(l) => Cell::Literal {
                lexical: l.value().to_string(),
                datatype: l.datatype().as_str().to_string(),
                language: l.language().map(|s| s.to_string()),
            },
        }
    }

    pub fn from_named_node(n: &NamedNode) -> Self {
        Cell::Iri(n.as_str().to_string())
    }
}

/// The uniform pull-based cursor surface (§4.2). Implemented by a closed,
/// enumerable set of concrete kinds — [`VecCursor`] here, plus the Turtle/TriG
/// parser cursor and the SPARQL results cursor elsewhere in the crate —
/// rather than an open `Box<dyn Cursor>` object hierarchy at every call site.
pub trait Cursor {
    fn column_count(&self) -> usize;
    fn variable_name(&self, i: usize) -> Option<&str>;
    fn value_type(&self, i: usize) -> CursorResult<ValueType>;
    /// `(lexical, language_tag, length)`.
    fn string(&self, i: usize) -> CursorResult<(String, Option<String>, usize)>;
    fn integer(&self, i: usize) -> CursorResult<i64>;
    fn double(&self, i: usize) -> CursorResult<f64>;
    fn boolean(&self, i: usize) -> CursorResult<bool>;
    fn datetime(&self, i: usize) -> CursorResult<DateTime<Utc>>;
    fn next(&mut self, cancel: &CancelToken) -> CursorResult<bool>;
    fn close(&mut self);
}

/// A cursor backed by an already-materialized `Vec<Vec<Cell>>` with fixed
/// column names. Used for in-memory SPARQL bindings results and the
/// resource-tree adapter (§4.4).
pub struct VecCursor {
    names: Vec<Option<String>>,
    rows: std::vec::IntoIter<Vec<Cell>>,
    current: Option<Vec<Cell>>,
    closed: bool,
}

impl VecCursor {
    pub fn new(names: Vec<Option<String>>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            names,
            rows: rows.into_iter(),
            current: None,
            closed: false,
        }
    }

    fn cell(&self, i: usize) -> CursorResult<&Cell> {
        let row = self.current.as_ref().ok_or_else(|| {
            CursorError::Source("next() not called or past EOF".to_string())
        })?;
        row.get(i).ok_or(CursorError::OutOfRange(i, row.len()))
    }
}

impl Cursor for VecCursor {
    fn column_count(&self) -> usize {
        self.names.len()
    }

    fn variable_name(&self, i: usize) -> Option<&str> {
        self.names.get(i).and_then(|n| n.as_deref())
    }

    fn value_type(&self, i: usize) -> CursorResult<ValueType> {
        Ok(self.cell(i)?.value_type())
    }

    fn string(&self, i: usize) -> CursorResult<(String, Option<String>, usize)> {
        match self.cell(i)? {
            Cell::Iri(s) | Cell::BlankNode(s) => Ok((s.clone(), None, s.len())),
            Cell::Literal { lexical, language, .. } => {
                Ok((lexical.clone(), language.clone(), lexical.len()))
            }
            Cell::Integer(n) => {
                let s = n.to_string();
                Ok((s.clone(), None, s.len()))
            }
            Cell::Double(bits) => {
                let s = f64::from_bits(*bits).to_string();
                Ok((s.clone(), None, s.len()))
            }
            Cell::Boolean(b) => {
                let s = b.to_string();
                Ok((s.clone(), None, s.len()))
            }
            Cell::Datetime(s) => Ok((s.clone(), None, s.len())),
            Cell::Unbound => Ok((String::new(), None, 0)),
        }
    }

    fn integer(&self, i: usize) -> CursorResult<i64> {
        match self.cell(i)? {
            Cell::Integer(n) => Ok(*n),
            Cell::Literal { lexical, .. } => lexical
                .parse()
                .map_err(|e: std::num::ParseIntError| CursorError::Coercion(i, e.to_string())),
            other => Err(CursorError::Coercion(i, format!("{:?} is not an integer", other.value_type()))),
        }
    }

    fn double(&self, i: usize) -> CursorResult<f64> {
        match self.cell(i)? {
            Cell::Double(bits) => Ok(f64::from_bits(*bits)),
            Cell::Integer(n) => Ok(*n as f64),
            Cell::Literal { lexical, .. } => lexical
                .parse()
                .map_err(|e: std::num::ParseFloatError| CursorError::Coercion(i, e.to_string())),
            other => Err(CursorError::Coercion(i, format!("{:?} is not a double", other.value_type()))),
        }
    }

    fn boolean(&self, i: usize) -> CursorResult<bool> {
        match self.cell(i)? {
            Cell::Boolean(b) => Ok(*b),
            Cell::Literal { lexical, .. } => match lexical.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(CursorError::Coercion(i, format!("not a boolean: {other}"))),
            },
            other => Err(CursorError::Coercion(i, format!("{:?} is not a boolean", other.value_type()))),
        }
    }

    fn datetime(&self, i: usize) -> CursorResult<DateTime<Utc>> {
        let text = match self.cell(i)? {
            Cell::Datetime(s) => s.clone(),
            Cell::Literal { lexical, .. } => lexical.clone(),
            other => return Err(CursorError::Coercion(i, format!("{:?} is not a datetime", other.value_type()))),
        };
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CursorError::Coercion(i, e.to_string()))
    }

    fn next(&mut self, cancel: &CancelToken) -> CursorResult<bool> {
        cancel.check()?;
        if self.closed {
            return Ok(false);
        }
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_cursor_yields_rows_in_order() {
        let mut cursor = VecCursor::new(
            vec![Some("s".to_string())],
            vec![vec![Cell::Iri("http://e/1".to_string())], vec![Cell::Iri("http://e/2".to_string())]],
        );
        let token = CancelToken::new();
        assert!(cursor.next(&token).unwrap());
        assert_eq!(cursor.string(0).unwrap().0, "http://e/1");
        assert!(cursor.next(&token).unwrap());
        assert_eq!(cursor.string(0).unwrap().0, "http://e/2");
        assert!(!cursor.next(&token).unwrap());
    }

    #[test]
    fn cancel_token_short_circuits_next() {
        let mut cursor = VecCursor::new(vec![], vec![vec![]]);
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(cursor.next(&token), Err(CursorError::Cancelled)));
    }

    #[test]
    fn unbound_column_reports_unbound_type() {
        let mut cursor = VecCursor::new(vec![Some("x".into())], vec![vec![Cell::Unbound]]);
        let token = CancelToken::new();
        cursor.next(&token).unwrap();
        assert_eq!(cursor.value_type(0).unwrap(), ValueType::Unbound);
    }
}
