//! SPARQL 1.1 query language support: a prepared-statement-friendly surface
//! over the BGP-join [`executor`], the [`results`] cursor builders, and the
//! update path already implemented on [`crate::rdf::update::UpdateEngine`].
//!
//! `SparqlEngine` itself is stateless — query evaluation only ever needs a
//! borrowed [`RdfStore`], and UPDATE execution is already owned by
//! [`crate::rdf::update::UpdateEngine::update_sparql`] — so the functions
//! here take the store/engine by reference rather than wrapping one, letting
//! [`crate::rdf::statement::PreparedStatement`] and the HTTP endpoint share a
//! single store under one lock without this module adding a second handle to
//! it.
//!
//! # Example
//!
//! ```rust,ignore
//! use tinytriple::sparql::SparqlEngine;
//! use tinytriple::rdf::cursor::CancelToken;
//! use tinytriple::rdf::store::RdfStore;
//!
//! let store = RdfStore::new();
//! let outcome = SparqlEngine::query(&store, "SELECT * WHERE { ?s ?p ?o }", &CancelToken::new())?;
//! # Ok::<(), tinytriple::sparql::SparqlError>(())
//! ```

mod executor;
mod http;
mod optimizer;
mod parser;
mod results;

pub use executor::{ExecutionError, ExecutionResult};
pub use http::{router, HttpError, SparqlHttpState};
pub use parser::{ParseError as SparqlParseError, SparqlParser};
pub use results::Binding;

use std::collections::HashMap;

use spargebra::Query;
use thiserror::Error;

use crate::rdf::cursor::{CancelToken, Cursor, VecCursor};
use crate::rdf::store::RdfStore;
use crate::rdf::update::{UpdateEngine, UpdateError};

use executor::{collect_variables, BgpExecutor};
use results::{ask_cursor, bindings_cursor, graph_cursor, cell_of_stored_object, GraphRow};

#[derive(Error, Debug)]
pub enum SparqlError {
    #[error("parse error: {0}")]
    Parse(#[from] SparqlParseError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    #[error("wrong query form: expected {expected}, query was a {actual}")]
    WrongForm { expected: &'static str, actual: &'static str },
}

pub type SparqlResult<T> = Result<T, SparqlError>;

/// The shape of a successfully executed query, distinguished by SPARQL query
/// form (§4.6's `execute` dispatches on this to pick cursor vs. boolean).
pub enum QueryOutcome {
    /// SELECT: a bindings cursor plus the projected variable names in order.
    Select { cursor: VecCursor, variables: Vec<String> },
    /// ASK: a single boolean.
    Ask(bool),
    /// CONSTRUCT/DESCRIBE: a quad-shaped cursor ready for
    /// `rdf::serialization::open_serializer`.
    Graph(VecCursor),
}

impl QueryOutcome {
    pub fn into_cursor(self) -> VecCursor {
        match self {
            QueryOutcome::Select { cursor, .. } => cursor,
            QueryOutcome::Ask(result) => ask_cursor(result),
            QueryOutcome::Graph(cursor) => cursor,
        }
    }
}

/// Stateless SPARQL entry points shared by the prepared-statement API and
/// the HTTP endpoint.
pub struct SparqlEngine;

impl SparqlEngine {
    /// Parses and evaluates a query (SELECT/ASK/CONSTRUCT/DESCRIBE) against
    /// `store`.
    pub fn query(store: &RdfStore, query_str: &str, cancel: &CancelToken) -> SparqlResult<QueryOutcome> {
        let query = SparqlParser::parse_query(query_str)?;
        cancel.check().map_err(|_| ExecutionError::Unsupported("cancelled".to_string()))?;
        match query {
            Query::Select { pattern, .. } => {
                let variables = select_variables(&pattern);
                let rows = BgpExecutor::new(store).evaluate(&pattern)?;
                Ok(QueryOutcome::Select { cursor: bindings_cursor(store, &variables, &rows), variables })
            }
            Query::Ask { pattern, .. } => {
                let rows = BgpExecutor::new(store).evaluate(&pattern)?;
                Ok(QueryOutcome::Ask(!rows.is_empty()))
            }
            Query::Construct { template, pattern, .. } => {
                let rows = BgpExecutor::new(store).evaluate(&pattern)?;
                let graph_rows = instantiate_template(&template, &rows, store);
                Ok(QueryOutcome::Graph(graph_cursor(graph_rows)))
            }
            Query::Describe { pattern, .. } => {
                let rows = BgpExecutor::new(store).evaluate(&pattern)?;
                Ok(QueryOutcome::Graph(graph_cursor(describe_bounded(&rows, store))))
            }
        }
    }

    /// Only valid for SELECT; returns [`SparqlError::WrongForm`] otherwise.
    pub fn query_select(store: &RdfStore, query_str: &str, cancel: &CancelToken) -> SparqlResult<(VecCursor, Vec<String>)> {
        match Self::query(store, query_str, cancel)? {
            QueryOutcome::Select { cursor, variables } => Ok((cursor, variables)),
            QueryOutcome::Ask(_) => Err(SparqlError::WrongForm { expected: "SELECT", actual: "ASK" }),
            QueryOutcome::Graph(_) => Err(SparqlError::WrongForm { expected: "SELECT", actual: "CONSTRUCT/DESCRIBE" }),
        }
    }

    /// Parses and applies a SPARQL UPDATE request (`INSERT DATA`/`DELETE
    /// DATA`) against `engine`'s write buffer. Staged, not flushed — the
    /// caller commits via `TransactionManager`.
    pub fn update(engine: &mut UpdateEngine, update_str: &str) -> SparqlResult<()> {
        engine.update_sparql(update_str)?;
        Ok(())
    }
}

/// The SELECT variable list, in projection order. Bare `SELECT *` compiles
/// to a raw `GraphPattern` with no `Project` node, so the fallback collects
/// every variable the pattern mentions (insertion order is not meaningful
/// there — sorted for a deterministic column order).
fn select_variables(pattern: &spargebra::algebra::GraphPattern) -> Vec<String> {
    if let Some(names) = projected_variables(pattern) {
        return names;
    }
    let mut seen = HashMap::new();
    collect_variables(pattern, &mut seen);
    let mut names: Vec<String> = seen.into_keys().collect();
    names.sort();
    names
}

fn projected_variables(pattern: &spargebra::algebra::GraphPattern) -> Option<Vec<String>> {
    use spargebra::algebra::GraphPattern;
    match pattern {
        GraphPattern::Project { variables, .. } => Some(variables.iter().map(|v| v.as_str().to_string()).collect()),
        GraphPattern::Distinct { inner } | GraphPattern::Reduced { inner } | GraphPattern::Slice { inner, .. } | GraphPattern::OrderBy { inner, .. } => {
            projected_variables(inner)
        }
        _ => None,
    }
}

fn instantiate_template(template: &[spargebra::term::TriplePattern], solutions: &[Binding], store: &RdfStore) -> Vec<GraphRow> {
    use crate::rdf::cursor::Cell;
    use spargebra::term::{NamedNodePattern, TermPattern};

    fn term_cell(term: &TermPattern, binding: &Binding, store: &RdfStore, solution_idx: usize) -> Option<Cell> {
        match term {
            TermPattern::NamedNode(n) => Some(Cell::Iri(n.as_str().to_string())),
            TermPattern::Literal(l) => Some(Cell::Literal {
                lexical: l.value().to_string(),
                datatype: l.datatype().as_str().to_string(),
                language: l.language().map(str::to_string),
            }),
            TermPattern::BlankNode(b) => Some(Cell::BlankNode(format!("construct-{solution_idx}-{}", b.as_str()))),
            TermPattern::Variable(v) => binding.get(v.as_str()).map(|o| cell_of_stored_object(store, o)),
        }
    }

    fn predicate_cell(pred: &NamedNodePattern, binding: &Binding, store: &RdfStore) -> Option<Cell> {
        match pred {
            NamedNodePattern::NamedNode(n) => Some(Cell::Iri(n.as_str().to_string())),
            NamedNodePattern::Variable(v) => binding.get(v.as_str()).map(|o| cell_of_stored_object(store, o)),
        }
    }

    let mut out = Vec::new();
    for (idx, solution) in solutions.iter().enumerate() {
        for t in template {
            let subject = term_cell(&t.subject, solution, store, idx);
            let predicate = predicate_cell(&t.predicate, solution, store);
            let object = term_cell(&t.object, solution, store, idx);
            if let (Some(subject), Some(predicate), Some(object)) = (subject, predicate, object) {
                out.push(GraphRow { subject, predicate, object, graph: crate::rdf::cursor::Cell::Unbound });
            }
        }
    }
    out
}

/// Concise bounded description: every quad whose subject is a resource bound
/// to any variable across the WHERE solutions. Blank-node closure (following
/// bnode objects transitively) is not implemented.
fn describe_bounded(solutions: &[Binding], store: &RdfStore) -> Vec<GraphRow> {
    use crate::rdf::store::StoredObject;
    use std::collections::HashSet;

    let mut resources = HashSet::new();
    for solution in solutions {
        for value in solution.values() {
            if let StoredObject::Resource(id) = value {
                resources.insert(*id);
            }
        }
    }

    let mut out = Vec::new();
    for resource in resources {
        for quad in store.match_quads(None, Some(resource), None, None) {
            out.push(GraphRow {
                subject: cell_of_stored_object(store, &StoredObject::Resource(quad.subject)),
                predicate: cell_of_stored_object(store, &StoredObject::Resource(quad.predicate)),
                object: cell_of_stored_object(store, &quad.object),
                graph: quad.graph.map(|g| cell_of_stored_object(store, &StoredObject::Resource(g))).unwrap_or(crate::rdf::cursor::Cell::Unbound),
            });
        }
    }
    out
}
