//! Thin wrapper over `spargebra` so the rest of the module depends on one
//! narrow seam instead of spreading `spargebra::Query::parse` call sites.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("query syntax error: {0}")]
    Query(String),

    #[error("update syntax error: {0}")]
    Update(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// SPARQL parser
pub struct SparqlParser;

impl SparqlParser {
    /// Parse a SPARQL query string into `spargebra`'s query algebra.
    pub fn parse_query(query: &str) -> ParseResult<spargebra::Query> {
        spargebra::Query::parse(query, None).map_err(|e| ParseError::Query(e.to_string()))
    }

    /// Parse a SPARQL UPDATE request string.
    pub fn parse_update(update: &str) -> ParseResult<spargebra::Update> {
        spargebra::Update::parse(update, None).map_err(|e| ParseError::Update(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_select() {
        let query = SparqlParser::parse_query("SELECT * WHERE { ?s ?p ?o }").unwrap();
        assert!(matches!(query, spargebra::Query::Select { .. }));
    }

    #[test]
    fn parses_insert_data() {
        let update = SparqlParser::parse_update(
            "INSERT DATA { <http://e/s> <http://e/p> <http://e/o> }",
        )
        .unwrap();
        assert_eq!(update.operations.len(), 1);
    }

    #[test]
    fn rejects_malformed_query() {
        assert!(SparqlParser::parse_query("SELECT ?s WHERE {").is_err());
    }
}
