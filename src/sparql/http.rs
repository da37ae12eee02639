//! SPARQL 1.1 HTTP protocol endpoint (§4.9): `GET`/`POST /sparql` for
//! queries and updates behind one shared transaction lock, `GET /` for a
//! static service description. Content negotiation picks a result format
//! from the `Accept` header, honoring a `TRACKER_TEST_PREFERRED_CURSOR_FORMAT`
//! override so test harnesses can force a format without fighting
//! `Accept`-header quoting.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query as AxumQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use thiserror::Error;

use crate::rdf::cursor::CancelToken;
use crate::rdf::namespace::NamespaceManager;
use crate::rdf::parser::Format;
use crate::rdf::serialization::open_serializer;
use crate::rdf::transaction::TransactionManager;

use super::{QueryOutcome, SparqlEngine, SparqlError};

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("missing query or update parameter")]
    MissingParameter,

    #[error("sparql error: {0}")]
    Sparql(#[from] SparqlError),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            HttpError::MissingParameter => StatusCode::BAD_REQUEST,
            HttpError::Sparql(_) => StatusCode::BAD_REQUEST,
            HttpError::Transaction(_) => StatusCode::CONFLICT,
            HttpError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Shared state behind the endpoint: one store guarded by a single
/// transaction manager lock, so a query never observes a half-applied
/// update.
#[derive(Clone)]
pub struct SparqlHttpState {
    pub transactions: Arc<Mutex<TransactionManager>>,
}

/// Builds the axum router.
pub fn router(state: SparqlHttpState) -> Router {
    Router::new()
        .route("/", get(service_description))
        .route("/sparql", get(handle_request).post(handle_request))
        .with_state(state)
}

async fn service_description() -> Response {
    let body = concat!(
        "@prefix sd: <http://www.w3.org/ns/sparql-service-description#> .\n",
        "\n",
        "[] a sd:Service ;\n",
        "    sd:supportedLanguage sd:SPARQL11Query, sd:SPARQL11Update ;\n",
        "    sd:feature sd:EmptyGraphs, sd:BasicFederatedQuery, sd:UnionDefaultGraph ;\n",
        "    sd:resultFormat <http://www.w3.org/ns/formats/SPARQL_Results_JSON>,\n",
        "                    <http://www.w3.org/ns/formats/SPARQL_Results_XML> .\n",
    );
    ([(header::CONTENT_TYPE, "text/turtle")], body).into_response()
}

async fn handle_request(
    State(state): State<SparqlHttpState>,
    headers: HeaderMap,
    AxumQuery(params): AxumQuery<HashMap<String, String>>,
) -> Response {
    match dispatch(&state, &headers, &params) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

fn dispatch(state: &SparqlHttpState, headers: &HeaderMap, params: &HashMap<String, String>) -> Result<Response, HttpError> {
    let cancel = CancelToken::new();

    if let Some(update_str) = params.get("update") {
        let mut tx = state.transactions.lock().unwrap();
        tx.begin().map_err(|e| HttpError::Transaction(e.to_string()))?;
        if let Err(e) = SparqlEngine::update(tx.engine_mut(), update_str) {
            let _ = tx.rollback();
            return Err(e.into());
        }
        tx.commit().map_err(|e| HttpError::Transaction(e.to_string()))?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let query_str = params.get("query").ok_or(HttpError::MissingParameter)?;
    let tx = state.transactions.lock().unwrap();
    let outcome = SparqlEngine::query(tx.engine().store(), query_str, &cancel)?;
    let is_bindings = matches!(outcome, QueryOutcome::Select { .. } | QueryOutcome::Ask(_));
    let format = negotiate_format(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()), is_bindings);

    let cursor = Box::new(outcome.into_cursor());
    let mut body = open_serializer(format, cursor, NamespaceManager::new(), cancel);
    let mut buf = Vec::new();
    body.read_to_end(&mut buf)?;

    Ok(([(header::CONTENT_TYPE, content_type_for(format))], buf).into_response())
}

fn content_type_for(format: Format) -> &'static str {
    match format {
        Format::SparqlJson => "application/sparql-results+json",
        Format::SparqlXml => "application/sparql-results+xml",
        Format::Turtle => "text/turtle",
        Format::TriG => "application/trig",
        Format::JsonLd => "application/ld+json",
    }
}

fn format_from_mime(mime: &str, is_bindings: bool) -> Option<Format> {
    match mime {
        "application/sparql-results+json" => Some(Format::SparqlJson),
        "application/sparql-results+xml" => Some(Format::SparqlXml),
        "text/turtle" => Some(Format::Turtle),
        "application/trig" => Some(Format::TriG),
        "application/ld+json" => Some(Format::JsonLd),
        "application/json" if is_bindings => Some(Format::SparqlJson),
        _ => None,
    }
}

/// `true` if `format` is acceptable to the client: either the `Accept`
/// header lists it (or `*/*`) explicitly, or there is no `Accept` header at
/// all, in which case nothing constrains the response format.
fn mutually_supported(format: Format, accept: Option<&str>, is_bindings: bool) -> bool {
    match accept {
        Some(accept) => accept.split(',').any(|candidate| {
            let mime = candidate.split(';').next().unwrap_or("").trim();
            mime == "*/*" || format_from_mime(mime, is_bindings) == Some(format)
        }),
        None => true,
    }
}

/// Picks a result format from (in order) the env override, the `Accept`
/// header's preference list, then a hard default per result shape.
///
/// `TRACKER_TEST_PREFERRED_CURSOR_FORMAT` is a digit index into
/// [`Format::ALL`], not a format name (§6, `tracker-endpoint-http.c`'s
/// `pick_format`'s `g_ascii_isdigit`/`atoi` against a format-index bitmask).
fn negotiate_format(accept: Option<&str>, is_bindings: bool) -> Format {
    if let Ok(forced) = std::env::var("TRACKER_TEST_PREFERRED_CURSOR_FORMAT") {
        if let Ok(index) = forced.parse::<usize>() {
            if let Some(&format) = Format::ALL.get(index) {
                if mutually_supported(format, accept, is_bindings) {
                    return format;
                }
            }
        }
    }
    if let Some(accept) = accept {
        for candidate in accept.split(',') {
            let mime = candidate.split(';').next().unwrap_or("").trim();
            if let Some(format) = format_from_mime(mime, is_bindings) {
                return format;
            }
        }
    }
    if is_bindings {
        Format::SparqlJson
    } else {
        Format::Turtle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_header_picks_matching_bindings_format() {
        assert!(matches!(negotiate_format(Some("application/sparql-results+xml"), true), Format::SparqlXml));
    }

    #[test]
    fn unrecognised_accept_falls_back_to_default_for_shape() {
        assert!(matches!(negotiate_format(Some("text/plain"), true), Format::SparqlJson));
        assert!(matches!(negotiate_format(Some("text/plain"), false), Format::Turtle));
    }

    #[test]
    fn env_override_wins_over_accept_header() {
        // Format::ALL[3] == Format::TriG.
        std::env::set_var("TRACKER_TEST_PREFERRED_CURSOR_FORMAT", "3");
        assert!(matches!(negotiate_format(Some("text/turtle, application/trig"), false), Format::TriG));
        std::env::remove_var("TRACKER_TEST_PREFERRED_CURSOR_FORMAT");
    }

    #[test]
    fn env_override_is_ignored_when_not_mutually_supported() {
        // Index 0 is SparqlJson, which the `Accept` header below does not list.
        std::env::set_var("TRACKER_TEST_PREFERRED_CURSOR_FORMAT", "0");
        assert!(matches!(negotiate_format(Some("text/turtle"), false), Format::Turtle));
        std::env::remove_var("TRACKER_TEST_PREFERRED_CURSOR_FORMAT");
    }
}
