//! Bootstrap binary for the SPARQL 1.1 Protocol endpoint (§4.9, §6): opens a
//! store — optionally backed by on-disk persistence — wraps it in a
//! [`TransactionManager`], and serves the thin HTTP adapter built by
//! [`tinytriple::sparql::router`].
//!
//! This is a bootstrap, not a CLI front end (§1 excludes "CLI utility
//! front-ends" from scope): argument handling is limited to
//! `--host`/`--port`/`--data-dir`, with environment-variable equivalents for
//! unattended start-up.

use std::sync::{Arc, Mutex};

use tinytriple::persistence::PersistenceManager;
use tinytriple::rdf::{TransactionManager, UpdateEngine};
use tinytriple::sparql::{router, SparqlHttpState};

fn arg_value(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(a) = args.next() {
        if a == flag {
            return args.next();
        }
    }
    None
}

fn setting(flag: &str, env_var: &str) -> Option<String> {
    arg_value(flag).or_else(|| std::env::var(env_var).ok())
}

/// Opens the transaction manager: with durable WAL + column-family mirror
/// under `data_dir` if one was given, or a purely in-memory store otherwise.
fn open_transactions(data_dir: Option<&str>) -> TransactionManager {
    let Some(data_dir) = data_dir else {
        return TransactionManager::new(UpdateEngine::new());
    };

    let persistence = Arc::new(PersistenceManager::open(data_dir).expect("failed to open persistence directory"));
    let store = persistence.rebuild().expect("failed to rebuild store from persisted state");
    tracing::info!(quads = store.len(), %data_dir, "rebuilt store from persisted state");

    let mut engine = UpdateEngine::new();
    let bnode_counter = store.max_engine_bnode_counter();
    *engine.store_mut() = store;
    engine.restore_bnode_counter(bnode_counter);

    TransactionManager::with_persistence(engine, persistence)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let host = setting("--host", "TINYTRIPLE_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = setting("--port", "TINYTRIPLE_PORT").and_then(|p| p.parse().ok()).unwrap_or(3030);
    let data_dir = setting("--data-dir", "TINYTRIPLE_DATA_DIR");

    let transactions = open_transactions(data_dir.as_deref());
    let state = SparqlHttpState { transactions: Arc::new(Mutex::new(transactions)) };
    let app = router(state);

    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "starting SPARQL 1.1 Protocol endpoint");
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind endpoint address");
    axum::serve(listener, app).await.expect("endpoint server failed");
}
