//! RDF namespace and prefix management
//!
//! Maintains the bidirectional map between short prefixes and full IRI
//! namespaces used throughout parsing and serialization.

use std::collections::HashMap;
use thiserror::Error;

/// Namespace manager errors
#[derive(Error, Debug)]
pub enum PrefixError {
    /// Unknown prefix
    #[error("Unknown prefix: {0}")]
    UnknownPrefix(String),

    /// Invalid IRI
    #[error("Invalid IRI: {0}")]
    InvalidIri(String),

    /// Mutation attempted after `seal()`
    #[error("namespace map is sealed")]
    Sealed,
}

pub type PrefixResult<T> = Result<T, PrefixError>;

/// Namespace (prefix → IRI mapping)
#[derive(Debug, Clone)]
pub struct Namespace {
    /// Prefix
    pub prefix: String,
    /// IRI
    pub iri: String,
}

impl Namespace {
    /// Create a new namespace
    pub fn new(prefix: impl Into<String>, iri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            iri: iri.into(),
        }
    }
}

/// Namespace manager with common prefixes
///
/// Before [`NamespaceManager::seal`] the map has a single owner and may be
/// mutated freely; after sealing it is read-only and safe to share across
/// concurrent readers (`add_prefix` then fails with [`PrefixError::Sealed`]).
pub struct NamespaceManager {
    /// Prefix → IRI mappings
    prefixes: HashMap<String, String>,
    /// Insertion order, used to break length ties in `compress` deterministically
    order: Vec<String>,
    sealed: bool,
}

impl NamespaceManager {
    /// Create a new namespace manager with common prefixes
    pub fn new() -> Self {
        let mut mgr = Self {
            prefixes: HashMap::new(),
            order: Vec::new(),
            sealed: false,
        };

        // Default prefixes mirroring common SPARQL engine defaults: callers
        // never have to declare these to use `a` (rdf:type) or XSD datatypes.
        mgr.add_prefix("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#").ok();
        mgr.add_prefix("rdfs", "http://www.w3.org/2000/01/rdf-schema#").ok();
        mgr.add_prefix("xsd", "http://www.w3.org/2001/XMLSchema#").ok();
        mgr.add_prefix("owl", "http://www.w3.org/2002/07/owl#").ok();
        mgr.add_prefix("foaf", "http://xmlns.com/foaf/0.1/").ok();
        mgr.add_prefix("dc", "http://purl.org/dc/elements/1.1/").ok();
        mgr.add_prefix("dcterms", "http://purl.org/dc/terms/").ok();

        mgr
    }

    /// Insert or overwrite a prefix mapping. Fails once the map is sealed.
    pub fn add_prefix(&mut self, prefix: impl Into<String>, iri: impl Into<String>) -> PrefixResult<()> {
        if self.sealed {
            return Err(PrefixError::Sealed);
        }
        let prefix = prefix.into();
        if !self.prefixes.contains_key(&prefix) {
            self.order.push(prefix.clone());
        }
        self.prefixes.insert(prefix, iri.into());
        Ok(())
    }

    /// Makes the map read-only; subsequent `add_prefix` calls fail.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the map has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Get IRI for a prefix
    pub fn get_iri(&self, prefix: &str) -> PrefixResult<&str> {
        self.prefixes
            .get(prefix)
            .map(|s| s.as_str())
            .ok_or_else(|| PrefixError::UnknownPrefix(prefix.to_string()))
    }

    /// Expand a compact IRI (prefix:local) to full IRI
    pub fn expand(&self, compact_iri: &str) -> PrefixResult<String> {
        if let Some(pos) = compact_iri.find(':') {
            let prefix = &compact_iri[..pos];
            let local = &compact_iri[pos + 1..];
            let iri = self.get_iri(prefix)?;
            Ok(format!("{}{}", iri, local))
        } else {
            Err(PrefixError::InvalidIri(compact_iri.to_string()))
        }
    }

    /// Compact an IRI using the longest matching namespace. Ties (two
    /// namespaces of equal length both matching) are broken by insertion
    /// order: the first-registered prefix wins.
    pub fn compress(&self, iri: &str) -> Option<String> {
        let mut best: Option<&str> = None;
        for prefix in &self.order {
            let namespace_iri = &self.prefixes[prefix];
            if iri.starts_with(namespace_iri.as_str())
                && best.map_or(true, |b| namespace_iri.len() > self.prefixes[b].len())
            {
                best = Some(prefix);
            }
        }
        best.map(|prefix| {
            let namespace_iri = &self.prefixes[prefix];
            format!("{}:{}", prefix, &iri[namespace_iri.len()..])
        })
    }

    /// Deprecated alias kept for call sites written against the earlier,
    /// first-match behavior; now delegates to the longest-match `compress`.
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.compress(iri)
    }

    /// Get all registered prefixes
    pub fn prefixes(&self) -> Vec<Namespace> {
        self.order
            .iter()
            .map(|prefix| Namespace::new(prefix.clone(), self.prefixes[prefix].clone()))
            .collect()
    }
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_prefixes() {
        let mgr = NamespaceManager::new();

        assert_eq!(
            mgr.get_iri("rdf").unwrap(),
            "http://www.w3.org/1999/02/22-rdf-syntax-ns#"
        );
        assert_eq!(
            mgr.get_iri("rdfs").unwrap(),
            "http://www.w3.org/2000/01/rdf-schema#"
        );
        assert_eq!(mgr.get_iri("xsd").unwrap(), "http://www.w3.org/2001/XMLSchema#");
    }

    #[test]
    fn test_expand() {
        let mgr = NamespaceManager::new();

        let expanded = mgr.expand("foaf:name").unwrap();
        assert_eq!(expanded, "http://xmlns.com/foaf/0.1/name");

        let expanded = mgr.expand("rdf:type").unwrap();
        assert_eq!(expanded, "http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
    }

    #[test]
    fn test_expand_unknown_prefix() {
        let mgr = NamespaceManager::new();
        assert!(matches!(mgr.expand("bad:thing"), Err(PrefixError::UnknownPrefix(_))));
    }

    #[test]
    fn test_compress_longest_match() {
        let mut mgr = NamespaceManager::new();
        // A namespace nested under dcterms's own namespace, to exercise
        // the longest-match rule rather than first-registered-prefix-wins.
        mgr.add_prefix("dcsub", "http://purl.org/dc/terms/sub/").unwrap();

        let compressed = mgr.compress("http://purl.org/dc/terms/sub/title");
        assert_eq!(compressed, Some("dcsub:title".to_string()));

        let compressed = mgr.compress("http://purl.org/dc/terms/title");
        assert_eq!(compressed, Some("dcterms:title".to_string()));
    }

    #[test]
    fn test_namespace_round_trip() {
        let mut mgr = NamespaceManager::new();
        mgr.add_prefix("ex", "http://example.org/").unwrap();

        let expanded = mgr.expand("ex:alice").unwrap();
        assert_eq!(expanded, "http://example.org/alice");

        let compressed = mgr.compress(&expanded).unwrap();
        assert_eq!(mgr.expand(&compressed).unwrap(), expanded);
    }

    #[test]
    fn test_seal_blocks_mutation() {
        let mut mgr = NamespaceManager::new();
        mgr.seal();
        assert!(matches!(mgr.add_prefix("ex", "http://example.org/"), Err(PrefixError::Sealed)));
    }

    #[test]
    fn test_redefinition_overwrites() {
        let mut mgr = NamespaceManager::new();
        mgr.add_prefix("ex", "http://one.example/").unwrap();
        assert_eq!(mgr.expand("ex:a").unwrap(), "http://one.example/a");

        mgr.add_prefix("ex", "http://two.example/").unwrap();
        assert_eq!(mgr.expand("ex:a").unwrap(), "http://two.example/a");
    }
}
