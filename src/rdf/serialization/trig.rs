//! TriG serializer (§4.5.4): like Turtle, but rows are grouped first by
//! graph (wrapped in `graph_iri { … }` blocks, or left bare for the default
//! graph) and then by subject within each graph.

use crate::rdf::cursor::{CancelToken, Cursor};
use crate::rdf::namespace::NamespaceManager;

use super::turtle::render_object;
use super::{term_of, ChunkSource, SerializeResult, TermOut};

struct Row {
    subject: TermOut,
    predicate: TermOut,
    object: TermOut,
    graph: TermOut,
}

pub struct TriGSerializer {
    cursor: Box<dyn Cursor>,
    namespaces: NamespaceManager,
    cancel: CancelToken,
    pending: Option<Row>,
    prologue_emitted: bool,
    started: bool,
    finished: bool,
    current_graph: Option<String>,
    graph_open: bool,
}

impl TriGSerializer {
    pub fn new(cursor: Box<dyn Cursor>, namespaces: NamespaceManager, cancel: CancelToken) -> Self {
        Self {
            cursor,
            namespaces,
            cancel,
            pending: None,
            prologue_emitted: false,
            started: false,
            finished: false,
            current_graph: None,
            graph_open: false,
        }
    }

    fn advance(&mut self) -> SerializeResult<Option<Row>> {
        if !self.cursor.next(&self.cancel)? {
            return Ok(None);
        }
        Ok(Some(Row {
            subject: term_of(self.cursor.as_ref(), 0)?,
            predicate: term_of(self.cursor.as_ref(), 1)?,
            object: term_of(self.cursor.as_ref(), 2)?,
            graph: term_of(self.cursor.as_ref(), 3)?,
        }))
    }

    fn prologue(&self) -> String {
        let mut out = String::new();
        for ns in self.namespaces.prefixes() {
            out.push_str(&format!("@prefix {}: <{}> .\n", ns.prefix, ns.iri));
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn graph_key(term: &TermOut) -> Option<String> {
        match term {
            TermOut::Iri(s) => Some(s.clone()),
            TermOut::BlankNode(b) => Some(format!("_:{}", b)),
            TermOut::Literal { .. } | TermOut::Unbound => None,
        }
    }

    fn render_resource(&self, term: &TermOut) -> String {
        match term {
            TermOut::Iri(s) => self.namespaces.compress(s).unwrap_or_else(|| format!("<{}>", s)),
            TermOut::BlankNode(b) => format!("_:{}", b),
            TermOut::Literal { .. } | TermOut::Unbound => String::new(),
        }
    }
}

impl ChunkSource for TriGSerializer {
    fn next_chunk(&mut self) -> SerializeResult<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            self.pending = self.advance()?;
        }
        if !self.prologue_emitted {
            self.prologue_emitted = true;
            let p = self.prologue();
            if !p.is_empty() {
                return Ok(Some(p));
            }
        }
        let first = match self.pending.take() {
            Some(row) => row,
            None => {
                self.finished = true;
                return Ok(Some(if self.graph_open { "}\n".to_string() } else { String::new() }));
            }
        };

        let mut out = String::new();
        let graph_key = Self::graph_key(&first.graph);
        if graph_key != self.current_graph {
            if self.graph_open {
                out.push_str("}\n");
            }
            self.current_graph = graph_key.clone();
            match &graph_key {
                Some(_) => {
                    out.push_str(&format!("{} {{\n  ", self.render_resource(&first.graph)));
                    self.graph_open = true;
                }
                None => self.graph_open = false,
            }
        }

        let subject_str = self.render_resource(&first.subject);
        out.push_str(&format!("{} ", subject_str));
        let mut last_predicate: Option<String> = None;
        let mut row = first;

        loop {
            let predicate_str = self.render_resource(&row.predicate);
            let object_str = render_object(&row.object, &self.namespaces);
            if last_predicate.as_deref() == Some(predicate_str.as_str()) {
                out.push_str(" , ");
                out.push_str(&object_str);
            } else {
                if last_predicate.is_some() {
                    out.push_str(" ;\n      ");
                }
                out.push_str(&predicate_str);
                out.push(' ');
                out.push_str(&object_str);
            }
            last_predicate = Some(predicate_str);

            match self.advance()? {
                Some(next_row) => {
                    let next_graph_key = Self::graph_key(&next_row.graph);
                    if next_graph_key == self.current_graph
                        && self.render_resource(&next_row.subject) == subject_str
                    {
                        row = next_row;
                        continue;
                    }
                    self.pending = Some(next_row);
                    break;
                }
                None => break,
            }
        }
        out.push_str(" .\n");
        Ok(Some(out))
    }
}
