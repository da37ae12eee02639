//! Turtle serializer (§4.5.3): groups rows by subject, predicate lists
//! separated by `;`, object lists separated by `,`.

use crate::rdf::cursor::{CancelToken, Cursor};
use crate::rdf::namespace::NamespaceManager;

use super::{term_of, ChunkSource, SerializeResult, TermOut};

struct Row {
    subject: TermOut,
    predicate: TermOut,
    object: TermOut,
}

pub struct TurtleSerializer {
    cursor: Box<dyn Cursor>,
    namespaces: NamespaceManager,
    cancel: CancelToken,
    pending: Option<Row>,
    prologue_emitted: bool,
    started: bool,
    finished: bool,
}

impl TurtleSerializer {
    pub fn new(cursor: Box<dyn Cursor>, namespaces: NamespaceManager, cancel: CancelToken) -> Self {
        Self {
            cursor,
            namespaces,
            cancel,
            pending: None,
            prologue_emitted: false,
            started: false,
            finished: false,
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
}

/// Renders a term in subject/predicate position. Literals/unbound there
/// would be a malformed quad, which a quad-shaped cursor should never
/// produce; this is the serializer's own well-formedness boundary.
fn render_resource(term: &TermOut, ns: &NamespaceManager) -> String {
    match term {
        TermOut::Iri(s) => ns.compress(s).unwrap_or_else(|| format!("<{}>", s)),
        TermOut::BlankNode(b) => format!("_:{}", b),
        TermOut::Literal { .. } | TermOut::Unbound => String::new(),
    }
}

pub fn render_object(term: &TermOut, ns: &NamespaceManager) -> String {
    match term {
        TermOut::Iri(_) | TermOut::BlankNode(_) => render_resource(term, ns),
        TermOut::Literal { lexical, language, datatype } => {
            let escaped = escape_turtle_string(lexical);
            if let Some(lang) = language {
                format!("\"{}\"@{}", escaped, lang)
            } else {
                match datatype.as_deref() {
                    None | Some("http://www.w3.org/2001/XMLSchema#string") => format!("\"{}\"", escaped),
                    Some(dt) => format!("\"{}\"^^{}", escaped, ns.compress(dt).unwrap_or_else(|| format!("<{}>", dt))),
                }
            }
        }
        TermOut::Unbound => String::new(),
    }
}

pub fn escape_turtle_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

impl ChunkSource for TurtleSerializer {
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
                return Ok(None);
            }
        };

        let subject_str = render_resource(&first.subject, &self.namespaces);
        let mut out = format!("{} ", subject_str);
        let mut last_predicate: Option<String> = None;
        let mut row = first;

        loop {
            let predicate_str = render_resource(&row.predicate, &self.namespaces);
            let object_str = render_object(&row.object, &self.namespaces);
            if last_predicate.as_deref() == Some(predicate_str.as_str()) {
                out.push_str(" , ");
                out.push_str(&object_str);
            } else {
                if last_predicate.is_some() {
                    out.push_str(" ;\n    ");
                }
                out.push_str(&predicate_str);
                out.push(' ');
                out.push_str(&object_str);
            }
            last_predicate = Some(predicate_str);

            match self.advance()? {
                Some(next_row) => {
                    if render_resource(&next_row.subject, &self.namespaces) == subject_str {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::cursor::{Cell, VecCursor};

    fn cursor_of(rows: Vec<Vec<Cell>>) -> Box<dyn Cursor> {
        Box::new(VecCursor::new(
            vec![Some("s".into()), Some("p".into()), Some("o".into())],
            rows,
        ))
    }

    #[test]
    fn groups_same_subject_with_semicolon() {
        let rows = vec![
            vec![Cell::Iri("http://e/a".into()), Cell::Iri("http://e/p1".into()), Cell::Iri("http://e/x".into())],
            vec![Cell::Iri("http://e/a".into()), Cell::Iri("http://e/p2".into()), Cell::Iri("http://e/y".into())],
        ];
        let mut serializer = TurtleSerializer::new(cursor_of(rows), NamespaceManager::new(), CancelToken::new());
        let mut text = String::new();
        while let Some(chunk) = serializer.next_chunk().unwrap() {
            text.push_str(&chunk);
        }
        assert!(text.contains(" ;\n"));
        assert!(text.contains("http://e/a"));
    }

    #[test]
    fn repeats_predicate_with_comma() {
        let rows = vec![
            vec![Cell::Iri("http://e/a".into()), Cell::Iri("http://e/p".into()), Cell::Iri("http://e/x".into())],
            vec![Cell::Iri("http://e/a".into()), Cell::Iri("http://e/p".into()), Cell::Iri("http://e/y".into())],
        ];
        let mut serializer = TurtleSerializer::new(cursor_of(rows), NamespaceManager::new(), CancelToken::new());
        let mut text = String::new();
        while let Some(chunk) = serializer.next_chunk().unwrap() {
            text.push_str(&chunk);
        }
        assert!(text.contains(" , "));
    }
}
