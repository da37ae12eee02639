//! SPARQL-JSON serializer (§4.5.1): `{"head":{"vars":[…]},"results":{"bindings":[…]}}`.

use crate::rdf::cursor::{CancelToken, Cursor};

use super::{term_of, ChunkSource, SerializeResult, TermOut};

pub struct SparqlJsonSerializer {
    cursor: Box<dyn Cursor>,
    cancel: CancelToken,
    started: bool,
    finished: bool,
    row_count: usize,
}

impl SparqlJsonSerializer {
    pub fn new(cursor: Box<dyn Cursor>, cancel: CancelToken) -> Self {
        Self { cursor, cancel, started: false, finished: false, row_count: 0 }
    }

    fn head(&self) -> String {
        let names: Vec<String> = (0..self.cursor.column_count())
            .map(|i| self.variable_name(i))
            .collect();
        let vars = names
            .iter()
            .map(|n| format!("\"{}\"", escape_json(n)))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{\"head\":{{\"vars\":[{vars}]}},\"results\":{{\"bindings\":[")
    }

    fn variable_name(&self, i: usize) -> String {
        self.cursor
            .variable_name(i)
            .map(str::to_string)
            .unwrap_or_else(|| format!("var{}", i + 1))
    }

    fn binding_object(&self) -> SerializeResult<String> {
        let mut parts = Vec::with_capacity(self.cursor.column_count());
        for i in 0..self.cursor.column_count() {
            let term = term_of(self.cursor.as_ref(), i)?;
            if matches!(term, TermOut::Unbound) {
                continue;
            }
            let name = self.variable_name(i);
            parts.push(format!("\"{}\":{}", escape_json(&name), render_binding(&term)));
        }
        Ok(format!("{{{}}}", parts.join(",")))
    }
}

fn render_binding(term: &TermOut) -> String {
    match term {
        TermOut::Iri(s) => format!("{{\"type\":\"uri\",\"value\":\"{}\"}}", escape_json(s)),
        TermOut::BlankNode(b) => format!("{{\"type\":\"bnode\",\"value\":\"{}\"}}", escape_json(b)),
        TermOut::Literal { lexical, language, datatype } => {
            let mut fields = vec![
                "\"type\":\"literal\"".to_string(),
                format!("\"value\":\"{}\"", escape_json(lexical)),
            ];
            if let Some(lang) = language {
                fields.push(format!("\"xml:lang\":\"{}\"", escape_json(lang)));
            } else if let Some(dt) = datatype {
                if dt != "http://www.w3.org/2001/XMLSchema#string" {
                    fields.push(format!("\"datatype\":\"{}\"", escape_json(dt)));
                }
            }
            format!("{{{}}}", fields.join(","))
        }
        TermOut::Unbound => String::new(),
    }
}

pub fn escape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

impl ChunkSource for SparqlJsonSerializer {
    fn next_chunk(&mut self) -> SerializeResult<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            return Ok(Some(self.head()));
        }
        if !self.cursor.next(&self.cancel)? {
            self.finished = true;
            return Ok(Some("]}}".to_string()));
        }
        let prefix = if self.row_count > 0 { "," } else { "" };
        self.row_count += 1;
        let obj = self.binding_object()?;
        Ok(Some(format!("{prefix}{obj}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::cursor::{Cell, VecCursor};

    #[test]
    fn renders_head_and_bindings() {
        let rows = vec![vec![
            Cell::Iri("http://e/a".into()),
            Cell::Literal { lexical: "hi".into(), datatype: "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString".into(), language: Some("en".into()) },
        ]];
        let cursor = Box::new(VecCursor::new(vec![Some("s".into()), Some("o".into())], rows));
        let mut serializer = SparqlJsonSerializer::new(cursor, CancelToken::new());
        let mut text = String::new();
        while let Some(chunk) = serializer.next_chunk().unwrap() {
            text.push_str(&chunk);
        }
        assert!(text.contains("\"vars\":[\"s\",\"o\"]"));
        assert!(text.contains("\"xml:lang\":\"en\""));
        assert!(text.ends_with("]}}"));
    }

    #[test]
    fn omits_unbound_columns() {
        let rows = vec![vec![Cell::Iri("http://e/a".into()), Cell::Unbound]];
        let cursor = Box::new(VecCursor::new(vec![Some("s".into()), Some("o".into())], rows));
        let mut serializer = SparqlJsonSerializer::new(cursor, CancelToken::new());
        let mut text = String::new();
        while let Some(chunk) = serializer.next_chunk().unwrap() {
            text.push_str(&chunk);
        }
        assert!(!text.contains("\"o\":"));
    }
}
