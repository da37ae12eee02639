//! SPARQL-XML serializer (§4.5.2): `<sparql><head>…</head><results>…</results></sparql>`.

use crate::rdf::cursor::{CancelToken, Cursor};

use super::{term_of, ChunkSource, SerializeResult, TermOut};

pub struct SparqlXmlSerializer {
    cursor: Box<dyn Cursor>,
    cancel: CancelToken,
    started: bool,
    finished: bool,
}

impl SparqlXmlSerializer {
    pub fn new(cursor: Box<dyn Cursor>, cancel: CancelToken) -> Self {
        Self { cursor, cancel, started: false, finished: false }
    }

    fn variable_name(&self, i: usize) -> String {
        self.cursor
            .variable_name(i)
            .map(str::to_string)
            .unwrap_or_else(|| format!("var{}", i + 1))
    }

    fn prologue(&self) -> String {
        let mut head = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<sparql xmlns=\"http://www.w3.org/2005/sparql-results#\">\n<head>");
        for i in 0..self.cursor.column_count() {
            head.push_str(&format!("<variable name=\"{}\"/>", escape_xml(&self.variable_name(i))));
        }
        head.push_str("</head>\n<results>\n");
        head
    }

    fn render_row(&self) -> SerializeResult<String> {
        let mut out = String::from("<result>");
        for i in 0..self.cursor.column_count() {
            let term = term_of(self.cursor.as_ref(), i)?;
            if matches!(term, TermOut::Unbound) {
                continue;
            }
            out.push_str(&format!(
                "<binding name=\"{}\">{}</binding>",
                escape_xml(&self.variable_name(i)),
                render_term(&term)
            ));
        }
        out.push_str("</result>\n");
        Ok(out)
    }
}

fn render_term(term: &TermOut) -> String {
    match term {
        TermOut::Iri(s) => format!("<uri>{}</uri>", escape_xml(s)),
        TermOut::BlankNode(b) => format!("<bnode>{}</bnode>", escape_xml(b)),
        TermOut::Literal { lexical, language, datatype } => {
            let mut attrs = String::new();
            if let Some(lang) = language {
                attrs.push_str(&format!(" xml:lang=\"{}\"", escape_xml(lang)));
            } else if let Some(dt) = datatype {
                if dt != "http://www.w3.org/2001/XMLSchema#string" {
                    attrs.push_str(&format!(" datatype=\"{}\"", escape_xml(dt)));
                }
            }
            format!("<literal{}>{}</literal>", attrs, escape_xml(lexical))
        }
        TermOut::Unbound => String::new(),
    }
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

impl ChunkSource for SparqlXmlSerializer {
    fn next_chunk(&mut self) -> SerializeResult<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            return Ok(Some(self.prologue()));
        }
        if !self.cursor.next(&self.cancel)? {
            self.finished = true;
            return Ok(Some("</results>\n</sparql>\n".to_string()));
        }
        Ok(Some(self.render_row()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::cursor::{Cell, VecCursor};

    #[test]
    fn renders_head_variables_and_bindings() {
        let rows = vec![vec![Cell::Iri("http://e/a".into())]];
        let cursor = Box::new(VecCursor::new(vec![Some("s".into())], rows));
        let mut serializer = SparqlXmlSerializer::new(cursor, CancelToken::new());
        let mut text = String::new();
        while let Some(chunk) = serializer.next_chunk().unwrap() {
            text.push_str(&chunk);
        }
        assert!(text.contains("<variable name=\"s\"/>"));
        assert!(text.contains("<uri>http://e/a</uri>"));
        assert!(text.trim_end().ends_with("</sparql>"));
    }
}
