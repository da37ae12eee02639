//! Hand-rolled streaming Turtle/TriG deserializer (§4.3).
//!
//! One state machine drives both formats; `parse_trig` only changes whether
//! `GRAPH`/`{`/`}` are recognized and whether the cursor's graph column is
//! ever non-default. The buffer is a small sliding window that tops itself
//! up to a target size on every iteration, except while scanning for the
//! closing delimiter of a string terminal, where it doubles geometrically up
//! to a 1 GiB hard cap — everything else in a Turtle document is bounded by
//! a handful of bytes of lookahead.

use std::io::Read;

use crate::rdf::cursor::{CancelToken, Cursor, CursorError, CursorResult, ValueType};
use crate::rdf::namespace::NamespaceManager;
use crate::rdf::types::{BlankNode, Literal, NamedNode, RdfObject, RdfSubject};

use super::{ParseError, ParseErrorKind, ParseResult};

const INITIAL_BUF: usize = 4096;
const MAX_STRING_BUF: usize = 1 << 30; // 1 GiB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Graph,
    Subject,
    Predicate,
    Object,
    Step,
}

/// What a `[` or `(` pushed so `]`/`)` knows what to restore.
#[derive(Debug, Clone)]
enum StackEntry {
    /// Unwinding a blank-node property list `[ ... ]`: resume as this
    /// subject/predicate pair once `]` closes it.
    BracketSubject { subject: String, predicate: Option<String> },
}

/// One parsed term, tagged by kind, as produced by the object-position
/// terminal productions.
#[derive(Debug, Clone)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal { lexical: String, language: Option<String> },
}

pub struct TurtleParser<R: Read> {
    buf: Vec<u8>,
    reader: R,
    reader_eof: bool,
    window: usize,
    base_window: usize,
    max_string_buf: usize,

    namespaces: NamespaceManager,
    base: Option<String>,
    parse_trig: bool,

    state: State,
    stack: Vec<StackEntry>,

    graph: Option<String>,
    in_block: bool,
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<Term>,

    bnode_counter: u64,

    line: u64,
    column: u64,

    current_row: Option<[Option<Term>; 4]>, // subject, predicate, object, graph
    last_error: Option<ParseError>,
    closed: bool,
}

impl<R: Read> TurtleParser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_state(reader, false)
    }

    pub fn new_trig(reader: R) -> Self {
        Self::with_state(reader, true)
    }

    fn with_state(reader: R, parse_trig: bool) -> Self {
        Self {
            buf: Vec::new(),
            reader,
            reader_eof: false,
            window: INITIAL_BUF,
            base_window: INITIAL_BUF,
            max_string_buf: MAX_STRING_BUF,
            namespaces: NamespaceManager::new(),
            base: None,
            parse_trig,
            state: State::Initial,
            stack: Vec::new(),
            graph: None,
            in_block: false,
            subject: None,
            predicate: None,
            object: None,
            bnode_counter: 0,
            line: 1,
            column: 1,
            current_row: None,
            last_error: None,
            closed: false,
        }
    }

    pub fn with_namespaces(mut self, namespaces: NamespaceManager) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Overrides the sliding-window size the buffer tops itself up to
    /// outside of string-terminal scanning (§4.3, §10.3). Default 4 KiB.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window = window_size;
        self.base_window = window_size;
        self
    }

    /// Overrides the hard cap the string-terminal buffer may grow to before
    /// failing with `StringTooLarge` (§4.3, §10.3). Default 1 GiB.
    pub fn with_max_string_buf(mut self, max_string_buf: usize) -> Self {
        self.max_string_buf = max_string_buf;
        self
    }

    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    /// The structured error from the last failed `advance`/`next`, if any.
    pub fn last_error(&self) -> Option<&ParseError> {
        self.last_error.as_ref()
    }

    /// The row most recently yielded by `Cursor::next`, for callers (the
    /// update engine's `load_from_deserializer`) that want typed
    /// subject/predicate/object/graph terms rather than cursor cell strings.
    pub fn current_row(&self) -> Option<&[Option<Term>; 4]> {
        self.current_row.as_ref()
    }

    // ---- buffer management -------------------------------------------------

    fn top_up(&mut self) -> std::io::Result<()> {
        if self.reader_eof || self.buf.len() >= self.window {
            return Ok(());
        }
        let target = self.window;
        let mut chunk = vec![0u8; target - self.buf.len()];
        let n = read_fill(&mut self.reader, &mut chunk)?;
        chunk.truncate(n);
        self.buf.extend_from_slice(&chunk);
        if n == 0 {
            self.reader_eof = true;
        }
        Ok(())
    }

    /// Doubles the window (up to the 1 GiB cap) and refills until either the
    /// needle is found, the cap is hit, or the stream is exhausted.
    fn grow_until<F>(&mut self, found: F) -> ParseResult<()>
    where
        F: Fn(&[u8]) -> bool,
    {
        loop {
            if found(&self.buf) {
                return Ok(());
            }
            if self.reader_eof {
                return Ok(());
            }
            if self.window >= self.max_string_buf {
                return Err(self.error(ParseErrorKind::StringTooLarge, "string terminal exceeds configured cap"));
            }
            self.window = (self.window * 2).min(self.max_string_buf);
            self.top_up().map_err(|e| self.io_error(e))?;
        }
    }

    fn advance(&mut self, n: usize) {
        let consumed: Vec<u8> = self.buf.drain(0..n).collect();
        for &b in &consumed {
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        // Window tracks the live tail, not the cumulative growth.
        self.window = self.window.max(self.base_window);
    }

    fn error(&self, kind: ParseErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, self.column, kind, message)
    }

    fn io_error(&self, e: std::io::Error) -> ParseError {
        ParseError::new(self.line, self.column, ParseErrorKind::Io, e.to_string())
    }

    // ---- whitespace / comments ---------------------------------------------

    fn skip_ws_and_comments(&mut self) -> ParseResult<()> {
        loop {
            self.top_up().map_err(|e| self.io_error(e))?;
            if self.buf.is_empty() {
                return Ok(());
            }
            match self.buf[0] {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance(1);
                }
                b'#' => {
                    // Comment runs to end of line; may need to grow to find it.
                    self.grow_until(|b| b.contains(&b'\n') || b.is_empty())?;
                    let end = self.buf.iter().position(|&b| b == b'\n').unwrap_or(self.buf.len());
                    self.advance(end);
                }
                _ => return Ok(()),
            }
        }
    }

    // ---- generic token matching --------------------------------------------

    fn try_punct(&mut self, tok: &str) -> ParseResult<bool> {
        self.top_up().map_err(|e| self.io_error(e))?;
        if self.buf.len() >= tok.len() && &self.buf[..tok.len()] == tok.as_bytes() {
            self.advance(tok.len());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn try_keyword(&mut self, tok: &str) -> ParseResult<bool> {
        self.top_up().map_err(|e| self.io_error(e))?;
        if self.buf.len() < tok.len() {
            return Ok(false);
        }
        let matches = self.buf[..tok.len()]
            .iter()
            .zip(tok.as_bytes())
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase());
        if !matches {
            return Ok(false);
        }
        let boundary_ok = self
            .buf
            .get(tok.len())
            .map(|&b| !(b.is_ascii_alphanumeric() || b == b'_'))
            .unwrap_or(true);
        if boundary_ok {
            self.advance(tok.len());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ---- terminal productions ----------------------------------------------

    fn try_iriref(&mut self) -> ParseResult<Option<String>> {
        self.top_up().map_err(|e| self.io_error(e))?;
        if self.buf.first() != Some(&b'<') {
            return Ok(None);
        }
        self.grow_until(|b| terminal_iriref(b).is_some() || b.is_empty())?;
        let Some(end) = terminal_iriref(&self.buf) else {
            return Err(self.error(ParseErrorKind::UnterminatedString, "unterminated IRIREF"));
        };
        let text = String::from_utf8_lossy(&self.buf[1..end - 1]).into_owned();
        self.advance(end);
        Ok(Some(unescape(&text)))
    }

    fn try_pname(&mut self) -> ParseResult<Option<String>> {
        self.top_up().map_err(|e| self.io_error(e))?;
        if let Some(end) = terminal_pname_ln(&self.buf) {
            let text = String::from_utf8_lossy(&self.buf[..end]).into_owned();
            self.advance(end);
            return self.expand_prefixed(&text).map(Some);
        }
        if let Some(end) = terminal_pname_ns(&self.buf) {
            let text = String::from_utf8_lossy(&self.buf[..end]).into_owned();
            self.advance(end);
            return self.expand_prefixed(&text).map(Some);
        }
        Ok(None)
    }

    fn expand_prefixed(&mut self, text: &str) -> ParseResult<String> {
        match self.namespaces.expand(text) {
            Ok(iri) => Ok(iri),
            Err(_) => {
                let shortname = text.split(':').next().unwrap_or(text);
                let col = self.column.saturating_sub(text.chars().count() as u64);
                Err(ParseError::new(
                    self.line,
                    col,
                    ParseErrorKind::UnknownPrefix,
                    format!("unknown prefix '{shortname}'"),
                ))
            }
        }
    }

    fn try_blank_node_label(&mut self) -> ParseResult<Option<String>> {
        self.top_up().map_err(|e| self.io_error(e))?;
        let Some(end) = terminal_blank_node_label(&self.buf) else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&self.buf[2..end]).into_owned();
        self.advance(end);
        Ok(Some(format!("_:{text}")))
    }

    fn try_anon_blank_node(&mut self) -> ParseResult<Option<String>> {
        // `[]` with no property list: a fresh blank node.
        self.top_up().map_err(|e| self.io_error(e))?;
        if self.buf.len() >= 2 && self.buf[0] == b'[' {
            let mut i = 1;
            while i < self.buf.len() && matches!(self.buf[i], b' ' | b'\t' | b'\r' | b'\n') {
                i += 1;
            }
            if self.buf.get(i) == Some(&b']') {
                self.advance(i + 1);
                return Ok(Some(self.fresh_bnode()));
            }
        }
        Ok(None)
    }

    fn try_string_literal(&mut self) -> ParseResult<Option<String>> {
        self.top_up().map_err(|e| self.io_error(e))?;
        for delim in [&b"\"\"\""[..], b"'''", b"\"", b"'"] {
            if self.buf.starts_with(delim) {
                self.grow_until(|b| terminal_quoted(b, delim).is_some() || b.is_empty())?;
                let Some(end) = terminal_quoted(&self.buf, delim) else {
                    return Err(self.error(ParseErrorKind::UnterminatedString, "unterminated string literal"));
                };
                let body = String::from_utf8_lossy(&self.buf[delim.len()..end - delim.len()]).into_owned();
                self.advance(end);
                return Ok(Some(unescape(&body)));
            }
        }
        Ok(None)
    }

    fn try_langtag(&mut self) -> ParseResult<Option<String>> {
        self.top_up().map_err(|e| self.io_error(e))?;
        let Some(end) = terminal_langtag(&self.buf) else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&self.buf[1..end]).into_owned();
        self.advance(end);
        Ok(Some(text))
    }

    fn try_numeric(&mut self) -> ParseResult<Option<String>> {
        self.top_up().map_err(|e| self.io_error(e))?;
        let Some(end) = terminal_numeric(&self.buf) else {
            return Ok(None);
        };
        if end == 0 {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.advance(end);
        Ok(Some(text))
    }

    fn skip_datatype_cast(&mut self) -> ParseResult<()> {
        // `^^<iri>` or `^^prefix:local`: accepted, discarded (decision recorded
        // in the ledger — literals stay untyped at this layer).
        if self.try_punct("^^")? {
            if self.try_iriref()?.is_none() && self.try_pname()?.is_none() {
                return Err(self.error(ParseErrorKind::Syntax, "expected datatype IRI after ^^"));
            }
        }
        Ok(())
    }

    fn fresh_bnode(&mut self) -> String {
        self.bnode_counter += 1;
        format!("_:b{}", self.bnode_counter)
    }

    // ---- directive handling -------------------------------------------------

    fn handle_prefix_directive(&mut self, at_form: bool) -> ParseResult<()> {
        self.skip_ws_and_comments()?;
        let Some(ns_text) = self.try_pname_ns_raw()? else {
            return Err(self.error(ParseErrorKind::Syntax, "expected prefix name in @prefix directive"));
        };
        self.skip_ws_and_comments()?;
        let Some(iri) = self.try_iriref()? else {
            return Err(self.error(ParseErrorKind::Syntax, "expected IRI in @prefix directive"));
        };
        let resolved = self.resolve_against_base(&iri);
        let prefix = ns_text.trim_end_matches(':').to_string();
        self.namespaces
            .add_prefix(prefix, resolved)
            .map_err(|e| self.error(ParseErrorKind::Syntax, e.to_string()))?;
        self.skip_ws_and_comments()?;
        if at_form {
            if !self.try_punct(".")? {
                return Err(self.error(ParseErrorKind::Syntax, "expected '.' to end @prefix directive"));
            }
        } else {
            self.try_punct(".")?; // SPARQL-style PREFIX has no trailing dot
        }
        Ok(())
    }

    fn try_pname_ns_raw(&mut self) -> ParseResult<Option<String>> {
        self.top_up().map_err(|e| self.io_error(e))?;
        let Some(end) = terminal_pname_ns(&self.buf) else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.advance(end);
        Ok(Some(text))
    }

    fn handle_base_directive(&mut self, at_form: bool) -> ParseResult<()> {
        self.skip_ws_and_comments()?;
        let Some(iri) = self.try_iriref()? else {
            return Err(self.error(ParseErrorKind::Syntax, "expected IRI in @base directive"));
        };
        self.base = Some(self.resolve_against_base(&iri));
        self.skip_ws_and_comments()?;
        if at_form {
            if !self.try_punct(".")? {
                return Err(self.error(ParseErrorKind::Syntax, "expected '.' to end @base directive"));
            }
        } else {
            self.try_punct(".")?;
        }
        Ok(())
    }

    fn resolve_against_base(&self, iri: &str) -> String {
        if let Some(base) = &self.base {
            if let Ok(resolved) = oxiri::Iri::parse(base.clone()).and_then(|b| b.resolve(iri)) {
                return resolved.into_inner();
            }
        }
        iri.to_string()
    }

    // ---- term-level parsing --------------------------------------------------

    fn parse_subject_term(&mut self) -> ParseResult<Option<String>> {
        if let Some(iri) = self.try_iriref()? {
            return Ok(Some(iri));
        }
        if let Some(iri) = self.try_pname()? {
            return Ok(Some(iri));
        }
        if let Some(b) = self.try_blank_node_label()? {
            return Ok(Some(b));
        }
        if let Some(b) = self.try_anon_blank_node()? {
            return Ok(Some(b));
        }
        if self.try_punct("[")? {
            let subject = self.fresh_bnode();
            self.stack.push(StackEntry::BracketSubject {
                subject: self.subject.clone().unwrap_or_default(),
                predicate: self.predicate.clone(),
            });
            return Ok(Some(subject));
        }
        Ok(None)
    }

    fn parse_object_term(&mut self) -> ParseResult<Option<Term>> {
        if let Some(iri) = self.try_iriref()? {
            return Ok(Some(Term::Iri(iri)));
        }
        if let Some(iri) = self.try_pname()? {
            return Ok(Some(Term::Iri(iri)));
        }
        if let Some(b) = self.try_blank_node_label()? {
            return Ok(Some(Term::BlankNode(b)));
        }
        if let Some(b) = self.try_anon_blank_node()? {
            return Ok(Some(Term::BlankNode(b)));
        }
        if self.try_punct("[")? {
            let subject = self.fresh_bnode();
            self.stack.push(StackEntry::BracketSubject {
                subject: self.subject.clone().unwrap_or_default(),
                predicate: self.predicate.clone(),
            });
            self.subject = Some(subject.clone());
            self.predicate = None;
            self.state = State::Predicate;
            return Ok(Some(Term::BlankNode(subject)));
        }
        if let Some(s) = self.try_string_literal()? {
            let language = self.try_langtag()?;
            self.skip_datatype_cast()?;
            return Ok(Some(Term::Literal { lexical: s, language }));
        }
        if self.try_keyword("true")? {
            return Ok(Some(Term::Literal { lexical: "true".to_string(), language: None }));
        }
        if self.try_keyword("false")? {
            return Ok(Some(Term::Literal { lexical: "false".to_string(), language: None }));
        }
        if let Some(n) = self.try_numeric()? {
            return Ok(Some(Term::Literal { lexical: n, language: None }));
        }
        Ok(None)
    }

    // ---- the state machine itself --------------------------------------------

    /// Advances until one quad row is ready (`Ok(true)`), EOF with no more
    /// rows (`Ok(false)`), or a parse error.
    fn iterate_next(&mut self) -> ParseResult<bool> {
        loop {
            self.skip_ws_and_comments()?;
            self.top_up().map_err(|e| self.io_error(e))?;

            match self.state {
                State::Initial => {
                    if self.buf.is_empty() {
                        return Ok(false);
                    }
                    if self.try_keyword("@prefix")? {
                        self.handle_prefix_directive(true)?;
                        continue;
                    }
                    if self.try_keyword("PREFIX")? {
                        self.handle_prefix_directive(false)?;
                        continue;
                    }
                    if self.try_keyword("@base")? {
                        self.handle_base_directive(true)?;
                        continue;
                    }
                    if self.try_keyword("BASE")? {
                        self.handle_base_directive(false)?;
                        continue;
                    }
                    if self.parse_trig && self.try_punct("{")? {
                        self.graph = None;
                        self.in_block = true;
                        self.state = State::Subject;
                        continue;
                    }
                    if self.parse_trig && self.try_keyword("GRAPH")? {
                        self.state = State::Graph;
                        continue;
                    }
                    if self.parse_trig {
                        // A bare graph name is also legal TriG (no `GRAPH`
                        // keyword): `<g> { ... }`. Parse the leading term
                        // once and decide, from what follows, whether it
                        // names a graph block or starts an ordinary
                        // default-graph triple.
                        if let Some(term) = self.parse_subject_term()? {
                            self.skip_ws_and_comments()?;
                            if self.try_punct("{")? {
                                self.graph = Some(term);
                                self.in_block = true;
                                self.state = State::Subject;
                            } else {
                                self.subject = Some(term);
                                self.predicate = None;
                                self.state = State::Predicate;
                            }
                            continue;
                        }
                    }
                    self.state = State::Subject;
                }

                State::Graph => {
                    let g = self.parse_subject_term()?.ok_or_else(|| {
                        self.error(ParseErrorKind::Syntax, "expected graph name after GRAPH")
                    })?;
                    self.graph = Some(g);
                    self.skip_ws_and_comments()?;
                    if !self.try_punct("{")? {
                        return Err(self.error(ParseErrorKind::Syntax, "expected '{' after graph name"));
                    }
                    self.in_block = true;
                    self.state = State::Subject;
                }

                State::Subject => {
                    if self.in_block && self.try_punct("}")? {
                        self.graph = None;
                        self.in_block = false;
                        self.state = State::Initial;
                        continue;
                    }
                    if self.buf.is_empty() {
                        return Ok(false);
                    }
                    let Some(s) = self.parse_subject_term()? else {
                        return Err(self.error(ParseErrorKind::Syntax, "expected subject term"));
                    };
                    self.subject = Some(s);
                    self.predicate = None;
                    self.state = State::Predicate;
                }

                State::Predicate => {
                    self.skip_ws_and_comments()?;
                    if self.try_punct("]")? {
                        self.pop_bracket()?;
                        continue;
                    }
                    let predicate = if self.try_keyword("a")? {
                        "http://www.w3.org/1999/02/22-rdf-syntax-ns#type".to_string()
                    } else if let Some(p) = self.try_iriref()? {
                        p
                    } else if let Some(p) = self.try_pname()? {
                        p
                    } else {
                        return Err(self.error(ParseErrorKind::Syntax, "expected predicate"));
                    };
                    self.predicate = Some(predicate);
                    self.state = State::Object;
                }

                State::Object => {
                    self.skip_ws_and_comments()?;
                    let Some(term) = self.parse_object_term()? else {
                        return Err(self.error(ParseErrorKind::Syntax, "expected object term"));
                    };
                    self.object = Some(term);
                    self.state = State::Step;
                    return Ok(true);
                }

                State::Step => {
                    self.skip_ws_and_comments()?;
                    if self.try_punct(",")? {
                        self.state = State::Object;
                        continue;
                    }
                    if self.try_punct(";")? {
                        self.state = State::Predicate;
                        continue;
                    }
                    if self.try_punct(".")? {
                        self.state = if self.graph.is_some() || !self.parse_trig {
                            if self.parse_trig { State::Subject } else { State::Initial }
                        } else {
                            State::Initial
                        };
                        continue;
                    }
                    if self.try_punct("]")? {
                        self.pop_bracket()?;
                        self.state = State::Step;
                        continue;
                    }
                    if self.try_punct("}")? {
                        self.graph = None;
                        self.state = State::Initial;
                        continue;
                    }
                    if self.buf.is_empty() {
                        return Ok(false);
                    }
                    return Err(self.error(
                        ParseErrorKind::Syntax,
                        "expected ',' ';' '.' ']' or '}' after object",
                    ));
                }
            }
        }
    }

    fn pop_bracket(&mut self) -> ParseResult<()> {
        match self.stack.pop() {
            Some(StackEntry::BracketSubject { subject, predicate }) => {
                self.subject = Some(subject);
                self.predicate = predicate;
                self.state = State::Step;
                Ok(())
            }
            None => Err(self.error(ParseErrorKind::Syntax, "unmatched ']'")),
        }
    }
}

fn read_fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

impl<R: Read> Cursor for TurtleParser<R> {
    fn column_count(&self) -> usize {
        4
    }

    fn variable_name(&self, i: usize) -> Option<&str> {
        ["subject", "predicate", "object", "graph"].get(i).copied()
    }

    fn value_type(&self, i: usize) -> CursorResult<ValueType> {
        let row = self.current_row.as_ref().ok_or_else(|| CursorError::Source("no current row".to_string()))?;
        let cell = row.get(i).ok_or(CursorError::OutOfRange(i, 4))?;
        Ok(match cell {
            None => ValueType::Unbound,
            Some(Term::Iri(_)) => ValueType::Iri,
            Some(Term::BlankNode(_)) => ValueType::BlankNode,
            Some(Term::Literal { .. }) => ValueType::Literal,
        })
    }

    fn string(&self, i: usize) -> CursorResult<(String, Option<String>, usize)> {
        let row = self.current_row.as_ref().ok_or_else(|| CursorError::Source("no current row".to_string()))?;
        match row.get(i).ok_or(CursorError::OutOfRange(i, 4))? {
            None => Ok((String::new(), None, 0)),
            Some(Term::Iri(s)) | Some(Term::BlankNode(s)) => Ok((s.clone(), None, s.len())),
            Some(Term::Literal { lexical, language }) => {
                Ok((lexical.clone(), language.clone(), lexical.len()))
            }
        }
    }

    fn integer(&self, i: usize) -> CursorResult<i64> {
        let (s, _, _) = self.string(i)?;
        s.parse().map_err(|e: std::num::ParseIntError| CursorError::Coercion(i, e.to_string()))
    }

    fn double(&self, i: usize) -> CursorResult<f64> {
        let (s, _, _) = self.string(i)?;
        s.parse().map_err(|e: std::num::ParseFloatError| CursorError::Coercion(i, e.to_string()))
    }

    fn boolean(&self, i: usize) -> CursorResult<bool> {
        let (s, _, _) = self.string(i)?;
        match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(CursorError::Coercion(i, format!("not a boolean: {other}"))),
        }
    }

    fn datetime(&self, i: usize) -> CursorResult<chrono::DateTime<chrono::Utc>> {
        let (s, _, _) = self.string(i)?;
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| CursorError::Coercion(i, e.to_string()))
    }

    fn next(&mut self, cancel: &CancelToken) -> CursorResult<bool> {
        cancel.check()?;
        if self.closed {
            return Ok(false);
        }
        match self.iterate_next() {
            Ok(true) => {
                let subject = self.subject.clone().map(node_string_to_term);
                let predicate = self.predicate.clone().map(Term::Iri);
                let object = self.object.take();
                let graph = self.graph.clone().map(node_string_to_term);
                self.current_row = Some([subject, predicate, object, graph]);
                Ok(true)
            }
            Ok(false) => {
                self.current_row = None;
                Ok(false)
            }
            Err(e) => {
                self.last_error = Some(e.clone());
                Err(CursorError::Source(e.to_string()))
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.current_row = None;
    }
}

/// Subject/graph strings are either `_:label` blank nodes or plain IRIs;
/// this distinguishes the two when building a row from stored strings.
fn node_string_to_term(s: String) -> Term {
    if s.starts_with("_:") {
        Term::BlankNode(s)
    } else {
        Term::Iri(s)
    }
}

/// Builds the typed subject/predicate/object from one parser row for callers
/// that want `RdfSubject`/`RdfObject` rather than raw cursor cells (used by
/// `rdf::update::load_from_deserializer`).
pub fn row_as_triple_parts(
    row: &[Option<Term>; 4],
) -> Option<(RdfSubject, NamedNode, RdfObject, Option<NamedNode>)> {
    let subject = match row[0].as_ref()? {
        Term::Iri(s) => RdfSubject::NamedNode(NamedNode::new(s).ok()?),
        Term::BlankNode(b) => RdfSubject::BlankNode(BlankNode::from_str(b.trim_start_matches("_:")).ok()?),
        Term::Literal { .. } => return None,
    };
    let predicate = match row[1].as_ref()? {
        Term::Iri(s) => NamedNode::new(s).ok()?,
        _ => return None,
    };
    let object = match row[2].as_ref()? {
        Term::Iri(s) => RdfObject::NamedNode(NamedNode::new(s).ok()?),
        Term::BlankNode(b) => RdfObject::BlankNode(BlankNode::from_str(b.trim_start_matches("_:")).ok()?),
        Term::Literal { lexical, language } => RdfObject::Literal(match language {
            Some(lang) => Literal::new_language_tagged_literal(lexical, lang).ok()?,
            None => Literal::new_simple_literal(lexical),
        }),
    };
    let graph = match row[3].as_ref() {
        Some(Term::Iri(s)) => Some(NamedNode::new(s).ok()?),
        Some(Term::BlankNode(b)) => Some(NamedNode::new(format!("_:{}", b.trim_start_matches("_:"))).ok()?),
        _ => None,
    };
    Some((subject, predicate, object, graph))
}

// ---- byte-level terminal matchers -------------------------------------------

fn terminal_iriref(buf: &[u8]) -> Option<usize> {
    if buf.first() != Some(&b'<') {
        return None;
    }
    let mut i = 1;
    while i < buf.len() {
        match buf[i] {
            b'>' => return Some(i + 1),
            b'\\' if i + 1 < buf.len() => i += 2,
            b'\\' => return None,
            _ => i += 1,
        }
    }
    None
}

fn is_pn_chars(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b >= 0x80
}

fn terminal_pname_ns(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() && is_pn_chars(buf[i]) {
        i += 1;
    }
    if buf.get(i) == Some(&b':') {
        Some(i + 1)
    } else {
        None
    }
}

fn terminal_pname_ln(buf: &[u8]) -> Option<usize> {
    let ns_end = terminal_pname_ns(buf)?;
    let mut i = ns_end;
    while i < buf.len() {
        let b = buf[i];
        if is_pn_chars(b) || b == b'.' || b == b'%' {
            i += 1;
        } else {
            break;
        }
    }
    while i > ns_end && buf[i - 1] == b'.' {
        i -= 1;
    }
    if i > ns_end {
        Some(i)
    } else {
        None
    }
}

fn terminal_blank_node_label(buf: &[u8]) -> Option<usize> {
    if !buf.starts_with(b"_:") {
        return None;
    }
    let mut i = 2;
    if !buf.get(i).map(|&b| b.is_ascii_alphanumeric() || b == b'_').unwrap_or(false) {
        return None;
    }
    i += 1;
    while i < buf.len() && (is_pn_chars(buf[i]) || buf[i] == b'.') {
        i += 1;
    }
    while i > 2 && buf[i - 1] == b'.' {
        i -= 1;
    }
    Some(i)
}

fn find_unescaped(buf: &[u8], needle: &[u8]) -> Option<usize> {
    let mut start = 0;
    loop {
        if start > buf.len() || needle.is_empty() || buf.len() < needle.len() {
            return None;
        }
        let hay = &buf[start..];
        if hay.len() < needle.len() {
            return None;
        }
        let pos = (0..=hay.len() - needle.len()).find(|&i| &hay[i..i + needle.len()] == needle)?;
        let abs = start + pos;
        if abs == 0 || buf[abs - 1] != b'\\' {
            return Some(abs);
        }
        start = abs + 1;
    }
}

fn terminal_quoted(buf: &[u8], delim: &[u8]) -> Option<usize> {
    if !buf.starts_with(delim) {
        return None;
    }
    let body = &buf[delim.len()..];
    let rel = find_unescaped(body, delim)?;
    Some(delim.len() + rel + delim.len())
}

fn terminal_langtag(buf: &[u8]) -> Option<usize> {
    if buf.first() != Some(&b'@') {
        return None;
    }
    let mut i = 1;
    let start = i;
    while i < buf.len() && buf[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == start {
        return None;
    }
    while i < buf.len() && buf[i] == b'-' {
        let sub_start = i + 1;
        let mut j = sub_start;
        while j < buf.len() && buf[j].is_ascii_alphanumeric() {
            j += 1;
        }
        if j == sub_start {
            break;
        }
        i = j;
    }
    Some(i)
}

fn terminal_numeric(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    if buf.first() == Some(&b'+') || buf.first() == Some(&b'-') {
        i += 1;
    }
    let int_start = i;
    while i < buf.len() && buf[i].is_ascii_digit() {
        i += 1;
    }
    let has_int = i > int_start;
    let mut has_dot = false;
    if buf.get(i) == Some(&b'.') {
        let mut j = i + 1;
        let frac_start = j;
        while j < buf.len() && buf[j].is_ascii_digit() {
            j += 1;
        }
        if j > frac_start {
            i = j;
            has_dot = true;
        }
    }
    if !has_int && !has_dot {
        return None;
    }
    if matches!(buf.get(i), Some(&b'e') | Some(&b'E')) {
        let mut j = i + 1;
        if matches!(buf.get(j), Some(&b'+') | Some(&b'-')) {
            j += 1;
        }
        let exp_start = j;
        while j < buf.len() && buf[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Some(i)
}

/// Turtle/TriG escape sequences: `\t \b \n \r \f \" \' \\` plus `\uXXXX` and
/// `\UXXXXXXXX` UCHAR escapes.
fn unescape(s: &str) -> String {
    if !s.contains('\\') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Ok(n) = u32::from_str_radix(&hex, 16) {
                    if let Some(ch) = char::from_u32(n) {
                        out.push(ch);
                    }
                }
            }
            Some('U') => {
                let hex: String = chars.by_ref().take(8).collect();
                if let Ok(n) = u32::from_str_radix(&hex, 16) {
                    if let Some(ch) = char::from_u32(n) {
                        out.push(ch);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn rows(turtle: &str) -> Vec<[Option<Term>; 4]> {
        let mut parser = TurtleParser::new(IoCursor::new(turtle.as_bytes().to_vec()));
        let token = CancelToken::new();
        let mut out = Vec::new();
        while Cursor::next(&mut parser, &token).unwrap() {
            out.push(parser.current_row.take().unwrap());
        }
        out
    }

    #[test]
    fn parses_simple_triple() {
        let result = rows("<http://ex/s> <http://ex/p> <http://ex/o> .");
        assert_eq!(result.len(), 1);
        match &result[0][0] {
            Some(Term::Iri(s)) => assert_eq!(s, "http://ex/s"),
            other => panic!("unexpected subject: {other:?}"),
        }
    }

    #[test]
    fn expands_prefixed_names() {
        let result = rows("@prefix ex: <http://example.org/> .\nex:alice ex:knows ex:bob .");
        assert_eq!(result.len(), 1);
        match &result[0][0] {
            Some(Term::Iri(s)) => assert_eq!(s, "http://example.org/alice"),
            other => panic!("unexpected subject: {other:?}"),
        }
    }

    #[test]
    fn handles_predicate_object_lists() {
        let result = rows("<http://ex/s> <http://ex/p1> <http://ex/o1> ; <http://ex/p2> <http://ex/o2> .");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn handles_object_lists() {
        let result = rows("<http://ex/s> <http://ex/p> <http://ex/o1>, <http://ex/o2> .");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn parses_literal_with_language_tag() {
        let result = rows("<http://ex/s> <http://ex/p> \"hello\"@en .");
        match &result[0][2] {
            Some(Term::Literal { lexical, language }) => {
                assert_eq!(lexical, "hello");
                assert_eq!(language.as_deref(), Some("en"));
            }
            other => panic!("unexpected object: {other:?}"),
        }
    }

    #[test]
    fn discards_datatype_cast() {
        let result = rows("<http://ex/s> <http://ex/p> \"42\"^^<http://www.w3.org/2001/XMLSchema#integer> .");
        match &result[0][2] {
            Some(Term::Literal { lexical, language }) => {
                assert_eq!(lexical, "42");
                assert_eq!(*language, None);
            }
            other => panic!("unexpected object: {other:?}"),
        }
    }

    #[test]
    fn handles_anonymous_blank_node_property_list() {
        let result = rows("<http://ex/s> <http://ex/p> [ <http://ex/q> <http://ex/r> ] .");
        assert_eq!(result.len(), 2);
        match &result[1][0] {
            Some(Term::BlankNode(_)) => {}
            other => panic!("expected blank node subject, got {other:?}"),
        }
    }

    #[test]
    fn unknown_prefix_reports_precise_location() {
        let mut parser = TurtleParser::new(IoCursor::new(b"ex:alice ex:knows ex:bob .".to_vec()));
        let token = CancelToken::new();
        let err = Cursor::next(&mut parser, &token).unwrap_err();
        assert!(matches!(err, CursorError::Source(_)));
        let structured = parser.last_error().unwrap();
        assert_eq!(structured.kind, ParseErrorKind::UnknownPrefix);
        assert_eq!(structured.line, 1);
    }

    #[test]
    fn trig_graph_block_tags_the_graph_column() {
        let mut parser = TurtleParser::new_trig(IoCursor::new(
            b"GRAPH <http://ex/g> { <http://ex/s> <http://ex/p> <http://ex/o> . }".to_vec(),
        ));
        let token = CancelToken::new();
        assert!(Cursor::next(&mut parser, &token).unwrap());
        let (graph, _, _) = parser.string(3).unwrap();
        assert_eq!(graph, "http://ex/g");
    }

    #[test]
    fn parses_numeric_and_boolean_literals_as_plain_strings() {
        let result = rows("<http://ex/s> <http://ex/p> 42 .\n<http://ex/s> <http://ex/p> true .");
        match &result[0][2] {
            Some(Term::Literal { lexical, .. }) => assert_eq!(lexical, "42"),
            other => panic!("unexpected: {other:?}"),
        }
        match &result[1][2] {
            Some(Term::Literal { lexical, .. }) => assert_eq!(lexical, "true"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn trig_bare_graph_name_without_graph_keyword_tags_the_graph_column() {
        let mut parser = TurtleParser::new_trig(IoCursor::new(
            b"<http://g/G1> { <http://s> <http://p> \"x\" }".to_vec(),
        ));
        let token = CancelToken::new();
        assert!(Cursor::next(&mut parser, &token).unwrap());
        let (graph, _, _) = parser.string(3).unwrap();
        assert_eq!(graph, "http://g/G1");
        let (subject, _, _) = parser.string(0).unwrap();
        assert_eq!(subject, "http://s");
    }

    #[test]
    fn trig_bare_iri_without_following_brace_is_an_ordinary_default_graph_subject() {
        let result = {
            let mut parser = TurtleParser::new_trig(IoCursor::new(
                b"<http://ex/s> <http://ex/p> <http://ex/o> .".to_vec(),
            ));
            let token = CancelToken::new();
            let mut out = Vec::new();
            while Cursor::next(&mut parser, &token).unwrap() {
                out.push(parser.current_row.take().unwrap());
            }
            out
        };
        assert_eq!(result.len(), 1);
        match &result[0][0] {
            Some(Term::Iri(s)) => assert_eq!(s, "http://ex/s"),
            other => panic!("unexpected subject: {other:?}"),
        }
    }

    #[test]
    fn with_window_size_overrides_the_sliding_window_default() {
        let parser = TurtleParser::new(IoCursor::new(Vec::new())).with_window_size(64);
        assert_eq!(parser.window, 64);
        assert_eq!(parser.base_window, 64);
    }

    #[test]
    fn with_max_string_buf_overrides_the_1gib_default_and_is_enforced() {
        let long_string = format!("<a> <b> \"{}\" .", "a".repeat(200));
        let mut parser = TurtleParser::new(IoCursor::new(long_string.into_bytes()))
            .with_window_size(8)
            .with_max_string_buf(32);
        let token = CancelToken::new();
        let err = Cursor::next(&mut parser, &token).unwrap_err();
        assert!(matches!(err, CursorError::Source(_)));
        assert_eq!(parser.last_error().unwrap().kind, ParseErrorKind::StringTooLarge);
    }
}
