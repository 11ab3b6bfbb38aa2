use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Object,
    Array,
    Field,
    String,
    Number,
    Boolean,
    Null,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

/// One node of the salvaged tree. Objects hold `Field` children, a `Field`
/// holds at most one value child (none canonicalizes to `null`), arrays hold
/// values directly or, for malformed input, bare fields whose value alone is
/// emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub content: String,
    pub pos: Pos,
    pub children: Vec<Token>,
}

impl Token {
    /// Canonical emission: no whitespace, double-quoted keys, insertion
    /// order preserved.
    pub fn to_json(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out);
        out
    }

    fn write_json(&self, out: &mut String) {
        match self.kind {
            TokenKind::Text
            | TokenKind::String
            | TokenKind::Number
            | TokenKind::Boolean
            | TokenKind::Null => out.push_str(&self.content),
            TokenKind::Object => {
                out.push('{');
                let mut first = true;
                for child in &self.children {
                    if child.kind != TokenKind::Field {
                        continue;
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    child.write_json(out);
                }
                out.push('}');
            }
            TokenKind::Array => {
                out.push('[');
                let mut first = true;
                for child in &self.children {
                    // Stray fields inside arrays contribute their value only.
                    if child.kind == TokenKind::Field {
                        let Some(value) = child.children.first() else {
                            continue;
                        };
                        if !first {
                            out.push(',');
                        }
                        first = false;
                        value.write_json(out);
                        continue;
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    child.write_json(out);
                }
                out.push(']');
            }
            TokenKind::Field => {
                out.push('"');
                out.push_str(&self.content);
                out.push_str("\":");
                match self.children.first() {
                    Some(value) => value.write_json(out),
                    None => out.push_str("null"),
                }
            }
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// Concatenates the canonical form of the top-level JSON tokens; surrounding
/// prose (`Text` tokens) is dropped.
pub fn tokens_to_string(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        if matches!(token.kind, TokenKind::Object | TokenKind::Array) {
            out.push_str(&token.to_json());
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    JsonStart,
    JsonString,
    JsonEscape,
    JsonFieldName,
    JsonFieldValue,
    JsonNumber,
}

#[derive(Debug)]
struct Node {
    kind: TokenKind,
    content: String,
    pos: Pos,
    children: Vec<usize>,
}

#[derive(Debug)]
struct Frame {
    node: usize,
    /// A field that was opened but has not received its value yet.
    open_field: Option<usize>,
}

/// Single-pass, character-fed extractor for JSON embedded in arbitrary text.
///
/// Feed chunks with [`parse`](Self::parse); completed top-level tokens come
/// back as the input closes them. [`end`](Self::end) flushes the rest,
/// auto-closing any containers still open (innermost first).
///
/// Not internally synchronized: one parser per stream.
#[derive(Debug)]
pub struct StreamParser {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    frames: Vec<Frame>,
    states: Vec<State>,
    buffer: String,
    in_single_quote: bool,
    inside_json: bool,
    depth: usize,
    token_start: Pos,
    pos: Pos,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        let pos = Pos {
            offset: 0,
            line: 1,
            column: 1,
        };
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            frames: Vec::new(),
            states: vec![State::Text],
            buffer: String::new(),
            in_single_quote: false,
            inside_json: false,
            depth: 0,
            token_start: pos,
            pos,
        }
    }

    /// Feeds a chunk and returns the top-level tokens completed by it.
    pub fn parse(&mut self, chunk: &str) -> Vec<Token> {
        for c in chunk.chars() {
            self.process_char(c);
            self.advance_pos(c);
        }
        self.take_completed()
    }

    /// Ends the input: auto-closes open containers, flushes trailing text,
    /// and returns every remaining token.
    pub fn end(&mut self) -> Vec<Token> {
        if self.inside_json {
            self.auto_close();
        }
        self.flush_text();
        self.inside_json = false;

        let roots = std::mem::take(&mut self.roots);
        roots.into_iter().map(|root| self.to_token(root)).collect()
    }

    /// Convenience for non-streaming input.
    pub fn parse_all(input: &str) -> Vec<Token> {
        let mut parser = Self::new();
        let mut tokens = parser.parse(input);
        tokens.extend(parser.end());
        tokens
    }

    fn state(&self) -> State {
        *self.states.last().unwrap_or(&State::Text)
    }

    fn push_state(&mut self, state: State) {
        self.states.push(state);
    }

    fn pop_state(&mut self) {
        if self.states.len() > 1 {
            self.states.pop();
        }
    }

    fn process_char(&mut self, c: char) {
        match self.state() {
            State::Text => self.on_text(c),
            State::JsonStart => self.on_json_start(c),
            State::JsonString => self.on_json_string(c),
            State::JsonEscape => self.on_json_escape(c),
            State::JsonFieldName => self.on_json_field_name(c),
            State::JsonFieldValue => self.on_json_field_value(c),
            State::JsonNumber => self.on_json_number(c),
        }
    }

    fn on_text(&mut self, c: char) {
        if c == '{' || c == '[' {
            self.flush_text();
            self.inside_json = true;
            self.start_container(c);
        } else {
            if self.buffer.is_empty() {
                self.token_start = self.pos;
            }
            self.buffer.push(c);
        }
    }

    fn on_json_start(&mut self, c: char) {
        match c {
            '"' | '\'' => {
                self.push_state(State::JsonString);
                self.in_single_quote = c == '\'';
                self.buffer.push(c);
            }
            '}' | ']' => {
                self.complete_literal();
                self.close_container();
            }
            '{' | '[' => {
                self.complete_literal();
                self.start_container(c);
            }
            ':' => {
                self.start_field();
                self.push_state(State::JsonFieldValue);
            }
            ',' => self.complete_literal(),
            '0'..='9' | '-' => {
                self.push_state(State::JsonNumber);
                self.buffer.push(c);
            }
            't' | 'f' | 'n' => {
                self.push_state(State::JsonFieldValue);
                self.buffer.push(c);
            }
            _ if c.is_whitespace() => {}
            _ => {
                let in_array = self
                    .frames
                    .last()
                    .map(|frame| self.nodes[frame.node].kind == TokenKind::Array)
                    .unwrap_or(false);
                self.push_state(if in_array {
                    State::JsonFieldValue
                } else {
                    State::JsonFieldName
                });
                self.buffer.push(c);
            }
        }
    }

    fn on_json_string(&mut self, c: char) {
        self.buffer.push(c);
        if c == '\\' {
            self.push_state(State::JsonEscape);
        } else if (c == '"' && !self.in_single_quote) || (c == '\'' && self.in_single_quote) {
            self.pop_state();
            self.in_single_quote = false;
        }
    }

    fn on_json_escape(&mut self, c: char) {
        self.buffer.push(c);
        self.pop_state();
    }

    fn on_json_field_name(&mut self, c: char) {
        if c == ':' {
            self.start_field();
            self.pop_state();
            self.push_state(State::JsonFieldValue);
        } else {
            self.buffer.push(c);
        }
    }

    fn on_json_field_value(&mut self, c: char) {
        match c {
            ',' | '}' | ']' => {
                self.complete_literal();
                self.pop_state();
                if c == '}' || c == ']' {
                    self.process_char(c);
                }
            }
            '{' | '[' => self.start_container(c),
            '"' | '\'' => {
                self.push_state(State::JsonString);
                self.in_single_quote = c == '\'';
                self.buffer.push(c);
            }
            '0'..='9' | '-' => {
                self.pop_state();
                self.push_state(State::JsonNumber);
                self.buffer.push(c);
            }
            't' | 'f' | 'n' => self.buffer.push(c),
            _ if c.is_whitespace() => {}
            _ => self.buffer.push(c),
        }
    }

    fn on_json_number(&mut self, c: char) {
        if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
            self.buffer.push(c);
        } else {
            self.complete_literal();
            self.pop_state();
            self.process_char(c);
        }
    }

    /// Turns the pending literal into a value token and attaches it.
    fn complete_literal(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.buffer);

        let (kind, content) = match self.state() {
            State::JsonString => (TokenKind::String, normalize_string(&raw)),
            State::JsonNumber => (TokenKind::Number, trim_trailing_non_number(&raw)),
            _ if raw == "true" || raw == "false" => (TokenKind::Boolean, raw),
            _ if raw == "null" => (TokenKind::Null, raw),
            _ => classify_literal(raw),
        };

        let node = self.new_node(kind, content, self.token_start);
        self.attach_value(node);
        self.token_start = self.pos;
    }

    fn new_node(&mut self, kind: TokenKind, content: String, pos: Pos) -> usize {
        self.nodes.push(Node {
            kind,
            content,
            pos,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Attaches a value to the field awaiting one, else to the innermost
    /// open container, else as a new root.
    fn attach_value(&mut self, node: usize) {
        match self.frames.last_mut() {
            Some(frame) => match frame.open_field.take() {
                Some(field) => self.nodes[field].children.push(node),
                None => {
                    let container = frame.node;
                    self.nodes[container].children.push(node);
                }
            },
            None => self.roots.push(node),
        }
    }

    fn start_container(&mut self, c: char) {
        let kind = if c == '{' {
            TokenKind::Object
        } else {
            TokenKind::Array
        };
        let node = self.new_node(kind, String::new(), self.pos);
        self.attach_value(node);
        self.frames.push(Frame {
            node,
            open_field: None,
        });
        self.push_state(State::JsonStart);
        self.depth += 1;
    }

    fn close_container(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.frames.pop();

        if self.depth == 0 {
            self.inside_json = false;
            self.in_single_quote = false;
            self.states.clear();
            self.states.push(State::Text);
            self.flush_text();
        } else {
            self.pop_state();
        }
    }

    fn start_field(&mut self) {
        let name = self
            .buffer
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        self.buffer.clear();

        let node = self.new_node(TokenKind::Field, name, self.token_start);
        if let Some(frame) = self.frames.last_mut() {
            let container = frame.node;
            frame.open_field = Some(node);
            self.nodes[container].children.push(node);
        }
        self.token_start = self.pos;
    }

    fn auto_close(&mut self) {
        // The pending literal is typed by the state it was interrupted in.
        self.complete_literal();
        while self.depth > 0 {
            self.depth -= 1;
            self.frames.pop();
        }
        self.states.clear();
        self.states.push(State::Text);
        self.inside_json = false;
        self.in_single_quote = false;
    }

    fn flush_text(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if self.inside_json {
            self.buffer.clear();
            return;
        }
        let content = std::mem::take(&mut self.buffer);
        let node = self.new_node(TokenKind::Text, content, self.token_start);
        self.roots.push(node);
    }

    /// Pops the prefix of finished roots: text always, containers only once
    /// the parser is back outside JSON.
    fn take_completed(&mut self) -> Vec<Token> {
        let mut taken = 0;
        for &root in &self.roots {
            let done = match self.nodes[root].kind {
                TokenKind::Text => true,
                TokenKind::Object | TokenKind::Array => self.state() == State::Text,
                _ => false,
            };
            if !done {
                break;
            }
            taken += 1;
        }

        let drained: Vec<usize> = self.roots.drain(..taken).collect();
        drained.into_iter().map(|root| self.to_token(root)).collect()
    }

    fn to_token(&self, id: usize) -> Token {
        let node = &self.nodes[id];
        Token {
            kind: node.kind,
            content: node.content.clone(),
            pos: node.pos,
            children: node
                .children
                .iter()
                .map(|&child| self.to_token(child))
                .collect(),
        }
    }

    fn advance_pos(&mut self, c: char) {
        self.pos.offset += 1;
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
    }
}

/// Re-quotes a string literal with double quotes, whatever delimiter it came
/// in with and whether or not it was terminated.
fn normalize_string(raw: &str) -> String {
    let single = raw.starts_with('\'');
    let mut inner = raw;
    if raw.starts_with('"') || raw.starts_with('\'') {
        inner = &inner[1..];
    }
    if (single && inner.ends_with('\'')) || (!single && inner.ends_with('"')) {
        inner = &inner[..inner.len() - 1];
    }

    if single {
        format!("\"{}\"", inner.replace('"', "\\\""))
    } else {
        format!("\"{inner}\"")
    }
}

fn trim_trailing_non_number(s: &str) -> String {
    for (i, c) in s.char_indices().rev() {
        if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
            return s[..i + c.len_utf8()].to_string();
        }
    }
    s.to_string()
}

/// Types a literal completed outside the string/number states: quoted text,
/// a number, or a bareword that gets canonicalized into a quoted string.
fn classify_literal(raw: String) -> (TokenKind, String) {
    match raw.chars().next() {
        Some('"') | Some('\'') => {
            let content = normalize_string(&raw);
            (TokenKind::String, content)
        }
        Some(c) if c.is_ascii_digit() || c == '-' => (TokenKind::Number, raw),
        _ => {
            let content = format!("\"{raw}\"");
            (TokenKind::String, content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds one character at a time, the way streamed completions arrive.
    fn parse_char_by_char(input: &str) -> Vec<Token> {
        let mut parser = StreamParser::new();
        let mut tokens = Vec::new();
        for c in input.chars() {
            tokens.extend(parser.parse(&c.to_string()));
        }
        tokens.extend(parser.end());
        tokens
    }

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let input = "Some of the test string\n```json\n{\"name\": \"abcd\",\n\"age\": 30\n}```";
        let tokens = parse_char_by_char(input);
        assert_eq!(tokens_to_string(&tokens), r#"{"name":"abcd","age":30}"#);
    }

    #[test]
    fn auto_closes_object_missing_brace() {
        let input = "Some of the test string\n```json\n{\"name\": \"abcd\",\n\"age\": 30\n```";
        let tokens = parse_char_by_char(input);
        assert_eq!(tokens_to_string(&tokens), r#"{"name":"abcd","age":30}"#);
    }

    #[test]
    fn canonicalizes_mixed_quotes() {
        let input = "Some of the test string\n```json\n{\"name\": \"abcd\",\n'age': 30}";
        let tokens = parse_char_by_char(input);
        assert_eq!(tokens_to_string(&tokens), r#"{"name":"abcd","age":30}"#);
    }

    #[test]
    fn parses_array_of_primitives() {
        let input = "Some of the test string\n```json\n[1, \"abcd\", true, null]";
        let tokens = parse_char_by_char(input);
        assert_eq!(tokens_to_string(&tokens), r#"[1,"abcd",true,null]"#);
    }

    #[test]
    fn parses_array_of_objects() {
        let input = "Some of the test string\n```json\n[{\"name\": \"abcd\",\n\"age\": 30\n}, {\"name\": \"efgh\",\n\"age\": 40\n}]";
        let tokens = parse_char_by_char(input);
        assert_eq!(
            tokens_to_string(&tokens),
            r#"[{"name":"abcd","age":30},{"name":"efgh","age":40}]"#
        );
    }

    #[test]
    fn auto_closes_array_and_nested_object() {
        let input = "Some of the test string\n```json\n[1000,{\"name\": \"abcd\",\n\"age\": 30";
        let tokens = parse_char_by_char(input);
        assert_eq!(
            tokens_to_string(&tokens),
            r#"[1000,{"name":"abcd","age":30}]"#
        );
    }

    #[test]
    fn valid_json_round_trips_to_canonical() {
        let cases = [
            (r#"{"a":{"b":1},"c":[true,null]}"#, r#"{"a":{"b":1},"c":[true,null]}"#),
            (r#"{ "a" : -1.5e3 }"#, r#"{"a":-1.5e3}"#),
            (r#"[[1,2],[3]]"#, r#"[[1,2],[3]]"#),
            (r#"{"s":"with \"escape\" kept"}"#, r#"{"s":"with \"escape\" kept"}"#),
            (r#"{"empty":{}}"#, r#"{"empty":{}}"#),
        ];
        for (input, want) in cases {
            let tokens = StreamParser::parse_all(input);
            assert_eq!(tokens_to_string(&tokens), want, "input: {input}");
        }
    }

    #[test]
    fn surrounding_prose_does_not_change_output() {
        let json = r#"{"a":{"b":1},"c":[true,null]}"#;
        let wrapped = format!("prefix text {json} suffix text");
        let tokens = StreamParser::parse_all(&wrapped);
        assert_eq!(tokens_to_string(&tokens), json);
    }

    #[test]
    fn prose_is_kept_as_text_tokens() {
        let tokens = StreamParser::parse_all("before {\"a\":1} after");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Text, TokenKind::Object, TokenKind::Text]
        );
        assert_eq!(tokens[0].content, "before ");
        assert_eq!(tokens[2].content, " after");
    }

    #[test]
    fn valid_prefixes_auto_close_to_valid_json() {
        let cases = [
            (r#"{"a":1"#, r#"{"a":1}"#),
            (r#"{"a":"xy"#, r#"{"a":"xy"}"#),
            (r#"[1,[2"#, r#"[1,[2]]"#),
            (r#"{"a":{"b":true"#, r#"{"a":{"b":true}}"#),
            (r#"{"a""#, r#"{}"#),
        ];
        for (input, want) in cases {
            let tokens = StreamParser::parse_all(input);
            assert_eq!(tokens_to_string(&tokens), want, "input: {input}");
        }
    }

    #[test]
    fn unassigned_field_emits_null() {
        let tokens = StreamParser::parse_all(r#"{"a":"#);
        assert_eq!(tokens_to_string(&tokens), r#"{"a":null}"#);
    }

    #[test]
    fn multiple_top_level_fragments() {
        let tokens = StreamParser::parse_all("first {\"a\":1} then [2,3] done");
        assert_eq!(tokens_to_string(&tokens), r#"{"a":1}[2,3]"#);
    }

    #[test]
    fn completed_tokens_stream_out_before_end() {
        let mut parser = StreamParser::new();
        let mut tokens = parser.parse("intro {\"a\":1} outro");
        // The object closed mid-chunk, so it and the leading text are
        // already available; the trailing text is still buffering.
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[1].kind, TokenKind::Object);
        tokens.extend(parser.end());
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn tracks_positions() {
        let tokens = StreamParser::parse_all("ab\n{\"k\":1}");
        let object = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Object)
            .unwrap();
        assert_eq!(object.pos.line, 2);
        assert_eq!(object.pos.column, 1);
        assert_eq!(object.pos.offset, 3);
    }

    #[test]
    fn bare_field_in_array_emits_value_only() {
        let tokens = StreamParser::parse_all(r#"["k": 1, 2]"#);
        assert_eq!(tokens_to_string(&tokens), r#"[1,2]"#);
    }

    #[test]
    fn escaped_quote_does_not_terminate_string() {
        let tokens = StreamParser::parse_all(r#"{"a":"x\"y"}"#);
        assert_eq!(tokens_to_string(&tokens), r#"{"a":"x\"y"}"#);
    }

    #[test]
    fn field_tree_shape() {
        let tokens = StreamParser::parse_all(r#"{"a":1,"b":[2]}"#);
        assert_eq!(tokens.len(), 1);
        let object = &tokens[0];
        assert_eq!(object.kind, TokenKind::Object);
        assert_eq!(object.children.len(), 2);
        assert!(object.children.iter().all(|c| c.kind == TokenKind::Field));
        assert_eq!(object.children[0].content, "a");
        assert_eq!(object.children[0].children.len(), 1);
        assert_eq!(object.children[1].children[0].kind, TokenKind::Array);
    }
}
