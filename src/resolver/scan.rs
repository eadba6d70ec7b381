//! Dependency scanning for CommonJS sources
//!
//! A single pass over the source that skips comments, string, template and
//! regular expression literals, so only real `require("...")` call sites are
//! collected.

/// What a scan found in one module
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModuleScan {
    /// Literal arguments of `require(...)` calls, in order of first use
    pub requires: Vec<String>,

    /// Whether the module uses `import`/`export` statements
    pub module_syntax: bool,
}

/// Scan a module's source for its dependencies
pub fn scan_module(source: &str) -> ModuleScan {
    let mut scanner = Scanner::new(source);
    scanner.run();
    scanner.result
}

/// Keywords after which a `/` starts a regular expression
const REGEX_PREFIX_KEYWORDS: [&str; 14] = [
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "instanceof", "yield", "await",
];

struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,

    /// Brace depth inside each open `${ ... }` template substitution
    templates: Vec<usize>,

    /// Whether a `/` at this point would start a regex rather than divide
    regex_allowed: bool,

    /// Whether the previous token was a member access `.`
    after_dot: bool,

    result: ModuleScan,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            templates: Vec::new(),
            regex_allowed: true,
            after_dot: false,
            result: ModuleScan::default(),
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn run(&mut self) {
        if self.bytes.starts_with(b"#!") {
            self.skip_line();
        }

        while let Some(byte) = self.peek(0) {
            match byte {
                b'/' if self.peek(1) == Some(b'/') => self.skip_line(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b'/' if self.regex_allowed => {
                    self.skip_regex();
                    self.token(false);
                }
                b'\'' | b'"' => {
                    self.skip_string(byte);
                    self.token(false);
                }
                b'`' => {
                    self.pos += 1;
                    self.template();
                }
                b'{' => {
                    if let Some(depth) = self.templates.last_mut() {
                        *depth += 1;
                    }
                    self.pos += 1;
                    self.token(true);
                }
                b'}' => {
                    self.pos += 1;
                    match self.templates.last().copied() {
                        Some(0) => {
                            self.templates.pop();
                            self.template();
                        }
                        Some(depth) => {
                            if let Some(last) = self.templates.last_mut() {
                                *last = depth - 1;
                            }
                            self.token(false);
                        }
                        None => self.token(false),
                    }
                }
                b'.' if self.bytes[self.pos..].starts_with(b"...") => {
                    self.pos += 3;
                    self.token(true);
                }
                b'.' if self.peek(1).map_or(false, |b| b.is_ascii_digit()) => self.skip_number(),
                b'.' => {
                    self.pos += 1;
                    self.regex_allowed = false;
                    self.after_dot = true;
                }
                b')' | b']' => {
                    self.pos += 1;
                    self.token(false);
                }
                b if b.is_ascii_digit() => self.skip_number(),
                b if is_ident_byte(b) => self.identifier(),
                b if b.is_ascii_whitespace() => self.pos += 1,
                _ => {
                    self.pos += 1;
                    self.token(true);
                }
            }
        }
    }

    /// Record the end of a token
    fn token(&mut self, regex_allowed: bool) {
        self.regex_allowed = regex_allowed;
        self.after_dot = false;
    }

    fn skip_line(&mut self) {
        while let Some(byte) = self.peek(0) {
            if byte == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        match self.source[self.pos..].find("*/") {
            Some(end) => self.pos += end + 2,
            None => self.pos = self.bytes.len(),
        }
    }

    /// Skip a quoted string starting at the opening quote
    fn skip_string(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(byte) = self.peek(0) {
            self.pos += 1;
            match byte {
                b'\\' => self.pos += 1,
                b'\n' => break,
                b if b == quote => break,
                _ => {}
            }
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    /// Skip template text up to the closing backtick or the next `${`
    fn template(&mut self) {
        while let Some(byte) = self.peek(0) {
            match byte {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    self.token(false);
                    return;
                }
                b'$' if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.templates.push(0);
                    self.token(true);
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    fn skip_regex(&mut self) {
        let mut in_class = false;
        self.pos += 1;

        while let Some(byte) = self.peek(0) {
            self.pos += 1;
            match byte {
                b'\\' => self.pos += 1,
                b'[' => in_class = true,
                b']' => in_class = false,
                b'/' if !in_class => break,
                b'\n' => break,
                _ => {}
            }
        }

        // Flags
        while self.peek(0).map_or(false, is_ident_byte) {
            self.pos += 1;
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    fn skip_number(&mut self) {
        while self
            .peek(0)
            .map_or(false, |b| is_ident_byte(b) || b == b'.')
        {
            self.pos += 1;
        }
        self.token(false);
    }

    fn identifier(&mut self) {
        let start = self.pos;
        while self.peek(0).map_or(false, |b| is_ident_byte(b) || b.is_ascii_digit()) {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];

        if !self.after_dot {
            match word {
                "require" => {
                    if let Some(specifier) = self.require_argument() {
                        if !self.result.requires.contains(&specifier) {
                            self.result.requires.push(specifier);
                        }
                    }
                }
                "import" | "export" => {
                    // `import(...)` is a dynamic import; `x.import`, `{ import: ... }`
                    // and method shorthands are plain property names.
                    if !matches!(self.next_significant(self.pos), Some(b'(') | Some(b':')) {
                        self.result.module_syntax = true;
                    }
                }
                _ => {}
            }
        }

        self.token(REGEX_PREFIX_KEYWORDS.contains(&word));
    }

    /// Parse `( "literal" )` following a `require` identifier
    fn require_argument(&self) -> Option<String> {
        let mut pos = self.skip_whitespace(self.pos);
        if self.bytes.get(pos) != Some(&b'(') {
            return None;
        }

        pos = self.skip_whitespace(pos + 1);
        let quote = *self.bytes.get(pos)?;
        if quote != b'\'' && quote != b'"' {
            return None;
        }

        let start = pos + 1;
        let len = self.bytes[start..]
            .iter()
            .position(|&b| b == quote || b == b'\\' || b == b'\n')?;
        let end = start + len;
        if self.bytes[end] != quote {
            return None;
        }

        let close = self.skip_whitespace(end + 1);
        if self.bytes.get(close) != Some(&b')') {
            return None;
        }

        Some(self.source[start..end].to_string())
    }

    fn skip_whitespace(&self, mut pos: usize) -> usize {
        while self.bytes.get(pos).map_or(false, |b| b.is_ascii_whitespace()) {
            pos += 1;
        }
        pos
    }

    fn next_significant(&self, pos: usize) -> Option<u8> {
        self.bytes.get(self.skip_whitespace(pos)).copied()
    }
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$' || byte >= 0x80
}
