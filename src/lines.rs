//! Statement Line Markers
//!
//! The engine reports no source positions for runtime errors, so test files
//! are evaluated with a marker assignment (`__scriptLine=N;`) placed in front
//! of each statement. When a script throws, the last marker that ran names
//! the line.
//!
//! Markers are only placed where a statement can begin: at the start of the
//! file, after a `;` or an opening block brace at statement level, and on a
//! new line where automatic semicolon insertion ends the previous statement.
//! Markers never add newlines, so every other position is unchanged. The
//! caller re-parses the marked text and falls back to the original when the
//! scan guessed wrong.

/// Global written by the markers
pub const LINE_GLOBAL: &str = "__scriptLine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    /// Identifier, keyword or number
    Word,
    /// String, regex or complete template literal
    Literal,
    /// Template chunk ending in `${`
    TemplateOpen,
    Arrow,
    Punct(char),
}

#[derive(Debug, Clone, Copy)]
struct Token<'src> {
    kind: TokenKind,
    offset: usize,
    line: u32,
    origin: &'src str,
}

/// Keywords after which a `/` starts a regex rather than a division
const REGEX_PREFIX_WORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Keywords that continue the statement before them
const CONTINUATION_WORDS: &[&str] = &[
    "else", "catch", "finally", "while", "case", "default", "in", "instanceof", "of",
];

/// Keywords that never end a statement
const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "return", "static", "switch", "throw", "try", "typeof", "var",
    "void", "while", "with", "yield", "async", "await", "get", "set", "of",
];

struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: u32,
    regex_allowed: bool,
    /// One entry per open `{`; `true` when it opened a template substitution
    braces: Vec<bool>,
}

impl<'src> Lexer<'src> {
    fn new(src: &'src str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            regex_allowed: true,
            braces: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    /// Consume one char, counting line terminators
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        match c {
            '\n' | '\u{2028}' | '\u{2029}' => self.line += 1,
            '\r' if self.peek() != Some('\n') => self.line += 1,
            _ => {}
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '\u{feff}' {
                self.bump();
            } else if c == '/' && self.peek_second() == Some('/') {
                while let Some(c) = self.peek() {
                    if matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') {
                        break;
                    }
                    self.bump();
                }
            } else if c == '/' && self.peek_second() == Some('*') {
                self.bump();
                self.bump();
                while let Some(c) = self.bump() {
                    if c == '*' && self.peek() == Some('/') {
                        self.bump();
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn quoted(&mut self, quote: char) {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                c if c == quote => break,
                _ => {}
            }
        }
    }

    /// Scan template text up to the closing backtick or a `${`.
    fn template_chunk(&mut self) -> TokenKind {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '`' => return TokenKind::Literal,
                '$' if self.peek() == Some('{') => {
                    self.bump();
                    self.braces.push(true);
                    return TokenKind::TemplateOpen;
                }
                _ => {}
            }
        }
        TokenKind::Literal
    }

    fn regex(&mut self) {
        let mut in_class = false;
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                '\n' | '\r' => break,
                _ => {}
            }
        }
        while self.peek().is_some_and(is_word_char) {
            self.bump();
        }
    }

    fn next_token(&mut self) -> Option<Token<'src>> {
        self.skip_trivia();
        let start = self.pos;
        let line = self.line;
        let c = self.bump()?;

        let kind = match c {
            '"' | '\'' => {
                self.quoted(c);
                TokenKind::Literal
            }
            '`' => self.template_chunk(),
            '/' if self.regex_allowed => {
                self.regex();
                TokenKind::Literal
            }
            '=' if self.peek() == Some('>') => {
                self.bump();
                TokenKind::Arrow
            }
            '{' => {
                self.braces.push(false);
                TokenKind::Punct('{')
            }
            '}' => match self.braces.pop() {
                Some(true) => self.template_chunk(),
                _ => TokenKind::Punct('}'),
            },
            c if is_word_char(c) => {
                let number = c.is_ascii_digit();
                while self
                    .peek()
                    .is_some_and(|c| is_word_char(c) || (number && c == '.'))
                {
                    self.bump();
                }
                TokenKind::Word
            }
            c => TokenKind::Punct(c),
        };

        let origin = &self.src[start..self.pos];
        self.regex_allowed = match kind {
            TokenKind::Word => REGEX_PREFIX_WORDS.contains(&origin),
            TokenKind::Literal => false,
            TokenKind::TemplateOpen | TokenKind::Arrow => true,
            TokenKind::Punct(p) => !matches!(p, ')' | ']' | '}'),
        };

        Some(Token {
            kind,
            offset: start,
            line,
            origin,
        })
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\\' || (!c.is_ascii() && !c.is_whitespace())
}

/// What an open bracket turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    /// Braces holding a statement list
    Body,
    /// Object literal, class body, destructuring pattern
    Brace,
    Paren,
    Bracket,
    /// `${ ... }` inside a template literal
    Template,
}

/// Does a `{` following `prev` open a statement list?
fn opens_body(prev: Option<&Token<'_>>, stack: &[Open]) -> bool {
    let statement_level = matches!(stack.last(), None | Some(Open::Body));
    match prev {
        None => true,
        Some(t) => match t.kind {
            TokenKind::Punct(')') | TokenKind::Arrow => true,
            TokenKind::Punct(';') | TokenKind::Punct('{') | TokenKind::Punct('}') => {
                statement_level
            }
            TokenKind::Word => matches!(t.origin, "else" | "try" | "finally" | "do"),
            _ => false,
        },
    }
}

/// Can `tok` begin a statement, given the token before it?
fn starts_statement(prev: Option<&Token<'_>>, tok: &Token<'_>, stack: &[Open]) -> bool {
    if tok.kind == TokenKind::Word && CONTINUATION_WORDS.contains(&tok.origin) {
        return false;
    }
    if matches!(tok.kind, TokenKind::Punct('}') | TokenKind::Punct(';')) || is_template_tail(tok) {
        return false;
    }
    let statement_level = matches!(stack.last(), None | Some(Open::Body));

    let Some(prev) = prev else {
        // A leading string may be a directive prologue
        return tok.kind != TokenKind::Literal;
    };
    match prev.kind {
        TokenKind::Punct(';') => statement_level,
        // The `{` was just pushed, so the top of the stack is its own entry
        TokenKind::Punct('{') => stack.last() == Some(&Open::Body) && tok.kind != TokenKind::Literal,
        // A word on a fresh line after a finished expression: ASI ended it
        _ if tok.line > prev.line && tok.kind == TokenKind::Word && statement_level => {
            match prev.kind {
                TokenKind::Word => !RESERVED_WORDS.contains(&prev.origin),
                TokenKind::Literal | TokenKind::Punct(']') => true,
                _ => false,
            }
        }
        _ => false,
    }
}

/// Template text resuming after a `${ ... }` substitution
fn is_template_tail(tok: &Token<'_>) -> bool {
    matches!(tok.kind, TokenKind::Literal | TokenKind::TemplateOpen) && tok.origin.starts_with('}')
}

/// Insert `<global>=<line>;` in front of every statement in `text`.
pub fn mark_statement_lines(text: &str, global: &str) -> String {
    let mut lexer = Lexer::new(text);
    let mut stack: Vec<Open> = Vec::new();
    let mut marks: Vec<(usize, u32)> = Vec::new();
    let mut prev: Option<Token<'_>> = None;

    while let Some(tok) = lexer.next_token() {
        let depth = stack.len();
        match tok.kind {
            TokenKind::Punct('{') => {
                let open = if opens_body(prev.as_ref(), &stack) {
                    Open::Body
                } else {
                    Open::Brace
                };
                stack.push(open);
            }
            TokenKind::Punct('(') => stack.push(Open::Paren),
            TokenKind::Punct('[') => stack.push(Open::Bracket),
            TokenKind::Punct('}') | TokenKind::Punct(')') | TokenKind::Punct(']') => {
                stack.pop();
            }
            _ if is_template_tail(&tok) => {
                stack.pop();
                if tok.kind == TokenKind::TemplateOpen {
                    stack.push(Open::Template);
                }
            }
            TokenKind::TemplateOpen => stack.push(Open::Template),
            _ => {}
        }

        // A bracket the token itself opened does not count yet
        let before = if stack.len() > depth {
            &stack[..depth]
        } else {
            &stack[..]
        };
        if starts_statement(prev.as_ref(), &tok, before) {
            marks.push((tok.offset, tok.line));
        }
        prev = Some(tok);
    }

    let mut out = String::with_capacity(text.len() + marks.len() * (global.len() + 8));
    let mut last = 0;
    for (offset, line) in marks {
        out.push_str(&text[last..offset]);
        out.push_str(global);
        out.push('=');
        out.push_str(&line.to_string());
        out.push(';');
        last = offset;
    }
    out.push_str(&text[last..]);
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
