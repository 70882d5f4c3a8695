use std::collections::VecDeque;
use std::rc::Rc;

use crate::err::{CompileError, Locn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tokn<'t> {
    // layout
    Newline,
    Indent,
    Dedent,
    Eof,

    // punctuation
    LParen,
    RParen,
    Comma,
    Colon,
    Arrow,
    Assign,

    // operators
    Plus,
    Minus,
    Star,
    SlashSlash,
    Percent,
    Less,
    LessEq,
    EqualEq,

    // keywords
    Def,
    If,
    Else,
    While,
    Return,
    Pass,
    Print,
    Input,
    IntK,
    StrK,
    BoolK,
    And,
    Or,
    Not,
    True,
    False,
    NoneK,

    /// integer literal, already parsed
    Int(i64),
    /// string literal with escapes resolved
    Strg(String),
    /// identifier
    Name(&'t str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'t> {
    pub line: u32,
    pub col: u32,
    pub kind: Tokn<'t>,
}

/// Tokenizer over the raw source bytes. The surface syntax is line and
/// indentation structured, so alongside the usual operators and words the
/// lexer emits `Newline`, `Indent` and `Dedent` tokens; the indent stack
/// tracks the open indentation levels.
#[derive(Debug)]
pub struct Lexer<'l> {
    input: &'l [u8],
    src: Rc<str>,
    pos: usize,
    line: u32,
    col: u32,
    indents: Vec<u32>,
    pending: VecDeque<Token<'l>>,
    at_line_start: bool,
}

impl<'l> Lexer<'l> {
    pub fn new(input: &'l [u8], src: Rc<str>) -> Self {
        Self {
            input,
            src,
            pos: 0,
            line: 1,
            col: 1,
            indents: vec![0],
            pending: VecDeque::new(),
            at_line_start: true,
        }
    }

    pub fn src(&self) -> Rc<str> {
        Rc::clone(&self.src)
    }

    fn make_tok(&self, kind: Tokn<'l>) -> Token<'l> {
        Token {
            line: self.line,
            col: self.col,
            kind,
        }
    }

    fn make_err(&self, msg: impl Into<String>) -> CompileError {
        CompileError::with_msg(msg, Locn::new(Rc::clone(&self.src), self.line, self.col))
    }

    fn cur(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if let Some(b) = self.cur() {
            self.pos += 1;
            if b == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn skip_comment(&mut self) {
        while self.cur().is_some_and(|b| b != b'\n') {
            self.advance();
        }
    }

    /// Measure the leading whitespace of the line under the cursor and turn
    /// any change of depth into `Indent`/`Dedent` tokens. Blank and
    /// comment-only lines are structure-free and get skipped whole.
    fn open_line(&mut self) -> Result<(), CompileError> {
        loop {
            let mut width = 0u32;
            loop {
                match self.cur() {
                    Some(b' ') => {
                        width += 1;
                        self.advance();
                    }
                    Some(b'\t') => {
                        return Err(self.make_err("Tabs are not allowed in indentation."));
                    }
                    _ => break,
                }
            }
            match self.cur() {
                Some(b'\n') | Some(b'\r') => {
                    while self.cur().is_some_and(|b| b == b'\r') {
                        self.advance();
                    }
                    self.advance();
                    continue;
                }
                Some(b'#') => {
                    self.skip_comment();
                    continue;
                }
                None => {
                    self.close_out();
                    return Ok(());
                }
                _ => {}
            }
            self.at_line_start = false;
            let top = *self.indents.last().unwrap_or(&0);
            if width > top {
                self.indents.push(width);
                self.pending.push_back(self.make_tok(Tokn::Indent));
            } else {
                while width < *self.indents.last().unwrap_or(&0) {
                    self.indents.pop();
                    self.pending.push_back(self.make_tok(Tokn::Dedent));
                }
                if width != *self.indents.last().unwrap_or(&0) {
                    return Err(self.make_err("Inconsistent indentation."));
                }
            }
            return Ok(());
        }
    }

    /// Queue the end-of-file layout: close any dangling line, unwind the
    /// indent stack, then `Eof`.
    fn close_out(&mut self) {
        if !self.at_line_start {
            self.pending.push_back(self.make_tok(Tokn::Newline));
            self.at_line_start = true;
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.pending.push_back(self.make_tok(Tokn::Dedent));
        }
        self.pending.push_back(self.make_tok(Tokn::Eof));
    }

    pub fn next(&mut self) -> Result<Token<'l>, CompileError> {
        loop {
            if let Some(t) = self.pending.pop_front() {
                return Ok(t);
            }
            if self.at_line_start {
                self.open_line()?;
                continue;
            }

            while self.cur().is_some_and(|b| b == b' ' || b == b'\r') {
                self.advance();
            }

            let Some(c) = self.cur() else {
                self.close_out();
                continue;
            };

            let t = match c {
                b'#' => {
                    self.skip_comment();
                    continue;
                }
                b'\n' => {
                    let t = self.make_tok(Tokn::Newline);
                    self.advance();
                    self.at_line_start = true;
                    t
                }
                b'(' => self.one(Tokn::LParen),
                b')' => self.one(Tokn::RParen),
                b',' => self.one(Tokn::Comma),
                b':' => self.one(Tokn::Colon),
                b'+' => self.one(Tokn::Plus),
                b'*' => self.one(Tokn::Star),
                b'%' => self.one(Tokn::Percent),
                b'-' if self.peek() == Some(b'>') => self.two(Tokn::Arrow),
                b'-' => self.one(Tokn::Minus),
                b'/' if self.peek() == Some(b'/') => self.two(Tokn::SlashSlash),
                b'/' => return Err(self.make_err("Expected `//`; there is no `/` operator.")),
                b'<' if self.peek() == Some(b'=') => self.two(Tokn::LessEq),
                b'<' => self.one(Tokn::Less),
                b'=' if self.peek() == Some(b'=') => self.two(Tokn::EqualEq),
                b'=' => self.one(Tokn::Assign),
                b'"' => self.strg()?,
                c if c.is_ascii_digit() => self.intg()?,
                c if c.is_ascii_alphabetic() || c == b'_' => self.word()?,
                c => {
                    return Err(self.make_err(format!("Unknown character `{}`.", c as char)));
                }
            };

            return Ok(t);
        }
    }

    fn one(&mut self, kind: Tokn<'l>) -> Token<'l> {
        let t = self.make_tok(kind);
        self.advance();
        t
    }

    fn two(&mut self, kind: Tokn<'l>) -> Token<'l> {
        let t = self.make_tok(kind);
        self.advance();
        self.advance();
        t
    }

    fn intg(&mut self) -> Result<Token<'l>, CompileError> {
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        while self.cur().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.make_err("Invalid utf8 input."))?;
        let value: i64 = text
            .parse()
            .map_err(|_| self.make_err("Integer literal out of range."))?;
        Ok(Token {
            line,
            col,
            kind: Tokn::Int(value),
        })
    }

    fn strg(&mut self) -> Result<Token<'l>, CompileError> {
        let (line, col) = (self.line, self.col);
        self.advance();
        let mut bytes = Vec::new();
        loop {
            match self.cur() {
                None | Some(b'\n') => {
                    return Err(self.make_err("Unterminated string literal."));
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let esc = match self.cur() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'\\') => b'\\',
                        Some(b'"') => b'"',
                        _ => return Err(self.make_err("Unknown escape in string literal.")),
                    };
                    bytes.push(esc);
                    self.advance();
                }
                Some(c) => {
                    bytes.push(c);
                    self.advance();
                }
            }
        }
        let text =
            String::from_utf8(bytes).map_err(|_| self.make_err("Invalid utf8 input."))?;
        Ok(Token {
            line,
            col,
            kind: Tokn::Strg(text),
        })
    }

    fn word(&mut self) -> Result<Token<'l>, CompileError> {
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        while self
            .cur()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.advance();
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.make_err("Invalid utf8 input."))?;
        let kind = match text {
            "def" => Tokn::Def,
            "if" => Tokn::If,
            "else" => Tokn::Else,
            "while" => Tokn::While,
            "return" => Tokn::Return,
            "pass" => Tokn::Pass,
            "print" => Tokn::Print,
            "input" => Tokn::Input,
            "int" => Tokn::IntK,
            "str" => Tokn::StrK,
            "bool" => Tokn::BoolK,
            "and" => Tokn::And,
            "or" => Tokn::Or,
            "not" => Tokn::Not,
            "True" => Tokn::True,
            "False" => Tokn::False,
            "None" => Tokn::NoneK,
            _ => Tokn::Name(text),
        };
        Ok(Token { line, col, kind })
    }

    #[cfg(test)]
    pub fn all(&mut self) -> Result<Vec<Token<'l>>, CompileError> {
        let mut toks = vec![];
        loop {
            let t = self.next()?;
            let done = t.kind == Tokn::Eof;
            toks.push(t);
            if done {
                return Ok(toks);
            }
        }
    }
}
