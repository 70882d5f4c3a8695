use std::fmt::Display;
use std::rc::Rc;

/// Where a construct sits in the source text. Every AST node gets one at
/// construction; diagnostics carry one back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locn {
    pub src: Rc<str>,
    pub line: u32,
    pub col: u32,
}

impl Locn {
    pub fn new(src: Rc<str>, line: u32, col: u32) -> Self {
        Locn { src, line, col }
    }
}

impl Display for Locn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.src, self.line, self.col)
    }
}

/// The one diagnostic kind of the compiler. Any pass aborts at the first
/// offending site and surfaces one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{locn}: {msg}")]
pub struct CompileError {
    pub locn: Locn,
    pub msg: String,
}

impl From<Locn> for CompileError {
    fn from(locn: Locn) -> Self {
        CompileError {
            locn,
            msg: String::new(),
        }
    }
}

impl CompileError {
    pub fn new(locn: Locn, msg: impl Into<String>) -> Self {
        CompileError {
            locn,
            msg: msg.into(),
        }
    }

    /// Attach a message to whatever pinpoints the offending site.
    pub fn with_msg(msg: impl Into<String>, from: impl Into<CompileError>) -> Self {
        let mut err = from.into();
        err.msg = msg.into();
        err
    }

    /// Point at the offending source line, gutter and caret included.
    pub fn render(&self, lines: &[&str]) {
        eprintln!("error: {}", self.msg);
        eprintln!("  --> {}", self.locn);
        if let Some(line) = lines.get(self.locn.line as usize - 1) {
            eprintln!("   | {}", line);
            let pad = " ".repeat(self.locn.col.saturating_sub(1) as usize);
            eprintln!("   | {}^", pad);
        }
    }
}
