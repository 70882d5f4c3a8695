use std::rc::Rc;

use crate::ast::{Blck, Defn, Defs, Expn, ExpnKind, Prgm, Stmt, StmtKind, Valu};
use crate::check::Type;
use crate::err::{CompileError, Locn};
use crate::lex::{Lexer, Token, Tokn};
use crate::symt::SymT;

/// Recursive descent over the token stream. Definitions collect their
/// formals straight into their symbol table; every other scope entry is
/// made later by the checker and the translator.
pub struct Parser<'p> {
    lex: &'p mut Lexer<'p>,
    cur: Token<'p>,
    src: Rc<str>,
}

impl<'p> Parser<'p> {
    pub fn new(lex: &'p mut Lexer<'p>) -> Result<Self, CompileError> {
        let src = lex.src();
        let cur = lex.next()?;
        Ok(Self { lex, cur, src })
    }

    fn locn(&self) -> Locn {
        Locn::new(Rc::clone(&self.src), self.cur.line, self.cur.col)
    }

    fn err_here(&self, msg: impl Into<String>) -> CompileError {
        CompileError::with_msg(msg, self.locn())
    }

    fn advance(&mut self) -> Result<(), CompileError> {
        self.cur = self.lex.next()?;
        Ok(())
    }

    fn expect(&mut self, kind: Tokn) -> Result<(), CompileError> {
        if self.cur.kind == kind {
            self.advance()
        } else {
            Err(self.err_here(format!(
                "Expected {:?} but found {:?}.",
                kind, self.cur.kind
            )))
        }
    }

    fn expect_name(&mut self) -> Result<String, CompileError> {
        if let Tokn::Name(n) = &self.cur.kind {
            let name = n.to_string();
            self.advance()?;
            Ok(name)
        } else {
            Err(self.err_here(format!(
                "Expected a name but found {:?}.",
                self.cur.kind
            )))
        }
    }

    /// Top level: definitions and main-script statements, in any order.
    pub fn parse(mut self) -> Result<Prgm, CompileError> {
        let locn = self.locn();
        let mut defs = Defs::default();
        let mut stmts = vec![];
        let mut main_locn = None;
        while self.cur.kind != Tokn::Eof {
            if self.cur.kind == Tokn::Def {
                defs.add(self.defn()?)?;
            } else {
                if main_locn.is_none() {
                    main_locn = Some(self.locn());
                }
                stmts.push(self.stmt()?);
            }
        }
        let main = Blck {
            stmts,
            locn: main_locn.unwrap_or_else(|| locn.clone()),
        };
        Ok(Prgm {
            defs,
            main,
            main_symt: SymT::new(),
            locn,
        })
    }

    fn defn(&mut self) -> Result<Defn, CompileError> {
        let locn = self.locn();
        self.expect(Tokn::Def)?;
        let name = self.expect_name()?;
        self.expect(Tokn::LParen)?;
        let mut symt = SymT::new();
        while self.cur.kind != Tokn::RParen {
            let frml_locn = self.locn();
            let frml = self.expect_name()?;
            self.expect(Tokn::Colon)?;
            let ty = self.type_name()?;
            symt.add_frml(&frml, ty).ok_or_else(|| {
                CompileError::new(frml_locn, format!("Formal '{}' is already defined.", frml))
            })?;
            if self.cur.kind == Tokn::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(Tokn::RParen)?;
        self.expect(Tokn::Arrow)?;
        let rety = self.type_name()?;
        self.expect(Tokn::Colon)?;
        let body = self.nest()?;
        Ok(Defn {
            name,
            symt,
            rety,
            body,
            locn,
        })
    }

    fn type_name(&mut self) -> Result<Type, CompileError> {
        let ty = match &self.cur.kind {
            Tokn::IntK => Type::Int,
            Tokn::BoolK => Type::Bool,
            Tokn::StrK => Type::Str,
            Tokn::NoneK => Type::None,
            kind => {
                return Err(self.err_here(format!("Expected a type but found {:?}.", kind)));
            }
        };
        self.advance()?;
        Ok(ty)
    }

    /// An indented block: the suite after a `:` at the end of a line.
    fn nest(&mut self) -> Result<Blck, CompileError> {
        self.expect(Tokn::Newline)?;
        self.expect(Tokn::Indent)?;
        let locn = self.locn();
        let mut stmts = vec![self.stmt()?];
        while self.cur.kind != Tokn::Dedent {
            stmts.push(self.stmt()?);
        }
        self.expect(Tokn::Dedent)?;
        Ok(Blck { stmts, locn })
    }

    fn stmt(&mut self) -> Result<Stmt, CompileError> {
        let locn = self.locn();
        let kind = match &self.cur.kind {
            Tokn::Pass => {
                self.advance()?;
                self.expect(Tokn::Newline)?;
                StmtKind::Pass
            }
            Tokn::Print => {
                self.advance()?;
                self.expect(Tokn::LParen)?;
                let expn = self.expn()?;
                self.expect(Tokn::RParen)?;
                self.expect(Tokn::Newline)?;
                StmtKind::Prnt(expn)
            }
            Tokn::Return => {
                self.advance()?;
                if self.cur.kind == Tokn::Newline {
                    self.advance()?;
                    StmtKind::PRtn
                } else {
                    let expn = self.expn()?;
                    self.expect(Tokn::Newline)?;
                    StmtKind::FRtn(expn)
                }
            }
            Tokn::If => {
                self.advance()?;
                let cndn = self.expn()?;
                self.expect(Tokn::Colon)?;
                let then = self.nest()?;
                let elze = if self.cur.kind == Tokn::Else {
                    self.advance()?;
                    self.expect(Tokn::Colon)?;
                    Some(self.nest()?)
                } else {
                    None
                };
                StmtKind::IfEl { cndn, then, elze }
            }
            Tokn::While => {
                self.advance()?;
                let cndn = self.expn()?;
                self.expect(Tokn::Colon)?;
                let body = self.nest()?;
                StmtKind::Whle { cndn, body }
            }
            Tokn::Name(n) => {
                let name = n.to_string();
                self.advance()?;
                match &self.cur.kind {
                    Tokn::Colon => {
                        self.advance()?;
                        let ty = self.type_name()?;
                        self.expect(Tokn::Assign)?;
                        let expn = self.expn()?;
                        self.expect(Tokn::Newline)?;
                        StmtKind::Ntro { name, ty, expn }
                    }
                    Tokn::Assign => {
                        self.advance()?;
                        let expn = self.expn()?;
                        self.expect(Tokn::Newline)?;
                        StmtKind::Asgn { name, expn }
                    }
                    Tokn::LParen => {
                        self.advance()?;
                        let args = self.args()?;
                        self.expect(Tokn::Newline)?;
                        StmtKind::PCll { name, args }
                    }
                    kind => {
                        return Err(self.err_here(format!(
                            "Expected `:`, `=` or `(` after '{}' but found {:?}.",
                            name, kind
                        )));
                    }
                }
            }
            kind => {
                return Err(self.err_here(format!("Expected a statement but found {:?}.", kind)));
            }
        };
        Ok(Stmt { locn, kind })
    }

    /// A parenthesized argument list with the opening paren already eaten.
    fn args(&mut self) -> Result<Vec<Expn>, CompileError> {
        let mut args = vec![];
        if self.cur.kind != Tokn::RParen {
            args.push(self.expn()?);
            while self.cur.kind == Tokn::Comma {
                self.advance()?;
                args.push(self.expn()?);
            }
        }
        self.expect(Tokn::RParen)?;
        Ok(args)
    }

    // Expression tiers, loosest first: or, and, not, comparison, additive,
    // multiplicative, atom.

    fn expn(&mut self) -> Result<Expn, CompileError> {
        self.disj()
    }

    fn disj(&mut self) -> Result<Expn, CompileError> {
        let mut expn = self.conj()?;
        while self.cur.kind == Tokn::Or {
            let locn = self.locn();
            self.advance()?;
            let rght = self.conj()?;
            expn = Expn::new(locn, ExpnKind::Or(Box::new(expn), Box::new(rght)));
        }
        Ok(expn)
    }

    fn conj(&mut self) -> Result<Expn, CompileError> {
        let mut expn = self.nega()?;
        while self.cur.kind == Tokn::And {
            let locn = self.locn();
            self.advance()?;
            let rght = self.nega()?;
            expn = Expn::new(locn, ExpnKind::And(Box::new(expn), Box::new(rght)));
        }
        Ok(expn)
    }

    fn nega(&mut self) -> Result<Expn, CompileError> {
        if self.cur.kind == Tokn::Not {
            let locn = self.locn();
            self.advance()?;
            let expn = self.nega()?;
            Ok(Expn::new(locn, ExpnKind::Not(Box::new(expn))))
        } else {
            self.cmpr()
        }
    }

    /// A single, non-associative comparison.
    fn cmpr(&mut self) -> Result<Expn, CompileError> {
        let left = self.addn()?;
        let make: fn(Box<Expn>, Box<Expn>) -> ExpnKind = match self.cur.kind {
            Tokn::Less => ExpnKind::Less,
            Tokn::LessEq => ExpnKind::LsEq,
            Tokn::EqualEq => ExpnKind::Equl,
            _ => return Ok(left),
        };
        let locn = self.locn();
        self.advance()?;
        let rght = self.addn()?;
        Ok(Expn::new(locn, make(Box::new(left), Box::new(rght))))
    }

    fn addn(&mut self) -> Result<Expn, CompileError> {
        let mut expn = self.mult()?;
        loop {
            let make: fn(Box<Expn>, Box<Expn>) -> ExpnKind = match self.cur.kind {
                Tokn::Plus => ExpnKind::Plus,
                Tokn::Minus => ExpnKind::Mnus,
                _ => return Ok(expn),
            };
            let locn = self.locn();
            self.advance()?;
            let rght = self.mult()?;
            expn = Expn::new(locn, make(Box::new(expn), Box::new(rght)));
        }
    }

    fn mult(&mut self) -> Result<Expn, CompileError> {
        let mut expn = self.atom()?;
        loop {
            let make: fn(Box<Expn>, Box<Expn>) -> ExpnKind = match self.cur.kind {
                Tokn::Star => ExpnKind::Tmes,
                Tokn::SlashSlash => ExpnKind::IDiv,
                Tokn::Percent => ExpnKind::IMod,
                _ => return Ok(expn),
            };
            let locn = self.locn();
            self.advance()?;
            let rght = self.atom()?;
            expn = Expn::new(locn, make(Box::new(expn), Box::new(rght)));
        }
    }

    fn atom(&mut self) -> Result<Expn, CompileError> {
        let locn = self.locn();
        match &self.cur.kind {
            Tokn::Int(i) => {
                let i = *i;
                self.advance()?;
                Ok(Expn::new(locn, ExpnKind::Ltrl(Valu::Int(i))))
            }
            Tokn::Minus => {
                self.advance()?;
                if let Tokn::Int(i) = self.cur.kind {
                    self.advance()?;
                    Ok(Expn::new(locn, ExpnKind::Ltrl(Valu::Int(-i))))
                } else {
                    Err(self.err_here("Expected an integer literal after `-`."))
                }
            }
            Tokn::Strg(s) => {
                let s = s.clone();
                self.advance()?;
                Ok(Expn::new(locn, ExpnKind::Ltrl(Valu::Strg(s))))
            }
            Tokn::True => {
                self.advance()?;
                Ok(Expn::new(locn, ExpnKind::Ltrl(Valu::Bool(true))))
            }
            Tokn::False => {
                self.advance()?;
                Ok(Expn::new(locn, ExpnKind::Ltrl(Valu::Bool(false))))
            }
            Tokn::NoneK => {
                self.advance()?;
                Ok(Expn::new(locn, ExpnKind::Ltrl(Valu::None)))
            }
            Tokn::Input => {
                self.advance()?;
                let expn = self.parens()?;
                Ok(Expn::new(locn, ExpnKind::Inpt(Box::new(expn))))
            }
            Tokn::IntK => {
                self.advance()?;
                let expn = self.parens()?;
                Ok(Expn::new(locn, ExpnKind::IntC(Box::new(expn))))
            }
            Tokn::StrK => {
                self.advance()?;
                let expn = self.parens()?;
                Ok(Expn::new(locn, ExpnKind::StrC(Box::new(expn))))
            }
            Tokn::Name(n) => {
                let name = n.to_string();
                self.advance()?;
                if self.cur.kind == Tokn::LParen {
                    self.advance()?;
                    let args = self.args()?;
                    Ok(Expn::new(locn, ExpnKind::FCll { name, args }))
                } else {
                    Ok(Expn::new(locn, ExpnKind::Lkup(name)))
                }
            }
            Tokn::LParen => {
                self.advance()?;
                let expn = self.expn()?;
                self.expect(Tokn::RParen)?;
                Ok(expn)
            }
            kind => Err(self.err_here(format!("Expected an expression but found {:?}.", kind))),
        }
    }

    fn parens(&mut self) -> Result<Expn, CompileError> {
        self.expect(Tokn::LParen)?;
        let expn = self.expn()?;
        self.expect(Tokn::RParen)?;
        Ok(expn)
    }
}
