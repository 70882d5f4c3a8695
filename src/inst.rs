use std::fmt::Display;

use crate::ast::Name;
use crate::symt::Labl;

/// Comparison selector for `Bcn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmpr {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

/// Comparison-against-zero selector for `Bcz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmpz {
    Gtz,
    Eqz,
}

/// One three-address instruction. Operands are names from the symbol
/// tables; jump targets are labels minted there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// define a label at this point
    Lbl(Labl),
    /// frame prologue marker
    Enter,
    /// frame epilogue marker
    Leave,
    /// store an integer immediate
    Set { dst: Name, imm: i64 },
    /// load a pointer to an interned string
    Stl { dst: Name, strg: Labl },
    Mov { dst: Name, src: Name },
    Add { dst: Name, lft: Name, rgt: Name },
    Sub { dst: Name, lft: Name, rgt: Name },
    Mul { dst: Name, lft: Name, rgt: Name },
    Div { dst: Name, lft: Name, rgt: Name },
    Mod { dst: Name, lft: Name, rgt: Name },
    /// branch on a numeric comparison of two operands
    Bcn {
        cmp: Cmpr,
        lft: Name,
        rgt: Name,
        thn: Labl,
        els: Labl,
    },
    /// branch on a comparison of one operand against zero
    Bcz {
        cmp: Cmpz,
        arg: Name,
        thn: Labl,
        els: Labl,
    },
    Jmp(Labl),
    /// print an integer
    Pti(Name),
    /// print a string through its pointer
    Pts(Name),
    /// read a console line, parse it as an integer
    Gti(Name),
    /// call a definition, optionally keeping the result
    Cll {
        name: Name,
        args: Vec<Name>,
        dst: Option<Name>,
    },
    /// set the return value
    Rtn(Name),
    Nop,
}

impl Display for Cmpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Cmpr::Lt => "lt",
            Cmpr::Le => "le",
            Cmpr::Eq => "eq",
            Cmpr::Ne => "ne",
            Cmpr::Gt => "gt",
            Cmpr::Ge => "ge",
        };
        write!(f, "{}", text)
    }
}

impl Display for Cmpz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cmpz::Gtz => write!(f, "gtz"),
            Cmpz::Eqz => write!(f, "eqz"),
        }
    }
}

impl Display for Inst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inst::Lbl(l) => write!(f, "{}:", l),
            Inst::Enter => write!(f, "\tenter"),
            Inst::Leave => write!(f, "\tleave"),
            Inst::Set { dst, imm } => write!(f, "\tset {}, {}", dst, imm),
            Inst::Stl { dst, strg } => write!(f, "\tstl {}, {}", dst, strg),
            Inst::Mov { dst, src } => write!(f, "\tmov {}, {}", dst, src),
            Inst::Add { dst, lft, rgt } => write!(f, "\tadd {}, {}, {}", dst, lft, rgt),
            Inst::Sub { dst, lft, rgt } => write!(f, "\tsub {}, {}, {}", dst, lft, rgt),
            Inst::Mul { dst, lft, rgt } => write!(f, "\tmul {}, {}, {}", dst, lft, rgt),
            Inst::Div { dst, lft, rgt } => write!(f, "\tdiv {}, {}, {}", dst, lft, rgt),
            Inst::Mod { dst, lft, rgt } => write!(f, "\tmod {}, {}, {}", dst, lft, rgt),
            Inst::Bcn {
                cmp,
                lft,
                rgt,
                thn,
                els,
            } => write!(f, "\tbcn {}, {}, {}, {}, {}", cmp, lft, rgt, thn, els),
            Inst::Bcz { cmp, arg, thn, els } => {
                write!(f, "\tbcz {}, {}, {}, {}", cmp, arg, thn, els)
            }
            Inst::Jmp(l) => write!(f, "\tjmp {}", l),
            Inst::Pti(a) => write!(f, "\tpti {}", a),
            Inst::Pts(a) => write!(f, "\tpts {}", a),
            Inst::Gti(d) => write!(f, "\tgti {}", d),
            Inst::Cll { name, args, dst } => {
                write!(f, "\tcll {}", name)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                if let Some(dst) = dst {
                    write!(f, " -> {}", dst)?;
                }
                Ok(())
            }
            Inst::Rtn(a) => write!(f, "\trtn {}", a),
            Inst::Nop => write!(f, "\tnop"),
        }
    }
}
