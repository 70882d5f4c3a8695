//! The type-and-return checker. Walking a parsed program it:
//!
//! - fills the type slot of every expression
//! - enforces the typing rules of every statement and operator
//! - computes for each block whether it never, maybe, or definitely
//!   returns, and with what type
//!
//! The return summaries form a small algebra: `rtns_seq` composes the
//! summaries of consecutive statements, `rtns_sum` joins the two arms of a
//! branch, and `voidify` weakens a summary for code that may not run at
//! all, like a loop body.

use std::collections::HashMap;
use std::fmt::Display;

use crate::ast::{Blck, Defn, Defs, Expn, ExpnKind, Name, Prgm, Stmt, StmtKind, Valu};
use crate::err::{CompileError, Locn};
use crate::symt::SymT;

/// The four types of the language. Equality is plain variant equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    Str,
    None,
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "str"),
            Type::None => write!(f, "None"),
        }
    }
}

/// The return behavior of a statement or block:
///
/// * `Void` — no execution path reaches a return;
/// * `VoidOr(t)` — some path returns a `t`, some path falls through;
/// * `Def(t)` — every path returns a `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rtns {
    Void,
    VoidOr(Type),
    Def(Type),
}

/// The type a summary carries, if any.
pub fn type_of(rtns: Rtns) -> Type {
    match rtns {
        Rtns::VoidOr(t) | Rtns::Def(t) => t,
        Rtns::Void => Type::None,
    }
}

/// Weaken a definite return to a possible one.
pub fn voidify(rtns: Rtns) -> Rtns {
    match rtns {
        Rtns::Def(t) => Rtns::VoidOr(t),
        other => other,
    }
}

/// Compose the summaries of statement `a` followed by statement `b`.
pub fn rtns_seq(a: Rtns, b: Rtns, locn: &Locn) -> Result<Rtns, CompileError> {
    match a {
        Rtns::Void => Ok(b),
        Rtns::VoidOr(t1) => match b {
            Rtns::Void => Ok(a),
            _ if type_of(b) == t1 => Ok(b),
            _ => Err(CompileError::new(
                locn.clone(),
                "Type mismatch. Statement return is not compatible with what's expected.",
            )),
        },
        Rtns::Def(_) => Err(CompileError::new(
            locn.clone(),
            "Statement not reachable because of prior return.",
        )),
    }
}

/// Combine the summaries of two alternative branches.
pub fn rtns_sum(a: Rtns, b: Rtns, locn: &Locn) -> Result<Rtns, CompileError> {
    if a == Rtns::Void {
        return Ok(voidify(b));
    }
    if b == Rtns::Void {
        return Ok(voidify(a));
    }
    let (t1, t2) = (type_of(a), type_of(b));
    if t1 != t2 {
        return Err(CompileError::new(
            locn.clone(),
            "Type mismatch. Incompatible return types.",
        ));
    }
    match (a, b) {
        (Rtns::Def(_), Rtns::Def(_)) => Ok(Rtns::Def(t1)),
        _ => Ok(Rtns::VoidOr(t1)),
    }
}

/// A callable's shape, collected up front so that call sites in any
/// definition can be checked against any other definition.
struct Sig {
    frmls: Vec<Type>,
    rety: Type,
}

type Sigs = HashMap<Name, Sig>;

/// Verify the whole program: every definition body against its declared
/// return type, then the main script, which must not return. Fills the type
/// slot of every expression along the way.
pub fn check(prgm: &mut Prgm) -> Result<(), CompileError> {
    let sigs = collect_sigs(&prgm.defs);
    for defn in prgm.defs.iter_mut() {
        check_defn(defn, &sigs)?;
    }
    let rtns = check_blck(&mut prgm.main, Rtns::Void, &sigs, &mut prgm.main_symt)?;
    if rtns != Rtns::Void {
        return Err(CompileError::new(
            prgm.main.locn.clone(),
            "Main script should not return.",
        ));
    }
    Ok(())
}

fn collect_sigs(defs: &Defs) -> Sigs {
    defs.iter()
        .map(|defn| {
            let frmls = (0..defn.symt.arity())
                .map(|i| defn.symt.get_frml(i).ty)
                .collect();
            (
                defn.name.clone(),
                Sig {
                    frmls,
                    rety: defn.rety,
                },
            )
        })
        .collect()
}

fn check_defn(defn: &mut Defn, sigs: &Sigs) -> Result<(), CompileError> {
    let rtns = check_blck(&mut defn.body, Rtns::Def(defn.rety), sigs, &mut defn.symt)?;
    match rtns {
        Rtns::Void => Err(CompileError::new(
            defn.body.locn.clone(),
            "Definition body never returns.",
        )),
        Rtns::VoidOr(_) => Err(CompileError::new(
            defn.body.locn.clone(),
            "Definition body might not return.",
        )),
        Rtns::Def(_) => Ok(()),
    }
}

/// Fold the sequencing operator across the block's statements.
fn check_blck(
    blck: &mut Blck,
    expd: Rtns,
    sigs: &Sigs,
    symt: &mut SymT,
) -> Result<Rtns, CompileError> {
    let mut rtns = Rtns::Void;
    for stmt in &mut blck.stmts {
        let locn = stmt.locn.clone();
        let stmt_rtns = check_stmt(stmt, expd, sigs, symt)?;
        rtns = rtns_seq(rtns, stmt_rtns, &locn)?;
    }
    Ok(rtns)
}

fn check_stmt(
    stmt: &mut Stmt,
    expd: Rtns,
    sigs: &Sigs,
    symt: &mut SymT,
) -> Result<Rtns, CompileError> {
    match &mut stmt.kind {
        StmtKind::Pass => Ok(Rtns::Void),
        StmtKind::Ntro { name, ty, expn } => {
            let expn_ty = check_expn(expn, sigs, symt)?;
            if expn_ty != *ty {
                return Err(CompileError::new(
                    stmt.locn.clone(),
                    format!(
                        "Type mismatch. Expected initialization of type {} but instead has type {}.",
                        ty, expn_ty
                    ),
                ));
            }
            symt.add_locl(name, *ty).ok_or_else(|| {
                CompileError::new(
                    stmt.locn.clone(),
                    format!("Variable '{}' was already introduced.", name),
                )
            })?;
            Ok(Rtns::Void)
        }
        StmtKind::Asgn { name, expn } => {
            let Some(info) = symt.get_info(name) else {
                return Err(CompileError::new(
                    stmt.locn.clone(),
                    format!("Variable '{}' never introduced.", name),
                ));
            };
            let name_ty = info.ty;
            let expn_ty = check_expn(expn, sigs, symt)?;
            if expn_ty != name_ty {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    format!(
                        "Type mismatch. Expected expression of type {} but instead has type {}.",
                        name_ty, expn_ty
                    ),
                ));
            }
            Ok(Rtns::Void)
        }
        StmtKind::Prnt(expn) => {
            check_expn(expn, sigs, symt)?;
            Ok(Rtns::Void)
        }
        StmtKind::PRtn => {
            if expd == Rtns::Void {
                return Err(CompileError::new(
                    stmt.locn.clone(),
                    "Unexpected return statement.",
                ));
            }
            if type_of(expd) != Type::None {
                return Err(CompileError::new(
                    stmt.locn.clone(),
                    "A procedure does not return a value.",
                ));
            }
            Ok(Rtns::Def(Type::None))
        }
        StmtKind::FRtn(expn) => {
            let expn_ty = check_expn(expn, sigs, symt)?;
            if expd == Rtns::Void {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Unexpected return statement.",
                ));
            }
            let expd_ty = type_of(expd);
            if expn_ty != expd_ty {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    format!("Return type mismatch. Expected return of type {}.", expd_ty),
                ));
            }
            Ok(Rtns::Def(expd_ty))
        }
        StmtKind::IfEl { cndn, then, elze } => {
            check_cndn(cndn, sigs, symt)?;
            let then_rtns = check_blck(then, expd, sigs, symt)?;
            let elze_rtns = match elze {
                Some(blck) => check_blck(blck, expd, sigs, symt)?,
                None => Rtns::Void,
            };
            rtns_sum(then_rtns, elze_rtns, &stmt.locn)
        }
        StmtKind::Whle { cndn, body } => {
            check_cndn(cndn, sigs, symt)?;
            let body_rtns = check_blck(body, expd, sigs, symt)?;
            Ok(voidify(body_rtns))
        }
        StmtKind::PCll { name, args } => {
            let Some(sig) = sigs.get(name.as_str()) else {
                return Err(CompileError::new(
                    stmt.locn.clone(),
                    format!("Unknown function or procedure '{}'.", name),
                ));
            };
            if sig.rety != Type::None {
                return Err(CompileError::new(
                    stmt.locn.clone(),
                    format!("'{}' does not name a procedure.", name),
                ));
            }
            check_args(name, args, &stmt.locn, sigs, symt)?;
            Ok(Rtns::Void)
        }
    }
}

fn check_cndn(cndn: &mut Expn, sigs: &Sigs, symt: &mut SymT) -> Result<(), CompileError> {
    let cndn_ty = check_expn(cndn, sigs, symt)?;
    if cndn_ty != Type::Bool {
        return Err(CompileError::new(
            cndn.locn.clone(),
            "Type mismatch. Condition is not a bool.",
        ));
    }
    Ok(())
}

/// Check an argument list against the callee's formals. The signature is
/// looked up again to sidestep holding a borrow across the recursion.
fn check_args(
    name: &str,
    args: &mut [Expn],
    locn: &Locn,
    sigs: &Sigs,
    symt: &mut SymT,
) -> Result<(), CompileError> {
    let arity = sigs[name].frmls.len();
    if args.len() != arity {
        return Err(CompileError::new(
            locn.clone(),
            format!(
                "Wrong number of arguments. '{}' expects {} but got {}.",
                name,
                arity,
                args.len()
            ),
        ));
    }
    for (i, arg) in args.iter_mut().enumerate() {
        let arg_ty = check_expn(arg, sigs, symt)?;
        let frml_ty = sigs[name].frmls[i];
        if arg_ty != frml_ty {
            return Err(CompileError::new(
                arg.locn.clone(),
                format!(
                    "Type mismatch. Argument {} of '{}' should have type {}.",
                    i + 1,
                    name,
                    frml_ty
                ),
            ));
        }
    }
    Ok(())
}

/// Determine an expression's type, record it in the node's type slot, and
/// return it.
fn check_expn(expn: &mut Expn, sigs: &Sigs, symt: &mut SymT) -> Result<Type, CompileError> {
    let ty = match &mut expn.kind {
        ExpnKind::Ltrl(v) => match v {
            Valu::Int(_) => Type::Int,
            Valu::Bool(_) => Type::Bool,
            Valu::Strg(_) => Type::Str,
            Valu::None => Type::None,
        },
        ExpnKind::Lkup(name) => match symt.get_info(name) {
            Some(info) => info.ty,
            None => {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Unknown identifier.",
                ));
            }
        },
        ExpnKind::Plus(l, r) => check_arith(l, r, "plus", &expn.locn, sigs, symt)?,
        ExpnKind::Mnus(l, r) => check_arith(l, r, "minus", &expn.locn, sigs, symt)?,
        ExpnKind::Tmes(l, r) => check_arith(l, r, "times", &expn.locn, sigs, symt)?,
        ExpnKind::IDiv(l, r) => check_arith(l, r, "integer division", &expn.locn, sigs, symt)?,
        ExpnKind::IMod(l, r) => check_arith(l, r, "modulus", &expn.locn, sigs, symt)?,
        ExpnKind::Less(l, r) | ExpnKind::LsEq(l, r) => {
            let left_ty = check_expn(l, sigs, symt)?;
            let rght_ty = check_expn(r, sigs, symt)?;
            if left_ty != rght_ty {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Must compare values of the same type.",
                ));
            }
            if left_ty != Type::Int {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "This version of the language only compares integers.",
                ));
            }
            Type::Bool
        }
        ExpnKind::Equl(l, r) => {
            let left_ty = check_expn(l, sigs, symt)?;
            let rght_ty = check_expn(r, sigs, symt)?;
            if left_ty != rght_ty {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Must compare values of the same type.",
                ));
            }
            Type::Bool
        }
        ExpnKind::And(l, r) | ExpnKind::Or(l, r) => {
            let left_ty = check_expn(l, sigs, symt)?;
            let rght_ty = check_expn(r, sigs, symt)?;
            if left_ty != Type::Bool || rght_ty != Type::Bool {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Logical connective applied to a non-boolean value.",
                ));
            }
            Type::Bool
        }
        ExpnKind::Not(e) => {
            let e_ty = check_expn(e, sigs, symt)?;
            if e_ty != Type::Bool {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Logical connective applied to a non-boolean value.",
                ));
            }
            Type::Bool
        }
        ExpnKind::IntC(e) => {
            let e_ty = check_expn(e, sigs, symt)?;
            if e_ty == Type::None {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Cannot convert a None to an int.",
                ));
            }
            Type::Int
        }
        ExpnKind::StrC(e) => {
            check_expn(e, sigs, symt)?;
            Type::Str
        }
        ExpnKind::Inpt(e) => {
            let e_ty = check_expn(e, sigs, symt)?;
            if e_ty != Type::Str {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    "Input prompt is not a string.",
                ));
            }
            // This version of the language hands back the line parsed as an
            // integer rather than the string itself.
            Type::Int
        }
        ExpnKind::FCll { name, args } => {
            let Some(sig) = sigs.get(name.as_str()) else {
                return Err(CompileError::new(
                    expn.locn.clone(),
                    format!("Unknown function or procedure '{}'.", name),
                ));
            };
            let rety = sig.rety;
            let name = name.clone();
            check_args(&name, args, &expn.locn, sigs, symt)?;
            rety
        }
    };
    expn.ty = Some(ty);
    Ok(ty)
}

fn check_arith(
    l: &mut Expn,
    r: &mut Expn,
    what: &str,
    locn: &Locn,
    sigs: &Sigs,
    symt: &mut SymT,
) -> Result<Type, CompileError> {
    let left_ty = check_expn(l, sigs, symt)?;
    let rght_ty = check_expn(r, sigs, symt)?;
    if left_ty != Type::Int || rght_ty != Type::Int {
        return Err(CompileError::new(
            locn.clone(),
            format!("Wrong operand types for {}.", what),
        ));
    }
    Ok(Type::Int)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locn() -> Locn {
        Locn::new("<test>".into(), 1, 1)
    }

    mod algebra {
        use super::*;

        #[test]
        fn seq_void_is_identity() {
            let l = locn();
            assert_eq!(rtns_seq(Rtns::Void, Rtns::Void, &l).unwrap(), Rtns::Void);
            assert_eq!(
                rtns_seq(Rtns::Void, Rtns::Def(Type::Int), &l).unwrap(),
                Rtns::Def(Type::Int)
            );
            assert_eq!(
                rtns_seq(Rtns::Void, Rtns::VoidOr(Type::Str), &l).unwrap(),
                Rtns::VoidOr(Type::Str)
            );
        }

        #[test]
        fn seq_sharpens_a_maybe_return() {
            let l = locn();
            assert_eq!(
                rtns_seq(Rtns::VoidOr(Type::Int), Rtns::Void, &l).unwrap(),
                Rtns::VoidOr(Type::Int)
            );
            assert_eq!(
                rtns_seq(Rtns::VoidOr(Type::Int), Rtns::Def(Type::Int), &l).unwrap(),
                Rtns::Def(Type::Int)
            );
        }

        #[test]
        fn seq_rejects_incompatible_maybe_returns() {
            let l = locn();
            assert!(rtns_seq(Rtns::VoidOr(Type::Int), Rtns::Def(Type::Str), &l).is_err());
        }

        #[test]
        fn seq_after_definite_return_is_unreachable() {
            let l = locn();
            assert!(rtns_seq(Rtns::Def(Type::Int), Rtns::Void, &l).is_err());
            assert!(rtns_seq(Rtns::Def(Type::Int), Rtns::Def(Type::Int), &l).is_err());
        }

        #[test]
        fn sum_of_two_definites_is_definite() {
            let l = locn();
            assert_eq!(
                rtns_sum(Rtns::Def(Type::Int), Rtns::Def(Type::Int), &l).unwrap(),
                Rtns::Def(Type::Int)
            );
        }

        #[test]
        fn sum_with_void_weakens() {
            let l = locn();
            assert_eq!(
                rtns_sum(Rtns::Def(Type::Int), Rtns::Void, &l).unwrap(),
                Rtns::VoidOr(Type::Int)
            );
            assert_eq!(
                rtns_sum(Rtns::Void, Rtns::VoidOr(Type::Bool), &l).unwrap(),
                Rtns::VoidOr(Type::Bool)
            );
            assert_eq!(rtns_sum(Rtns::Void, Rtns::Void, &l).unwrap(), Rtns::Void);
        }

        #[test]
        fn sum_rejects_mixed_types() {
            let l = locn();
            assert!(rtns_sum(Rtns::Def(Type::Int), Rtns::Def(Type::Str), &l).is_err());
        }

        #[test]
        fn voidify_weakens_only_definites() {
            assert_eq!(voidify(Rtns::Def(Type::Int)), Rtns::VoidOr(Type::Int));
            assert_eq!(voidify(Rtns::VoidOr(Type::Int)), Rtns::VoidOr(Type::Int));
            assert_eq!(voidify(Rtns::Void), Rtns::Void);
        }
    }

    mod programs {
        use super::*;
        use crate::lex::Lexer;
        use crate::parser::Parser;

        fn check_src(src: &str) -> Result<Prgm, CompileError> {
            let mut lexer = Lexer::new(src.as_bytes(), "<test>".into());
            let mut prgm = Parser::new(&mut lexer)?.parse()?;
            check(&mut prgm)?;
            Ok(prgm)
        }

        macro_rules! rejects {
            ($($name:ident: $src:literal => $needle:literal;)*) => {
                $(
                    #[test]
                    fn $name() {
                        let err = check_src($src).unwrap_err();
                        assert!(
                            err.msg.contains($needle),
                            "expected {:?} in {:?}", $needle, err.msg
                        );
                    }
                )*
            };
        }

        #[test]
        fn print_of_a_sum_is_fine() {
            check_src("print(1 + 2)\n").unwrap();
        }

        #[test]
        fn both_arms_returning_makes_a_definite_body() {
            check_src(concat!(
                "def f(x : int) -> int:\n",
                "    if x < 0:\n",
                "        return -1\n",
                "    else:\n",
                "        return 1\n",
            ))
            .unwrap();
        }

        #[test]
        fn type_slots_are_filled() {
            let prgm = check_src("print(1 + 2 < 4)\n").unwrap();
            let StmtKind::Prnt(expn) = &prgm.main.stmts[0].kind else {
                unreachable!();
            };
            assert_eq!(expn.ty, Some(Type::Bool));
            let ExpnKind::Less(l, _) = &expn.kind else {
                unreachable!();
            };
            assert_eq!(l.ty, Some(Type::Int));
        }

        #[test]
        fn input_types_as_int() {
            check_src("n : int = input(\"? \")\n").unwrap();
        }

        #[test]
        fn calls_check_against_signatures() {
            check_src(concat!(
                "def dbl(x : int) -> int:\n",
                "    return x + x\n",
                "def greet(s : str) -> None:\n",
                "    print(s)\n",
                "    return\n",
                "y : int = dbl(21)\n",
                "greet(\"hi\")\n",
            ))
            .unwrap();
        }

        rejects! {
            maybe_missing_return:
                "def g(x : int) -> int:\n    if x < 0:\n        return -1\n"
                => "might not return";
            body_never_returns:
                "def h() -> int:\n    pass\n"
                => "never returns";
            unreachable_after_return:
                "def h() -> int:\n    return 0\n    print(1)\n"
                => "not reachable";
            duplicate_introduction:
                "x : int = 1\nx : int = 2\n"
                => "already introduced";
            input_into_a_str_local:
                "n : str = input(\"? \")\n"
                => "Type mismatch";
            return_in_main:
                "return 3\n"
                => "Unexpected return";
            assign_before_introduction:
                "x = 1\n"
                => "never introduced";
            unknown_identifier:
                "print(y)\n"
                => "Unknown identifier";
            arith_needs_ints:
                "print(1 + \"two\")\n"
                => "Wrong operand types for plus";
            comparison_needs_same_type:
                "print(1 < \"two\")\n"
                => "same type";
            comparison_needs_ints:
                "print(\"a\" < \"b\")\n"
                => "only compares integers";
            logic_needs_bools:
                "print(1 and True)\n"
                => "non-boolean";
            condition_must_be_bool:
                "if 1:\n    pass\n"
                => "Condition is not a bool";
            value_return_from_procedure:
                "def p() -> None:\n    return 3\n"
                => "Return type mismatch";
            arity_mismatch:
                "def dbl(x : int) -> int:\n    return x + x\ny : int = dbl(1, 2)\n"
                => "Wrong number of arguments";
            argument_type_mismatch:
                "def dbl(x : int) -> int:\n    return x + x\ny : int = dbl(\"no\")\n"
                => "Argument 1";
            statement_call_of_a_function:
                "def dbl(x : int) -> int:\n    return x + x\ndbl(2)\n"
                => "does not name a procedure";
            unknown_callee:
                "frob(2)\n"
                => "Unknown function or procedure";
            none_to_int_conversion:
                "print(int(None))\n"
                => "Cannot convert";
        }
    }
}
