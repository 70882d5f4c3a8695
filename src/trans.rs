use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Blck, Expn, ExpnKind, Name, Prgm, Stmt, StmtKind, Valu};
use crate::check::Type;
use crate::inst::{Cmpr, Cmpz, Inst};
use crate::symt::{Labl, SymT};

/// The instructions of one definition (or of the main script), together
/// with the symbol table that names their operands.
#[derive(Debug)]
pub struct IrUnit {
    pub name: Name,
    pub symt: SymT,
    pub code: Vec<Inst>,
}

/// The back end's input: every definition's unit, the main unit last, and
/// the global table holding the interned strings they all share.
#[derive(Debug)]
pub struct IrPrgm {
    pub units: Vec<IrUnit>,
    pub glbl: Rc<RefCell<SymT>>,
}

struct Trans {
    eoln_strg: Labl,
    true_strg: Labl,
    flse_strg: Labl,
    none_strg: Labl,
}

/// Lower a checked program to the three-address IR. Each unit's code is
/// bracketed as
///
/// ```text
/// <name>:         enter
///     ...body...
/// <name>_done:    leave
/// ```
///
/// and every return inside the body resolves to a jump to the one exit
/// label.
pub fn translate(prgm: Prgm) -> IrPrgm {
    let glbl = Rc::new(RefCell::new(SymT::new()));
    let trans = {
        let mut g = glbl.borrow_mut();
        let trans = Trans {
            eoln_strg: g.add_strg("\n"),
            true_strg: g.add_strg("True"),
            flse_strg: g.add_strg("False"),
            none_strg: g.add_strg("None"),
        };
        // the console input buffer the back end reads lines into
        g.add_strg(&"1234567890".repeat(8));
        trans
    };

    let mut units = vec![];
    for mut defn in prgm.defs.into_vec() {
        defn.symt.set_parent(Rc::clone(&glbl));
        let code = trans.unit(&defn.name, &defn.body, &mut defn.symt);
        units.push(IrUnit {
            name: defn.name,
            symt: defn.symt,
            code,
        });
    }

    let mut main_symt = prgm.main_symt;
    main_symt.set_parent(Rc::clone(&glbl));
    let code = trans.unit("main", &prgm.main, &mut main_symt);
    units.push(IrUnit {
        name: "main".to_string(),
        symt: main_symt,
        code,
    });

    IrPrgm { units, glbl }
}

impl Trans {
    fn unit(&self, name: &str, body: &Blck, symt: &mut SymT) -> Vec<Inst> {
        let mut code = vec![];
        let defn_labl = symt.add_labl(Some(name));
        let exit_labl = symt.add_labl(Some(&format!("{}_done", name)));
        code.push(Inst::Lbl(defn_labl));
        code.push(Inst::Enter);
        self.blck(body, &exit_labl, symt, &mut code);
        code.push(Inst::Lbl(exit_labl));
        code.push(Inst::Leave);
        code
    }

    fn blck(&self, blck: &Blck, exit: &str, symt: &mut SymT, code: &mut Vec<Inst>) {
        for stmt in &blck.stmts {
            self.stmt(stmt, exit, symt, code);
        }
    }

    fn stmt(&self, stmt: &Stmt, exit: &str, symt: &mut SymT, code: &mut Vec<Inst>) {
        match &stmt.kind {
            StmtKind::Pass => code.push(Inst::Nop),
            StmtKind::Ntro { name, expn, .. } | StmtKind::Asgn { name, expn } => {
                self.expn(expn, name, symt, code);
            }
            StmtKind::Prnt(expn) => self.prnt(expn, symt, code),
            StmtKind::FRtn(expn) => {
                let temp = symt.add_temp(ty_of(expn));
                self.expn(expn, &temp, symt, code);
                code.push(Inst::Rtn(temp));
                code.push(Inst::Jmp(exit.to_string()));
            }
            StmtKind::PRtn => {
                let temp = symt.add_temp(Type::None);
                code.push(Inst::Set {
                    dst: temp.clone(),
                    imm: 0,
                });
                code.push(Inst::Rtn(temp));
                code.push(Inst::Jmp(exit.to_string()));
            }
            StmtKind::IfEl { cndn, then, elze } => {
                let then_labl = symt.add_labl(None);
                let elze_labl = symt.add_labl(None);
                let done_labl = symt.add_labl(None);
                let flse_tgt = if elze.is_some() {
                    &elze_labl
                } else {
                    &done_labl
                };
                self.cndn(cndn, &then_labl, flse_tgt, symt, code);
                code.push(Inst::Lbl(then_labl));
                self.blck(then, exit, symt, code);
                code.push(Inst::Jmp(done_labl.clone()));
                if let Some(elze) = elze {
                    code.push(Inst::Lbl(elze_labl));
                    self.blck(elze, exit, symt, code);
                }
                code.push(Inst::Lbl(done_labl));
            }
            StmtKind::Whle { cndn, body } => {
                let head_labl = symt.add_labl(None);
                let body_labl = symt.add_labl(None);
                let done_labl = symt.add_labl(None);
                code.push(Inst::Lbl(head_labl.clone()));
                self.cndn(cndn, &body_labl, &done_labl, symt, code);
                code.push(Inst::Lbl(body_labl));
                self.blck(body, exit, symt, code);
                code.push(Inst::Jmp(head_labl));
                code.push(Inst::Lbl(done_labl));
            }
            StmtKind::PCll { name, args } => {
                let temps = self.args(args, symt, code);
                code.push(Inst::Cll {
                    name: name.clone(),
                    args: temps,
                    dst: None,
                });
            }
        }
    }

    /// A print is type-directed: integers go out through `Pti`, strings
    /// through `Pts`, booleans print their spelled-out names, `None` prints
    /// its name after evaluating the operand for effect. Every print ends
    /// with an end-of-line string.
    fn prnt(&self, expn: &Expn, symt: &mut SymT, code: &mut Vec<Inst>) {
        match ty_of(expn) {
            Type::Int => {
                let temp = symt.add_temp(Type::Int);
                self.expn(expn, &temp, symt, code);
                code.push(Inst::Pti(temp));
            }
            Type::Str => {
                let temp = symt.add_temp(Type::Str);
                self.expn(expn, &temp, symt, code);
                code.push(Inst::Pts(temp));
            }
            Type::Bool => {
                let true_labl = symt.add_labl(None);
                let flse_labl = symt.add_labl(None);
                let done_labl = symt.add_labl(None);
                let temp = symt.add_temp(Type::Bool);
                self.cndn(expn, &true_labl, &flse_labl, symt, code);
                code.push(Inst::Lbl(true_labl));
                code.push(Inst::Stl {
                    dst: temp.clone(),
                    strg: self.true_strg.clone(),
                });
                code.push(Inst::Jmp(done_labl.clone()));
                code.push(Inst::Lbl(flse_labl));
                code.push(Inst::Stl {
                    dst: temp.clone(),
                    strg: self.flse_strg.clone(),
                });
                code.push(Inst::Lbl(done_labl));
                code.push(Inst::Pts(temp));
            }
            Type::None => {
                let dumm = symt.add_temp(Type::None);
                let temp = symt.add_temp(Type::Str);
                self.expn(expn, &dumm, symt, code);
                code.push(Inst::Stl {
                    dst: temp.clone(),
                    strg: self.none_strg.clone(),
                });
                code.push(Inst::Pts(temp));
            }
        }
        let eoln = symt.add_temp(Type::Str);
        code.push(Inst::Stl {
            dst: eoln.clone(),
            strg: self.eoln_strg.clone(),
        });
        code.push(Inst::Pts(eoln));
    }

    /// Value-mode translation: leave the expression's value in `dst`.
    fn expn(&self, expn: &Expn, dst: &str, symt: &mut SymT, code: &mut Vec<Inst>) {
        match &expn.kind {
            ExpnKind::Ltrl(v) => {
                let inst = match v {
                    Valu::Int(i) => Inst::Set {
                        dst: dst.to_string(),
                        imm: *i,
                    },
                    Valu::Bool(b) => Inst::Set {
                        dst: dst.to_string(),
                        imm: *b as i64,
                    },
                    Valu::Strg(s) => Inst::Stl {
                        dst: dst.to_string(),
                        strg: symt.add_strg(s),
                    },
                    Valu::None => Inst::Set {
                        dst: dst.to_string(),
                        imm: 0,
                    },
                };
                code.push(inst);
            }
            ExpnKind::Lkup(name) => code.push(Inst::Mov {
                dst: dst.to_string(),
                src: name.clone(),
            }),
            ExpnKind::Plus(l, r)
            | ExpnKind::Mnus(l, r)
            | ExpnKind::Tmes(l, r)
            | ExpnKind::IDiv(l, r)
            | ExpnKind::IMod(l, r) => {
                let srce1 = symt.add_temp(ty_of(l));
                let srce2 = symt.add_temp(ty_of(r));
                self.expn(l, &srce1, symt, code);
                self.expn(r, &srce2, symt, code);
                let (dst, lft, rgt) = (dst.to_string(), srce1, srce2);
                code.push(match &expn.kind {
                    ExpnKind::Plus(..) => Inst::Add { dst, lft, rgt },
                    ExpnKind::Mnus(..) => Inst::Sub { dst, lft, rgt },
                    ExpnKind::Tmes(..) => Inst::Mul { dst, lft, rgt },
                    ExpnKind::IDiv(..) => Inst::Div { dst, lft, rgt },
                    ExpnKind::IMod(..) => Inst::Mod { dst, lft, rgt },
                    _ => unreachable!(),
                });
            }
            ExpnKind::Less(..)
            | ExpnKind::LsEq(..)
            | ExpnKind::Equl(..)
            | ExpnKind::And(..)
            | ExpnKind::Or(..)
            | ExpnKind::Not(..) => {
                let true_labl = symt.add_labl(None);
                let flse_labl = symt.add_labl(None);
                let done_labl = symt.add_labl(None);
                self.cndn(expn, &true_labl, &flse_labl, symt, code);
                code.push(Inst::Lbl(true_labl));
                code.push(Inst::Set {
                    dst: dst.to_string(),
                    imm: 1,
                });
                code.push(Inst::Jmp(done_labl.clone()));
                code.push(Inst::Lbl(flse_labl));
                code.push(Inst::Set {
                    dst: dst.to_string(),
                    imm: 0,
                });
                code.push(Inst::Lbl(done_labl));
            }
            ExpnKind::Inpt(prompt) => {
                let strg = symt.add_temp(Type::Str);
                self.expn(prompt, &strg, symt, code);
                code.push(Inst::Pts(strg));
                code.push(Inst::Gti(dst.to_string()));
            }
            ExpnKind::IntC(e) => match ty_of(e) {
                // ints and bools already carry the right encoding
                Type::Str => {
                    let temp = symt.add_temp(Type::Str);
                    self.expn(e, &temp, symt, code);
                    code.push(Inst::Cll {
                        name: "int".to_string(),
                        args: vec![temp],
                        dst: Some(dst.to_string()),
                    });
                }
                _ => self.expn(e, dst, symt, code),
            },
            ExpnKind::StrC(e) => match ty_of(e) {
                Type::Str => self.expn(e, dst, symt, code),
                _ => {
                    let temp = symt.add_temp(ty_of(e));
                    self.expn(e, &temp, symt, code);
                    code.push(Inst::Cll {
                        name: "str".to_string(),
                        args: vec![temp],
                        dst: Some(dst.to_string()),
                    });
                }
            },
            ExpnKind::FCll { name, args } => {
                let temps = self.args(args, symt, code);
                code.push(Inst::Cll {
                    name: name.clone(),
                    args: temps,
                    dst: Some(dst.to_string()),
                });
            }
        }
    }

    /// Condition-mode translation: jump to `thn` when the expression is
    /// true and to `els` when it is false, producing no value. `and` and
    /// `or` short-circuit by wiring their left operand straight to the
    /// far labels; `not` swaps the labels.
    fn cndn(&self, expn: &Expn, thn: &str, els: &str, symt: &mut SymT, code: &mut Vec<Inst>) {
        match &expn.kind {
            ExpnKind::Ltrl(Valu::Bool(true)) => code.push(Inst::Jmp(thn.to_string())),
            ExpnKind::Ltrl(Valu::Bool(false)) => code.push(Inst::Jmp(els.to_string())),
            ExpnKind::Lkup(name) => code.push(Inst::Bcz {
                cmp: Cmpz::Gtz,
                arg: name.clone(),
                thn: thn.to_string(),
                els: els.to_string(),
            }),
            ExpnKind::Less(l, r) | ExpnKind::LsEq(l, r) | ExpnKind::Equl(l, r) => {
                let srce1 = symt.add_temp(ty_of(l));
                let srce2 = symt.add_temp(ty_of(r));
                self.expn(l, &srce1, symt, code);
                self.expn(r, &srce2, symt, code);
                let cmp = match &expn.kind {
                    ExpnKind::Less(..) => Cmpr::Lt,
                    ExpnKind::LsEq(..) => Cmpr::Le,
                    ExpnKind::Equl(..) => Cmpr::Eq,
                    _ => unreachable!(),
                };
                code.push(Inst::Bcn {
                    cmp,
                    lft: srce1,
                    rgt: srce2,
                    thn: thn.to_string(),
                    els: els.to_string(),
                });
            }
            ExpnKind::And(l, r) => {
                let cont_labl = symt.add_labl(None);
                self.cndn(l, &cont_labl, els, symt, code);
                code.push(Inst::Lbl(cont_labl));
                self.cndn(r, thn, els, symt, code);
            }
            ExpnKind::Or(l, r) => {
                let cont_labl = symt.add_labl(None);
                self.cndn(l, thn, &cont_labl, symt, code);
                code.push(Inst::Lbl(cont_labl));
                self.cndn(r, thn, els, symt, code);
            }
            ExpnKind::Not(e) => self.cndn(e, els, thn, symt, code),
            ExpnKind::FCll { .. } => {
                let temp = symt.add_temp(Type::Bool);
                self.expn(expn, &temp, symt, code);
                code.push(Inst::Bcz {
                    cmp: Cmpz::Gtz,
                    arg: temp,
                    thn: thn.to_string(),
                    els: els.to_string(),
                });
            }
            _ => unreachable!("only boolean expressions reach condition position"),
        }
    }

    /// Evaluate call arguments left to right, each into a fresh temp.
    fn args(&self, args: &[Expn], symt: &mut SymT, code: &mut Vec<Inst>) -> Vec<Name> {
        args.iter()
            .map(|arg| {
                let temp = symt.add_temp(ty_of(arg));
                self.expn(arg, &temp, symt, code);
                temp
            })
            .collect()
    }
}

fn ty_of(expn: &Expn) -> Type {
    let Some(ty) = expn.ty else {
        unreachable!("the checker fills every type slot before translation");
    };
    ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check;
    use crate::lex::Lexer;
    use crate::parser::Parser;

    fn translate_src(src: &str) -> IrPrgm {
        let mut lexer = Lexer::new(src.as_bytes(), "<test>".into());
        let mut prgm = Parser::new(&mut lexer).unwrap().parse().unwrap();
        check::check(&mut prgm).unwrap();
        translate(prgm)
    }

    fn unit<'a>(ir: &'a IrPrgm, name: &str) -> &'a IrUnit {
        ir.units.iter().find(|u| u.name == name).unwrap()
    }

    macro_rules! set {
        ($dst:literal, $imm:literal) => {
            Inst::Set {
                dst: $dst.into(),
                imm: $imm,
            }
        };
    }

    macro_rules! stl {
        ($dst:literal, $strg:literal) => {
            Inst::Stl {
                dst: $dst.into(),
                strg: $strg.into(),
            }
        };
    }

    #[test]
    fn print_of_a_sum() {
        let ir = translate_src("print(1 + 2)\n");
        assert_eq!(
            unit(&ir, "main").code,
            vec![
                Inst::Lbl("main".into()),
                Inst::Enter,
                set!("$t1", 1),
                set!("$t2", 2),
                Inst::Add {
                    dst: "$t0".into(),
                    lft: "$t1".into(),
                    rgt: "$t2".into(),
                },
                Inst::Pti("$t0".into()),
                stl!("$t3", "$S0"),
                Inst::Pts("$t3".into()),
                Inst::Lbl("main_done".into()),
                Inst::Leave,
            ]
        );
    }

    #[test]
    fn short_circuit_and() {
        let ir = translate_src(concat!(
            "a : int = 1\n",
            "b : int = 2\n",
            "print(a < 10 and b < 20)\n",
        ));
        assert_eq!(
            unit(&ir, "main").code,
            vec![
                Inst::Lbl("main".into()),
                Inst::Enter,
                set!("a", 1),
                set!("b", 2),
                // left comparison falls to $L1 (false) without touching b
                Inst::Mov {
                    dst: "$t1".into(),
                    src: "a".into(),
                },
                set!("$t2", 10),
                Inst::Bcn {
                    cmp: Cmpr::Lt,
                    lft: "$t1".into(),
                    rgt: "$t2".into(),
                    thn: "$L3".into(),
                    els: "$L1".into(),
                },
                Inst::Lbl("$L3".into()),
                Inst::Mov {
                    dst: "$t3".into(),
                    src: "b".into(),
                },
                set!("$t4", 20),
                Inst::Bcn {
                    cmp: Cmpr::Lt,
                    lft: "$t3".into(),
                    rgt: "$t4".into(),
                    thn: "$L0".into(),
                    els: "$L1".into(),
                },
                Inst::Lbl("$L0".into()),
                stl!("$t0", "$S1"),
                Inst::Jmp("$L2".into()),
                Inst::Lbl("$L1".into()),
                stl!("$t0", "$S2"),
                Inst::Lbl("$L2".into()),
                Inst::Pts("$t0".into()),
                stl!("$t5", "$S0"),
                Inst::Pts("$t5".into()),
                Inst::Lbl("main_done".into()),
                Inst::Leave,
            ]
        );
    }

    #[test]
    fn every_return_reaches_the_one_exit_label() {
        let ir = translate_src(concat!(
            "def f(x : int) -> int:\n",
            "    if x < 0:\n",
            "        return -1\n",
            "    else:\n",
            "        return 1\n",
            "print(f(3))\n",
        ));
        let f = unit(&ir, "f");
        let exits = f
            .code
            .iter()
            .filter(|i| **i == Inst::Lbl("f_done".into()))
            .count();
        assert_eq!(exits, 1);
        let rtns: Vec<usize> = f
            .code
            .iter()
            .enumerate()
            .filter(|(_, i)| matches!(i, Inst::Rtn(_)))
            .map(|(n, _)| n)
            .collect();
        assert_eq!(rtns.len(), 2);
        for n in rtns {
            assert_eq!(f.code[n + 1], Inst::Jmp("f_done".into()));
        }
    }

    #[test]
    fn while_loops_back_to_the_head() {
        let ir = translate_src(concat!(
            "n : int = 3\n",
            "while 0 < n:\n",
            "    n = n - 1\n",
        ));
        assert_eq!(
            unit(&ir, "main").code,
            vec![
                Inst::Lbl("main".into()),
                Inst::Enter,
                set!("n", 3),
                Inst::Lbl("$L0".into()),
                set!("$t0", 0),
                Inst::Mov {
                    dst: "$t1".into(),
                    src: "n".into(),
                },
                Inst::Bcn {
                    cmp: Cmpr::Lt,
                    lft: "$t0".into(),
                    rgt: "$t1".into(),
                    thn: "$L1".into(),
                    els: "$L2".into(),
                },
                Inst::Lbl("$L1".into()),
                Inst::Mov {
                    dst: "$t2".into(),
                    src: "n".into(),
                },
                set!("$t3", 1),
                Inst::Sub {
                    dst: "n".into(),
                    lft: "$t2".into(),
                    rgt: "$t3".into(),
                },
                Inst::Jmp("$L0".into()),
                Inst::Lbl("$L2".into()),
                Inst::Lbl("main_done".into()),
                Inst::Leave,
            ]
        );
    }

    #[test]
    fn procedure_return_encodes_none_as_zero() {
        let ir = translate_src(concat!(
            "def p() -> None:\n",
            "    return\n",
            "p()\n",
        ));
        let p = unit(&ir, "p");
        assert_eq!(
            p.code,
            vec![
                Inst::Lbl("p".into()),
                Inst::Enter,
                set!("$t0", 0),
                Inst::Rtn("$t0".into()),
                Inst::Jmp("p_done".into()),
                Inst::Lbl("p_done".into()),
                Inst::Leave,
            ]
        );
        let main = unit(&ir, "main");
        assert!(main.code.contains(&Inst::Cll {
            name: "p".into(),
            args: vec![],
            dst: None,
        }));
    }

    #[test]
    fn string_literals_are_interned_across_units() {
        let ir = translate_src(concat!(
            "def shout() -> None:\n",
            "    print(\"hey\")\n",
            "    return\n",
            "print(\"hey\")\n",
        ));
        let pool = ir.glbl.borrow().strg_pool().to_vec();
        let heys: Vec<&(String, String)> =
            pool.iter().filter(|(_, s)| s.as_str() == "hey").collect();
        assert_eq!(heys.len(), 1);
    }

    #[test]
    fn minted_names_never_collide() {
        let ir = translate_src(concat!(
            "def f(x : int) -> int:\n",
            "    return x + 1\n",
            "def g(x : int) -> int:\n",
            "    return x * 2\n",
            "print(f(1) + g(2))\n",
        ));
        let mut seen = std::collections::HashSet::new();
        for u in &ir.units {
            for info in u.symt.infos() {
                if info.name.starts_with("$t") {
                    assert!(seen.insert(info.name.clone()), "duplicate {}", info.name);
                }
            }
            for i in &u.code {
                if let Inst::Lbl(l) = i {
                    assert!(seen.insert(l.clone()), "duplicate {}", l);
                }
            }
        }
    }

    #[test]
    fn translation_is_deterministic() {
        let src = concat!(
            "def f(x : int) -> int:\n",
            "    if x < 0:\n",
            "        return 0 - x\n",
            "    else:\n",
            "        return x\n",
            "print(f(0 - 7))\n",
        );
        let a = translate_src(src);
        let b = translate_src(src);
        assert_eq!(a.units.len(), b.units.len());
        for (ua, ub) in a.units.iter().zip(b.units.iter()) {
            assert_eq!(ua.code, ub.code);
        }
        assert_eq!(
            a.glbl.borrow().strg_pool(),
            b.glbl.borrow().strg_pool()
        );
    }

    #[test]
    fn boolean_print_spells_out_the_names() {
        let ir = translate_src("print(True)\n");
        let code = &unit(&ir, "main").code;
        // condition mode on a literal: jump straight to the true arm
        assert_eq!(code[2], Inst::Jmp("$L0".into()));
        assert!(code.contains(&stl!("$t0", "$S1")));
        assert!(code.contains(&stl!("$t0", "$S2")));
    }

    #[test]
    fn input_prints_the_prompt_then_reads() {
        let ir = translate_src("n : int = input(\"? \")\n");
        let code = &unit(&ir, "main").code;
        assert_eq!(
            &code[2..5],
            &[
                stl!("$t0", "$S5"),
                Inst::Pts("$t0".into()),
                Inst::Gti("n".into()),
            ]
        );
    }
}
