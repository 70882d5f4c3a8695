use std::collections::HashMap;
use std::io::{BufRead, Write};

use crate::ast::{Blck, Defs, Expn, ExpnKind, Name, Prgm, Stmt, StmtKind, Valu};
use crate::err::{CompileError, Locn};

type Ctxt = HashMap<Name, Valu>;

/// Run a checked program directly off its syntax tree. The reader and
/// writer stand in for the console.
pub fn run(
    prgm: &Prgm,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<(), CompileError> {
    let mut machine = Machine {
        defs: &prgm.defs,
        input,
        out,
    };
    let mut ctxt = Ctxt::new();
    machine.exec_blck(&prgm.main, &mut ctxt)?;
    Ok(())
}

struct Machine<'m> {
    defs: &'m Defs,
    input: &'m mut dyn BufRead,
    out: &'m mut dyn Write,
}

impl Machine<'_> {
    /// Execute the statements in order. `Some(valu)` signals that a return
    /// statement ran and unwinds the enclosing call.
    fn exec_blck(&mut self, blck: &Blck, ctxt: &mut Ctxt) -> Result<Option<Valu>, CompileError> {
        for stmt in &blck.stmts {
            if let Some(valu) = self.exec_stmt(stmt, ctxt)? {
                return Ok(Some(valu));
            }
        }
        Ok(None)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, ctxt: &mut Ctxt) -> Result<Option<Valu>, CompileError> {
        match &stmt.kind {
            StmtKind::Pass => Ok(None),
            StmtKind::Ntro { name, expn, .. } | StmtKind::Asgn { name, expn } => {
                let valu = self.eval(expn, ctxt)?;
                ctxt.insert(name.clone(), valu);
                Ok(None)
            }
            StmtKind::Prnt(expn) => {
                let valu = self.eval(expn, ctxt)?;
                self.write_out(&stmt.locn, format!("{}\n", valu))?;
                Ok(None)
            }
            StmtKind::PRtn => Ok(Some(Valu::None)),
            StmtKind::FRtn(expn) => Ok(Some(self.eval(expn, ctxt)?)),
            StmtKind::IfEl { cndn, then, elze } => {
                if truth(self.eval(cndn, ctxt)?) {
                    self.exec_blck(then, ctxt)
                } else if let Some(elze) = elze {
                    self.exec_blck(elze, ctxt)
                } else {
                    Ok(None)
                }
            }
            StmtKind::Whle { cndn, body } => {
                while truth(self.eval(cndn, ctxt)?) {
                    if let Some(valu) = self.exec_blck(body, ctxt)? {
                        return Ok(Some(valu));
                    }
                }
                Ok(None)
            }
            StmtKind::PCll { name, args } => {
                self.call(name, args, ctxt)?;
                Ok(None)
            }
        }
    }

    fn eval(&mut self, expn: &Expn, ctxt: &Ctxt) -> Result<Valu, CompileError> {
        match &expn.kind {
            ExpnKind::Ltrl(valu) => Ok(valu.clone()),
            ExpnKind::Lkup(name) => {
                let Some(valu) = ctxt.get(name) else {
                    unreachable!("the checker admits only introduced names");
                };
                Ok(valu.clone())
            }
            ExpnKind::Plus(l, r) => self.arith(l, r, &expn.locn, ctxt, i64::checked_add),
            ExpnKind::Mnus(l, r) => self.arith(l, r, &expn.locn, ctxt, i64::checked_sub),
            ExpnKind::Tmes(l, r) => self.arith(l, r, &expn.locn, ctxt, i64::checked_mul),
            ExpnKind::IDiv(l, r) => self.arith(l, r, &expn.locn, ctxt, floor_div),
            ExpnKind::IMod(l, r) => self.arith(l, r, &expn.locn, ctxt, floor_mod),
            ExpnKind::Less(l, r) => {
                let (a, b) = (self.eval_int(l, ctxt)?, self.eval_int(r, ctxt)?);
                Ok(Valu::Bool(a < b))
            }
            ExpnKind::LsEq(l, r) => {
                let (a, b) = (self.eval_int(l, ctxt)?, self.eval_int(r, ctxt)?);
                Ok(Valu::Bool(a <= b))
            }
            ExpnKind::Equl(l, r) => {
                let (a, b) = (self.eval(l, ctxt)?, self.eval(r, ctxt)?);
                Ok(Valu::Bool(a == b))
            }
            ExpnKind::And(l, r) => {
                if truth(self.eval(l, ctxt)?) {
                    self.eval(r, ctxt)
                } else {
                    Ok(Valu::Bool(false))
                }
            }
            ExpnKind::Or(l, r) => {
                if truth(self.eval(l, ctxt)?) {
                    Ok(Valu::Bool(true))
                } else {
                    self.eval(r, ctxt)
                }
            }
            ExpnKind::Not(e) => Ok(Valu::Bool(!truth(self.eval(e, ctxt)?))),
            ExpnKind::Inpt(prompt) => {
                let prompt = self.eval(prompt, ctxt)?;
                self.write_out(&expn.locn, prompt.to_string())?;
                self.out.flush().ok();
                let mut line = String::new();
                self.input.read_line(&mut line).map_err(|e| {
                    CompileError::new(expn.locn.clone(), format!("Input failed: {}.", e))
                })?;
                let line = line.trim_end_matches(['\n', '\r']);
                let valu: i64 = line.trim().parse().map_err(|_| {
                    CompileError::new(
                        expn.locn.clone(),
                        format!("Input '{}' is not an integer.", line),
                    )
                })?;
                Ok(Valu::Int(valu))
            }
            ExpnKind::IntC(e) => match self.eval(e, ctxt)? {
                Valu::Int(i) => Ok(Valu::Int(i)),
                Valu::Bool(b) => Ok(Valu::Int(b as i64)),
                Valu::Strg(s) => s.trim().parse().map(Valu::Int).map_err(|_| {
                    CompileError::new(
                        expn.locn.clone(),
                        format!("Cannot convert '{}' to an int.", s),
                    )
                }),
                Valu::None => unreachable!("the checker refuses int(None)"),
            },
            ExpnKind::StrC(e) => {
                let valu = self.eval(e, ctxt)?;
                Ok(Valu::Strg(valu.to_string()))
            }
            ExpnKind::FCll { name, args } => self.call(name, args, ctxt),
        }
    }

    fn call(&mut self, name: &str, args: &[Expn], ctxt: &Ctxt) -> Result<Valu, CompileError> {
        let Some(defn) = self.defs.get(name) else {
            unreachable!("the checker admits only defined callables");
        };
        let mut frame = Ctxt::new();
        for (i, arg) in args.iter().enumerate() {
            let valu = self.eval(arg, ctxt)?;
            frame.insert(defn.symt.get_frml(i).name.clone(), valu);
        }
        match self.exec_blck(&defn.body, &mut frame)? {
            Some(valu) => Ok(valu),
            None => unreachable!("checked definition bodies always return"),
        }
    }

    fn arith(
        &mut self,
        l: &Expn,
        r: &Expn,
        locn: &Locn,
        ctxt: &Ctxt,
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<Valu, CompileError> {
        let (a, b) = (self.eval_int(l, ctxt)?, self.eval_int(r, ctxt)?);
        match op(a, b) {
            Some(valu) => Ok(Valu::Int(valu)),
            None if b == 0 => Err(CompileError::new(locn.clone(), "Division by zero.")),
            None => Err(CompileError::new(locn.clone(), "Integer overflow.")),
        }
    }

    fn eval_int(&mut self, expn: &Expn, ctxt: &Ctxt) -> Result<i64, CompileError> {
        let Valu::Int(i) = self.eval(expn, ctxt)? else {
            unreachable!("the checker types arithmetic operands as int");
        };
        Ok(i)
    }

    fn write_out(&mut self, locn: &Locn, text: String) -> Result<(), CompileError> {
        write!(self.out, "{}", text)
            .map_err(|e| CompileError::new(locn.clone(), format!("Output failed: {}.", e)))
    }
}

fn truth(valu: Valu) -> bool {
    let Valu::Bool(b) = valu else {
        unreachable!("the checker types conditions as bool");
    };
    b
}

/// Division that rounds toward negative infinity, matching the surface
/// language's `//`.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    if b == 0 || (a == i64::MIN && b == -1) {
        return None;
    }
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Remainder whose sign follows the divisor, matching `%`.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    if b == 0 || (a == i64::MIN && b == -1) {
        return None;
    }
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        Some(r + b)
    } else {
        Some(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check;
    use crate::lex::Lexer;
    use crate::parser::Parser;

    fn run_src(src: &str, console_in: &str) -> Result<String, CompileError> {
        let mut lexer = Lexer::new(src.as_bytes(), "<test>".into());
        let mut prgm = Parser::new(&mut lexer)?.parse()?;
        check::check(&mut prgm)?;
        let mut input = console_in.as_bytes();
        let mut out = Vec::new();
        run(&prgm, &mut input, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    macro_rules! table {
        ($group:ident,$(($name:ident,$src:expr,$stdin:literal,$expected:literal))*) => {
            mod $group {
                use super::*;

                $(
                    #[test]
                    fn $name() {
                        assert_eq!(run_src($src, $stdin).unwrap(), $expected);
                    }
                )*
            }
        };
    }

    table! {
        printing,
        (sum, "print(1 + 2)\n", "", "3\n")
        (string, "print(\"hi there\")\n", "", "hi there\n")
        (comparison, "print(1 < 2)\n", "", "True\n")
        (negation, "print(not 1 < 2)\n", "", "False\n")
        (none_value, "print(None)\n", "", "None\n")
        (conversions, "print(str(42))\nprint(int(\"17\") + 1)\nprint(int(True))\n", "", "42\n18\n1\n")
        (floor_division, "print(0 - 7 // 2)\nprint((0 - 7) // 2)\nprint((0 - 7) % 2)\n", "", "-3\n-4\n1\n")
    }

    table! {
        control,
        (
            countdown,
            "n : int = 3\nwhile 0 < n:\n    print(n)\n    n = n - 1\n",
            "",
            "3\n2\n1\n"
        )
        (
            branch_both_ways,
            "x : int = 4\nif x % 2 == 0:\n    print(\"even\")\nelse:\n    print(\"odd\")\n",
            "",
            "even\n"
        )
        (
            factorial,
            concat!(
                "def fact(n : int) -> int:\n",
                "    if n <= 1:\n",
                "        return 1\n",
                "    else:\n",
                "        return n * fact(n - 1)\n",
                "print(fact(5))\n",
            ),
            "",
            "120\n"
        )
        (
            procedure_call,
            concat!(
                "def greet(who : str) -> None:\n",
                "    print(who)\n",
                "    return\n",
                "greet(\"hello\")\n",
            ),
            "",
            "hello\n"
        )
    }

    #[test]
    fn input_prompts_then_parses_an_int() {
        let out = run_src("n : int = input(\"? \")\nprint(n + 1)\n", "7\n").unwrap();
        assert_eq!(out, "? 8\n");
    }

    #[test]
    fn and_short_circuits() {
        let out = run_src(
            concat!(
                "def noisy() -> bool:\n",
                "    print(\"called\")\n",
                "    return True\n",
                "x : bool = False and noisy()\n",
                "print(x)\n",
            ),
            "",
        )
        .unwrap();
        assert_eq!(out, "False\n");
    }

    #[test]
    fn or_short_circuits() {
        let out = run_src(
            concat!(
                "def noisy() -> bool:\n",
                "    print(\"called\")\n",
                "    return False\n",
                "x : bool = True or noisy()\n",
                "print(x)\n",
            ),
            "",
        )
        .unwrap();
        assert_eq!(out, "True\n");
    }

    #[test]
    fn division_by_zero_is_reported() {
        let err = run_src("print(1 // 0)\n", "").unwrap_err();
        assert!(err.msg.contains("Division by zero"));
    }

    #[test]
    fn bad_console_input_is_reported() {
        let err = run_src("n : int = input(\"? \")\nprint(n)\n", "seven\n").unwrap_err();
        assert!(err.msg.contains("not an integer"));
    }

    #[test]
    fn string_equality_is_by_content() {
        let out = run_src("print(\"ab\" == str(\"ab\"))\n", "").unwrap();
        assert_eq!(out, "True\n");
    }
}
