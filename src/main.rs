use std::fs;
use std::io::{self, Write};
use std::rc::Rc;

use anyhow::Context;

use dwislpyc::check;
use dwislpyc::err::CompileError;
use dwislpyc::exec;
use dwislpyc::lex::Lexer;
use dwislpyc::parser::Parser;
use dwislpyc::trans;

#[derive(clap::Parser, Debug)]
#[command(about, version, long_about = None)]
struct Args {
    /// Readable abstract syntax tree
    #[arg(short = 'A', long)]
    ast: bool,

    /// Stop after the type-and-return checker
    #[arg(long)]
    check: bool,

    /// Interpret the program instead of emitting IR
    #[arg(long)]
    run: bool,

    /// Compile a string passed via this flag instead of a file
    #[arg(short = 'r')]
    source: Option<String>,

    target: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    let (src, input): (Rc<str>, Vec<u8>) = match &args.source {
        Some(text) => ("<string>".into(), text.as_bytes().to_vec()),
        None => {
            let path = args
                .target
                .clone()
                .context("no input file or `-r` string given")?;
            let bytes =
                fs::read(&path).with_context(|| format!("failed to read {}", path))?;
            (path.into(), bytes)
        }
    };

    let mut lexer = Lexer::new(&input, Rc::clone(&src));
    let mut prgm = match Parser::new(&mut lexer).and_then(|p| p.parse()) {
        Ok(prgm) => prgm,
        Err(e) => bail(e, &input),
    };

    if args.ast {
        print!("{}", prgm);
    }

    if let Err(e) = check::check(&mut prgm) {
        bail(e, &input);
    }
    if args.check {
        return Ok(());
    }

    if args.run {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        if let Err(e) = exec::run(&prgm, &mut stdin.lock(), &mut stdout) {
            bail(e, &input);
        }
        return Ok(());
    }

    let ir = trans::translate(prgm);
    let mut stdout = io::stdout().lock();
    for unit in &ir.units {
        writeln!(stdout, "# {}", unit.name)?;
        for inst in &unit.code {
            writeln!(stdout, "{}", inst)?;
        }
    }
    writeln!(stdout, "# strings")?;
    for (labl, text) in ir.glbl.borrow().strg_pool() {
        writeln!(stdout, "{}: {:?}", labl, text)?;
    }
    Ok(())
}

fn bail(e: CompileError, input: &[u8]) -> ! {
    let text = String::from_utf8_lossy(input);
    let lines: Vec<&str> = text.lines().collect();
    e.render(&lines);
    std::process::exit(1);
}
