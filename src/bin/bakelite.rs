//! Bakelite protocol compiler.
//!
//! Usage:
//!   bakelite gen -l {python|cpptiny|ctiny} -i <input>.bakelite -o <output>
//!   bakelite runtime -l {cpptiny|ctiny} -o <output>
//!
//! `gen` compiles a protocol definition into one generated source file.
//! `runtime` writes the target's runtime support header; its output depends
//! only on the chosen language. Both exit 1 with one diagnostic line per
//! error on stderr.

use anyhow::{anyhow, bail};
use bakelite::gen::backend_for;
use bakelite::{analyze, parse};
use std::path::PathBuf;

struct Args {
    language: Option<String>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn parse_flags(args: &[String]) -> anyhow::Result<Args> {
    let mut out = Args { language: None, input: None, output: None };
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let mut take = |what: &str| {
            it.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", what))
        };
        match arg.as_str() {
            "-l" | "--language" => out.language = Some(take("-l")?),
            "-i" | "--input" => out.input = Some(PathBuf::from(take("-i")?)),
            "-o" | "--output" => out.output = Some(PathBuf::from(take("-o")?)),
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(out)
}

fn usage() -> anyhow::Error {
    anyhow!(
        "usage:\n  bakelite gen -l {{python|cpptiny|ctiny}} -i <input>.bakelite -o <output>\n  \
         bakelite runtime -l {{cpptiny|ctiny}} -o <output>"
    )
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let (command, rest) = argv.split_first().ok_or_else(usage)?;

    match command.as_str() {
        "gen" => {
            let args = parse_flags(rest)?;
            let language = args.language.ok_or_else(usage)?;
            let input = args.input.ok_or_else(usage)?;
            let output = args.output.ok_or_else(usage)?;

            let backend = backend_for(&language)
                .ok_or_else(|| anyhow!("unknown language: {}", language))?;

            let source = std::fs::read_to_string(&input)
                .map_err(|e| anyhow!("{}: {}", input.display(), e))?;
            let defs = parse(&source).map_err(|e| anyhow!(e))?;
            let schema = analyze(defs)?;

            std::fs::write(&output, backend.generate(&schema))
                .map_err(|e| anyhow!("{}: {}", output.display(), e))?;
        }
        "runtime" => {
            let args = parse_flags(rest)?;
            let language = args.language.ok_or_else(usage)?;
            let output = args.output.ok_or_else(usage)?;

            let backend = backend_for(&language)
                .ok_or_else(|| anyhow!("unknown language: {}", language))?;
            let text = backend
                .runtime()
                .ok_or_else(|| anyhow!("{} has no runtime artifact", language))?;

            std::fs::write(&output, text)
                .map_err(|e| anyhow!("{}: {}", output.display(), e))?;
        }
        other => {
            bail!("unknown command: {}\n{}", other, usage());
        }
    }
    Ok(())
}
