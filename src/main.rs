use std::collections::HashSet;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::Parser as _;
use log::{debug, info};

mod ast;
mod code;
mod codegen;
mod config;
mod hir;
mod link;
mod parse;
mod sema;
mod sink;

use config::Cli;
use parse::parse_program;
use sema::{build_env, lower_program};

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();
    if let Err(e) = run(&cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let (src_in, base_dir) = read_source(cli)?;
    let src = preprocess_includes(&src_in, &base_dir)?;
    let hint = |e: String| anyhow!(with_source_hint(&src, &e));

    let p = parse_program(&src).map_err(hint)?;
    let env = build_env(&p).map_err(hint)?;
    let program = lower_program(&env, &p).map_err(hint)?;
    debug!(
        "program {}: {} globals, {} routines, {} records",
        program.name,
        program.globals.len(),
        program.routines.len(),
        program.records.len()
    );

    let units = codegen::generate(&program, &cli.codegen())?;
    let class = cli.class_name.clone().unwrap_or_else(|| p.name.clone());
    let listings = link::render(&units, &class);
    write_listings(cli, &listings)
}

/// Source text plus the directory include paths are resolved against.
fn read_source(cli: &Cli) -> anyhow::Result<(String, PathBuf)> {
    match &cli.input {
        Some(path) => {
            let src = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let base = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((src, base))
        }
        None => {
            let mut src = String::new();
            std::io::stdin()
                .read_to_string(&mut src)
                .context("cannot read standard input")?;
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            Ok((src, cwd))
        }
    }
}

fn write_listings(cli: &Cli, listings: &[(String, String)]) -> anyhow::Result<()> {
    let Some(dir) = &cli.out_dir else {
        for (_, text) in listings {
            print!("{text}");
        }
        return Ok(());
    };
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    for (class, text) in listings {
        let path = dir.join(format!("{class}.j"));
        std::fs::write(&path, text).with_context(|| format!("cannot write {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

fn with_source_hint(src: &str, err: &str) -> String {
    if err.contains("line ") && err.contains("column ") {
        return err.to_string();
    }
    if let Some(sym) = extract_symbol_from_error(err) {
        if let Some((line, col)) = find_symbol(src, &sym) {
            return format!("{err} at line {line}, column {col}");
        }
    }
    err.to_string()
}

fn extract_symbol_from_error(err: &str) -> Option<String> {
    let prefixes = [
        "unknown type: ",
        "unknown identifier: ",
        "unknown field: ",
        "unknown var: ",
        "unknown routine in scope: ",
        "unknown const: ",
        "procedure used as expression: ",
    ];
    for p in prefixes {
        if let Some(rest) = err.strip_prefix(p) {
            return Some(rest.trim().to_string());
        }
    }
    let pos = err.find("call to ")?;
    let tail = &err[pos + "call to ".len()..];
    let name = tail
        .split(|c: char| c == ':' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn find_symbol(src: &str, sym: &str) -> Option<(usize, usize)> {
    if sym.is_empty() {
        return None;
    }
    for (li, line) in src.lines().enumerate() {
        if let Some(ci) = line.find(sym) {
            return Some((li + 1, ci + 1));
        }
    }
    None
}

/// Comment forms that may carry a `$I file` directive.
const COMMENT_DELIMS: [(&str, &str); 2] = [("(*", "*)"), ("{", "}")];

fn preprocess_includes(src: &str, base_dir: &Path) -> anyhow::Result<String> {
    let mut stack = HashSet::new();
    expand_includes(src, base_dir, &mut stack)
}

fn next_comment(src: &str) -> Option<(usize, &'static str, &'static str)> {
    COMMENT_DELIMS
        .iter()
        .filter_map(|&(open, close)| src.find(open).map(|i| (i, open, close)))
        .min_by_key(|&(i, _, _)| i)
}

fn expand_includes(src: &str, base_dir: &Path, stack: &mut HashSet<PathBuf>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(src.len());
    let mut pos = 0usize;
    while let Some((rel, open, close)) = next_comment(&src[pos..]) {
        let start = pos + rel;
        out.push_str(&src[pos..start]);
        let after = start + open.len();
        let Some(end_rel) = src[after..].find(close) else {
            out.push_str(&src[start..]);
            return Ok(out);
        };
        let end = after + end_rel;
        if let Some(path) = parse_include_directive(&src[after..end]) {
            let full = base_dir.join(path);
            let canon = full.canonicalize().unwrap_or_else(|_| full.clone());
            if stack.contains(&canon) {
                bail!("include cycle detected: {}", canon.display());
            }
            let text = std::fs::read_to_string(&full)
                .with_context(|| format!("include read failed ({})", full.display()))?;
            debug!("including {}", full.display());
            stack.insert(canon.clone());
            let parent = full.parent().unwrap_or(base_dir);
            let expanded = expand_includes(&text, parent, stack)?;
            stack.remove(&canon);
            out.push_str(&expanded);
        } else {
            out.push_str(&src[start..end + close.len()]);
        }
        pos = end + close.len();
    }
    out.push_str(&src[pos..]);
    Ok(out)
}

fn parse_include_directive(body: &str) -> Option<String> {
    let t = body.trim();
    if !t.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("$I")) {
        return None;
    }
    let mut rest = t[2..].trim();
    // `{$IFDEF ...}` and friends are not includes.
    if t[2..].starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let quoted = (rest.starts_with('\'') && rest.ends_with('\''))
        || (rest.starts_with('"') && rest.ends_with('"'));
    if quoted && rest.len() >= 2 {
        rest = &rest[1..rest.len() - 1];
    }
    (!rest.is_empty()).then(|| rest.to_string())
}
