#![allow(dead_code)]

use std::process::{Command, Output, Stdio};

fn spawn(src: &str, args: &[&str]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_pascalc"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn pascalc");

    {
        use std::io::Write;
        let stdin = child.stdin.as_mut().expect("stdin not available");
        stdin
            .write_all(src.as_bytes())
            .expect("failed to write source to stdin");
    }

    child.wait_with_output().expect("failed to wait on child")
}

pub fn run_compiler_with(src: &str, args: &[&str]) -> String {
    let out = spawn(src, args);
    assert!(
        out.status.success(),
        "compiler failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).expect("stdout is not valid utf-8")
}

pub fn run_compiler(src: &str) -> String {
    run_compiler_with(src, &[])
}

pub fn run_compiler_fail_with(src: &str, args: &[&str]) -> String {
    let out = spawn(src, args);
    assert_eq!(
        out.status.code(),
        Some(1),
        "compiler should report an error.\nstderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stderr).expect("stderr is not valid utf-8")
}

pub fn run_compiler_fail(src: &str) -> String {
    run_compiler_fail_with(src, &[])
}

/// Instruction and label lines of the method whose `.method` line contains
/// `header`, trimmed, without directives or blank lines.
pub fn method_body(listing: &str, header: &str) -> Vec<String> {
    let mut lines = listing.lines();
    lines
        .by_ref()
        .find(|l| l.starts_with(".method") && l.contains(header))
        .unwrap_or_else(|| panic!("no method matching {header:?} in:\n{listing}"));
    lines
        .take_while(|l| *l != ".end method")
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(".limit"))
        .map(str::to_string)
        .collect()
}

pub fn main_body(listing: &str) -> Vec<String> {
    method_body(listing, "main([Ljava/lang/String;)V")
}

/// Value of `.limit stack` for the method matching `header`.
pub fn stack_limit(listing: &str, header: &str) -> u32 {
    let mut lines = listing.lines();
    lines
        .by_ref()
        .find(|l| l.starts_with(".method") && l.contains(header))
        .unwrap_or_else(|| panic!("no method matching {header:?}"));
    lines
        .map(str::trim)
        .find_map(|l| l.strip_prefix(".limit stack "))
        .and_then(|n| n.parse().ok())
        .expect("missing .limit stack")
}

/// Asserts that `expected` occurs in `body` as consecutive lines.
pub fn assert_run(body: &[String], expected: &[&str]) {
    let found = body
        .windows(expected.len())
        .any(|w| w.iter().zip(expected).all(|(a, b)| a == b));
    assert!(
        found,
        "expected consecutive lines:\n{}\nin body:\n{}",
        expected.join("\n"),
        body.join("\n")
    );
}

/// Lines `main` always starts with: the shared scanner is opened first.
pub const OPEN_INPUT: [&str; 5] = [
    "new java/util/Scanner",
    "dup",
    "getstatic java/lang/System/in Ljava/io/InputStream;",
    "invokespecial java/util/Scanner/<init>(Ljava/io/InputStream;)V",
    "putstatic p/_sysin Ljava/util/Scanner;",
];
