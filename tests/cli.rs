mod common;

use std::path::PathBuf;

use common::{assert_run, main_body, run_compiler, run_compiler_fail_with, run_compiler_with};

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn compiles_all_statements_fixture() {
    let src = include_str!("fixtures/all_statements.pas");
    let out = run_compiler(src);

    assert!(out.contains(".class public tour\n"));
    assert!(out.contains(".class public tour$point"));
    assert!(out.contains(".method private static swap([I[I)V"));
    assert!(out.contains(".method private static square(I)I"));
    assert!(out.contains(".method private static describe(Ltour$point;)V"));
    assert!(out.contains("lookupswitch"));
    assert!(out.contains("if_icmplt"));
    assert!(out.contains("if_icmpgt"));
    assert!(out.contains("fcmpg"));
    assert!(out.contains(r#"ldc "avg = %8.2f (%d%%)\n""#));
    assert!(out.contains(r#"ldc "%s at (%3d,%-3d)\n""#));
    assert!(out.contains("invokevirtual java/util/Scanner/nextLine()Ljava/lang/String;"));
    assert!(out.contains("invokevirtual java/lang/String/charAt(I)C"));
    assert_eq!(out.matches(".end method").count(), 6);
}

#[test]
fn class_name_overrides_program_name() {
    let src = include_str!("fixtures/all_statements.pas");
    let out = run_compiler_with(src, &["--class-name", "Tour"]);
    assert!(out.contains(".class public Tour\n"));
    assert!(out.contains(".class public Tour$point"));
    assert!(out.contains("getstatic Tour/_sysin Ljava/util/Scanner;"));
    assert!(!out.contains("tour/"));
}

#[test]
fn include_directive_is_resolved_next_to_the_source() {
    let out = run_compiler_with("", &[&fixture("with_include.pas")]);
    assert!(out.contains(".method private static greet(Ljava/lang/String;)V"));
    let body = main_body(&out);
    assert_run(&body, &[r#"ldc "world""#, "invokestatic greeter/greet(Ljava/lang/String;)V", "return"]);
}

#[test]
fn out_dir_receives_one_file_per_class() {
    let dir: PathBuf = std::env::temp_dir().join(format!("pascalc-out-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let src = include_str!("fixtures/all_statements.pas");
    let stdout = run_compiler_with(src, &["-o", dir.to_str().expect("utf-8 temp dir")]);
    assert!(stdout.is_empty());

    let main = std::fs::read_to_string(dir.join("tour.j")).expect("tour.j");
    assert!(main.starts_with(".class public tour\n"));
    let record = std::fs::read_to_string(dir.join("tour$point.j")).expect("tour$point.j");
    assert!(record.contains(".field public tag Ljava/lang/String;"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_input_file_is_reported() {
    let err = run_compiler_fail_with("", &[&fixture("no_such_file.pas")]);
    assert!(err.starts_with("error: cannot read"), "{err}");
}

#[test]
fn parse_errors_carry_a_position() {
    let err = run_compiler_fail_with("program p;\nbegin\n  x := \nend.\n", &[]);
    assert!(err.contains("parse error at line"), "{err}");
}
