mod common;

use common::{assert_run, main_body, method_body, run_compiler, run_compiler_fail};

#[test]
fn scalar_var_parameter_is_a_cell() {
    let src = r#"
program p;
var x: integer;

procedure bump(var n: integer);
begin
  n := n + 1
end;

begin
  bump(x)
end.
"#;
    let out = run_compiler(src);
    let body = method_body(&out, "bump([I)V");
    assert_eq!(
        body,
        vec!["aload_0", "iconst_0", "aload_0", "iconst_0", "iaload", "iconst_1", "iadd", "iastore", "return"]
    );

    let main = main_body(&out);
    assert_run(
        &main,
        &[
            "iconst_1",
            "newarray int",
            "astore_1",
            "aload_1",
            "iconst_0",
            "getstatic p/x I",
            "iastore",
            "aload_1",
            "invokestatic p/bump([I)V",
            "aload_1",
            "iconst_0",
            "iaload",
            "putstatic p/x I",
        ],
    );
    assert!(out.contains(".limit locals 2"));
}

#[test]
fn cell_is_passed_through_unchanged() {
    let src = r#"
program p;
var x: integer;

procedure inner(var n: integer);
begin
  n := 0
end;

procedure outer(var m: integer);
begin
  inner(m)
end;

begin
  outer(x)
end.
"#;
    let out = run_compiler(src);
    let body = method_body(&out, "outer([I)V");
    assert_eq!(body, vec!["aload_0", "invokestatic p/inner([I)V", "return"]);
}

#[test]
fn function_result_lives_in_the_last_slot() {
    let src = r#"
program p;
var y: real;

function half(v: integer): real;
var t: integer;
begin
  t := v;
  half := t / 2
end;

begin
  y := half(7)
end.
"#;
    let out = run_compiler(src);
    let body = method_body(&out, "half(I)F");
    assert_run(&body, &["iconst_0", "istore_1", "fconst_0", "fstore_2"]);
    assert_run(&body, &["iload_0", "istore_1"]);
    assert_run(&body, &["iload_1", "i2f", "iconst_2", "i2f", "fdiv", "fstore_2", "fload_2", "freturn"]);

    let main = main_body(&out);
    assert_run(&main, &["bipush 7", "invokestatic p/half(I)F", "putstatic p/y F"]);
}

#[test]
fn integer_argument_is_widened_for_a_real_parameter() {
    let src = r#"
program p;
procedure show(r: real);
begin
  writeln(r)
end;
begin
  show(3)
end.
"#;
    let main = main_body(&run_compiler(src));
    assert_run(&main, &["iconst_3", "i2f", "invokestatic p/show(F)V"]);
}

#[test]
fn function_called_as_statement_discards_its_result() {
    let src = r#"
program p;
function one: integer;
begin
  one := 1
end;
begin
  one
end.
"#;
    let main = main_body(&run_compiler(src));
    assert_run(&main, &["invokestatic p/one()I", "pop", "return"]);
}

#[test]
fn aggregates_are_passed_by_reference() {
    let src = r#"
program p;
type
  pt = record x, y: integer end;
  row = array[1..4] of real;
var
  q: pt;
  a: row;

procedure clear(var v: pt; var w: row);
begin
  v.x := 0;
  w[4] := 1.5
end;

begin
  clear(q, a)
end.
"#;
    let out = run_compiler(src);
    let body = method_body(&out, "clear(Lp$pt;[F)V");
    assert_run(&body, &["aload_0", "iconst_0", "putfield p$pt/x I"]);
    assert_run(&body, &["aload_1", "iconst_4", "iconst_1", "isub", "ldc 1.5", "fastore"]);
    let main = main_body(&out);
    assert_run(&main, &["getstatic p/q Lp$pt;", "getstatic p/a [F", "invokestatic p/clear(Lp$pt;[F)V"]);
}

#[test]
fn nested_routine_name_includes_its_parent() {
    let src = r#"
program p;
procedure outer;
  procedure inner;
  begin
    writeln('in')
  end;
begin
  inner
end;
begin
  outer
end.
"#;
    let out = run_compiler(src);
    assert!(out.contains(".method private static outer$inner()V"));
    let body = method_body(&out, "outer()V");
    assert_run(&body, &["invokestatic p/outer$inner()V", "return"]);
}

#[test]
fn record_constructor_fills_reference_fields() {
    let src = r#"
program p;
type
  row = array[1..2] of integer;
  pt = record name: string; cells: row; n: integer end;
var q: pt;
begin
end.
"#;
    let out = run_compiler(src);
    let class_start = out.find(".class public p$pt").expect("record class");
    let body = method_body(&out[class_start..], "<init>()V");
    assert_eq!(
        body,
        vec![
            "aload_0",
            "invokespecial java/lang/Object/<init>()V",
            "aload_0",
            r#"ldc """#,
            "putfield p$pt/name Ljava/lang/String;",
            "aload_0",
            "iconst_2",
            "newarray int",
            "putfield p$pt/cells [I",
            "return",
        ]
    );
}

#[test]
fn procedure_in_an_expression_is_rejected() {
    let src = r#"
program p;
var x: integer;
procedure noop;
begin
end;
begin
  x := noop
end.
"#;
    let err = run_compiler_fail(src);
    assert!(err.contains("procedure used as expression: noop"), "{err}");
}

#[test]
fn var_argument_must_be_a_variable() {
    let src = r#"
program p;
procedure bump(var n: integer);
begin
  n := n + 1
end;
begin
  bump(3)
end.
"#;
    let err = run_compiler_fail(src);
    assert!(err.contains("must be lvalue for var parameter"), "{err}");
}
