mod common;

use common::{assert_run, main_body, run_compiler, run_compiler_fail, run_compiler_fail_with, run_compiler_with, OPEN_INPUT};

const PRINT: &str = "invokevirtual java/io/PrintStream/print(Ljava/lang/String;)V";
const OUT: &str = "getstatic java/lang/System/out Ljava/io/PrintStream;";

#[test]
fn main_opens_input_then_defaults_globals() {
    let src = r#"
program p;
type
  pt = record x, y: integer end;
  row = array[1..3] of integer;
var
  n: integer;
  r: real;
  s: string;
  q: pt;
  a: row;
begin
end.
"#;
    let out = run_compiler(src);
    let body = main_body(&out);
    assert_eq!(&body[..5], &OPEN_INPUT);
    assert_run(
        &body,
        &[
            "iconst_0",
            "putstatic p/n I",
            "fconst_0",
            "putstatic p/r F",
            r#"ldc """#,
            "putstatic p/s Ljava/lang/String;",
            "new p$pt",
            "dup",
            "invokespecial p$pt/<init>()V",
            "putstatic p/q Lp$pt;",
            "iconst_3",
            "newarray int",
            "putstatic p/a [I",
            "return",
        ],
    );
    assert!(out.contains(".class public p$pt"));
    assert!(out.contains(".field public y I"));
    assert!(out.contains(".field private static a [I"));
}

#[test]
fn integer_assigned_to_real_is_widened() {
    let src = r#"
program p;
var r: real;
begin
  r := 2
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(&body, &["iconst_2", "i2f", "putstatic p/r F"]);
}

#[test]
fn element_and_field_targets_push_their_prefix_first() {
    let src = r#"
program p;
type
  pt = record x, y: integer end;
  row = array[1..3] of integer;
var
  q: pt;
  a: row;
begin
  a[2] := 7;
  q.y := a[2]
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "getstatic p/a [I",
            "iconst_2",
            "iconst_1",
            "isub",
            "bipush 7",
            "iastore",
            "getstatic p/q Lp$pt;",
            "getstatic p/a [I",
            "iconst_2",
            "iconst_1",
            "isub",
            "iaload",
            "putfield p$pt/y I",
        ],
    );
}

#[test]
fn if_else_places_else_branch_first() {
    let src = r#"
program p;
var x: integer;
begin
  if x > 0 then writeln('pos') else writeln('neg')
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "getstatic p/x I",
            "iconst_0",
            "if_icmpgt L000",
            "iconst_0",
            "goto L001",
            "L000:",
            "iconst_1",
            "L001:",
            "ifne L002",
            OUT,
            r#"ldc "neg\n""#,
            PRINT,
            "goto L003",
            "L002:",
            OUT,
            r#"ldc "pos\n""#,
            PRINT,
            "L003:",
            "return",
        ],
    );
}

#[test]
fn if_without_else_jumps_straight_to_end() {
    let src = r#"
program p;
var b: boolean;
begin
  if b then writeln
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "getstatic p/b Z",
            "ifne L000",
            "goto L001",
            "L000:",
            OUT,
            "invokevirtual java/io/PrintStream/println()V",
            "L001:",
        ],
    );
}

#[test]
fn while_tests_before_the_body() {
    let src = r#"
program p;
var x: integer;
begin
  while x < 10 do x := x + 1
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "L000:",
            "getstatic p/x I",
            "bipush 10",
            "if_icmplt L001",
            "iconst_0",
            "goto L002",
            "L001:",
            "iconst_1",
            "L002:",
            "ifeq L003",
            "getstatic p/x I",
            "iconst_1",
            "iadd",
            "putstatic p/x I",
            "goto L000",
            "L003:",
        ],
    );
}

#[test]
fn repeat_tests_after_the_body() {
    let src = r#"
program p;
var x: integer;
begin
  repeat
    x := x - 1;
    writeln
  until x = 0
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "L000:",
            "getstatic p/x I",
            "iconst_1",
            "isub",
            "putstatic p/x I",
            OUT,
            "invokevirtual java/io/PrintStream/println()V",
            "getstatic p/x I",
            "iconst_0",
            "if_icmpeq L001",
        ],
    );
    assert_run(
        &body,
        &["L002:", "ifne L003", "goto L000", "L003:", "return"],
    );
}

#[test]
fn for_to_counts_up_and_rechecks_the_bound() {
    let src = r#"
program p;
var i: integer;
begin
  for i := 1 to 5 do writeln(i)
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "iconst_1",
            "putstatic p/i I",
            "L000:",
            "iconst_5",
            "getstatic p/i I",
            "if_icmplt L001",
        ],
    );
    assert_run(
        &body,
        &[
            "getstatic p/i I",
            "iconst_1",
            "iadd",
            "putstatic p/i I",
            "goto L000",
            "L001:",
            "return",
        ],
    );
}

#[test]
fn for_downto_counts_down() {
    let src = r#"
program p;
var i: integer;
begin
  for i := 10 downto 1 do writeln
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "bipush 10",
            "putstatic p/i I",
            "L000:",
            "iconst_1",
            "getstatic p/i I",
            "if_icmpgt L001",
        ],
    );
    assert_run(&body, &["getstatic p/i I", "iconst_1", "isub", "putstatic p/i I", "goto L000", "L001:"]);
}

#[test]
fn case_builds_a_sorted_lookup_table() {
    let src = r#"
program p;
var x: integer;
begin
  case x of
    3, 2: writeln('few');
    1: writeln('one')
  else
    writeln('many')
  end
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "getstatic p/x I",
            "lookupswitch",
            "1 : L001",
            "2 : L000",
            "3 : L000",
            "default : L002",
            "L000:",
            OUT,
            r#"ldc "few\n""#,
            PRINT,
            "goto L003",
            "L001:",
            OUT,
            r#"ldc "one\n""#,
            PRINT,
            "goto L003",
            "L002:",
            OUT,
            r#"ldc "many\n""#,
            PRINT,
            "L003:",
        ],
    );
}

#[test]
fn case_without_default_falls_to_the_end() {
    let src = r#"
program p;
type color = (red, green, blue);
var c: color;
begin
  case c of
    red: writeln('r');
    blue: writeln('b')
  end
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "getstatic p/c I",
            "lookupswitch",
            "0 : L000",
            "2 : L001",
            "default : L002",
        ],
    );
    assert_run(&body, &["goto L002", "L002:", "return"]);
}

#[test]
fn duplicate_case_constant_is_rejected() {
    let src = r#"
program p;
var x: integer;
begin
  case x of
    1: writeln('a');
    1: writeln('b')
  end
end.
"#;
    let err = run_compiler_fail(src);
    assert!(err.contains("duplicate case constant 1"), "{err}");
}

#[test]
fn duplicate_case_constant_can_resolve_to_the_last_branch() {
    let src = r#"
program p;
var x: integer;
begin
  case x of
    1: writeln('a');
    1: writeln('b')
  end
end.
"#;
    let body = main_body(&run_compiler_with(src, &["--case-duplicates", "last-wins"]));
    assert_run(&body, &["lookupswitch", "1 : L001", "default : L002"]);
    let err = run_compiler_fail_with(src, &["--case-duplicates", "reject"]);
    assert!(err.starts_with("error:"), "{err}");
}

#[test]
fn real_comparison_goes_through_fcmpg() {
    let src = r#"
program p;
var r: real; b: boolean;
begin
  b := r >= 1
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &["getstatic p/r F", "iconst_1", "i2f", "fcmpg", "ifge L000"],
    );
    assert_run(&body, &["L001:", "putstatic p/b Z"]);
}

#[test]
fn string_comparison_uses_compare_to() {
    let src = r#"
program p;
var s: string; b: boolean;
begin
  b := s = 'abc'
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(
        &body,
        &[
            "getstatic p/s Ljava/lang/String;",
            r#"ldc "abc""#,
            "invokevirtual java/lang/String/compareTo(Ljava/lang/String;)I",
            "ifeq L000",
        ],
    );
}

#[test]
fn slash_always_divides_as_real() {
    let src = r#"
program p;
var r: real; i: integer;
begin
  r := i / 2;
  i := i div 2
end.
"#;
    let body = main_body(&run_compiler(src));
    assert_run(&body, &["getstatic p/i I", "i2f", "iconst_2", "i2f", "fdiv", "putstatic p/r F"]);
    assert_run(&body, &["getstatic p/i I", "iconst_2", "idiv", "putstatic p/i I"]);
}

#[test]
fn assigning_a_string_to_an_integer_is_a_type_error() {
    let src = r#"
program p;
var x: integer;
begin
  x := 'abc'
end.
"#;
    let err = run_compiler_fail(src);
    assert!(err.contains("error:"), "{err}");
    assert!(err.contains("type"), "{err}");
}

#[test]
fn unknown_variable_is_reported_with_position() {
    let src = "program p;\nbegin\n  zz := 1\nend.\n";
    let err = run_compiler_fail(src);
    assert!(err.contains("unknown var: zz at line 3, column 3"), "{err}");
}

#[test]
fn negating_the_smallest_integer_constant_is_an_error() {
    let src = r#"
program p;
const
  a = -2147483647 - 1;
  b = -a;
begin
end.
"#;
    let err = run_compiler_fail(src);
    assert!(err.starts_with("error:"), "{err}");
    assert!(err.contains("integer overflow"), "{err}");
}

#[test]
fn array_range_wider_than_an_integer_is_an_error() {
    let src = r#"
program p;
type t = array[-2..2147483647] of integer;
var v: t;
begin
end.
"#;
    let err = run_compiler_fail(src);
    assert!(err.contains("array length in program is too large"), "{err}");
}
