//! End-to-end compile suite: source text through lex → parse → resolve →
//! lower → emit. Success cases assert a non-empty native object; failure
//! cases assert the specific diagnostic.

use std::path::Path;

use slate_codegen::{emit_object, lower_program, CodegenContext};
use slate_compiler::compiler::types::TypeRegistry;

fn compile(source: &str) -> Result<Vec<u8>, String> {
    compile_in(source, Path::new("."))
}

fn compile_in(source: &str, base_dir: &Path) -> Result<Vec<u8>, String> {
    let mut registry = TypeRegistry::new();
    let program =
        slate_compiler::compile_source(source, &mut registry).map_err(|e| e.to_string())?;
    let context = CodegenContext::new().expect("host codegen context");
    let lowered = lower_program(context, &program, &mut registry, base_dir, false)
        .map_err(|e| e.to_string())?;
    emit_object(lowered.module).map_err(|e| e.to_string())
}

fn assert_compiles(source: &str) {
    let bytes = compile(source).expect("program should compile");
    assert!(bytes.len() > 16, "object file should have reasonable size");
}

fn assert_fails_with(source: &str, needle: &str) {
    match compile(source) {
        Ok(_) => panic!("program should have been rejected"),
        Err(message) => assert!(
            message.contains(needle),
            "expected error containing {needle:?}, got {message:?}"
        ),
    }
}

#[test]
fn hello_world() {
    assert_compiles(r#"def main() -> i32 { std.println("hi"); return 0; }"#);
}

#[test]
fn recursive_factorial() {
    assert_compiles(
        r#"
def fact(n: i32) -> i32 {
    if n <= 1 {
        return 1;
    }
    return n * fact(n - 1);
}

def main() -> i32 {
    return fact(5);
}
"#,
    );
}

#[test]
fn for_loop_with_empty_init() {
    assert_compiles(
        r#"
def main() -> i32 {
    def mut i: i32 = 0;
    for ; i < 3; i = i + 1 {}
    return i;
}
"#,
    );
}

#[test]
fn assignment_to_const_is_rejected() {
    assert_fails_with(
        r#"
def main() -> i32 {
    def const PI: i32 = 3;
    PI = 4;
    return PI;
}
"#,
        "cannot assign to immutable variable 'PI'",
    );
}

#[test]
fn assignment_to_plain_def_is_rejected() {
    assert_fails_with(
        r#"
def main() -> i32 {
    def x: i32 = 1;
    x = 2;
    return x;
}
"#,
        "cannot assign to immutable variable 'x'",
    );
}

#[test]
fn assignment_to_mut_is_accepted() {
    assert_compiles(
        r#"
def main() -> i32 {
    def mut x: i32 = 1;
    x = 2;
    return x;
}
"#,
    );
}

#[test]
fn record_literal_and_field_sum() {
    assert_compiles(
        r#"
def struct P {
    x: i32;
    y: i32;
}

def main() -> i32 {
    def mut p: P = P { x: 1, y: 2 };
    return p.x + p.y;
}
"#,
    );
}

#[test]
fn pointer_write_through() {
    assert_compiles(
        r#"
def main() -> i32 {
    def mut v: i32 = 7;
    def p: *i32 = &v;
    *p = 42;
    return v;
}
"#,
    );
}

#[test]
fn while_loop_with_break_and_continue() {
    assert_compiles(
        r#"
def main() -> i32 {
    def mut i: i32 = 0;
    while i < 10 {
        i = i + 1;
        if i == 3 {
            continue;
        }
        if i == 7 {
            break;
        }
    }
    return i;
}
"#,
    );
}

#[test]
fn switch_with_cases_and_default() {
    assert_compiles(
        r#"
def main() -> i32 {
    def x: i32 = 2;
    switch x {
        case 1:
            return 10;
        case 2:
            return 20;
        default:
            return 0;
    }
    return 1;
}
"#,
    );
}

#[test]
fn switch_without_default_falls_to_exit() {
    assert_compiles(
        r#"
def main() -> i32 {
    def mut out: i32 = 0;
    switch 1 {
        case 1:
            out = 10;
    }
    return out;
}
"#,
    );
}

#[test]
fn match_with_wildcard_pattern() {
    assert_compiles(
        r#"
def main() -> i32 {
    def x: i32 = 5;
    match x {
        1 => { return 1; }
        _ => { return 99; }
    }
    return 0;
}
"#,
    );
}

#[test]
fn unless_inverts_the_branch() {
    assert_compiles(
        r#"
def main() -> i32 {
    def ok: bool = true;
    unless ok {
        return 1;
    } else {
        return 2;
    }
    return 0;
}
"#,
    );
}

#[test]
fn record_methods_are_mangled_and_callable() {
    assert_compiles(
        r#"
def struct Counter {
    value: i32;
    pub bump(amount: i32) -> i32 {
        value = value + amount;
        return value;
    }
    priv reset() {
        value = 0;
    }
}

def main() -> i32 {
    def mut c: Counter = Counter { value: 3 };
    return c.bump(4);
}
"#,
    );
}

#[test]
fn builtins_compile() {
    assert_compiles(
        r#"
def main() -> i32 {
    def line: string = std.input();
    def longer: string = std.readln();
    def n: i32 = std.to_int(line);
    def big: i64 = std.to_i64(longer);
    def s: string = std.to_string(n);
    std.print(s);
    std.println(big);
    std.println(true);
    def buf: *void = std.malloc(64);
    std.free(buf);
    return n;
}
"#,
    );
}

#[test]
fn cast_between_integer_widths() {
    assert_compiles(
        r#"
def main() -> i32 {
    def small: i32 = 40;
    def wide: i64 = cast(small, "i64");
    def back: i32 = cast(wide, "i32");
    def unsigned: u32 = cast(back, "u32");
    return cast(unsigned, "i32");
}
"#,
    );
}

#[test]
fn unsupported_cast_is_rejected() {
    assert_fails_with(
        r#"
def main() -> i32 {
    def b: bool = true;
    def n: i32 = cast(b, "i32");
    return n;
}
"#,
        "cast(): conversion from 'bool' to 'i32' is not supported",
    );
}

#[test]
fn global_const_is_readable_and_immutable() {
    assert_compiles(
        r#"
def const LIMIT: i32 = 10;

def main() -> i32 {
    return LIMIT;
}
"#,
    );
    assert_fails_with(
        r#"
def const LIMIT: i32 = 10;

def main() -> i32 {
    LIMIT = 11;
    return LIMIT;
}
"#,
        "cannot assign to immutable variable 'LIMIT'",
    );
}

#[test]
fn global_mut_accepts_assignment() {
    assert_compiles(
        r#"
def mut COUNTER: i32 = 0;

def main() -> i32 {
    COUNTER = COUNTER + 1;
    return COUNTER;
}
"#,
    );
}

#[test]
fn break_outside_a_loop_is_rejected() {
    assert_fails_with(
        "def main() -> i32 { break; return 0; }",
        "'break' used outside of a loop",
    );
}

#[test]
fn continue_outside_a_loop_is_rejected() {
    assert_fails_with(
        "def main() -> i32 { continue; return 0; }",
        "'continue' used outside of a loop",
    );
}

#[test]
fn dereferencing_a_non_pointer_is_rejected() {
    assert_fails_with(
        "def main() -> i32 { def x: i32 = 1; return *x; }",
        "cannot dereference non-pointer type 'i32'",
    );
}

#[test]
fn arithmetic_on_mixed_widths_is_rejected() {
    assert_fails_with(
        r#"
def main() -> i32 {
    def a: i32 = 1;
    def b: i64 = 2;
    def c: i32 = a + b;
    return c;
}
"#,
        "cannot perform arithmetic on incompatible types 'i32' and 'i64'",
    );
}

#[test]
fn unknown_function_is_rejected() {
    assert_fails_with(
        "def main() -> i32 { return mystery(); }",
        "unknown function 'mystery'",
    );
}

#[test]
fn unknown_variable_is_rejected() {
    assert_fails_with("def main() -> i32 { return ghost; }", "unknown variable 'ghost'");
}

#[test]
fn printing_128_bit_integers_is_rejected() {
    assert_fails_with(
        r#"
def main() -> i32 {
    def huge: i128 = 1;
    std.println(huge);
    return 0;
}
"#,
        "128-bit integers cannot be printed",
    );
}

#[test]
fn address_of_non_identifier_is_rejected() {
    assert_fails_with(
        "def main() -> i32 { def p: *i32 = &(1 + 2); return 0; }",
        "address-of operator can only be applied to variables",
    );
}

#[test]
fn local_import_contributes_functions() {
    let dir = std::env::temp_dir().join(format!("slate-import-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp project dir");
    std::fs::write(
        dir.join("util.src"),
        "def triple(n: i32) -> i32 { return n * 3; }\n",
    )
    .expect("write util.src");

    let source = r#"
import "./util"

def main() -> i32 {
    return triple(14);
}
"#;
    let bytes = compile_in(source, &dir).expect("import should compile");
    assert!(bytes.len() > 16);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_import_file_is_an_error() {
    let err = compile_in(
        "import \"./nonexistent\"\ndef main() -> i32 { return 0; }",
        Path::new("."),
    )
    .unwrap_err();
    assert!(err.contains("cannot open import file"), "got: {err}");
}

#[test]
fn automatic_numeric_widening_on_declaration() {
    assert_compiles(
        r#"
def main() -> i32 {
    def wide: i64 = 1;
    def narrow: i8 = 2;
    def f: f64 = 1.5;
    return 0;
}
"#,
    );
}

#[test]
fn functions_can_be_called_before_their_definition() {
    assert_compiles(
        r#"
def main() -> i32 {
    return later(2);
}

def later(n: i32) -> i32 {
    return n + 1;
}
"#,
    );
}

#[test]
fn void_functions_get_a_default_return() {
    assert_compiles(
        r#"
def log_twice(msg: string) -> void {
    std.println(msg);
    std.println(msg);
}

def main() -> i32 {
    log_twice("hey");
    return 0;
}
"#,
    );
}

#[test]
fn every_arm_returning_removes_the_merge_block() {
    // Both arms terminate; statements after the if are unreachable and the
    // lowering must still produce a well-formed function.
    assert_compiles(
        r#"
def pick(flag: bool) -> i32 {
    if flag {
        return 1;
    } else {
        return 2;
    }
    return 3;
}

def main() -> i32 {
    return pick(true);
}
"#,
    );
}

#[test]
fn ir_dump_is_produced_on_request() {
    let mut registry = TypeRegistry::new();
    let program = slate_compiler::compile_source(
        "def main() -> i32 { return 0; }",
        &mut registry,
    )
    .expect("front end");
    let context = CodegenContext::new().expect("host codegen context");
    let lowered =
        lower_program(context, &program, &mut registry, Path::new("."), true).expect("lower");
    assert_eq!(lowered.ir.len(), 1);
    assert!(lowered.ir[0].contains("function"), "got: {}", lowered.ir[0]);
}
