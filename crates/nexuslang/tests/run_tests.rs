//! End-to-end execution semantics: arithmetic, scoping, closures, control
//! flow, and the documented diagnostic shapes.

use nexuslang::{CollectStringPrint, DefaultHost, ErrorKind, Exception, NoLimitTracker, Runner, Value};
use pretty_assertions::assert_eq;

/// Runs a program against the default host and returns the printed output.
fn run_code(code: &str) -> String {
    let runner = Runner::new(code.to_owned(), "test.nx").unwrap();
    let mut print = CollectStringPrint::new();
    runner
        .run(&mut DefaultHost, &mut NoLimitTracker, &mut print)
        .expect("should succeed");
    print.into_output()
}

/// Runs a program expecting a failure, returning the exception.
fn run_err(code: &str) -> Exception {
    let runner = Runner::new(code.to_owned(), "test.nx").unwrap();
    let mut print = CollectStringPrint::new();
    runner
        .run(&mut DefaultHost, &mut NoLimitTracker, &mut print)
        .expect_err("should fail")
}

// === Documented scenarios ===

#[test]
fn function_call_with_precedence() {
    assert_eq!(run_code("fn main() { print(2 + 3 * 4) } main()"), "14\n");
}

#[test]
fn for_loop_over_array() {
    assert_eq!(run_code("let xs = [1,2,3]; for x in xs { print(x*x) }"), "1\n4\n9\n");
}

#[test]
fn personality_trait_readback() {
    assert_eq!(
        run_code("personality { curiosity: 0.9 } print(get_trait(\"curiosity\"))"),
        "0.9\n"
    );
}

#[test]
fn divide_by_zero_diagnostic() {
    let runner = Runner::new("let x = 1 / 0".to_owned(), "main.nx").unwrap();
    let mut print = CollectStringPrint::new();
    let err = runner
        .run(&mut DefaultHost, &mut NoLimitTracker, &mut print)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArithError);
    assert_eq!(err.diagnostic_line(), "ArithError at main.nx:1:13: divide-by-zero");
}

// === Arithmetic ===

#[test]
fn integer_division_truncates_toward_zero() {
    assert_eq!(run_code("print(7 / 2) print(-7 / 2)"), "3\n-3\n");
}

#[test]
fn modulo_follows_dividend_sign() {
    assert_eq!(run_code("print(7 % -2) print(-7 % 2)"), "1\n-1\n");
}

#[test]
fn mixed_arithmetic_widens_to_float() {
    assert_eq!(run_code("print(1 + 0.5) print(2 * 2.0)"), "1.5\n4.0\n");
}

#[test]
fn string_concatenation() {
    assert_eq!(run_code("print(\"foo\" + \"bar\")"), "foobar\n");
}

#[test]
fn string_minus_int_is_a_type_error() {
    let err = run_err("let y = \"x\" - 1");
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn arrays_do_not_participate_in_arithmetic() {
    let err = run_err("let y = [1] + [2]");
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn integer_overflow_is_rejected_not_wrapped() {
    let err = run_err("print(9223372036854775807 + 1)");
    assert_eq!(err.kind(), ErrorKind::ArithError);
    assert!(err.message().contains("overflow"));
}

#[test]
fn extreme_integer_literals_round_trip() {
    assert_eq!(
        run_code("print(9223372036854775807) print(-9223372036854775808)"),
        "9223372036854775807\n-9223372036854775808\n"
    );
}

#[test]
fn float_literal_with_exponent() {
    assert_eq!(run_code("print(2.5e-3)"), "0.0025\n");
}

// === Comparison and truthiness ===

#[test]
fn numeric_comparison_widens() {
    assert_eq!(run_code("print(1 < 1.5) print(2 >= 2.0)"), "true\ntrue\n");
}

#[test]
fn strings_compare_by_code_point() {
    assert_eq!(run_code("print(\"abc\" < \"abd\")"), "true\n");
}

#[test]
fn mixed_type_ordering_is_incomparable() {
    let err = run_err("let y = 1 < \"a\"");
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert!(err.message().contains("incomparable"));
}

#[test]
fn structural_equality_for_arrays() {
    assert_eq!(run_code("print([1, [2]] == [1, [2]]) print([1] == [2])"), "true\nfalse\n");
}

#[test]
fn falsy_values_in_conditions() {
    let code = r#"
if "" { print("yes") } else { print("no") }
if 0 { print("yes") } else { print("no") }
if [] { print("yes") } else { print("no") }
if null { print("yes") } else { print("no") }
if 0.5 { print("yes") } else { print("no") }
"#;
    assert_eq!(run_code(code), "no\nno\nno\nno\nyes\n");
}

#[test]
fn short_circuit_returns_the_determining_operand() {
    assert_eq!(
        run_code("print(0 || \"x\") print(null && 1) print(1 && 2) print(\"a\" || \"b\")"),
        "x\nnull\n2\na\n"
    );
}

#[test]
fn short_circuit_skips_the_right_operand() {
    // The divide-by-zero on the right must never evaluate.
    assert_eq!(run_code("print(false && 1 / 0) print(true || 1 / 0)"), "false\ntrue\n");
}

// === Scoping and closures ===

#[test]
fn let_shadows_for_the_rest_of_the_block_and_never_leaks() {
    let code = r"
let x = 1
{
    let x = 2
    print(x)
}
print(x)
";
    assert_eq!(run_code(code), "2\n1\n");
}

#[test]
fn redeclaration_in_the_same_scope_fails() {
    let err = run_err("let x = 1 let x = 2");
    assert_eq!(err.kind(), ErrorKind::NameError);
}

#[test]
fn assignment_to_constant_fails() {
    let err = run_err("const k = 1 k = 2");
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert!(err.message().contains("constant"));
}

#[test]
fn unbound_name_read_fails() {
    let err = run_err("print(missing)");
    assert_eq!(err.kind(), ErrorKind::NameError);
}

#[test]
fn closures_capture_their_declaration_environment() {
    let code = r"
fn counter() {
    let n = 5
    fn get() { return n }
    return get
}
let g = counter()
print(g())
";
    assert_eq!(run_code(code), "5\n");
}

#[test]
fn closure_sees_bindings_after_block_exits() {
    let code = r"
let f = null
{
    let x = 42
    fn inner() { return x }
    f = inner
}
print(f())
";
    assert_eq!(run_code(code), "42\n");
}

#[test]
fn loop_binding_is_fresh_per_iteration() {
    let code = r"
let fs = [null, null]
for i in 0..2 {
    fn capture() { return i }
    fs[i] = capture
}
print(fs[0]())
print(fs[1]())
";
    assert_eq!(run_code(code), "0\n1\n");
}

// === Control flow ===

#[test]
fn break_leaves_the_loop() {
    let code = r"
let i = 0
while true {
    i = i + 1
    if i == 3 { break }
}
print(i)
";
    assert_eq!(run_code(code), "3\n");
}

#[test]
fn continue_skips_to_the_next_iteration() {
    assert_eq!(
        run_code("for x in 0..5 { if x % 2 == 0 { continue } print(x) }"),
        "1\n3\n"
    );
}

#[test]
fn else_if_chains() {
    let code = r#"
fn describe(n) {
    if n < 0 { return "neg" } else if n == 0 { return "zero" } else { return "pos" }
}
print(describe(-1))
print(describe(0))
print(describe(9))
"#;
    assert_eq!(run_code(code), "neg\nzero\npos\n");
}

#[test]
fn while_loop_runs_to_condition_failure() {
    let code = r"
let n = 1
while n < 100 { n = n * 2 }
print(n)
";
    assert_eq!(run_code(code), "128\n");
}

// === Iteration ===

#[test]
fn range_is_half_open() {
    assert_eq!(run_code("for i in 1..4 { print(i) }"), "1\n2\n3\n");
}

#[test]
fn empty_range_never_iterates() {
    assert_eq!(run_code("for i in 3..3 { print(i) } print(\"done\")"), "done\n");
}

#[test]
fn range_over_non_integers_fails() {
    let err = run_err("let r = 1.5..3");
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn string_iteration_yields_code_points() {
    assert_eq!(run_code("for ch in \"héy\" { print(ch) }"), "h\né\ny\n");
}

#[test]
fn iteration_sees_a_snapshot_of_the_source() {
    // Mutation during iteration only becomes visible after the loop.
    let code = r"
let xs = [1, 2, 3]
for x in xs {
    xs[0] = 99
    print(x)
}
print(xs[0])
";
    assert_eq!(run_code(code), "1\n2\n3\n99\n");
}

// === Indexing ===

#[test]
fn array_index_out_of_bounds() {
    let err = run_err("let xs = [1] print(xs[1])");
    assert_eq!(err.kind(), ErrorKind::IndexError);
}

#[test]
fn negative_array_index_is_rejected() {
    let err = run_err("let xs = [1] print(xs[-1])");
    assert_eq!(err.kind(), ErrorKind::IndexError);
}

#[test]
fn string_index_into_array_is_a_type_error() {
    let err = run_err("let xs = [1] print(xs[\"0\"])");
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn index_assignment_mutates_in_place() {
    assert_eq!(run_code("let xs = [1, 2] xs[1] = 9 print(xs)"), "[1, 9]\n");
}

// === Functions ===

#[test]
fn functions_return_null_without_an_explicit_return() {
    assert_eq!(run_code("fn f() { 42 } print(f())"), "null\n");
}

#[test]
fn defaults_fill_missing_arguments() {
    let code = r"
fn add(a, b = 10) { return a + b }
print(add(1))
print(add(1, 2))
print(add(1, b: 5))
";
    assert_eq!(run_code(code), "11\n3\n6\n");
}

#[test]
fn missing_required_argument_is_an_arity_error() {
    let err = run_err("fn f(a) { return a } f()");
    assert_eq!(err.kind(), ErrorKind::ArityError);
}

#[test]
fn excess_positional_arguments_are_an_arity_error() {
    let err = run_err("fn f(a) { return a } f(1, 2)");
    assert_eq!(err.kind(), ErrorKind::ArityError);
}

#[test]
fn named_argument_colliding_with_positional_fails() {
    let err = run_err("fn f(a) { return a } f(1, a: 2)");
    assert_eq!(err.kind(), ErrorKind::ArityError);
    assert!(err.message().contains("multiple values"));
}

#[test]
fn unknown_named_argument_fails() {
    let err = run_err("fn f(a) { return a } f(1, b: 2)");
    assert_eq!(err.kind(), ErrorKind::ArityError);
}

#[test]
fn calling_a_non_function_fails() {
    let err = run_err("let x = 3 x()");
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn recursion_works() {
    let code = r"
fn fib(n) {
    if n < 2 { return n }
    return fib(n - 1) + fib(n - 2)
}
print(fib(10))
";
    assert_eq!(run_code(code), "55\n");
}

#[test]
fn traceback_records_call_sites() {
    let code = r"
fn inner() { return 1 / 0 }
fn outer() { return inner() }
outer()
";
    let err = run_err(code);
    assert_eq!(err.kind(), ErrorKind::ArithError);
    let names: Vec<&str> = err.frames().iter().map(|frame| frame.name.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer"]);
}

// === Determinism and results ===

#[test]
fn execution_is_deterministic() {
    let code = r#"
personality { focus: 0.5 }
let xs = [3, 1, 2]
for x in xs { print(x * 10) }
say("done")
"#;
    let first = run_code(code);
    let second = run_code(code);
    assert_eq!(first, second);
}

#[test]
fn runner_returns_the_final_expression_value() {
    let runner = Runner::new("let x = 40 x + 2".to_owned(), "test.nx").unwrap();
    let mut print = CollectStringPrint::new();
    let value = runner.run(&mut DefaultHost, &mut NoLimitTracker, &mut print).unwrap();
    assert_eq!(value, Value::Int(42));
}

#[test]
fn executions_do_not_share_state() {
    let runner = Runner::new("personality { calm: 1.0 } print(get_trait(\"calm\"))".to_owned(), "a.nx").unwrap();
    let mut print = CollectStringPrint::new();
    runner.run(&mut DefaultHost, &mut NoLimitTracker, &mut print).unwrap();

    // A second, independent program must not observe the first one's traits.
    assert_eq!(run_code("print(get_trait(\"calm\"))"), "null\n");
}
