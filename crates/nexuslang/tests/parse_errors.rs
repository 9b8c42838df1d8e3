//! First-error reporting from the lexer and parser. The toolchain is
//! batch-oriented: no recovery, one diagnostic per invocation.

use nexuslang::{CodeLoc, ErrorKind, Exception, Runner};
use pretty_assertions::assert_eq;

fn parse_err(code: &str) -> Exception {
    Runner::new(code.to_owned(), "test.nx").expect_err("should fail to parse")
}

// === Lexer failures ===

#[test]
fn unterminated_string() {
    let err = parse_err("let s = \"oops");
    assert_eq!(err.kind(), ErrorKind::LexError);
    assert!(err.message().contains("unterminated string"));
}

#[test]
fn unknown_escape_sequence() {
    let err = parse_err(r#"let s = "\q""#);
    assert_eq!(err.kind(), ErrorKind::LexError);
}

#[test]
fn short_unicode_escape() {
    let err = parse_err(r#"let s = "\u12""#);
    assert_eq!(err.kind(), ErrorKind::LexError);
    assert!(err.message().contains("four hex digits"));
}

#[test]
fn unterminated_block_comment() {
    let err = parse_err("let x = 1 /* dangling");
    assert_eq!(err.kind(), ErrorKind::LexError);
    assert!(err.message().contains("unterminated block comment"));
}

#[test]
fn stray_character() {
    let err = parse_err("let x = 1 # 2");
    assert_eq!(err.kind(), ErrorKind::LexError);
    assert_eq!(err.loc(), Some(CodeLoc::new(1, 11)));
}

// === Parser failures ===

#[test]
fn unexpected_token_reports_expected_and_found() {
    let err = parse_err("let = 5");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("expected identifier"));
    assert!(err.message().contains("found '='"));
}

#[test]
fn missing_closing_brace() {
    let err = parse_err("fn f() { print(1)");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn range_does_not_chain() {
    let err = parse_err("let r = 1..2..3");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn personality_trait_above_one() {
    let err = parse_err("personality { curiosity: 1.5 }");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    // The position points at the offending literal.
    assert_eq!(err.loc(), Some(CodeLoc::new(1, 26)));
}

#[test]
fn personality_rejects_non_numeric_values() {
    let err = parse_err("personality { mood: \"happy\" }");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn break_outside_a_loop() {
    let err = parse_err("break");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("'break' outside"));
}

#[test]
fn continue_outside_a_loop() {
    let err = parse_err("if true { continue }");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn return_outside_a_function() {
    let err = parse_err("return 1");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("'return' outside"));
}

#[test]
fn break_in_function_does_not_see_enclosing_loop() {
    // The function boundary resets loop context.
    let err = parse_err("while true { fn f() { break } }");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn duplicate_named_argument() {
    let err = parse_err("say(\"x\", emotion: \"a\", emotion: \"b\")");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("duplicate named argument"));
}

#[test]
fn positional_after_named_argument() {
    let err = parse_err("fn f(a, b) { return a } f(a: 1, 2)");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn say_rejects_unknown_option_names() {
    let err = parse_err("say(\"x\", volume: 3)");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn optimize_self_requires_metric_and_target() {
    let err = parse_err("optimize_self(metric: \"accuracy\")");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("target"));
}

#[test]
fn parameters_without_defaults_cannot_follow_defaults() {
    let err = parse_err("fn f(a = 1, b) { return b }");
    assert_eq!(err.kind(), ErrorKind::ParseError);
}

#[test]
fn invalid_assignment_target() {
    let err = parse_err("1 + 2 = 3");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("assignment target"));
}

#[test]
fn nesting_depth_guard_rejects_pathological_sources() {
    let mut code = String::from("let x = ");
    for _ in 0..300 {
        code.push('(');
    }
    code.push('1');
    for _ in 0..300 {
        code.push(')');
    }
    let err = parse_err(&code);
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("nesting"));
}

#[test]
fn integer_literal_beyond_i64_range() {
    let err = parse_err("let x = 9223372036854775808");
    assert_eq!(err.kind(), ErrorKind::ParseError);
    assert!(err.message().contains("out of range"));
}

#[test]
fn parse_positions_are_one_based() {
    let err = parse_err("let x = 1\nlet = 2");
    assert_eq!(err.loc(), Some(CodeLoc::new(2, 5)));
}
