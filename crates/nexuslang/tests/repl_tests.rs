//! Behaviour of the persistent REPL session: state across lines, final
//! expression reporting, and continuation detection.

use nexuslang::{
    CollectStringPrint, DefaultHost, ErrorKind, FixtureHost, NoPrint, ReplSession, Value, needs_more_input,
};
use pretty_assertions::assert_eq;

fn session() -> ReplSession {
    ReplSession::new(Box::new(DefaultHost), "<stdin>")
}

#[test]
fn create_session_with_a_script_name() {
    let session = session();
    assert_eq!(session.script_name(), "<stdin>");
}

#[test]
fn fresh_session_only_has_the_seeded_intrinsics() {
    let session = session();
    assert_eq!(session.list_variables(), vec!["now".to_owned(), "print".to_owned()]);
}

#[test]
fn expression_value_is_reported() {
    let mut session = session();
    let result = session.execute("1 + 2", &mut NoPrint).unwrap();
    assert_eq!(result, Some(Value::Int(3)));
}

#[test]
fn declarations_report_no_value() {
    let mut session = session();
    let result = session.execute("let x = 42", &mut NoPrint).unwrap();
    assert_eq!(result, None);
}

#[test]
fn variables_persist_across_lines() {
    let mut session = session();
    session.execute("let a = 10", &mut NoPrint).unwrap();
    session.execute("let b = 20", &mut NoPrint).unwrap();
    let result = session.execute("a + b", &mut NoPrint).unwrap();
    assert_eq!(result, Some(Value::Int(30)));
}

#[test]
fn functions_persist_across_lines() {
    let mut session = session();
    session.execute("fn double(n) { return n * 2 }", &mut NoPrint).unwrap();
    let result = session.execute("double(21)", &mut NoPrint).unwrap();
    assert_eq!(result, Some(Value::Int(42)));
}

#[test]
fn personality_traits_persist_across_lines() {
    let mut session = session();
    session.execute("personality { wit: 0.7 }", &mut NoPrint).unwrap();
    let result = session.execute("get_trait(\"wit\")", &mut NoPrint).unwrap();
    assert_eq!(result, Some(Value::Float(0.7)));
    assert_eq!(session.get_trait("wit"), Some(0.7));
}

#[test]
fn a_failed_line_does_not_poison_the_session() {
    let mut session = session();
    session.execute("let x = 1", &mut NoPrint).unwrap();
    let err = session.execute("x + missing", &mut NoPrint).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);
    let result = session.execute("x + 1", &mut NoPrint).unwrap();
    assert_eq!(result, Some(Value::Int(2)));
}

#[test]
fn redeclaring_a_repl_binding_fails_like_a_script() {
    let mut session = session();
    session.execute("let x = 1", &mut NoPrint).unwrap();
    let err = session.execute("let x = 2", &mut NoPrint).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);
}

#[test]
fn print_output_reaches_the_writer() {
    let mut session = session();
    let mut print = CollectStringPrint::new();
    session.execute("print(\"hi from the repl\")", &mut print).unwrap();
    assert_eq!(print.output(), "hi from the repl\n");
}

#[test]
fn fixture_hosts_work_in_sessions() {
    let host = FixtureHost::new().with_listen_response("ok");
    let mut session = ReplSession::new(Box::new(host), "<stdin>");
    let result = session.execute("listen()", &mut NoPrint).unwrap();
    assert_eq!(result, Some(Value::str("ok")));
}

#[test]
fn multi_line_forms_accumulate_until_balanced() {
    assert!(needs_more_input("fn f() {"));
    assert!(needs_more_input("fn f() {\n    let x = ["));
    assert!(!needs_more_input("fn f() {\n    return 1\n}"));

    let mut session = session();
    session.execute("fn f() {\n    return 7\n}", &mut NoPrint).unwrap();
    assert_eq!(session.execute("f()", &mut NoPrint).unwrap(), Some(Value::Int(7)));
}

#[test]
fn script_name_is_attached_to_diagnostics() {
    let mut session = session();
    let err = session.execute("1 / 0", &mut NoPrint).unwrap_err();
    assert!(err.diagnostic_line().contains("<stdin>"));
}
