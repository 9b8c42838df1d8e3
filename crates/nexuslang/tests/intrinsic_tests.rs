//! Host capability behaviour: knowledge, say, listen, optimize_self,
//! get_trait, and the wall clock, exercised through deterministic fixtures.

use nexuslang::{
    CollectStringPrint, DefaultHost, ErrorKind, FixtureHost, NoLimitTracker, Runner,
    capability::HostCapabilities,
};
use pretty_assertions::assert_eq;

fn run_with_host(code: &str, host: &mut dyn HostCapabilities) -> String {
    let runner = Runner::new(code.to_owned(), "test.nx").unwrap();
    let mut print = CollectStringPrint::new();
    runner.run(host, &mut NoLimitTracker, &mut print).expect("should succeed");
    print.into_output()
}

// === knowledge ===

#[test]
fn knowledge_returns_records_from_the_host() {
    let mut host = FixtureHost::new().with_knowledge_record(
        "Rust",
        "A systems language.",
        0.97,
        "encyclopedia",
    );
    let code = r#"
let rs = knowledge("rust", limit: 3)
print(rs[0].title)
print(rs[0]["summary"])
print(rs[0].confidence)
"#;
    assert_eq!(
        run_with_host(code, &mut host),
        "Rust\nA systems language.\n0.97\n"
    );
    assert_eq!(host.knowledge_queries, vec!["rust".to_owned()]);
}

#[test]
fn knowledge_without_a_host_returns_an_empty_array_and_never_raises() {
    let code = r#"
let rs = knowledge("anything")
print(rs)
if rs { print("got results") } else { print("empty") }
"#;
    assert_eq!(run_with_host(code, &mut DefaultHost), "[]\nempty\n");
}

#[test]
fn knowledge_record_member_access_on_absent_key_is_a_key_error() {
    let mut host = FixtureHost::new().with_knowledge_record("t", "s", 0.5, "src");
    let runner = Runner::new("print(knowledge(\"q\")[0].nope)".to_owned(), "test.nx").unwrap();
    let mut print = CollectStringPrint::new();
    let err = runner.run(&mut host, &mut NoLimitTracker, &mut print).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyError);
}

#[test]
fn knowledge_records_are_mutable_mappings() {
    let mut host = FixtureHost::new().with_knowledge_record("t", "s", 0.5, "src");
    let code = r#"
let r = knowledge("q")[0]
r["note"] = "extra"
r.title = "T2"
print(r.note)
print(r["title"])
"#;
    assert_eq!(run_with_host(code, &mut host), "extra\nT2\n");
}

#[test]
fn mapping_iteration_follows_insertion_order() {
    let mut host = FixtureHost::new().with_knowledge_record("t", "s", 0.5, "src");
    let code = r#"
let r = knowledge("q")[0]
for key in r { print(key) }
"#;
    assert_eq!(
        run_with_host(code, &mut host),
        "title\nsummary\nconfidence\nsource\n"
    );
}

// === say ===

#[test]
fn say_without_a_voice_backend_prints_a_transcription() {
    assert_eq!(
        run_with_host("say(\"hello\")", &mut DefaultHost),
        "[say] hello\n"
    );
}

#[test]
fn say_transcription_includes_named_options() {
    assert_eq!(
        run_with_host(
            "say(\"hi\", emotion: \"happy\", voice_id: \"aria\", speed: 1.5)",
            &mut DefaultHost
        ),
        "[say emotion=happy voice=aria speed=1.5] hi\n"
    );
}

#[test]
fn say_requests_reach_the_host_in_order() {
    let mut host = FixtureHost::new();
    run_with_host("say(\"one\") say(\"two\", emotion: \"calm\")", &mut host);
    assert_eq!(host.say_requests.len(), 2);
    assert_eq!(host.say_requests[0].text, "one");
    assert_eq!(host.say_requests[1].emotion.as_deref(), Some("calm"));
}

#[test]
fn say_emotion_must_be_a_string() {
    let runner = Runner::new("say(\"x\", emotion: 3)".to_owned(), "test.nx").unwrap();
    let mut print = CollectStringPrint::new();
    let err = runner
        .run(&mut DefaultHost, &mut NoLimitTracker, &mut print)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn voice_block_executes_its_body() {
    assert_eq!(
        run_with_host("voice { say(\"inside\") print(1 + 1) }", &mut DefaultHost),
        "[say] inside\n2\n"
    );
}

// === listen ===

#[test]
fn listen_returns_the_configured_fixture() {
    let mut host = FixtureHost::new().with_listen_response("turn on the lights");
    assert_eq!(
        run_with_host("print(listen(timeout: 2.5, language: \"en\"))", &mut host),
        "turn on the lights\n"
    );
}

#[test]
fn listen_without_a_host_returns_null() {
    assert_eq!(run_with_host("print(listen())", &mut DefaultHost), "null\n");
}

// === optimize_self ===

#[test]
fn optimize_self_is_delegated_with_no_observable_effect() {
    let mut host = FixtureHost::new();
    let output = run_with_host(
        "optimize_self(metric: \"accuracy\", target: 0.95, strategy: \"gradient\") print(\"after\")",
        &mut host,
    );
    assert_eq!(output, "after\n");
    assert_eq!(host.optimize_requests.len(), 1);
    assert_eq!(host.optimize_requests[0].metric.to_string(), "accuracy");
}

// === get_trait / personality ===

#[test]
fn unset_trait_reads_as_null() {
    assert_eq!(run_with_host("print(get_trait(\"bravery\"))", &mut DefaultHost), "null\n");
}

#[test]
fn later_personality_blocks_overwrite_traits() {
    let code = r#"
personality { focus: 0.2 }
personality { focus: 0.8, calm: 1.0 }
print(get_trait("focus"))
print(get_trait("calm"))
"#;
    assert_eq!(run_with_host(code, &mut DefaultHost), "0.8\n1.0\n");
}

#[test]
fn get_trait_requires_a_string() {
    let runner = Runner::new("print(get_trait(7))".to_owned(), "test.nx").unwrap();
    let mut print = CollectStringPrint::new();
    let err = runner
        .run(&mut DefaultHost, &mut NoLimitTracker, &mut print)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

// === now ===

#[test]
fn now_reads_the_host_clock() {
    let mut host = FixtureHost::new();
    assert_eq!(
        run_with_host("print(now()) print(now())", &mut host),
        "1700000000000\n1700000000010\n"
    );
}
