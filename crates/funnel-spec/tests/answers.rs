use std::collections::BTreeSet;

use serde_json::json;

use funnel_spec::{
    AnswerError, AnswerStore, AnswerValue, FunnelSpec, is_visible, resolve_visibility,
};

fn lead_funnel() -> FunnelSpec {
    FunnelSpec::from_json(include_str!("../tests/fixtures/lead_funnel.json")).expect("definition")
}

fn branching() -> FunnelSpec {
    FunnelSpec::from_json(include_str!("../tests/fixtures/branching.json")).expect("definition")
}

#[test]
fn visibility_is_pure_over_the_snapshot() {
    let spec = lead_funnel();
    let mut store = AnswerStore::new(&spec);
    store
        .set_answer("11", AnswerValue::Choice("sell".into()))
        .expect("answer");

    let first = resolve_visibility(&spec, store.answers());
    let second = resolve_visibility(&spec, store.answers());
    assert_eq!(first, second);
    assert_eq!(first.get("12").copied(), Some(false));
    assert_eq!(first.get("13").copied(), Some(true));
}

#[test]
fn answers_survive_hiding_but_leave_visible_set() {
    let spec = lead_funnel();
    let mut store = AnswerStore::new(&spec);
    store
        .set_answer("11", AnswerValue::Choice("buy".into()))
        .expect("intent");
    store
        .set_answer("12", AnswerValue::Text("2500".into()))
        .expect("budget");
    assert!(store.visible_answers().contains("12"));

    store
        .set_answer("11", AnswerValue::Choice("browse".into()))
        .expect("intent");
    assert_eq!(store.get_answer("12"), Some(&AnswerValue::Text("2500".into())));
    assert!(!store.visible_answers().contains("12"));
    assert!(!store.visible_answers().contains("13"));
}

#[test]
fn hidden_questions_are_vacuously_satisfied() {
    let spec = branching();
    let mut store = AnswerStore::new(&spec);
    store.set_answer("q1", AnswerValue::Text("no".into())).expect("q1");
    let q2 = spec.question("q2").expect("q2");
    assert!(!store.is_visible(q2));
    assert!(store.is_question_satisfied(q2));
}

#[test]
fn required_blank_text_is_unsatisfied() {
    let spec = branching();
    let mut store = AnswerStore::new(&spec);
    store.set_answer("q1", AnswerValue::Text(String::new())).expect("q1");
    let q1 = spec.question("q1").expect("q1");
    let result = store.check_question(q1);
    assert!(!result.valid);
    assert_eq!(result.errors, vec!["This field is required"]);
    assert!(!store.is_question_satisfied(q1));
}

#[test]
fn email_rule_reports_single_error() {
    let spec = lead_funnel();
    let mut store = AnswerStore::new(&spec);
    store.set_answer("15", AnswerValue::Text("bob@".into())).expect("email");
    let result = store.check_question(spec.question("15").expect("email"));
    assert_eq!(result.errors, vec!["Please enter a valid email address"]);
}

#[test]
fn setting_same_value_twice_is_idempotent() {
    let spec = lead_funnel();
    let mut store = AnswerStore::new(&spec);
    assert!(store.set_answer("11", AnswerValue::Choice("buy".into())).expect("first"));
    let snapshot = store.get_all_answers();
    assert!(!store.set_answer("11", AnswerValue::Choice("buy".into())).expect("second"));
    assert_eq!(store.get_all_answers(), snapshot);
}

#[test]
fn writes_reject_wrong_shapes() {
    let spec = lead_funnel();
    let mut store = AnswerStore::new(&spec);

    let err = store.set_answer("13", AnswerValue::Choice("1".into())).unwrap_err();
    assert!(matches!(err, AnswerError::ShapeMismatch { .. }));

    let err = store.set_answer_json("14", &json!({ "fax": "123" })).unwrap_err();
    assert!(matches!(err, AnswerError::UnknownField { field, .. } if field == "fax"));

    let err = store.set_answer("99", AnswerValue::Text("x".into())).unwrap_err();
    assert!(matches!(err, AnswerError::UnknownQuestion { .. }));
    assert!(store.answers().is_empty());

    store.set_answer_json("13", &json!([2, 3])).expect("features");
    assert_eq!(
        store.get_answer("13"),
        Some(&AnswerValue::Choices(BTreeSet::from(["2".to_string(), "3".to_string()])))
    );
}

#[test]
fn nested_hiding_treats_hidden_reference_as_unanswered() {
    let spec = FunnelSpec::from_value(json!({
        "id": "nested",
        "name": "Nested",
        "questions": [
            { "id": "a", "text": "A", "type": "text_input", "position": 0 },
            {
                "id": "b", "text": "B", "type": "text_input", "position": 1,
                "conditional": { "conditions": [{ "questionId": "a", "operator": "equals", "value": "go" }] }
            },
            {
                "id": "c", "text": "C", "type": "text_input", "position": 2,
                "conditional": { "conditions": [{ "questionId": "b", "operator": "is_answered" }] }
            }
        ]
    }))
    .expect("definition");

    let mut store = AnswerStore::new(&spec);
    store.set_answer("a", AnswerValue::Text("go".into())).expect("a");
    store.set_answer("b", AnswerValue::Text("yes".into())).expect("b");
    let c = spec.question("c").expect("c");
    assert!(store.is_visible(c));

    store.set_answer("a", AnswerValue::Text("stop".into())).expect("a");
    assert!(!store.is_visible(c));
    // the raw snapshot still holds b, so the single-question check disagrees
    assert!(is_visible(c, store.answers()));
}
