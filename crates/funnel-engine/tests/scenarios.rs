use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use funnel_engine::{
    Change, Engine, EngineError, EngineOptions, EventKind, ManualClock, MemoryTransport, NavState,
    SessionId, Step,
};
use funnel_spec::{AnswerValue, DefinitionError, FunnelSpec};

fn branching() -> FunnelSpec {
    FunnelSpec::from_json(include_str!("../tests/fixtures/branching.json")).expect("definition")
}

fn quiz() -> FunnelSpec {
    FunnelSpec::from_json(include_str!("../tests/fixtures/quiz.json")).expect("definition")
}

fn harness() -> (ManualClock, Rc<MemoryTransport>, EngineOptions) {
    let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
    let transport = Rc::new(MemoryTransport::new());
    let options = EngineOptions::with_transport(transport.clone())
        .clock(clock.clone())
        .session(SessionId::new("test-session"));
    (clock, transport, options)
}

fn text(value: &str) -> AnswerValue {
    AnswerValue::Text(value.to_string())
}

fn kinds(transport: &MemoryTransport) -> Vec<&'static str> {
    transport
        .events()
        .iter()
        .map(|event| event.kind.as_str())
        .collect()
}

#[test]
fn hidden_follow_up_is_skipped_and_left_out_of_submission() {
    let spec = branching();
    let (_clock, transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");

    assert_eq!(engine.start().expect("start"), Step::Question(0));
    engine.answer(text("no")).expect("answer");
    assert_eq!(engine.advance().expect("advance"), Step::Completed);
    assert_eq!(engine.state(), NavState::Completed);

    let submission = engine.build_submission().expect("submission");
    assert_eq!(submission.answers.to_json(), json!({ "q1": "no" }));
    assert_eq!(transport.submissions().len(), 1);
    assert!(engine.delivery().expect("delivered").is_sent());
}

#[test]
fn empty_required_answer_blocks_advance() {
    let spec = branching();
    let (_clock, _transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");
    engine.answer(text("")).expect("answer");

    let err = engine.advance().expect_err("blocked");
    match err {
        EngineError::ValidationFailure {
            question_id,
            errors,
        } => {
            assert_eq!(question_id.as_str(), "q1");
            assert_eq!(errors, vec!["This field is required"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.state(), NavState::OnQuestion(0));
    let validation = engine.current_validation().expect("current");
    assert!(!validation.valid);
}

#[test]
fn malformed_email_reports_single_error() {
    let spec = quiz();
    let (_clock, _transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine
        .set_answer("email", text("bob@"))
        .expect("prefill before start");

    let question = spec.question("email").expect("question");
    let result = engine.store().check_question(question);
    assert_eq!(result.errors, vec!["Please enter a valid email address"]);
}

#[test]
fn changing_an_earlier_answer_drops_the_stale_next_question() {
    let spec = branching();
    let (_clock, _transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");
    engine.answer(text("yes")).expect("answer");
    assert_eq!(engine.advance().expect("advance"), Step::Question(1));
    engine.answer(text("2019")).expect("answer q2");

    assert_eq!(engine.back().expect("back"), Step::Question(0));
    engine.answer(text("no")).expect("change q1");
    assert_eq!(engine.peek_next(), None);
    assert_eq!(engine.advance().expect("advance"), Step::Completed);

    let submission = engine.build_submission().expect("submission");
    assert!(submission.answers.get("q2").is_none());
    // the hidden answer is still held, only excluded
    assert!(engine.store().get_answer("q2").is_some());
}

#[test]
fn abandon_mid_funnel_records_event_and_refuses_submission() {
    let spec = branching();
    let (clock, transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");
    clock.advance_secs(4);

    assert_eq!(engine.abandon().expect("abandon"), Step::Abandoned);
    assert_eq!(engine.state(), NavState::Abandoned);
    let abandon = engine
        .tracker()
        .events_of_kind(EventKind::Abandon)
        .next()
        .expect("abandon event");
    assert_eq!(abandon.data["questionId"], "q1");
    assert_eq!(abandon.data["elapsed"], 4);

    assert!(matches!(
        engine.build_submission(),
        Err(EngineError::InvalidState(NavState::Abandoned))
    ));
    assert!(transport.submissions().is_empty());
    assert!(matches!(
        engine.advance(),
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[test]
fn event_stream_follows_navigation() {
    let spec = branching();
    let (_clock, transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");
    engine.answer(text("yes")).expect("answer");
    engine.advance().expect("advance");
    engine.answer(text("2019")).expect("answer");
    engine.advance().expect("complete");

    assert_eq!(
        kinds(&transport),
        vec![
            "funnel_start",
            "question_view",
            "question_answer",
            "question_timing",
            "question_view",
            "question_answer",
            "question_timing",
            "funnel_complete",
        ]
    );
    let start = &transport.events()[0];
    assert_eq!(start.data["funnelId"], "branching");
    assert_eq!(start.data["questionCount"], 2);
    assert_eq!(start.session_id.as_str(), "test-session");
}

#[test]
fn timings_and_interactions_reach_submission_metadata() {
    let spec = branching();
    let (clock, transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");
    clock.advance_millis(2_600);
    engine.answer(text("yes")).expect("answer");
    let mut details = Map::new();
    details.insert("target".into(), Value::String("help".into()));
    engine.track_interaction("click", details);
    engine.advance().expect("advance");
    clock.advance_secs(5);
    engine.answer(text("2019")).expect("answer");
    engine.advance().expect("complete");

    let submission = transport.submissions().pop().expect("sent");
    assert_eq!(submission.completion_time, 8);
    assert_eq!(submission.metadata.question_timings["q1"], 3);
    assert_eq!(submission.metadata.question_timings["q2"], 5);
    assert_eq!(submission.metadata.interactions.len(), 1);
    assert_eq!(submission.metadata.interactions[0]["interaction"], "click");
    assert_eq!(submission.metadata.interactions[0]["target"], "help");
    assert_eq!(submission.metadata.event_count, engine.tracker().events().len());
}

#[test]
fn single_choice_auto_advances_when_enabled() {
    let spec = quiz();
    let (_clock, _transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");

    let step = engine
        .answer(AnswerValue::Choice("modern".into()))
        .expect("answer");
    assert_eq!(step, Some(Step::Question(1)));

    let rooms = BTreeSet::from(["kitchen".to_string()]);
    let step = engine.answer(AnswerValue::Choices(rooms)).expect("answer");
    assert_eq!(step, None);
    assert_eq!(engine.state(), NavState::OnQuestion(1));
}

#[test]
fn back_is_refused_when_disabled() {
    let spec = quiz();
    let (_clock, _transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");
    engine
        .answer(AnswerValue::Choice("classic".into()))
        .expect("answer");

    assert!(!engine.can_go_back());
    assert!(matches!(engine.back(), Err(EngineError::BackDisabled)));
}

#[test]
fn only_the_displayed_question_accepts_answers() {
    let spec = quiz();
    let (_clock, _transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");

    let err = engine
        .set_answer("email", text("a@b.co"))
        .expect_err("not current");
    assert!(matches!(err, EngineError::NotCurrentQuestion { .. }));

    let err = engine
        .set_answer_json("style", &json!(["modern"]))
        .expect_err("wrong shape");
    assert!(matches!(err, EngineError::Answer(_)));
}

#[test]
fn observers_see_answer_and_state_changes() {
    let spec = branching();
    let (_clock, _transport, options) = harness();
    let seen = RefCell::new(Vec::new());
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.on_change(|change| seen.borrow_mut().push(change.clone()));

    engine.start().expect("start");
    engine.answer(text("no")).expect("answer");
    engine.answer(text("no")).expect("same answer");
    engine.advance().expect("advance");
    drop(engine);

    assert_eq!(
        seen.into_inner(),
        vec![
            Change::State(NavState::OnQuestion(0)),
            Change::Answer {
                question_id: "q1".into()
            },
            Change::State(NavState::Completed),
        ]
    );
}

#[test]
fn failed_delivery_keeps_submission_for_retry() {
    let spec = branching();
    let (_clock, transport, options) = harness();
    transport.fail_submissions(true);
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.start().expect("start");
    engine.answer(text("no")).expect("answer");
    engine.advance().expect("advance");

    let delivery = engine.delivery().expect("attempted");
    assert!(!delivery.is_sent());
    assert_eq!(engine.state(), NavState::Completed);
    assert!(engine.submission().is_some());
    assert!(transport.submissions().is_empty());

    transport.fail_submissions(false);
    assert!(engine.retry_submission().expect("retry").is_sent());
    assert_eq!(transport.submissions().len(), 1);
}

#[test]
fn progress_counts_visible_questions_only() {
    let spec = branching();
    let (_clock, _transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    assert_eq!(engine.progress().current, 0);

    engine.start().expect("start");
    let progress = engine.progress();
    assert_eq!((progress.current, progress.total, progress.percent), (1, 1, 100));

    engine.answer(text("yes")).expect("answer");
    let progress = engine.progress();
    assert_eq!((progress.current, progress.total, progress.percent), (1, 2, 50));
}

#[test]
fn disabled_analytics_still_times_completion() {
    let spec = branching();
    let (clock, transport, options) = harness();
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.set_analytics_enabled(false);
    engine.start().expect("start");
    clock.advance_secs(12);
    engine.answer(text("no")).expect("answer");
    engine.advance().expect("advance");

    assert!(transport.events().is_empty());
    let submission = engine.submission().expect("built");
    assert_eq!(submission.completion_time, 12);
    assert_eq!(submission.metadata.event_count, 0);
}

#[test]
fn engine_refuses_definitions_that_skipped_preparation() {
    let duplicate: FunnelSpec = serde_json::from_str(
        r#"{
            "id": "dup",
            "name": "Duplicate",
            "questions": [
                { "id": "q1", "text": "First", "type": "text_input", "position": 0 },
                { "id": "q1", "text": "Again", "type": "text_input", "position": 1 }
            ]
        }"#,
    )
    .expect("raw definition");
    let err = Engine::new(&duplicate, EngineOptions::default()).err().expect("rejected");
    assert!(matches!(
        err,
        EngineError::MalformedDefinition(DefinitionError::DuplicateQuestion(id)) if id.as_str() == "q1"
    ));

    let unsorted: FunnelSpec = serde_json::from_str(
        r#"{
            "id": "unsorted",
            "name": "Unsorted",
            "questions": [
                { "id": "b", "text": "Second", "type": "text_input", "position": 1 },
                { "id": "a", "text": "First", "type": "text_input", "position": 0 }
            ]
        }"#,
    )
    .expect("raw definition");
    let (_clock, transport, options) = harness();
    let err = Engine::new(&unsorted, options).err().expect("rejected");
    assert!(matches!(
        err,
        EngineError::MalformedDefinition(DefinitionError::PositionGap { .. })
    ));
    assert!(transport.events().is_empty());
}

#[test]
fn clearing_an_answer_notifies_observers() {
    let spec = branching();
    let (_clock, _transport, options) = harness();
    let seen = RefCell::new(Vec::new());
    let mut engine = Engine::new(&spec, options).expect("engine");
    engine.on_change(|change| seen.borrow_mut().push(change.clone()));

    engine.start().expect("start");
    engine.answer(text("yes")).expect("answer");
    assert_eq!(engine.clear_answer("q1").expect("clear"), Some(text("yes")));
    assert_eq!(engine.clear_answer("q1").expect("clear again"), None);
    assert!(engine.store().get_answer("q1").is_none());
    assert!(matches!(
        engine.clear_answer("q2"),
        Err(EngineError::NotCurrentQuestion { .. })
    ));
    drop(engine);

    let answers = seen
        .into_inner()
        .into_iter()
        .filter(|change| matches!(change, Change::Answer { .. }))
        .count();
    assert_eq!(answers, 2);
}
