use serde_json::{Map, Value, json};

use funnel_spec::{AnswerShape, AnswerValue, QuestionSpec, QuestionType};

use crate::engine::{Delivery, Engine, Progress};
use crate::navigation::NavState;

/// Status labels exposed to front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    NotStarted,
    NeedInput,
    Complete,
    Abandoned,
}

impl ViewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewStatus::NotStarted => "not_started",
            ViewStatus::NeedInput => "need_input",
            ViewStatus::Complete => "complete",
            ViewStatus::Abandoned => "abandoned",
        }
    }
}

/// Selectable entry of a question.
#[derive(Debug, Clone)]
pub struct ViewChoice {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

/// Describes the displayed question.
#[derive(Debug, Clone)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub kind: QuestionType,
    pub shape: AnswerShape,
    pub required: bool,
    pub placeholder: Option<String>,
    pub choices: Vec<ViewChoice>,
    pub fields: Vec<(String, String)>,
    pub current_value: Option<Value>,
    pub errors: Vec<String>,
}

/// Everything a front-end needs to draw the current step.
#[derive(Debug, Clone)]
pub struct StepView {
    pub funnel_id: String,
    pub funnel_name: String,
    pub theme: String,
    pub status: ViewStatus,
    pub progress: Option<Progress>,
    pub can_go_back: bool,
    pub question: Option<QuestionView>,
    pub delivery_error: Option<String>,
}

/// Snapshot of the engine for rendering.
pub fn build_step_view(engine: &Engine<'_>) -> StepView {
    let funnel = engine.funnel();
    let status = match engine.state() {
        NavState::NotStarted => ViewStatus::NotStarted,
        NavState::OnQuestion(_) => ViewStatus::NeedInput,
        NavState::Completed => ViewStatus::Complete,
        NavState::Abandoned => ViewStatus::Abandoned,
    };

    let question = engine.current_question().map(|question| {
        let answer = engine.store().get_answer(question.id.as_str());
        let errors = match answer {
            Some(_) => engine.store().check_question(question).errors,
            None => Vec::new(),
        };
        question_view(question, answer, errors)
    });

    let delivery_error = match engine.delivery() {
        Some(Delivery::Failed(err)) => Some(err.to_string()),
        _ => None,
    };

    StepView {
        funnel_id: funnel.id.to_string(),
        funnel_name: funnel.name.clone(),
        theme: funnel.settings.theme.clone(),
        status,
        progress: funnel.settings.progress_bar.then(|| engine.progress()),
        can_go_back: engine.can_go_back(),
        question,
        delivery_error,
    }
}

fn question_view(question: &QuestionSpec, answer: Option<&AnswerValue>, errors: Vec<String>) -> QuestionView {
    let selected = |id: &str| match answer {
        Some(AnswerValue::Choice(choice)) => choice == id,
        Some(AnswerValue::Choices(choices)) => choices.contains(id),
        _ => false,
    };
    QuestionView {
        id: question.id.to_string(),
        text: question.text.clone(),
        kind: question.kind,
        shape: question.answer_shape(),
        required: question.is_required(),
        placeholder: question.options.placeholder.clone(),
        choices: question
            .options
            .choices
            .iter()
            .map(|choice| ViewChoice {
                id: choice.id.clone(),
                label: choice.label.clone(),
                selected: selected(&choice.id),
            })
            .collect(),
        fields: question
            .options
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.display_label().to_string()))
            .collect(),
        current_value: answer.map(AnswerValue::to_json),
        errors,
    }
}

/// Render the view as a structured JSON value.
pub fn render_json(view: &StepView) -> Value {
    let question = view.question.as_ref().map(|question| {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(question.id.clone()));
        map.insert("text".into(), Value::String(question.text.clone()));
        map.insert("type".into(), Value::String(question.kind.as_str().to_string()));
        map.insert("required".into(), Value::Bool(question.required));
        if let Some(placeholder) = &question.placeholder {
            map.insert("placeholder".into(), Value::String(placeholder.clone()));
        }
        if !question.choices.is_empty() {
            map.insert(
                "multiple".into(),
                Value::Bool(question.shape == AnswerShape::MultiChoice),
            );
            map.insert(
                "choices".into(),
                Value::Array(
                    question
                        .choices
                        .iter()
                        .map(|choice| {
                            json!({
                                "id": choice.id,
                                "label": choice.label,
                                "selected": choice.selected,
                            })
                        })
                        .collect(),
                ),
            );
        }
        if !question.fields.is_empty() {
            map.insert(
                "fields".into(),
                Value::Array(
                    question
                        .fields
                        .iter()
                        .map(|(name, label)| json!({ "name": name, "label": label }))
                        .collect(),
                ),
            );
        }
        if let Some(value) = &question.current_value {
            map.insert("current_value".into(), value.clone());
        }
        map.insert(
            "errors".into(),
            Value::Array(question.errors.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(map)
    });

    json!({
        "funnel_id": view.funnel_id,
        "funnel_name": view.funnel_name,
        "theme": view.theme,
        "status": view.status.as_str(),
        "progress": view.progress.map(|progress| json!({
            "current": progress.current,
            "total": progress.total,
            "percent": progress.percent,
        })),
        "can_go_back": view.can_go_back,
        "question": question,
        "delivery_error": view.delivery_error,
    })
}

/// Render the view as human-friendly text.
pub fn render_text(view: &StepView) -> String {
    let mut lines = Vec::new();

    match &view.progress {
        Some(progress) if view.status == ViewStatus::NeedInput => lines.push(format!(
            "[{}/{}] {}%",
            progress.current, progress.total, progress.percent
        )),
        _ => {}
    }

    match view.status {
        ViewStatus::NotStarted => lines.push(format!("Funnel: {} (not started)", view.funnel_name)),
        ViewStatus::Complete => {
            lines.push("All done, thank you!".to_string());
            if let Some(error) = &view.delivery_error {
                lines.push(error.clone());
            }
        }
        ViewStatus::Abandoned => lines.push("Funnel abandoned.".to_string()),
        ViewStatus::NeedInput => {}
    }

    if let Some(question) = &view.question {
        let mut title = question.text.clone();
        if question.required {
            title.push_str(" *");
        }
        lines.push(title);
        if let Some(placeholder) = &question.placeholder {
            lines.push(format!("  ({})", placeholder));
        }
        for (number, choice) in question.choices.iter().enumerate() {
            let marker = if choice.selected { "x" } else { " " };
            lines.push(format!("  {}. [{}] {}", number + 1, marker, choice.label));
        }
        for (_, label) in &question.fields {
            lines.push(format!("  - {}", label));
        }
        if let Some(value) = &question.current_value {
            lines.push(format!("  Current answer: {}", value_to_display(value)));
        }
        for error in &question.errors {
            lines.push(format!("  ! {}", error));
        }
    }

    lines.join("\n")
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_display)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{}={}", key, value_to_display(value)))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use funnel_spec::FunnelSpec;

    fn funnel() -> FunnelSpec {
        FunnelSpec::from_value(json!({
            "id": 3,
            "name": "Quiz",
            "settings": { "theme": "ocean" },
            "questions": [
                {
                    "id": "color", "text": "Favourite colour?", "type": "text_selection",
                    "required": true, "position": 0,
                    "options": { "choices": [{ "id": "r", "label": "Red" }, { "id": "b", "label": "Blue" }] }
                },
                { "id": "why", "text": "Why?", "type": "text_input", "position": 1,
                  "validation": { "minLength": 5 } }
            ]
        }))
        .expect("definition")
    }

    #[test]
    fn text_view_lists_choices_and_progress() {
        let spec = funnel();
        let mut engine = Engine::new(&spec, EngineOptions::default()).expect("engine");
        engine.start().expect("start");
        engine
            .answer(AnswerValue::Choice("b".into()))
            .expect("answer");

        let text = render_text(&build_step_view(&engine));
        assert!(text.contains("[1/2] 50%"));
        assert!(text.contains("Favourite colour? *"));
        assert!(text.contains("2. [x] Blue"));
    }

    #[test]
    fn json_view_exposes_errors_of_answered_question() {
        let spec = funnel();
        let mut engine = Engine::new(&spec, EngineOptions::default()).expect("engine");
        engine.start().expect("start");
        engine.answer(AnswerValue::Choice("r".into())).expect("answer");
        engine.advance().expect("advance");
        engine.answer(AnswerValue::Text("meh".into())).expect("answer");

        let ui = render_json(&build_step_view(&engine));
        assert_eq!(ui["funnel_id"], "3");
        assert_eq!(ui["theme"], "ocean");
        assert_eq!(ui["status"], "need_input");
        assert_eq!(ui["can_go_back"], true);
        assert_eq!(ui["progress"]["current"], 2);
        assert_eq!(ui["question"]["errors"][0], "Minimum 5 characters required");
    }
}
