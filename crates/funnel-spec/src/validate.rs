use std::sync::LazyLock;

use regex::Regex;

use crate::answers::{AnswerValue, ValidationResult};
use crate::spec::question::QuestionSpec;
use crate::spec::rules::{Rule, ValidationRules};

pub const REQUIRED_MESSAGE: &str = "This field is required";
pub const EMAIL_MESSAGE: &str = "Please enter a valid email address";
pub const PATTERN_FALLBACK_MESSAGE: &str = "Invalid format";

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// Runs the required check and every declared rule against one answer.
///
/// Rules never short-circuit: each failing rule contributes one message, in
/// declaration order, after the required message. Rules whose applicable type
/// does not match the answer are skipped. An absent answer has no runtime type,
/// so only the required check applies to it.
pub fn validate(answer: Option<&AnswerValue>, rules: &ValidationRules, required: bool) -> ValidationResult {
    let mut errors = Vec::new();

    let empty = answer.is_none_or(AnswerValue::is_empty);
    if required && empty {
        errors.push(REQUIRED_MESSAGE.to_string());
    }

    if let Some(answer) = answer {
        for rule in rules.rules() {
            if let Some(message) = apply_rule(rule, answer) {
                errors.push(message);
            }
        }
    }

    ValidationResult::from_errors(errors)
}

/// Validates an answer against everything `question` declares.
///
/// Multi-input sub-fields flagged as required add one message each, after the
/// rule messages, once the answer has any populated field.
pub fn validate_question(question: &QuestionSpec, answer: Option<&AnswerValue>) -> ValidationResult {
    let mut result = validate(answer, &question.validation, question.is_required());

    if let Some(AnswerValue::Fields(values)) = answer
        && values.values().any(|value| !value.trim().is_empty())
    {
        for field in question.options.fields.iter().filter(|field| field.required) {
            let blank = values
                .get(&field.name)
                .is_none_or(|value| value.trim().is_empty());
            if blank {
                result.errors.push(format!("{} is required", field.display_label()));
            }
        }
        result.valid = result.errors.is_empty();
    }

    result
}

fn apply_rule(rule: &Rule, answer: &AnswerValue) -> Option<String> {
    let text = match answer {
        AnswerValue::Text(text) => text,
        AnswerValue::Choice(_) | AnswerValue::Choices(_) | AnswerValue::Fields(_) => return None,
    };

    match rule {
        Rule::MinLength(min) => (text.chars().count() < *min)
            .then(|| format!("Minimum {} characters required", min)),
        Rule::MaxLength(max) => (text.chars().count() > *max)
            .then(|| format!("Maximum {} characters allowed", max)),
        Rule::Pattern { pattern, message } => {
            let regex = Regex::new(pattern).ok()?;
            (!regex.is_match(text)).then(|| {
                message
                    .clone()
                    .unwrap_or_else(|| PATTERN_FALLBACK_MESSAGE.to_string())
            })
        }
        Rule::Min(min) => numeric(text)
            .filter(|value| value < min)
            .map(|_| format!("Minimum value is {}", min)),
        Rule::Max(max) => numeric(text)
            .filter(|value| value > max)
            .map(|_| format!("Maximum value is {}", max)),
        Rule::Email => (!EMAIL.is_match(text)).then(|| EMAIL_MESSAGE.to_string()),
    }
}

fn numeric(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
