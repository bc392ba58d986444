use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::spec::id::{QuestionId, value_text};
use crate::spec::question::{AnswerShape, QuestionSpec};
use crate::visibility::VisibilityMap;

/// A recorded answer. The variant is fixed by the question kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Free text of a `text_input` question.
    Text(String),
    /// Selected option id of a single-select question.
    Choice(String),
    /// Selected option ids of a multi-select question.
    Choices(BTreeSet<String>),
    /// Sub-field values of a `multi_input` question.
    Fields(BTreeMap<String, String>),
}

impl AnswerValue {
    pub fn shape(&self) -> AnswerShape {
        match self {
            AnswerValue::Text(_) => AnswerShape::Text,
            AnswerValue::Choice(_) => AnswerShape::SingleChoice,
            AnswerValue::Choices(_) => AnswerShape::MultiChoice,
            AnswerValue::Fields(_) => AnswerShape::Fields,
        }
    }

    /// Kind-specific emptiness: blank text, no selection, or no populated field.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) | AnswerValue::Choice(text) => text.trim().is_empty(),
            AnswerValue::Choices(selected) => selected.is_empty(),
            AnswerValue::Fields(fields) => fields.values().all(|value| value.trim().is_empty()),
        }
    }

    /// Reads a JSON answer for the given shape without coercing between shapes.
    pub fn from_json(question_id: &QuestionId, shape: AnswerShape, value: &Value) -> Result<Self, AnswerError> {
        let mismatch = || AnswerError::InvalidJson {
            question_id: question_id.clone(),
            expected: shape,
        };
        match shape {
            AnswerShape::Text => value
                .as_str()
                .map(|text| AnswerValue::Text(text.to_string()))
                .ok_or_else(mismatch),
            AnswerShape::SingleChoice => match value {
                Value::String(_) | Value::Number(_) => {
                    value_text(value).map(AnswerValue::Choice).ok_or_else(mismatch)
                }
                _ => Err(mismatch()),
            },
            AnswerShape::MultiChoice => value
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(_) | Value::Number(_) => value_text(item),
                            _ => None,
                        })
                        .collect::<Option<BTreeSet<_>>>()
                })
                .map(AnswerValue::Choices)
                .ok_or_else(mismatch),
            AnswerShape::Fields => value
                .as_object()
                .and_then(|object| {
                    object
                        .iter()
                        .map(|(name, value)| value.as_str().map(|text| (name.clone(), text.to_string())))
                        .collect::<Option<BTreeMap<_, _>>>()
                })
                .map(AnswerValue::Fields)
                .ok_or_else(mismatch),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Answer snapshot keyed by question id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AnswerSet {
    values: BTreeMap<QuestionId, AnswerValue>,
}

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.values.get(question_id)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.values.contains_key(question_id)
    }

    /// Returns the previous value, if any.
    pub fn insert(&mut self, question_id: QuestionId, value: AnswerValue) -> Option<AnswerValue> {
        self.values.insert(question_id, value)
    }

    pub fn remove(&mut self, question_id: &str) -> Option<AnswerValue> {
        self.values.remove(question_id)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &AnswerValue)> {
        self.values.iter()
    }

    /// Copy restricted to questions marked visible.
    pub fn restricted_to(&self, visibility: &VisibilityMap) -> AnswerSet {
        let values = self
            .values
            .iter()
            .filter(|(id, _)| visibility.get(*id).copied().unwrap_or(false))
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect();
        AnswerSet { values }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl FromIterator<(QuestionId, AnswerValue)> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = (QuestionId, AnswerValue)>>(iter: I) -> Self {
        AnswerSet {
            values: iter.into_iter().collect(),
        }
    }
}

/// Outcome of running the rule evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Rejected answer writes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnswerError {
    #[error("question '{question_id}' is not part of this funnel")]
    UnknownQuestion { question_id: QuestionId },
    #[error("question '{question_id}' expects {expected}, got {found}")]
    ShapeMismatch {
        question_id: QuestionId,
        expected: AnswerShape,
        found: AnswerShape,
    },
    #[error("question '{question_id}' has no option '{option}'")]
    UnknownOption { question_id: QuestionId, option: String },
    #[error("question '{question_id}' has no field '{field}'")]
    UnknownField { question_id: QuestionId, field: String },
    #[error("answer for '{question_id}' is not valid JSON for {expected}")]
    InvalidJson {
        question_id: QuestionId,
        expected: AnswerShape,
    },
}

/// Checks that `value` has the shape `question` accepts.
pub fn check_shape(question: &QuestionSpec, value: &AnswerValue) -> Result<(), AnswerError> {
    let expected = question.answer_shape();
    if value.shape() != expected {
        return Err(AnswerError::ShapeMismatch {
            question_id: question.id.clone(),
            expected,
            found: value.shape(),
        });
    }

    let unknown_option = |option: &String| AnswerError::UnknownOption {
        question_id: question.id.clone(),
        option: option.clone(),
    };
    match value {
        AnswerValue::Text(_) => Ok(()),
        AnswerValue::Choice(choice) => {
            if choice.is_empty() || question.choice(choice).is_some() {
                Ok(())
            } else {
                Err(unknown_option(choice))
            }
        }
        AnswerValue::Choices(selected) => match selected
            .iter()
            .find(|choice| question.choice(choice).is_none())
        {
            Some(choice) => Err(unknown_option(choice)),
            None => Ok(()),
        },
        AnswerValue::Fields(fields) => match fields.keys().find(|name| question.field(name).is_none()) {
            Some(name) => Err(AnswerError::UnknownField {
                question_id: question.id.clone(),
                field: name.clone(),
            }),
            None => Ok(()),
        },
    }
}
