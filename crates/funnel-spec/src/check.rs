use std::collections::BTreeSet;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::spec::funnel::FunnelSpec;
use crate::spec::id::QuestionId;
use crate::spec::question::QuestionType;
use crate::spec::rules::Rule;

/// Structural problems that keep a funnel from starting.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to parse funnel definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("funnel '{0}' has no questions")]
    NoQuestions(String),
    #[error("question id '{0}' is used more than once")]
    DuplicateQuestion(QuestionId),
    #[error("question '{question_id}' has position {found}, expected {expected}")]
    PositionGap {
        question_id: QuestionId,
        expected: i64,
        found: i64,
    },
    #[error("question '{0}' declares no choices")]
    MissingChoices(QuestionId),
    #[error("question '{question_id}' declares choice '{choice}' twice")]
    DuplicateChoice { question_id: QuestionId, choice: String },
    #[error("question '{0}' declares no fields")]
    MissingFields(QuestionId),
    #[error("question '{question_id}' declares field '{field}' twice")]
    DuplicateField { question_id: QuestionId, field: String },
    #[error("question '{question_id}' has an invalid pattern")]
    InvalidPattern {
        question_id: QuestionId,
        #[source]
        source: regex::Error,
    },
    #[error("question '{question_id}' has {lower} greater than {upper}")]
    InvalidBounds {
        question_id: QuestionId,
        lower: &'static str,
        upper: &'static str,
    },
    #[error("question '{question_id}' depends on unknown question '{target}'")]
    UnknownConditionTarget {
        question_id: QuestionId,
        target: QuestionId,
    },
    #[error("question '{question_id}' depends on '{target}', which is not asked before it")]
    ForwardCondition {
        question_id: QuestionId,
        target: QuestionId,
    },
}

impl FunnelSpec {
    /// Parses, orders, and checks a definition.
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let spec: FunnelSpec = serde_json::from_str(json)?;
        spec.prepared()
    }

    pub fn from_value(value: Value) -> Result<Self, DefinitionError> {
        let spec: FunnelSpec = serde_json::from_value(value)?;
        spec.prepared()
    }

    /// Stable-sorts questions by position and runs [`check_definition`].
    pub fn prepared(mut self) -> Result<Self, DefinitionError> {
        self.questions.sort_by_key(|question| question.position);
        check_definition(&self)?;
        Ok(self)
    }
}

/// Checks a definition whose questions are already in traversal order.
pub fn check_definition(spec: &FunnelSpec) -> Result<(), DefinitionError> {
    if spec.questions.is_empty() {
        return Err(DefinitionError::NoQuestions(spec.id.to_string()));
    }

    let mut seen = BTreeSet::new();
    for question in &spec.questions {
        if !seen.insert(question.id.as_str()) {
            return Err(DefinitionError::DuplicateQuestion(question.id.clone()));
        }
    }
    for pair in spec.questions.windows(2) {
        let (previous, question) = (&pair[0], &pair[1]);
        if previous.position.checked_add(1) != Some(question.position) {
            return Err(DefinitionError::PositionGap {
                question_id: question.id.clone(),
                expected: previous.position.saturating_add(1),
                found: question.position,
            });
        }
    }

    for (index, question) in spec.questions.iter().enumerate() {
        let id = &question.id;

        match question.kind {
            QuestionType::ImageSelection | QuestionType::IconSelection | QuestionType::TextSelection => {
                if question.options.choices.is_empty() {
                    return Err(DefinitionError::MissingChoices(id.clone()));
                }
                let mut choices = BTreeSet::new();
                for choice in &question.options.choices {
                    if !choices.insert(choice.id.as_str()) {
                        return Err(DefinitionError::DuplicateChoice {
                            question_id: id.clone(),
                            choice: choice.id.clone(),
                        });
                    }
                }
            }
            QuestionType::MultiInput => {
                if question.options.fields.is_empty() {
                    return Err(DefinitionError::MissingFields(id.clone()));
                }
                let mut fields = BTreeSet::new();
                for field in &question.options.fields {
                    if !fields.insert(field.name.as_str()) {
                        return Err(DefinitionError::DuplicateField {
                            question_id: id.clone(),
                            field: field.name.clone(),
                        });
                    }
                }
            }
            QuestionType::TextInput => {}
        }

        check_rules(id, question.validation.rules())?;

        for condition in &question.conditional.conditions {
            match spec.index_of(condition.question_id.as_str()) {
                None => {
                    return Err(DefinitionError::UnknownConditionTarget {
                        question_id: id.clone(),
                        target: condition.question_id.clone(),
                    });
                }
                Some(target) if target >= index => {
                    return Err(DefinitionError::ForwardCondition {
                        question_id: id.clone(),
                        target: condition.question_id.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}

fn check_rules(question_id: &QuestionId, rules: &[Rule]) -> Result<(), DefinitionError> {
    let mut min_length = None;
    let mut max_length = None;
    let mut min = None;
    let mut max = None;

    for rule in rules {
        match rule {
            Rule::Pattern { pattern, .. } => {
                Regex::new(pattern).map_err(|source| DefinitionError::InvalidPattern {
                    question_id: question_id.clone(),
                    source,
                })?;
            }
            Rule::MinLength(value) => min_length = Some(*value),
            Rule::MaxLength(value) => max_length = Some(*value),
            Rule::Min(value) => min = Some(*value),
            Rule::Max(value) => max = Some(*value),
            Rule::Email => {}
        }
    }

    if let (Some(lower), Some(upper)) = (min_length, max_length)
        && lower > upper
    {
        return Err(DefinitionError::InvalidBounds {
            question_id: question_id.clone(),
            lower: "minLength",
            upper: "maxLength",
        });
    }
    if let (Some(lower), Some(upper)) = (min, max)
        && lower > upper
    {
        return Err(DefinitionError::InvalidBounds {
            question_id: question_id.clone(),
            lower: "min",
            upper: "max",
        });
    }

    Ok(())
}
