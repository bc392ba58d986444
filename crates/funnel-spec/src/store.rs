use serde_json::Value;

use crate::answers::{AnswerError, AnswerSet, AnswerValue, ValidationResult, check_shape};
use crate::spec::funnel::FunnelSpec;
use crate::spec::question::QuestionSpec;
use crate::validate::validate_question;
use crate::visibility::{VisibilityMap, resolve_visibility};

/// In-progress answers for one funnel execution.
///
/// Writes are checked for shape only; validity is a read.
#[derive(Debug, Clone)]
pub struct AnswerStore<'f> {
    funnel: &'f FunnelSpec,
    answers: AnswerSet,
}

impl<'f> AnswerStore<'f> {
    pub fn new(funnel: &'f FunnelSpec) -> Self {
        Self {
            funnel,
            answers: AnswerSet::new(),
        }
    }

    pub fn funnel(&self) -> &'f FunnelSpec {
        self.funnel
    }

    /// Replaces any previous answer. Returns `true` when the stored value changed.
    pub fn set_answer(&mut self, question_id: &str, value: AnswerValue) -> Result<bool, AnswerError> {
        let question = self.question(question_id)?;
        check_shape(question, &value)?;
        if self.answers.get(question_id) == Some(&value) {
            return Ok(false);
        }
        self.answers.insert(question.id.clone(), value);
        Ok(true)
    }

    /// Same as [`set_answer`](Self::set_answer) for a raw JSON value.
    pub fn set_answer_json(&mut self, question_id: &str, value: &Value) -> Result<bool, AnswerError> {
        let question = self.question(question_id)?;
        let value = AnswerValue::from_json(&question.id, question.answer_shape(), value)?;
        self.set_answer(question_id, value)
    }

    pub fn clear_answer(&mut self, question_id: &str) -> Option<AnswerValue> {
        self.answers.remove(question_id)
    }

    pub fn get_answer(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn get_all_answers(&self) -> AnswerSet {
        self.answers.clone()
    }

    pub fn visibility(&self) -> VisibilityMap {
        resolve_visibility(self.funnel, &self.answers)
    }

    pub fn is_visible(&self, question: &QuestionSpec) -> bool {
        self.visibility().get(&question.id).copied().unwrap_or(false)
    }

    /// Answers of currently visible questions only.
    pub fn visible_answers(&self) -> AnswerSet {
        self.answers.restricted_to(&self.visibility())
    }

    /// Validation outcome of `question`; hidden questions are vacuously fine.
    pub fn check_question(&self, question: &QuestionSpec) -> ValidationResult {
        if !self.is_visible(question) {
            return ValidationResult::ok();
        }
        validate_question(question, self.answers.get(question.id.as_str()))
    }

    pub fn is_question_satisfied(&self, question: &QuestionSpec) -> bool {
        self.check_question(question).valid
    }

    fn question(&self, question_id: &str) -> Result<&'f QuestionSpec, AnswerError> {
        self.funnel
            .question(question_id)
            .ok_or_else(|| AnswerError::UnknownQuestion {
                question_id: question_id.into(),
            })
    }
}
