use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::answers::{AnswerSet, AnswerValue};
use crate::spec::id::{QuestionId, value_text};

/// How the conditions of a rule are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    IsAnswered,
    IsNotAnswered,
}

/// A single `(questionId, operator, value)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub question_id: QuestionId,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// Conditional visibility of a question. No conditions means always visible.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRule {
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ConditionalRule {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the rule against an answer snapshot.
    pub fn evaluate(&self, answers: &AnswerSet) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        match self.combinator {
            Combinator::And => self
                .conditions
                .iter()
                .all(|condition| condition.evaluate(answers)),
            Combinator::Or => self
                .conditions
                .iter()
                .any(|condition| condition.evaluate(answers)),
        }
    }
}

impl Condition {
    /// Missing and empty answers both count as not answered.
    pub fn evaluate(&self, answers: &AnswerSet) -> bool {
        let answer = answers
            .get(self.question_id.as_str())
            .filter(|answer| !answer.is_empty());
        match self.operator {
            Operator::IsAnswered => answer.is_some(),
            Operator::IsNotAnswered => answer.is_none(),
            Operator::Equals => answer.is_some_and(|answer| equals(answer, &self.value)),
            Operator::NotEquals => !answer.is_some_and(|answer| equals(answer, &self.value)),
            Operator::Contains => answer.is_some_and(|answer| contains(answer, &self.value)),
        }
    }
}

fn text_set(value: &Value) -> Option<BTreeSet<String>> {
    match value {
        Value::Array(items) => items.iter().map(value_text).collect(),
        other => value_text(other).map(|text| BTreeSet::from([text])),
    }
}

fn equals(answer: &AnswerValue, expected: &Value) -> bool {
    match answer {
        AnswerValue::Text(text) | AnswerValue::Choice(text) => {
            value_text(expected).is_some_and(|expected| *text == expected)
        }
        AnswerValue::Choices(selected) => text_set(expected).is_some_and(|set| set == *selected),
        AnswerValue::Fields(fields) => expected.as_object().is_some_and(|object| {
            object.len() == fields.len()
                && object.iter().all(|(name, value)| {
                    fields.get(name).map(String::as_str) == value_text(value).as_deref()
                })
        }),
    }
}

fn contains(answer: &AnswerValue, expected: &Value) -> bool {
    match answer {
        AnswerValue::Text(text) => value_text(expected).is_some_and(|needle| text.contains(&needle)),
        AnswerValue::Choice(choice) => value_text(expected).is_some_and(|id| *choice == id),
        AnswerValue::Choices(selected) => {
            text_set(expected).is_some_and(|wanted| !wanted.is_empty() && wanted.is_subset(selected))
        }
        AnswerValue::Fields(fields) => value_text(expected)
            .is_some_and(|needle| fields.values().any(|value| *value == needle)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answers(entries: &[(&str, AnswerValue)]) -> AnswerSet {
        let mut set = AnswerSet::default();
        for (id, value) in entries {
            set.insert(QuestionId::from(*id), value.clone());
        }
        set
    }

    fn rule(value: Value) -> ConditionalRule {
        serde_json::from_value(value).expect("rule")
    }

    #[test]
    fn empty_rule_is_always_true() {
        assert!(ConditionalRule::default().evaluate(&AnswerSet::default()));
    }

    #[test]
    fn combinator_defaults_to_and() {
        let rule = rule(json!({
            "conditions": [
                { "questionId": "q1", "operator": "equals", "value": "yes" },
                { "questionId": "q2", "operator": "is_answered" }
            ]
        }));
        assert_eq!(rule.combinator, Combinator::And);
        let partial = answers(&[("q1", AnswerValue::Choice("yes".into()))]);
        assert!(!rule.evaluate(&partial));
        let full = answers(&[
            ("q1", AnswerValue::Choice("yes".into())),
            ("q2", AnswerValue::Text("hi".into())),
        ]);
        assert!(rule.evaluate(&full));
    }

    #[test]
    fn or_combinator_accepts_any() {
        let rule = rule(json!({
            "combinator": "OR",
            "conditions": [
                { "questionId": "q1", "operator": "equals", "value": "a" },
                { "questionId": "q1", "operator": "equals", "value": "b" }
            ]
        }));
        assert!(rule.evaluate(&answers(&[("q1", AnswerValue::Choice("b".into()))])));
        assert!(!rule.evaluate(&answers(&[("q1", AnswerValue::Choice("c".into()))])));
    }

    #[test]
    fn missing_answers_are_not_answered() {
        let rule = rule(json!({
            "conditions": [{ "questionId": "ghost", "operator": "is_not_answered" }]
        }));
        assert!(rule.evaluate(&AnswerSet::default()));
        let blank = answers(&[("ghost", AnswerValue::Text("   ".into()))]);
        assert!(rule.evaluate(&blank));
    }

    #[test]
    fn not_equals_holds_for_missing_answer() {
        let rule = rule(json!({
            "conditions": [{ "questionId": "q1", "operator": "not_equals", "value": "yes" }]
        }));
        assert!(rule.evaluate(&AnswerSet::default()));
    }

    #[test]
    fn contains_checks_set_membership() {
        let rule = rule(json!({
            "conditions": [{ "questionId": "tags", "operator": "contains", "value": 7 }]
        }));
        let selected = answers(&[(
            "tags",
            AnswerValue::Choices(BTreeSet::from(["3".to_string(), "7".to_string()])),
        )]);
        assert!(rule.evaluate(&selected));
        let other = answers(&[("tags", AnswerValue::Choices(BTreeSet::from(["3".to_string()])))]);
        assert!(!rule.evaluate(&other));
    }

    #[test]
    fn equals_on_fields_requires_identical_mapping() {
        let rule = rule(json!({
            "conditions": [{ "questionId": "contact", "operator": "equals", "value": { "city": "Oslo" } }]
        }));
        let fields = answers(&[(
            "contact",
            AnswerValue::Fields([("city".to_string(), "Oslo".to_string())].into()),
        )]);
        assert!(rule.evaluate(&fields));
    }
}
