use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::condition::ConditionalRule;
use crate::spec::id::{QuestionId, empty_as_default, string_or_number};
use crate::spec::rules::ValidationRules;

/// Closed set of question kinds a funnel may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    TextInput,
    ImageSelection,
    IconSelection,
    TextSelection,
    MultiInput,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::TextInput => "text_input",
            QuestionType::ImageSelection => "image_selection",
            QuestionType::IconSelection => "icon_selection",
            QuestionType::TextSelection => "text_selection",
            QuestionType::MultiInput => "multi_input",
        }
    }

    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            QuestionType::ImageSelection | QuestionType::IconSelection | QuestionType::TextSelection
        )
    }
}

/// Legal shape of an answer, derived from the question kind and options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerShape {
    Text,
    SingleChoice,
    MultiChoice,
    Fields,
}

impl AnswerShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerShape::Text => "text",
            AnswerShape::SingleChoice => "single choice",
            AnswerShape::MultiChoice => "multiple choices",
            AnswerShape::Fields => "field mapping",
        }
    }
}

impl std::fmt::Display for AnswerShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable option of a selection question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChoiceOption {
    #[serde(deserialize_with = "string_or_number")]
    #[schemars(with = "String")]
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// One sub-field of a multi-input question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Kind-dependent options payload. Members irrelevant to the kind stay empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOptions {
    #[serde(default)]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

/// A single step of a funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionSpec {
    pub id: QuestionId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default, deserialize_with = "empty_as_default")]
    #[schemars(with = "QuestionOptions")]
    pub options: QuestionOptions,
    #[serde(default, deserialize_with = "empty_as_default")]
    #[schemars(with = "ValidationRules")]
    pub validation: ValidationRules,
    #[serde(default, deserialize_with = "empty_as_default")]
    #[schemars(with = "ConditionalRule")]
    pub conditional: ConditionalRule,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub position: i64,
}

impl QuestionSpec {
    pub fn answer_shape(&self) -> AnswerShape {
        match self.kind {
            QuestionType::TextInput => AnswerShape::Text,
            QuestionType::ImageSelection | QuestionType::IconSelection | QuestionType::TextSelection => {
                if self.options.multiple {
                    AnswerShape::MultiChoice
                } else {
                    AnswerShape::SingleChoice
                }
            }
            QuestionType::MultiInput => AnswerShape::Fields,
        }
    }

    /// Required either by the question flag or by the rule set.
    pub fn is_required(&self) -> bool {
        self.required || self.validation.required()
    }

    pub fn choice(&self, id: &str) -> Option<&ChoiceOption> {
        self.options.choices.iter().find(|choice| choice.id == id)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.options.fields.iter().find(|field| field.name == name)
    }
}
