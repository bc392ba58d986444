#![allow(missing_docs)]

pub mod answers;
pub mod check;
pub mod spec;
pub mod store;
pub mod validate;
pub mod visibility;

pub use answers::{AnswerError, AnswerSet, AnswerValue, ValidationResult, check_shape};
pub use check::{DefinitionError, check_definition};
pub use spec::{
    AnswerShape, ChoiceOption, Combinator, Condition, ConditionalRule, FieldSpec, FormEndpoint,
    FunnelId, FunnelSettings, FunnelSpec, Operator, QuestionId, QuestionOptions, QuestionSpec,
    QuestionType, Rule, TrackingConfig, ValidationRules,
};
pub use store::AnswerStore;
pub use validate::{validate, validate_question};
pub use visibility::{VisibilityMap, is_visible, resolve_visibility};
