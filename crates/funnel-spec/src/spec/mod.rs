pub mod condition;
pub mod funnel;
pub mod id;
pub mod question;
pub mod rules;

pub use condition::{Combinator, Condition, ConditionalRule, Operator};
pub use funnel::{FormEndpoint, FunnelSettings, FunnelSpec, TrackingConfig};
pub use id::{FunnelId, QuestionId};
pub use question::{AnswerShape, ChoiceOption, FieldSpec, QuestionOptions, QuestionSpec, QuestionType};
pub use rules::{Rule, ValidationRules};
