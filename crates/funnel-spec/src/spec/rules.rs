use std::borrow::Cow;

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One declarative constraint checked against an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    MinLength(usize),
    MaxLength(usize),
    Pattern {
        pattern: String,
        message: Option<String>,
    },
    Min(f64),
    Max(f64),
    Email,
}

impl Rule {
    /// Wire key the rule is declared under.
    pub fn key(&self) -> &'static str {
        match self {
            Rule::MinLength(_) => "minLength",
            Rule::MaxLength(_) => "maxLength",
            Rule::Pattern { .. } => "pattern",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::Email => "email",
        }
    }
}

/// Validation rules in the order they were declared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationRules {
    rules: Vec<Rule>,
    required: bool,
}

impl ValidationRules {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            required: false,
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// `required` flag carried inside the rule set itself.
    pub fn required(&self) -> bool {
        self.required
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && !self.required
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, String> {
        let mut rules = Vec::new();
        let mut required = false;
        let mut pattern_message = None;

        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "minLength" => rules.push(Rule::MinLength(as_length(&key, &value)?)),
                "maxLength" => rules.push(Rule::MaxLength(as_length(&key, &value)?)),
                "min" => rules.push(Rule::Min(as_number(&key, &value)?)),
                "max" => rules.push(Rule::Max(as_number(&key, &value)?)),
                "pattern" => {
                    let pattern = value
                        .as_str()
                        .ok_or_else(|| "validation.pattern must be a string".to_string())?;
                    if !pattern.is_empty() {
                        rules.push(Rule::Pattern {
                            pattern: pattern.to_string(),
                            message: None,
                        });
                    }
                }
                "patternMessage" => {
                    pattern_message = value
                        .as_str()
                        .filter(|message| !message.is_empty())
                        .map(String::from);
                }
                "email" => {
                    if as_flag(&value) {
                        rules.push(Rule::Email);
                    }
                }
                "required" => required = as_flag(&value),
                _ => {}
            }
        }

        if let Some(text) = pattern_message {
            for rule in rules.iter_mut() {
                if let Rule::Pattern { message, .. } = rule {
                    *message = Some(text.clone());
                }
            }
        }

        Ok(Self { rules, required })
    }
}

fn as_number(key: &str, value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|number| number.is_finite())
    .ok_or_else(|| format!("validation.{} must be a number", key))
}

fn as_length(key: &str, value: &Value) -> Result<usize, String> {
    let number = as_number(key, value)?;
    if number < 0.0 || number.fract() != 0.0 {
        return Err(format!("validation.{} must be a non-negative integer", key));
    }
    Ok(number as usize)
}

fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => matches!(text.as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

impl<'de> Deserialize<'de> for ValidationRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        ValidationRules::from_map(map).map_err(de::Error::custom)
    }
}

impl Serialize for ValidationRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for rule in &self.rules {
            match rule {
                Rule::MinLength(len) | Rule::MaxLength(len) => map.serialize_entry(rule.key(), len)?,
                Rule::Min(bound) | Rule::Max(bound) => map.serialize_entry(rule.key(), bound)?,
                Rule::Pattern { pattern, message } => {
                    map.serialize_entry("pattern", pattern)?;
                    if let Some(message) = message {
                        map.serialize_entry("patternMessage", message)?;
                    }
                }
                Rule::Email => map.serialize_entry("email", &true)?,
            }
        }
        if self.required {
            map.serialize_entry("required", &true)?;
        }
        map.end()
    }
}

/// Schema-only mirror of the accepted validation keys.
#[derive(JsonSchema)]
#[schemars(rename_all = "camelCase")]
#[allow(dead_code)]
struct ValidationRulesSchema {
    min_length: Option<u64>,
    max_length: Option<u64>,
    pattern: Option<String>,
    pattern_message: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    email: Option<bool>,
    required: Option<bool>,
}

impl JsonSchema for ValidationRules {
    fn schema_name() -> Cow<'static, str> {
        "ValidationRules".into()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        ValidationRulesSchema::json_schema(generator)
    }
}
