//! Declarative validation of submissions.
//!
//! Each tenant carries a set of per-field rules. A rule may require the
//! field, constrain its type, its length, a pattern it must start with, a
//! numeric range or a fixed set of allowed values:
//!
//! ```json
//! {
//!   "email":    { "required": true, "type": "email" },
//!   "name":     { "required": true, "type": "string", "min_length": 2, "max_length": 80 },
//!   "age":      { "type": "number", "min": 18 },
//!   "plan":     { "one_of": ["free", "pro"] },
//!   "zip":      { "pattern": "[0-9]{5}" }
//! }
//! ```
//!
//! Rules are data only. Unknown rule keys are rejected when the rules are
//! loaded, so a profile asking for custom code does not load at all.
//!
//! Independently of the rules, a submission carrying `password` must carry a
//! matching `confirm_password`.

use std::collections::BTreeMap;
use std::fmt;

use formgate_persistence::types::{CONFIRM_PASSWORD_FIELD, FieldValue, Record};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field checked against [`CONFIRM_PASSWORD_FIELD`].
pub const PASSWORD_FIELD: &str = "password";

/// Rules for one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldRule {
    /// The field must be present and neither null nor empty text.
    pub required: bool,

    /// Expected kind of value.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,

    /// Minimum length of text, in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Maximum length of text, in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Regular expression the text must match at its start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Smallest allowed number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Largest allowed number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Allowed values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
}

/// Value kinds a rule can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text.
    String,
    /// Integer or fractional number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// Text containing an `@`.
    Email,
}

impl FieldType {
    fn accepts(&self, value: &FieldValue) -> bool {
        match self {
            FieldType::String => matches!(value, FieldValue::Text(_)),
            FieldType::Number => matches!(value, FieldValue::Integer(_) | FieldValue::Float(_)),
            FieldType::Boolean => matches!(value, FieldValue::Bool(_)),
            FieldType::Email => value.as_str().is_some_and(|s| s.contains('@')),
        }
    }

    fn message(&self) -> &'static str {
        match self {
            FieldType::String => "Must be a string.",
            FieldType::Number => "Must be a number.",
            FieldType::Boolean => "Must be a boolean.",
            FieldType::Email => "Must be a valid email address.",
        }
    }
}

/// A tenant's rules, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationRules(BTreeMap<String, FieldRule>);

impl ValidationRules {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style rule registration.
    pub fn with(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.0.insert(field.into(), rule);
        self
    }

    /// Returns the rule for a field.
    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.0.get(field)
    }

    /// Returns true if no field has rules.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with rules.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks `record` against every rule and the password confirmation.
    ///
    /// All problems are collected; the error lists every failing field.
    pub fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();

        check_password_confirmation(record, &mut errors);

        for (field, rule) in &self.0 {
            match record.get(field) {
                Some(value) => rule.check(field, value, &mut errors),
                None if rule.required => errors.add(field, "This field is required."),
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl FieldRule {
    /// A rule requiring the field.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Builder-style type constraint.
    pub fn of_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    fn check(&self, field: &str, value: &FieldValue, errors: &mut ValidationError) {
        if is_blank(value) {
            if self.required {
                errors.add(field, "This field is required.");
            }
            return;
        }

        if let Some(field_type) = self.field_type
            && !field_type.accepts(value)
        {
            errors.add(field, field_type.message());
        }

        if let Some(text) = value.as_str() {
            let length = text.chars().count();
            if let Some(min) = self.min_length
                && length < min
            {
                errors.add(field, format!("Must be at least {min} characters."));
            }
            if let Some(max) = self.max_length
                && length > max
            {
                errors.add(field, format!("Must be at most {max} characters."));
            }
            if let Some(pattern) = &self.pattern {
                match Regex::new(&format!("^(?:{pattern})")) {
                    Ok(re) if re.is_match(text) => {}
                    Ok(_) => errors.add(field, "Does not match the required pattern."),
                    Err(_) => errors.add(field, "The validation pattern for this field is invalid."),
                }
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = self.min
                && number < min
            {
                errors.add(field, format!("Must be at least {min}."));
            }
            if let Some(max) = self.max
                && number > max
            {
                errors.add(field, format!("Must be at most {max}."));
            }
        }

        if let Some(allowed) = &self.one_of
            && !allowed.iter().any(|candidate| FieldValue::from(candidate) == *value)
        {
            let choices: Vec<String> = allowed.iter().map(|v| FieldValue::from(v).to_string()).collect();
            errors.add(field, format!("Must be one of: {}.", choices.join(", ")));
        }
    }
}

fn check_password_confirmation(record: &Record, errors: &mut ValidationError) {
    let Some(password) = record.get(PASSWORD_FIELD) else {
        return;
    };
    match record.get(CONFIRM_PASSWORD_FIELD) {
        Some(confirm) if confirm == password => {}
        Some(_) => errors.add(CONFIRM_PASSWORD_FIELD, "Passwords do not match."),
        None => errors.add(CONFIRM_PASSWORD_FIELD, "Confirm password is required."),
    }
}

fn is_blank(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Text(s) => s.is_empty(),
        _ => false,
    }
}

/// Field-level validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Messages for each failing field.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Records a message for `field`.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Returns true if no field failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages for one field.
    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.errors.keys().map(String::as_str).collect();
        write!(f, "validation failed for {}", fields.join(", "))
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(value: Value) -> ValidationRules {
        serde_json::from_value(value).unwrap()
    }

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn test_empty_rules_accept_anything() {
        let rules = ValidationRules::new();
        assert!(rules.validate(&record(json!({"anything": [1, 2]}))).is_ok());
    }

    #[test]
    fn test_required_field() {
        let rules = rules(json!({"email": {"required": true}}));

        let err = rules.validate(&record(json!({"name": "Jo"}))).unwrap_err();
        assert_eq!(err.messages("email"), ["This field is required."]);

        let err = rules.validate(&record(json!({"email": ""}))).unwrap_err();
        assert_eq!(err.messages("email"), ["This field is required."]);

        let err = rules.validate(&record(json!({"email": null}))).unwrap_err();
        assert_eq!(err.messages("email"), ["This field is required."]);

        assert!(rules.validate(&record(json!({"email": "jo@x.com"}))).is_ok());
    }

    #[test]
    fn test_blank_optional_field_skips_other_rules() {
        let rules = rules(json!({"nickname": {"min_length": 3, "type": "string"}}));
        assert!(rules.validate(&record(json!({"nickname": ""}))).is_ok());
    }

    #[test]
    fn test_types() {
        let rules = rules(json!({
            "name": {"type": "string"},
            "age": {"type": "number"},
            "active": {"type": "boolean"},
            "email": {"type": "email"},
        }));

        assert!(rules
            .validate(&record(json!({"name": "Ann", "age": 30.5, "active": true, "email": "a@b.c"})))
            .is_ok());

        let err = rules
            .validate(&record(json!({"name": 1, "age": "30", "active": "yes", "email": "ann"})))
            .unwrap_err();
        assert_eq!(err.messages("name"), ["Must be a string."]);
        assert_eq!(err.messages("age"), ["Must be a number."]);
        assert_eq!(err.messages("active"), ["Must be a boolean."]);
        assert_eq!(err.messages("email"), ["Must be a valid email address."]);
    }

    #[test]
    fn test_lengths_count_characters() {
        let rules = rules(json!({"name": {"min_length": 2, "max_length": 4}}));

        assert!(rules.validate(&record(json!({"name": "Zoë"}))).is_ok());

        let err = rules.validate(&record(json!({"name": "Z"}))).unwrap_err();
        assert_eq!(err.messages("name"), ["Must be at least 2 characters."]);

        let err = rules.validate(&record(json!({"name": "Zoëlle"}))).unwrap_err();
        assert_eq!(err.messages("name"), ["Must be at most 4 characters."]);
    }

    #[test]
    fn test_pattern_is_anchored_at_start_only() {
        let rules = rules(json!({"zip": {"pattern": "[0-9]{5}"}}));

        assert!(rules.validate(&record(json!({"zip": "12345"}))).is_ok());
        assert!(rules.validate(&record(json!({"zip": "12345-678"}))).is_ok());

        let err = rules.validate(&record(json!({"zip": "ab12345"}))).unwrap_err();
        assert_eq!(err.messages("zip"), ["Does not match the required pattern."]);
    }

    #[test]
    fn test_invalid_pattern_is_a_field_error() {
        let rules = rules(json!({"zip": {"pattern": "([0-9"}}));
        let err = rules.validate(&record(json!({"zip": "12345"}))).unwrap_err();
        assert_eq!(
            err.messages("zip"),
            ["The validation pattern for this field is invalid."]
        );
    }

    #[test]
    fn test_numeric_range() {
        let rules = rules(json!({"age": {"min": 18, "max": 130}}));

        assert!(rules.validate(&record(json!({"age": 18}))).is_ok());

        let err = rules.validate(&record(json!({"age": 17}))).unwrap_err();
        assert_eq!(err.messages("age"), ["Must be at least 18."]);

        let err = rules.validate(&record(json!({"age": 131.5}))).unwrap_err();
        assert_eq!(err.messages("age"), ["Must be at most 130."]);

        // Range checks apply to numbers only.
        assert!(rules.validate(&record(json!({"age": "7"}))).is_ok());
    }

    #[test]
    fn test_one_of() {
        let rules = rules(json!({"plan": {"one_of": ["free", "pro"]}}));

        assert!(rules.validate(&record(json!({"plan": "pro"}))).is_ok());

        let err = rules.validate(&record(json!({"plan": "gold"}))).unwrap_err();
        assert_eq!(err.messages("plan"), ["Must be one of: free, pro."]);
    }

    #[test]
    fn test_messages_accumulate_per_field() {
        let rules = rules(json!({"code": {"type": "email", "min_length": 5}}));
        let err = rules.validate(&record(json!({"code": "abc"}))).unwrap_err();
        assert_eq!(
            err.messages("code"),
            ["Must be a valid email address.", "Must be at least 5 characters."]
        );
    }

    #[test]
    fn test_password_confirmation() {
        let rules = ValidationRules::new();

        assert!(rules
            .validate(&record(json!({"password": "pw1", "confirm_password": "pw1"})))
            .is_ok());

        let err = rules
            .validate(&record(json!({"password": "pw1", "confirm_password": "pw2"})))
            .unwrap_err();
        assert_eq!(err.messages("confirm_password"), ["Passwords do not match."]);

        let err = rules.validate(&record(json!({"password": "pw1"}))).unwrap_err();
        assert_eq!(err.messages("confirm_password"), ["Confirm password is required."]);
    }

    #[test]
    fn test_all_failures_reported() {
        let rules = rules(json!({
            "email": {"required": true},
            "name": {"required": true},
        }));
        let err = rules
            .validate(&record(json!({"password": "a", "confirm_password": "b"})))
            .unwrap_err();
        assert_eq!(
            err.errors.keys().collect::<Vec<_>>(),
            vec!["confirm_password", "email", "name"]
        );
        assert_eq!(
            err.to_string(),
            "validation failed for confirm_password, email, name"
        );
    }

    #[test]
    fn test_custom_code_rules_do_not_load() {
        let result: Result<ValidationRules, _> = serde_json::from_value(json!({
            "name": {"custom_validator": "def validate_custom(v): return True"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_builder() {
        let rules = ValidationRules::new().with("email", FieldRule::required().of_type(FieldType::Email));
        let rule = rules.get("email").unwrap();
        assert!(rule.required);
        assert_eq!(rule.field_type, Some(FieldType::Email));
    }
}
