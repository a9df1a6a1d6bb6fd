use chrono::{DateTime, Local};

pub const MIN_FIELD_LENGTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Absent,
}

impl FieldValue {
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Flag(true) => "true",
            Self::Flag(false) => "false",
            Self::Absent => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Input,
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    MinLength(usize),
}

impl Validator {
    pub fn check(self, value: &str) -> Option<String> {
        match self {
            Self::MinLength(minimum) if value.chars().count() < minimum => {
                Some(format!("Must be at least {minimum} characters long."))
            }
            Self::MinLength(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub failures: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldState {
    #[default]
    Unvalidated,
    Valid,
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub id: String,
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub value: FieldValue,
    pub is_sensitive: bool,
    pub validators: Vec<Validator>,
    pub help_text: String,
    pub placeholder: String,
    pub state: FieldState,
}

impl Field {
    pub fn validate(&self, value: &str) -> ValidationResult {
        ValidationResult {
            failures: self
                .validators
                .iter()
                .filter_map(|validator| validator.check(value))
                .collect(),
        }
    }

    /// Re-run the validators and move the field out of `Unvalidated`.
    pub fn apply_validation(&mut self, value: &str) -> ValidationResult {
        let result = self.validate(value);
        self.state = if result.is_valid() {
            FieldState::Valid
        } else {
            FieldState::Invalid(result.failures.clone())
        };
        result
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.state, FieldState::Invalid(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            title: None,
            message: message.into(),
            severity: Severity::Information,
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StampedNotice {
    pub notice: Notice,
    pub at: DateTime<Local>,
}
