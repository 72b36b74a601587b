use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

pub const REQUIRED: &str = "This field is required.";

/// Errors keyed by form field.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Input required, at most `max` characters.
    pub fn check_text(&mut self, field: &'static str, value: &str, max: Option<usize>) {
        if value.trim().is_empty() {
            self.add(field, REQUIRED);
            return;
        }
        if let Some(max) = max {
            if value.chars().count() > max {
                self.add(field, format!("Must be at most {max} characters."));
            }
        }
    }

    /// Usernames end up in URL paths, so only a path-safe set is allowed.
    pub fn check_username(&mut self, field: &'static str, value: &str, max: usize) {
        self.check_text(field, value, Some(max));
        if self.get(field).is_none() && !is_valid_username(value) {
            self.add(field, "Only letters, digits, '.', '_' and '-' are allowed.");
        }
    }

    pub fn check_email(&mut self, field: &'static str, value: &str, max: usize) {
        self.check_text(field, value, Some(max));
        if self.get(field).is_none() && !is_valid_email(value) {
            self.add(field, "Invalid email address.");
        }
    }
}

/// Form as shown to the client: which form, the values to pre-fill, and
/// errors per field. Passwords are never put in `values`.
#[derive(Debug, Serialize)]
pub struct FormView {
    pub form: &'static str,
    pub values: BTreeMap<&'static str, String>,
    pub errors: FieldErrors,
}

impl FormView {
    pub fn empty(form: &'static str) -> Self {
        Self {
            form,
            values: BTreeMap::new(),
            errors: FieldErrors::new(),
        }
    }

    pub fn value(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    pub fn with_errors(mut self, errors: FieldErrors) -> Self {
        self.errors = errors;
        self
    }
}

pub fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}
