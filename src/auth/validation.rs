//! Input validation for the auth endpoints.
//!
//! Every field is checked and all failures are collected; a single field
//! stops at its first failing rule.

use serde_json::{json, Map, Value};
use std::fmt;
use validator::ValidateEmail;

pub const MIN_PASSWORD_LEN: usize = 6;

/// How the collected messages are rendered in a 422 body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `{"errors": ["...", "..."]}`
    Messages,
    /// `{"email": ["..."], "password": ["..."]}`
    ByField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    layout: Layout,
    fields: Vec<(&'static str, Vec<String>)>,
}

impl ValidationErrors {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            fields: Vec::new(),
        }
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        let message = message.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, messages)) => messages.push(message),
            None => self.fields.push((field, vec![message])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| *name == field)
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .flat_map(|(_, messages)| messages.iter().map(String::as_str))
    }

    pub fn to_json(&self) -> Value {
        match self.layout {
            Layout::Messages => json!({ "errors": self.messages().collect::<Vec<_>>() }),
            Layout::ByField => {
                let map: Map<String, Value> = self
                    .fields
                    .iter()
                    .map(|(name, messages)| (name.to_string(), json!(messages)))
                    .collect();
                Value::Object(map)
            }
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.messages().collect();
        write!(f, "{}", joined.join(" "))
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn required<'a>(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    let value = present(value);
    if value.is_none() {
        errors.add(field, format!("The {} field is required.", field));
    }
    value
}

/// Returns the email back only when it is present and well formed.
pub(crate) fn email<'a>(errors: &mut ValidationErrors, value: Option<&'a str>) -> Option<&'a str> {
    let value = required(errors, "email", value)?;
    if value.validate_email() {
        Some(value)
    } else {
        errors.add("email", "The email must be a valid email address.");
        None
    }
}

pub(crate) fn password<'a>(
    errors: &mut ValidationErrors,
    value: Option<&'a str>,
) -> Option<&'a str> {
    let value = required(errors, "password", value)?;
    if value.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("The password must be at least {} characters.", MIN_PASSWORD_LEN),
        );
        return None;
    }
    Some(value)
}
