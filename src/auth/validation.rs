//! Form validation for the auth pages.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::password::MIN_PASSWORD_LENGTH;
use crate::models::{LoginForm, RecoverEndForm, RecoverStartForm, RegisterForm};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r".*@.*\.[a-z]+").unwrap());

/// Field name -> messages, in field order. Empty means the form is valid.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Rule
///
/// A single field's constraints.
pub struct Rule {
    pub field: &'static str,
    pub required: bool,
    pub min_length: usize,
    pub must_match: Option<(&'static Regex, &'static str)>,
}

impl Rule {
    const fn required(field: &'static str) -> Self {
        Self {
            field,
            required: true,
            min_length: 0,
            must_match: None,
        }
    }

    /// Messages for `value`; empty when it passes.
    pub fn check(&self, value: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if value.is_empty() {
            if self.required {
                errors.push("Cannot be blank".to_string());
            }
            return errors;
        }

        if value.chars().count() < self.min_length {
            let plural = if self.min_length == 1 { "" } else { "s" };
            errors.push(format!(
                "Must be at least {} character{plural}",
                self.min_length
            ));
        }
        if let Some((regex, message)) = self.must_match {
            if !regex.is_match(value) {
                errors.push(message.to_string());
            }
        }
        errors
    }
}

fn email_rule() -> Rule {
    Rule {
        must_match: Some((&*EMAIL_REGEX, "Must be a valid e-mail address")),
        ..Rule::required("email")
    }
}

fn password_rule() -> Rule {
    Rule {
        min_length: MIN_PASSWORD_LENGTH,
        ..Rule::required("password")
    }
}

fn apply(errors: &mut FieldErrors, rule: &Rule, value: &str) {
    let messages = rule.check(value);
    if !messages.is_empty() {
        errors
            .entry(rule.field.to_string())
            .or_default()
            .extend(messages);
    }
}

fn confirm_matches(errors: &mut FieldErrors, field: &str, value: &str, confirm: &str) {
    if value != confirm {
        errors
            .entry(format!("confirm_{field}"))
            .or_default()
            .push(format!("Does not match {field}"));
    }
}

/// Login only checks presence; credential failures are reported as a whole.
pub fn validate_login(form: &LoginForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    apply(&mut errors, &Rule::required("email"), &form.email);
    apply(&mut errors, &Rule::required("password"), &form.password);
    errors
}

pub fn validate_register(form: &RegisterForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    apply(&mut errors, &email_rule(), &form.email);
    apply(&mut errors, &password_rule(), &form.password);
    confirm_matches(&mut errors, "password", &form.password, &form.confirm_password);
    errors
}

pub fn validate_recover_start(form: &RecoverStartForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    apply(&mut errors, &email_rule(), &form.email);
    errors
}

pub fn validate_recover_end(form: &RecoverEndForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    apply(&mut errors, &Rule::required("token"), &form.token);
    apply(&mut errors, &password_rule(), &form.password);
    confirm_matches(&mut errors, "password", &form.password, &form.confirm_password);
    errors
}
