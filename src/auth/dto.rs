use serde::Deserialize;

use crate::forms::{FieldErrors, FormView};

pub const USERNAME_MAX: usize = 20;
pub const EMAIL_MAX: usize = 50;
pub const NAME_MAX: usize = 30;

/// Registration form body. Missing fields deserialize as empty strings so
/// they come back as field errors instead of a rejected request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterForm {
    /// Trim identifiers and lowercase the email.
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check_username("username", &self.username, USERNAME_MAX);
        errors.check_text("password", &self.password, None);
        errors.check_email("email", &self.email, EMAIL_MAX);
        errors.check_text("first_name", &self.first_name, Some(NAME_MAX));
        errors.check_text("last_name", &self.last_name, Some(NAME_MAX));
        errors
    }

    pub fn view(&self, errors: FieldErrors) -> FormView {
        FormView::empty("register")
            .value("username", &self.username)
            .value("email", &self.email)
            .value("first_name", &self.first_name)
            .value("last_name", &self.last_name)
            .with_errors(errors)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check_text("username", &self.username, None);
        errors.check_text("password", &self.password, None);
        errors
    }

    pub fn view(&self, errors: FieldErrors) -> FormView {
        FormView::empty("login")
            .value("username", &self.username)
            .with_errors(errors)
    }
}
