use serde::Deserialize;

use crate::forms::{FieldErrors, FormView};

pub const TITLE_MAX: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedbackForm {
    pub title: String,
    pub content: String,
}

impl FeedbackForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check_text("title", &self.title, Some(TITLE_MAX));
        errors.check_text("content", &self.content, None);
        errors
    }

    pub fn view(&self, form: &'static str, errors: FieldErrors) -> FormView {
        FormView::empty(form)
            .value("title", &self.title)
            .value("content", &self.content)
            .with_errors(errors)
    }
}
