use thiserror::Error;

use crate::category::Category;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    #[error("Invalid category '{value}', expected one of: {}", Category::names().join(", "))]
    Invalid { value: String },
}

impl CategoryError {
    /// The accepted category names, for error payloads.
    pub fn valid_categories(&self) -> Vec<&'static str> {
        Category::names()
    }
}
