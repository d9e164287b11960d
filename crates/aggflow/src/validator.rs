use crate::error::{ErrorCode, SpecError, SpecResult};

/// Collects every problem found while compiling a pipeline document so the
/// caller sees all of them at once.
#[derive(Debug, Default)]
pub struct ValidationCtx {
    errors: Vec<SpecError>,
}

impl ValidationCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: ErrorCode, message: impl Into<String>, path: impl Into<String>) {
        self.errors.push(SpecError::new(code, message).with_path(path));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[SpecError] {
        &self.errors
    }

    /// Returns `value` when nothing was reported.
    pub fn finish<T>(self, value: T) -> SpecResult<T> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.errors)
        }
    }
}

/// Variable names bound by `$let` must look like identifiers and must not
/// shadow the system variables.
pub fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
