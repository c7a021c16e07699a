//! Report text sanitization.
//!
//! The server only relies on the [`Sanitizer`] contract: whatever comes out
//! is safe to store and display. The bundled implementation drops control
//! characters, trims, and enforces the length cap.

use vigil_shared::constants::MAX_CONTENT_LEN;

pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, raw: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct LengthCapSanitizer {
    max_chars: usize,
}

impl LengthCapSanitizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for LengthCapSanitizer {
    fn default() -> Self {
        Self::new(MAX_CONTENT_LEN)
    }
}

impl Sanitizer for LengthCapSanitizer {
    fn sanitize(&self, raw: &str) -> String {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect();
        cleaned.trim().chars().take(self.max_chars).collect()
    }
}
