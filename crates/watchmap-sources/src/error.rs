use std::fmt;

/// Failure reported by a library source adapter
#[derive(Debug)]
pub struct SourceError {
    source_name: String,
    message: String,
}

impl SourceError {
    pub fn new(source_name: &str, message: String) -> Self {
        Self {
            source_name: source_name.to_string(),
            message,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_name, self.message)
    }
}

impl std::error::Error for SourceError {}
