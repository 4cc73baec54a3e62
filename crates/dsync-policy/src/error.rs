//! Error types for access document handling

/// Errors raised while reading, merging or building access documents
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Document text is not a JSON object with the expected field types
    #[error("malformed access document: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A statement is not a JSON object
    #[error("statement {index} is not a JSON object")]
    StatementNotObject { index: usize },

    /// A statement object could not be read (e.g. non-string `Sid`)
    #[error("statement {index} is invalid: {source}")]
    InvalidStatement {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Two statements share the same `Sid`
    #[error("duplicate statement id: '{0}'")]
    DuplicateSid(String),

    /// A statement handed to the merge is not in the owned set
    #[error("statement id {sid:?} is not owned by this tool")]
    ForeignStatement { sid: Option<String> },

    /// Serializing a document or statement failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl PolicyError {
    /// Create a foreign statement error
    pub fn foreign(sid: Option<&str>) -> Self {
        Self::ForeignStatement {
            sid: sid.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_sid_display() {
        let err = PolicyError::DuplicateSid("AllowCI".to_string());
        assert_eq!(err.to_string(), "duplicate statement id: 'AllowCI'");
    }

    #[test]
    fn foreign_statement_display() {
        let err = PolicyError::foreign(None);
        assert!(err.to_string().contains("not owned"));
    }
}
