//! Error types for repository operations.
//!
//! Every error carries an [`ErrorContext`] naming the operation and the
//! record involved; services map the variant to a user-facing kind and only
//! ever show the bare message.

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a repository error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Repository method, e.g. `transition_report`.
    pub operation: Option<String>,
    /// Record type: `analysis`, `prediction`, `report`, `template`, `schedule`.
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    /// Free-form specifics, e.g. the state that was found.
    pub details: Option<String>,
    /// Whether the same call may succeed later.
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    /// Renders as `(operation entity/id: details)`, or nothing for an empty context.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match (&self.entity, &self.entity_id) {
            (Some(entity), Some(id)) => Some(format!("{}/{}", entity, id)),
            (Some(entity), None) => Some(entity.clone()),
            (None, Some(id)) => Some(id.clone()),
            (None, None) => None,
        };
        let parts: Vec<&str> = [self.operation.as_deref(), target.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() && self.details.is_none() {
            return Ok(());
        }
        match &self.details {
            Some(details) if parts.is_empty() => write!(f, "({})", details)?,
            Some(details) => write!(f, "({}: {})", parts.join(" "), details)?,
            None => write!(f, "({})", parts.join(" "))?,
        }
        if self.retryable {
            f.write_str(" [retryable]")?;
        }
        Ok(())
    }
}

/// Error type for repository operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    /// Backing store unreachable.
    #[error("Connection error: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    /// Record does not exist.
    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Record exists but belongs to another owner.
    #[error("Forbidden: {message} {context}")]
    Forbidden {
        message: String,
        context: ErrorContext,
    },

    /// Compare-and-set lost: the stored state is not the expected one.
    #[error("Conflict: {message} {context}")]
    Conflict {
        message: String,
        context: ErrorContext,
    },

    #[error("Data validation error: {message} {context}")]
    ValidationError {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message} {context}")]
    ConfigurationError {
        message: String,
        context: ErrorContext,
    },

    #[error("Internal error: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },

    #[error("Timeout error: {message} {context}")]
    TimeoutError {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::not_found_with_context(message, ErrorContext::default())
    }

    pub fn not_found_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn forbidden_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Forbidden {
            message: message.into(),
            context,
        }
    }

    pub fn conflict_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Conflict {
            message: message.into(),
            context,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    fn parts(&self) -> (&str, &ErrorContext) {
        match self {
            Self::ConnectionError { message, context }
            | Self::NotFound { message, context }
            | Self::Forbidden { message, context }
            | Self::Conflict { message, context }
            | Self::ValidationError { message, context }
            | Self::ConfigurationError { message, context }
            | Self::InternalError { message, context }
            | Self::TimeoutError { message, context } => (message, context),
        }
    }

    /// The message alone, safe to show to the caller.
    pub fn message(&self) -> &str {
        self.parts().0
    }

    pub fn context(&self) -> &ErrorContext {
        self.parts().1
    }

    /// Transient failures, or any error whose context was marked retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::TimeoutError { .. }
        ) || self.context().retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext::new("get_report")
            .with_entity("report")
            .with_entity_id(42);
        assert_eq!(ctx.to_string(), "(get_report report/42)");
        assert_eq!(ErrorContext::default().to_string(), "");
        let detailed = ErrorContext::new("transition_report")
            .with_entity("report")
            .with_details("found completed");
        assert_eq!(detailed.to_string(), "(transition_report report: found completed)");
    }

    #[test]
    fn test_message_omits_context() {
        let err = RepositoryError::forbidden_with_context(
            "Report belongs to another owner",
            ErrorContext::new("get_report").with_entity("report"),
        );
        assert_eq!(err.message(), "Report belongs to another owner");
        assert_eq!(
            err.to_string(),
            "Forbidden: Report belongs to another owner (get_report report)"
        );
    }

    #[test]
    fn test_retryable() {
        let down = RepositoryError::ConnectionError {
            message: "down".into(),
            context: ErrorContext::default(),
        };
        assert!(down.is_retryable());
        assert!(!RepositoryError::not_found("gone").is_retryable());
        let marked = RepositoryError::conflict_with_context(
            "raced",
            ErrorContext::new("transition_report").retryable(),
        );
        assert!(marked.is_retryable());
    }
}
