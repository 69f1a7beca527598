//! Structured error types for configuration resolution.

use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Startup errors
    Discovery,
    Io,
    Parse,
    Merge,
    SubstitutionCycle,
    InvalidEnvironment,

    // Typed access errors
    MissingField,
    Deserialize,
    NoFactory,
    ConstructionCycle,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Discovery => "DISCOVERY",
            ErrorCode::Io => "IO",
            ErrorCode::Parse => "PARSE",
            ErrorCode::Merge => "MERGE",
            ErrorCode::SubstitutionCycle => "SUBSTITUTION_CYCLE",
            ErrorCode::InvalidEnvironment => "INVALID_ENVIRONMENT",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::Deserialize => "DESERIALIZE",
            ErrorCode::NoFactory => "NO_FACTORY",
            ErrorCode::ConstructionCycle => "CONSTRUCTION_CYCLE",
        };
        f.write_str(s)
    }
}

/// Errors raised while discovering, merging or extracting configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A fragment file name does not follow `<priority>[.<name>][.<env>].conf`.
    #[error("invalid config file name '{file}': {reason}")]
    Discovery { file: String, reason: String },

    #[error("failed to read config fragment {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// A fragment body is not valid configuration text.
    #[error("failed to parse {origin} (line {line}): {message}")]
    Parse {
        origin: String,
        line: usize,
        message: String,
    },

    /// A `${path}` reference could not be resolved against the merged tree.
    #[error("could not resolve substitution ${{{reference}}} from {origin}")]
    Merge { reference: String, origin: String },

    #[error("substitution cycle through ${{{reference}}} from {origin}")]
    SubstitutionCycle { reference: String, origin: String },

    #[error("invalid environment name '{name}': {reason}")]
    Environment { name: String, reason: String },

    /// A required leaf of a typed record is absent from the tree.
    #[error("missing required config value at '{path}'")]
    MissingField { path: String },

    #[error("failed to deserialize config at '{path}': {source}")]
    Deserialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// No factory has been registered for a cached sub-record type.
    #[error("type {type_name} must register a factory which takes the config manager")]
    NoFactory { type_name: &'static str },

    /// A factory asked, directly or indirectly, for the type it is building.
    #[error("type {type_name} was requested while it is being constructed")]
    ConstructionCycle { type_name: &'static str },
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::Discovery { .. } => ErrorCode::Discovery,
            ConfigError::Io { .. } => ErrorCode::Io,
            ConfigError::Parse { .. } => ErrorCode::Parse,
            ConfigError::Merge { .. } => ErrorCode::Merge,
            ConfigError::SubstitutionCycle { .. } => ErrorCode::SubstitutionCycle,
            ConfigError::Environment { .. } => ErrorCode::InvalidEnvironment,
            ConfigError::MissingField { .. } => ErrorCode::MissingField,
            ConfigError::Deserialize { .. } => ErrorCode::Deserialize,
            ConfigError::NoFactory { .. } => ErrorCode::NoFactory,
            ConfigError::ConstructionCycle { .. } => ErrorCode::ConstructionCycle,
        }
    }

    // Convenience constructors

    pub fn discovery(file: &str, reason: impl Into<String>) -> Self {
        ConfigError::Discovery {
            file: file.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(path: impl Into<String>) -> Self {
        ConfigError::MissingField { path: path.into() }
    }

    /// Whether the error aborts startup rather than a single typed lookup.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ConfigError::MissingField { .. }
                | ConfigError::Deserialize { .. }
                | ConfigError::NoFactory { .. }
                | ConfigError::ConstructionCycle { .. }
        )
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_message_names_file() {
        let err = ConfigError::discovery("abc.conf", "priority must be an integer");
        assert_eq!(err.code(), ErrorCode::Discovery);
        assert!(err.to_string().contains("abc.conf"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_merge_message_names_reference() {
        let err = ConfigError::Merge {
            reference: "db.host".into(),
            origin: "5.conf: 3".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("${db.host}"));
        assert!(msg.contains("5.conf: 3"));
    }

    #[test]
    fn test_typed_access_errors_are_recoverable() {
        assert!(!ConfigError::missing_field("app.value").is_fatal());
        assert!(!ConfigError::NoFactory { type_name: "Foo" }.is_fatal());
        assert!(!ConfigError::ConstructionCycle { type_name: "Foo" }.is_fatal());
        assert_eq!(ConfigError::missing_field("x").code().to_string(), "MISSING_FIELD");
    }
}
