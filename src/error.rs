use graphql_parser::query::ParseError as QueryParseError;
use thiserror::Error;

/// Central error type for all compilation failures.
///
/// The compiler is a pure function over its inputs; every variant here is a
/// programmer or schema mistake, not a runtime fault. Generated Cypher is not
/// validated — syntax errors surface at database execution time.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// GraphQL query parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] QueryParseError),

    /// GraphQL SDL parsing errors
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    /// A `where` key carried an operator suffix not in the operator table
    #[error("Unknown filter operator: {operator}")]
    UnknownOperator { operator: String },

    /// An inline fragment without an `on <Type>` condition
    #[error("Inline fragment is missing a type condition")]
    MissingTypeCondition,

    /// A referenced field is absent on the current object type
    #[error("Field not found: {field} on type {type_name}")]
    FieldNotFound { field: String, type_name: String },

    /// A fragment spread referenced an undefined fragment
    #[error("Unknown fragment: {name}")]
    UnknownFragment { name: String },

    /// General operation errors with context
    #[error("{context}: {message}")]
    Operation { context: String, message: String },
}

impl CompilerError {
    /// Creates a field not found error
    pub fn field_not_found(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::FieldNotFound {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates an unknown operator error
    pub fn unknown_operator(operator: impl Into<String>) -> Self {
        Self::UnknownOperator {
            operator: operator.into(),
        }
    }

    /// Creates an operation selection error
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            context: "Operation error".to_string(),
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error
    pub fn unsupported_operation(operation: impl Into<String>) -> Self {
        Self::Operation {
            context: "Operation not supported".to_string(),
            message: operation.into(),
        }
    }

    /// Creates a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Operation {
            context: "Schema error".to_string(),
            message: message.into(),
        }
    }
}

/// Type alias for Results that use CompilerError
pub type CompilerResult<T> = Result<T, CompilerError>;
