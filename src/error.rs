//! Construction-error taxonomy for style expressions.
//!
//! Every variant is fatal to the construction that raised it: no node is
//! allocated in the arena when a constructor returns an error. Codegen and
//! binding failures are reported through `anyhow` at the pass level instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExprError {
    /// Wrong arity or an argument value that can never be valid
    /// (non-finite literal, empty palette, malformed hex color).
    #[error("invalid argument to {ctor}: {reason}")]
    InvalidArgument { ctor: &'static str, reason: String },

    /// An operand's declared output type does not satisfy the consumer.
    #[error("{ctor}: expected {expected} operand for '{operand}', got {actual}")]
    TypeMismatch {
        ctor: &'static str,
        operand: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// A property name that is absent from the supplied schema.
    #[error("property name not found in schema: '{name}'")]
    UnknownProperty { name: String },

    /// `replace_child` was asked to swap a node that is not a child of the
    /// given parent.
    #[error("no child slot of the parent holds the node being replaced")]
    NoSuchChild,
}

impl ExprError {
    pub(crate) fn invalid(ctor: &'static str, reason: impl Into<String>) -> Self {
        ExprError::InvalidArgument {
            ctor,
            reason: reason.into(),
        }
    }
}
