//! Crate-wide error taxonomy (§7).
//!
//! `ClassNotFound`/`MethodNotFound` are non-fatal analysis gaps: callers
//! elide the offending call and keep going. `BadBytecode`/`UnsupportedOpcode`
//! abandon the current task only; they never propagate out of `analyze`.
//! `EmptyMethod` is deliberately not a variant here — an empty body is
//! `Ok(None)`, not an error (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bad bytecode in {method}: {reason}")]
    BadBytecode { method: String, reason: String },

    #[error("unsupported opcode 0x{opcode:02x} ({mnemonic}) in {method} at offset {offset}")]
    UnsupportedOpcode {
        method: String,
        opcode: u8,
        mnemonic: String,
        offset: u32,
    },

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("method not found: {class}.{name}{descriptor}")]
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error("brush fixpoint exceeded iteration cap ({cap}) in {method}")]
    IterationCapExceeded { method: String, cap: u32 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn bad_bytecode(method: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::BadBytecode {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_opcode(
        method: impl Into<String>,
        opcode: u8,
        mnemonic: impl Into<String>,
        offset: u32,
    ) -> Self {
        EngineError::UnsupportedOpcode {
            method: method.into(),
            opcode,
            mnemonic: mnemonic.into(),
            offset,
        }
    }

    /// Non-fatal error kinds whose policy is "elide the call, keep going"
    /// rather than "abandon the task".
    pub fn is_elidable(&self) -> bool {
        matches!(
            self,
            EngineError::ClassNotFound(_) | EngineError::MethodNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
