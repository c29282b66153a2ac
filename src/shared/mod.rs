//! Cross-cutting types shared by every feature. Zero dependency on any
//! single feature's internals.

pub mod verification_type;

pub use verification_type::VerificationType;
