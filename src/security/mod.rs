//! Credential and token primitives.

pub mod password;
pub mod tokens;
