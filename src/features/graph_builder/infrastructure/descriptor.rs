//! JVM method-descriptor parsing. Pure and resolver-independent: the
//! class-pool collaborator resolves names to classes, but the descriptor
//! grammar itself is fixed and needs no collaboration (§4.1 "Invocation
//! return type is parsed from the method descriptor").

use crate::errors::{EngineError, Result};
use crate::shared::VerificationType;

pub fn parse_descriptor(descriptor: &str) -> Result<(Vec<VerificationType>, Option<VerificationType>)> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(EngineError::bad_bytecode("<descriptor>", format!("malformed descriptor: {descriptor}")));
    }
    let mut i = 1;
    let mut params = Vec::new();
    while i < bytes.len() && bytes[i] != b')' {
        let (ty, consumed) = parse_field_type(&descriptor[i..])?;
        params.push(ty);
        i += consumed;
    }
    if i >= bytes.len() {
        return Err(EngineError::bad_bytecode("<descriptor>", format!("unterminated descriptor: {descriptor}")));
    }
    i += 1; // skip ')'
    let return_type = if descriptor[i..] == *"V" {
        None
    } else {
        Some(parse_field_type(&descriptor[i..])?.0)
    };
    Ok((params, return_type))
}

pub fn parse_field_descriptor(descriptor: &str) -> Result<VerificationType> {
    let (ty, consumed) = parse_field_type(descriptor)?;
    if consumed != descriptor.len() {
        return Err(EngineError::bad_bytecode("<descriptor>", format!("trailing data in field descriptor: {descriptor}")));
    }
    Ok(ty)
}

fn parse_field_type(s: &str) -> Result<(VerificationType, usize)> {
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b'B' | b'C' | b'S' | b'Z' | b'I') => Ok((VerificationType::IntLike, 1)),
        Some(b'J') => Ok((VerificationType::Long, 1)),
        Some(b'F') => Ok((VerificationType::Float, 1)),
        Some(b'D') => Ok((VerificationType::Double, 1)),
        Some(b'L') => {
            let end = s.find(';').ok_or_else(|| {
                EngineError::bad_bytecode("<descriptor>", format!("unterminated class type: {s}"))
            })?;
            Ok((VerificationType::Reference(s[1..end].to_string()), end + 1))
        }
        Some(b'[') => {
            let (elem, consumed) = parse_field_type(&s[1..])?;
            Ok((VerificationType::Reference(format!("[{elem}")), 1 + consumed))
        }
        _ => Err(EngineError::bad_bytecode("<descriptor>", format!("unrecognized field type: {s}"))),
    }
}
