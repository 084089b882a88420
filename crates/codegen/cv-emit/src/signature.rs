//! Signature blob encoding
//!
//! Types are written with single-byte element codes; type definitions and
//! references are written as compressed `TypeDefOrRef` coded indices of
//! their tokens, so every type a signature mentions must already hold a
//! token when the blob is produced.

use crate::EmitSession;
use crate::adapters::EmitSignature;
use crate::error::EmitError;
use crate::tokens::{RefKey, TableKind, Token};
use cv_symbols::{Primitive, TyId, TyKind, TypeDefId};

/// Element type codes
pub mod element_type {
    /// `void`
    pub const VOID: u8 = 0x01;
    /// `bool`
    pub const BOOLEAN: u8 = 0x02;
    /// `char`
    pub const CHAR: u8 = 0x03;
    /// `int8`
    pub const I1: u8 = 0x04;
    /// `uint8`
    pub const U1: u8 = 0x05;
    /// `int16`
    pub const I2: u8 = 0x06;
    /// `uint16`
    pub const U2: u8 = 0x07;
    /// `int32`
    pub const I4: u8 = 0x08;
    /// `uint32`
    pub const U4: u8 = 0x09;
    /// `int64`
    pub const I8: u8 = 0x0a;
    /// `uint64`
    pub const U8: u8 = 0x0b;
    /// `float32`
    pub const R4: u8 = 0x0c;
    /// `float64`
    pub const R8: u8 = 0x0d;
    /// `string`
    pub const STRING: u8 = 0x0e;
    /// Unmanaged pointer prefix
    pub const PTR: u8 = 0x0f;
    /// Managed pointer prefix
    pub const BYREF: u8 = 0x10;
    /// Value type followed by a coded index
    pub const VALUETYPE: u8 = 0x11;
    /// Reference type followed by a coded index
    pub const CLASS: u8 = 0x12;
    /// Type generic parameter
    pub const VAR: u8 = 0x13;
    /// Multi-dimensional array
    pub const ARRAY: u8 = 0x14;
    /// Generic instantiation
    pub const GENERICINST: u8 = 0x15;
    /// `native int`
    pub const NATIVE_INT: u8 = 0x18;
    /// `native uint`
    pub const NATIVE_UINT: u8 = 0x19;
    /// `object`
    pub const OBJECT: u8 = 0x1c;
    /// Single-dimensional zero-based array
    pub const SZARRAY: u8 = 0x1d;
    /// Method generic parameter
    pub const MVAR: u8 = 0x1e;
}

/// Calling-convention flag: instance method
pub const HASTHIS: u8 = 0x20;
/// Calling-convention flag: generic method
pub const GENERIC: u8 = 0x10;
/// Leading byte of a field signature
pub const FIELD: u8 = 0x06;
/// Leading byte of a generic method instantiation
pub const GENERIC_INST: u8 = 0x0a;

/// Appends `value` as a compressed unsigned integer
///
/// # Errors
/// Returns `EmitError::CompressedOverflow` for values of `0x2000_0000` or more
pub fn write_compressed_uint(value: u32, out: &mut Vec<u8>) -> Result<(), EmitError> {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.extend_from_slice(&(value as u16 | 0x8000).to_be_bytes());
    } else if value < 0x2000_0000 {
        out.extend_from_slice(&(value | 0xC000_0000).to_be_bytes());
    } else {
        return Err(EmitError::CompressedOverflow(value));
    }
    Ok(())
}

/// Reads a compressed unsigned integer, returning it with its encoded length
#[must_use]
pub fn read_compressed_uint(bytes: &[u8]) -> Option<(u32, usize)> {
    let first = *bytes.first()?;
    if first & 0x80 == 0 {
        Some((u32::from(first), 1))
    } else if first & 0xC0 == 0x80 {
        let second = *bytes.get(1)?;
        Some(((u32::from(first & 0x3F) << 8) | u32::from(second), 2))
    } else {
        let rest = bytes.get(1..4)?;
        let value = (u32::from(first & 0x1F) << 24)
            | (u32::from(rest[0]) << 16)
            | (u32::from(rest[1]) << 8)
            | u32::from(rest[2]);
        Some((value, 4))
    }
}

/// `TypeDefOrRef` coded index of a type token
///
/// # Panics
/// If `token` does not point into the TypeDef, TypeRef or TypeSpec table
#[must_use]
#[allow(clippy::panic, reason = "only type tokens are written as type indices")]
pub fn type_def_or_ref(token: Token) -> u32 {
    let tag = match token.table() {
        Some(TableKind::TypeDef) => 0,
        Some(TableKind::TypeRef) => 1,
        Some(TableKind::TypeSpec) => 2,
        other => panic!("COMPILER BUG: {token} from {other:?} used as a type index"),
    };
    (token.row() << 2) | tag
}

fn primitive_code(primitive: Primitive) -> u8 {
    match primitive {
        Primitive::Void => element_type::VOID,
        Primitive::Bool => element_type::BOOLEAN,
        Primitive::Char => element_type::CHAR,
        Primitive::I1 => element_type::I1,
        Primitive::U1 => element_type::U1,
        Primitive::I2 => element_type::I2,
        Primitive::U2 => element_type::U2,
        Primitive::I4 => element_type::I4,
        Primitive::U4 => element_type::U4,
        Primitive::I8 => element_type::I8,
        Primitive::U8 => element_type::U8,
        Primitive::R4 => element_type::R4,
        Primitive::R8 => element_type::R8,
        Primitive::String => element_type::STRING,
        Primitive::Object => element_type::OBJECT,
        Primitive::IntPtr => element_type::NATIVE_INT,
        Primitive::UIntPtr => element_type::NATIVE_UINT,
    }
}

/// Writes signature blobs against the tokens of one session
#[derive(Debug, Clone, Copy)]
pub struct SignatureEncoder<'session> {
    session: &'session EmitSession,
}

impl<'session> SignatureEncoder<'session> {
    /// Creates an encoder
    #[must_use]
    pub fn new(session: &'session EmitSession) -> Self {
        Self { session }
    }

    /// Appends the encoding of `ty`
    ///
    /// # Errors
    /// Returns `EmitError::MissingToken` when a named type has no token
    pub fn encode_type(&self, ty: TyId, out: &mut Vec<u8>) -> Result<(), EmitError> {
        let symbols = self.session.symbols();
        match symbols.ty_kind(ty) {
            TyKind::Primitive(primitive) => out.push(primitive_code(primitive)),
            TyKind::Named(def) => self.encode_named(def, out)?,
            TyKind::Instance { def, args } => {
                out.push(element_type::GENERICINST);
                self.encode_named(def, out)?;
                write_compressed_uint(args.len() as u32, out)?;
                for arg in args {
                    self.encode_type(arg, out)?;
                }
            }
            TyKind::TypeParam(index) => {
                out.push(element_type::VAR);
                write_compressed_uint(index, out)?;
            }
            TyKind::MethodParam(index) => {
                out.push(element_type::MVAR);
                write_compressed_uint(index, out)?;
            }
            TyKind::Vector { element } => {
                out.push(element_type::SZARRAY);
                self.encode_type(element, out)?;
            }
            TyKind::Array { element, rank } => {
                out.push(element_type::ARRAY);
                self.encode_type(element, out)?;
                write_compressed_uint(rank, out)?;
                // No sizes, no lower bounds
                out.extend_from_slice(&[0, 0]);
            }
            TyKind::Pointer { pointee } => {
                out.push(element_type::PTR);
                self.encode_type(pointee, out)?;
            }
            TyKind::ByRef { referent } => {
                out.push(element_type::BYREF);
                self.encode_type(referent, out)?;
            }
        }
        Ok(())
    }

    fn encode_named(&self, def: TypeDefId, out: &mut Vec<u8>) -> Result<(), EmitError> {
        let symbols = self.session.symbols();
        out.push(if symbols.type_defs[def].is_value_type {
            element_type::VALUETYPE
        } else {
            element_type::CLASS
        });
        let key = RefKey::Type(symbols.named(def));
        let token = self
            .session
            .lookup(key)
            .ok_or(EmitError::MissingToken(key))?;
        write_compressed_uint(type_def_or_ref(token), out)
    }

    /// Field signature blob
    ///
    /// # Errors
    /// Returns `EmitError::MissingToken` when a named type has no token
    pub fn field_signature(&self, ty: TyId) -> Result<Vec<u8>, EmitError> {
        let mut out = vec![FIELD];
        self.encode_type(ty, &mut out)?;
        Ok(out)
    }

    /// Method signature blob
    ///
    /// # Errors
    /// Returns `EmitError::MissingToken` when a named type has no token
    pub fn method_signature(&self, signature: &dyn EmitSignature) -> Result<Vec<u8>, EmitError> {
        let mut flags = 0;
        if signature.has_this() {
            flags |= HASTHIS;
        }
        let generic_arity = signature.generic_arity();
        if generic_arity > 0 {
            flags |= GENERIC;
        }

        let mut out = vec![flags];
        if generic_arity > 0 {
            write_compressed_uint(generic_arity, &mut out)?;
        }
        let params = signature.params();
        write_compressed_uint(params.len() as u32, &mut out)?;
        self.encode_type(signature.ret(), &mut out)?;
        for param in params {
            self.encode_type(param, &mut out)?;
        }
        Ok(out)
    }

    /// Type-spec blob
    ///
    /// # Errors
    /// Returns `EmitError::MissingToken` when a named type has no token
    pub fn type_spec(&self, ty: TyId) -> Result<Vec<u8>, EmitError> {
        let mut out = Vec::new();
        self.encode_type(ty, &mut out)?;
        Ok(out)
    }

    /// Generic method instantiation blob
    ///
    /// # Errors
    /// Returns `EmitError::MissingToken` when a named type has no token
    pub fn method_spec(&self, args: &[TyId]) -> Result<Vec<u8>, EmitError> {
        let mut out = vec![GENERIC_INST];
        write_compressed_uint(args.len() as u32, &mut out)?;
        for &arg in args {
            self.encode_type(arg, &mut out)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressed(value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        write_compressed_uint(value, &mut out).unwrap();
        out
    }

    #[test]
    fn test_compressed_integer_widths() {
        assert_eq!(compressed(0x03), [0x03]);
        assert_eq!(compressed(0x7F), [0x7F]);
        assert_eq!(compressed(0x80), [0x80, 0x80]);
        assert_eq!(compressed(0x2E57), [0xAE, 0x57]);
        assert_eq!(compressed(0x4000), [0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(compressed(0x1FFF_FFFF), [0xDF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            write_compressed_uint(0x2000_0000, &mut Vec::new()),
            Err(EmitError::CompressedOverflow(0x2000_0000))
        ));
    }

    #[test]
    fn test_read_back_compressed_integers() {
        for value in [0, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            let bytes = compressed(value);
            assert_eq!(read_compressed_uint(&bytes), Some((value, bytes.len())));
        }
        assert_eq!(read_compressed_uint(&[0x80]), None);
    }

    #[test]
    fn test_type_index_tags() {
        assert_eq!(type_def_or_ref(Token::new(TableKind::TypeDef, 2)), 0x08);
        assert_eq!(type_def_or_ref(Token::new(TableKind::TypeRef, 1)), 0x05);
        assert_eq!(type_def_or_ref(Token::new(TableKind::TypeSpec, 3)), 0x0E);
    }
}
