//! Export signature strings.
//!
//! The generator records each export's signature as its return tag followed
//! by the parameter tags, joined with `|`:
//!
//! ```text
//! i32|NativePointer|i32        fn(NativePointer, i32) -> i32
//! void                         fn()
//! Context|Config|String        fn(Config, String) -> Context
//! ```
//!
//! Binders that need a JNI-style method descriptor render one from the
//! parsed form.

use std::fmt;

use crate::error::{InteropError, InteropResult};

/// Tag of one logical type in a signature string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    /// No value (`void`)
    Void,
    /// `bool`
    Bool,
    /// `u8`
    U8,
    /// `i32`
    I32,
    /// `u32`
    U32,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `NativePointer`
    Pointer,
    /// `String`
    String,
    /// `InteropString`
    InteropString,
    /// `InteropNumber`
    Number,
    /// `IntArray`
    IntArray,
    /// `FloatArray`
    FloatArray,
    /// `ByteArray`
    ByteArray,
    /// `SerializerBuffer`
    SerializerBuffer,
    /// `InteropBuffer`
    InteropBuffer,
    /// `ReturnBuffer`
    ReturnBuffer,
    /// `StringArray`
    StringArray,
    /// `PointerArray`
    PointerArray,
    /// Any typed opaque handle, by name
    Handle(String),
}

impl TypeTag {
    /// Parse one tag; unrecognized names are typed handles
    pub fn parse(tag: &str) -> InteropResult<Self> {
        let tag = tag.trim();
        Ok(match tag {
            "" => return Err(InteropError::Message("empty type tag in signature".into())),
            "void" | "()" => TypeTag::Void,
            "bool" => TypeTag::Bool,
            "u8" => TypeTag::U8,
            "i32" => TypeTag::I32,
            "u32" => TypeTag::U32,
            "i64" => TypeTag::I64,
            "f32" => TypeTag::F32,
            "f64" => TypeTag::F64,
            "NativePointer" => TypeTag::Pointer,
            "String" => TypeTag::String,
            "InteropString" => TypeTag::InteropString,
            "InteropNumber" => TypeTag::Number,
            "IntArray" => TypeTag::IntArray,
            "FloatArray" => TypeTag::FloatArray,
            "ByteArray" => TypeTag::ByteArray,
            "SerializerBuffer" => TypeTag::SerializerBuffer,
            "InteropBuffer" => TypeTag::InteropBuffer,
            "ReturnBuffer" => TypeTag::ReturnBuffer,
            "StringArray" => TypeTag::StringArray,
            "PointerArray" => TypeTag::PointerArray,
            other => TypeTag::Handle(other.to_string()),
        })
    }

    /// JNI-style descriptor of this type
    pub fn jni_descriptor(&self) -> &'static str {
        match self {
            TypeTag::Void => "V",
            TypeTag::Bool => "Z",
            TypeTag::U8 => "B",
            TypeTag::I32 | TypeTag::U32 => "I",
            TypeTag::I64 => "J",
            TypeTag::F32 => "F",
            TypeTag::F64 | TypeTag::Number => "D",
            TypeTag::String | TypeTag::InteropString => "Ljava/lang/String;",
            TypeTag::IntArray => "[I",
            TypeTag::FloatArray => "[F",
            TypeTag::ByteArray
            | TypeTag::StringArray
            | TypeTag::InteropBuffer
            | TypeTag::ReturnBuffer => "[B",
            TypeTag::Pointer
            | TypeTag::SerializerBuffer
            | TypeTag::PointerArray
            | TypeTag::Handle(_) => "J",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeTag::Void => "void",
            TypeTag::Bool => "bool",
            TypeTag::U8 => "u8",
            TypeTag::I32 => "i32",
            TypeTag::U32 => "u32",
            TypeTag::I64 => "i64",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Pointer => "NativePointer",
            TypeTag::String => "String",
            TypeTag::InteropString => "InteropString",
            TypeTag::Number => "InteropNumber",
            TypeTag::IntArray => "IntArray",
            TypeTag::FloatArray => "FloatArray",
            TypeTag::ByteArray => "ByteArray",
            TypeTag::SerializerBuffer => "SerializerBuffer",
            TypeTag::InteropBuffer => "InteropBuffer",
            TypeTag::ReturnBuffer => "ReturnBuffer",
            TypeTag::StringArray => "StringArray",
            TypeTag::PointerArray => "PointerArray",
            TypeTag::Handle(name) => name.as_str(),
        };
        f.write_str(s)
    }
}

/// Parsed export signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Return type
    pub ret: TypeTag,
    /// Parameter types, excluding the context argument
    pub params: Vec<TypeTag>,
}

impl Signature {
    /// Parse `ret|p0|p1...`
    pub fn parse(signature: &str) -> InteropResult<Self> {
        let mut parts = signature.split('|');
        let ret = TypeTag::parse(parts.next().unwrap_or_default())?;
        let params = parts.map(TypeTag::parse).collect::<InteropResult<Vec<_>>>()?;
        if params.iter().any(|p| *p == TypeTag::Void) {
            return Err(InteropError::Message(format!(
                "void parameter in signature '{}'",
                signature
            )));
        }
        Ok(Signature { ret, params })
    }

    /// Parameter count
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Render a JNI-style method descriptor, e.g. `(IJ)J`
    pub fn jni_descriptor(&self) -> String {
        let mut out = String::from("(");
        for p in &self.params {
            out.push_str(p.jni_descriptor());
        }
        out.push(')');
        out.push_str(self.ret.jni_descriptor());
        out
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ret)?;
        for p in &self.params {
            write!(f, "|{}", p)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Signature {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_void() {
        let sig = Signature::parse("void").unwrap();
        assert_eq!(sig.ret, TypeTag::Void);
        assert_eq!(sig.arity(), 0);
        assert_eq!(sig.jni_descriptor(), "()V");
    }

    #[test]
    fn test_parse_with_handles() {
        let sig = Signature::parse("Context|Config|String").unwrap();
        assert_eq!(sig.ret, TypeTag::Handle("Context".into()));
        assert_eq!(sig.params, [TypeTag::Handle("Config".into()), TypeTag::String]);
        assert_eq!(sig.jni_descriptor(), "(JLjava/lang/String;)J");
    }

    #[test]
    fn test_jni_descriptor_scalars_and_arrays() {
        let sig = Signature::parse("bool|u8|i32|u32|i64|f32|f64|IntArray|FloatArray|ByteArray").unwrap();
        assert_eq!(sig.jni_descriptor(), "(BIIJFD[I[F[B)Z");
    }

    #[test]
    fn test_display_round_trip() {
        let text = "i32|NativePointer|InteropNumber|StringArray";
        assert_eq!(Signature::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Signature::parse("").is_err());
        assert!(Signature::parse("i32||i32").is_err());
        assert!(Signature::parse("i32|void").is_err());
    }
}
