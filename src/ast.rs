//! Abstract syntax tree for the `.bakelite` protocol definition language.

/// Fixed-width primitive wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl Primitive {
    pub fn parse(name: &str) -> Option<Primitive> {
        Some(match name {
            "bool" => Primitive::Bool,
            "int8" => Primitive::Int8,
            "int16" => Primitive::Int16,
            "int32" => Primitive::Int32,
            "int64" => Primitive::Int64,
            "uint8" => Primitive::UInt8,
            "uint16" => Primitive::UInt16,
            "uint32" => Primitive::UInt32,
            "uint64" => Primitive::UInt64,
            "float32" => Primitive::Float32,
            "float64" => Primitive::Float64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::UInt8 => "uint8",
            Primitive::UInt16 => "uint16",
            Primitive::UInt32 => "uint32",
            Primitive::UInt64 => "uint64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
        }
    }

    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            Primitive::Bool | Primitive::Int8 | Primitive::UInt8 => 1,
            Primitive::Int16 | Primitive::UInt16 => 2,
            Primitive::Int32 | Primitive::UInt32 | Primitive::Float32 => 4,
            Primitive::Int64 | Primitive::UInt64 | Primitive::Float64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Primitive::Bool | Primitive::Float32 | Primitive::Float64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::Int8 | Primitive::Int16 | Primitive::Int32 | Primitive::Int64
        )
    }

    /// Inclusive value range for integer primitives; meaningless for the rest.
    pub fn range(self) -> (i128, i128) {
        match self {
            Primitive::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Primitive::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Primitive::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Primitive::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Primitive::UInt8 => (0, u8::MAX as i128),
            Primitive::UInt16 => (0, u16::MAX as i128),
            Primitive::UInt32 => (0, u32::MAX as i128),
            Primitive::UInt64 => (0, u64::MAX as i128),
            Primitive::Bool | Primitive::Float32 | Primitive::Float64 => (0, 0),
        }
    }
}

/// A field's type as written, before name resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Prim(Primitive),
    /// `bytes[N]`; the capacity is validated during analysis.
    Bytes(Option<u32>),
    /// `string[N]`; the capacity is validated during analysis.
    Str(Option<u32>),
    /// Reference to a declared enum or struct.
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub args: Vec<AnnotationArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationArg {
    pub name: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct EnumValue {
    pub name: String,
    pub value: i128,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub underlying: Primitive,
    pub values: Vec<EnumValue>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    /// `T[N]` outer array modifier (variable length, up to N elements).
    pub array: Option<u32>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct OptionDecl {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct MessageIdDecl {
    pub name: String,
    pub id: i128,
}

#[derive(Debug, Clone)]
pub struct ProtocolDecl {
    pub options: Vec<OptionDecl>,
    pub message_ids: Vec<MessageIdDecl>,
    pub annotations: Vec<Annotation>,
}

/// Everything declared in one source file.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    pub enums: Vec<EnumDecl>,
    pub structs: Vec<StructDecl>,
    pub protocol: Option<ProtocolDecl>,
}
