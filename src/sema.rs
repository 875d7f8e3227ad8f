//! Semantic analysis: resolve names, enforce schema invariants, compute
//! sizes, and freeze the result for the codec and the backends.
//!
//! Analysis runs in two passes. Pass 1 registers every top-level
//! declaration by name. Pass 2 resolves field references, checks the
//! invariants (capacities, enum ranges, recursion, message ids, protocol
//! options) and computes each struct's minimum and maximum wire size.

use std::collections::HashMap;

use crate::ast::{self, Primitive, TypeExpr};
use crate::runtime::crc::CrcKind;
use crate::sizes::SizeInfo;

#[derive(Debug, thiserror::Error)]
pub enum SemaError {
    #[error("duplicate type name: {0}")]
    DuplicateType(String),
    #[error("enum {0}: underlying type must be an integer primitive, not {1}")]
    EnumUnderlying(String, &'static str),
    #[error("enum {0}: duplicate value name {1}")]
    DuplicateEnumName(String, String),
    #[error("enum {0}: duplicate value {1}")]
    DuplicateEnumValue(String, i128),
    #[error("enum {0}: value {1} = {2} does not fit {3}")]
    EnumValueRange(String, String, i128, &'static str),
    #[error("struct {0}: duplicate field name {1}")]
    DuplicateField(String, String),
    #[error("struct {0}, field {1}: unknown type {2}")]
    UnknownType(String, String, String),
    #[error("struct {0}, field {1}: {2} requires a capacity")]
    MissingCapacity(String, String, &'static str),
    #[error("struct {0}, field {1}: capacity {2} does not fit the 1-byte length prefix")]
    CapacityTooLarge(String, String, u32),
    #[error("struct {0}, field {1}: capacity must be at least 1")]
    ZeroCapacity(String, String),
    #[error("struct {0} contains itself")]
    RecursiveStruct(String),
    #[error("protocol: unknown option {0}")]
    UnknownOption(String),
    #[error("protocol: invalid value {1} for option {0}")]
    BadOption(String, String),
    #[error("protocol: a framing type must be specified")]
    MissingFraming,
    #[error("message id 0 is reserved for the frame delimiter")]
    ReservedMessageId,
    #[error("message id {0} for {1} does not fit in one byte")]
    MessageIdRange(i128, String),
    #[error("message id {0} assigned twice")]
    DuplicateMessageId(u8),
    #[error("{0} assigned a message id twice")]
    DuplicateMessageStruct(String),
    #[error("{0} assigned a message id, but not declared as a struct")]
    UnknownMessageStruct(String),
    #[error("maxLength {0} is less than the largest message ({1} bytes plus {2} CRC bytes)")]
    MaxLengthTooSmall(usize, usize, usize),
}

/// A resolved element type: what a single value on the wire is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    Prim(Primitive),
    /// Length-prefixed bytes, capacity `1..=255`.
    Bytes(u8),
    /// Null-terminated string stored in capacity-`N` storage.
    Str(u32),
    /// Index into [`Schema::enums`].
    Enum(usize),
    /// Index into [`Schema::structs`].
    Struct(usize),
}

/// A resolved field type: a single element or a variable-length array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Elem(ElemType),
    Array { elem: ElemType, cap: u8 },
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub annotations: Vec<ast::Annotation>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub underlying: Primitive,
    pub values: Vec<(String, i128)>,
    pub annotations: Vec<ast::Annotation>,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub size: SizeInfo,
    pub annotations: Vec<ast::Annotation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Cobs,
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct MessageBinding {
    pub struct_idx: usize,
    pub id: u8,
}

#[derive(Debug, Clone)]
pub struct ProtocolDef {
    pub framing: Framing,
    pub crc: CrcKind,
    /// Payload budget per message (message id byte not counted).
    pub max_length: usize,
    /// Largest maximum message size among the bound structs.
    pub max_message_size: usize,
    pub messages: Vec<MessageBinding>,
}

/// The frozen output of analysis, shared by the codec and all backends.
#[derive(Debug, Clone)]
pub struct Schema {
    pub enums: Vec<EnumDef>,
    pub structs: Vec<StructDef>,
    pub protocol: Option<ProtocolDef>,
    enum_index: HashMap<String, usize>,
    struct_index: HashMap<String, usize>,
}

impl Schema {
    pub fn get_enum(&self, name: &str) -> Option<&EnumDef> {
        self.enum_index.get(name).map(|&i| &self.enums[i])
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        self.struct_index.get(name).map(|&i| &self.structs[i])
    }

    pub fn struct_index(&self, name: &str) -> Option<usize> {
        self.struct_index.get(name).copied()
    }

    pub fn protocol(&self) -> Option<&ProtocolDef> {
        self.protocol.as_ref()
    }

    /// Message id assigned to a struct, if any.
    pub fn message_id(&self, name: &str) -> Option<u8> {
        let idx = self.struct_index(name)?;
        let proto = self.protocol.as_ref()?;
        proto
            .messages
            .iter()
            .find(|m| m.struct_idx == idx)
            .map(|m| m.id)
    }

    /// Struct bound to a message id, if any.
    pub fn message_struct(&self, id: u8) -> Option<&StructDef> {
        let proto = self.protocol.as_ref()?;
        proto
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| &self.structs[m.struct_idx])
    }

    /// Maximum encoded size of an element type.
    pub fn elem_size(&self, ty: &ElemType) -> SizeInfo {
        match *ty {
            ElemType::Prim(p) => SizeInfo::fixed(p.width()),
            ElemType::Bytes(cap) => SizeInfo { min: 1, max: 1 + cap as usize },
            ElemType::Str(cap) => SizeInfo { min: 1, max: cap as usize },
            ElemType::Enum(idx) => SizeInfo::fixed(self.enums[idx].underlying.width()),
            ElemType::Struct(idx) => self.structs[idx].size,
        }
    }

    pub fn field_size(&self, ty: &FieldType) -> SizeInfo {
        match ty {
            FieldType::Elem(e) => self.elem_size(e),
            FieldType::Array { elem, cap } => {
                let elem = self.elem_size(elem);
                SizeInfo { min: 1, max: 1 + *cap as usize * elem.max }
            }
        }
    }
}

/// Analyze parsed definitions into a frozen [`Schema`].
pub fn analyze(defs: ast::Definitions) -> Result<Schema, SemaError> {
    // Pass 1: register declarations. Enums and structs share one namespace.
    let mut enum_index = HashMap::new();
    let mut struct_index = HashMap::new();
    for (i, e) in defs.enums.iter().enumerate() {
        if enum_index.insert(e.name.clone(), i).is_some() {
            return Err(SemaError::DuplicateType(e.name.clone()));
        }
    }
    for (i, s) in defs.structs.iter().enumerate() {
        if enum_index.contains_key(&s.name)
            || struct_index.insert(s.name.clone(), i).is_some()
        {
            return Err(SemaError::DuplicateType(s.name.clone()));
        }
    }

    // Pass 2a: enums.
    let mut enums = Vec::with_capacity(defs.enums.len());
    for decl in &defs.enums {
        enums.push(check_enum(decl)?);
    }

    // Pass 2b: struct fields.
    let mut structs = Vec::with_capacity(defs.structs.len());
    for decl in &defs.structs {
        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut seen = HashMap::new();
        for field in &decl.fields {
            if seen.insert(field.name.as_str(), ()).is_some() {
                return Err(SemaError::DuplicateField(
                    decl.name.clone(),
                    field.name.clone(),
                ));
            }
            fields.push(Field {
                name: field.name.clone(),
                ty: resolve_field(decl, field, &enum_index, &struct_index)?,
                annotations: field.annotations.clone(),
            });
        }
        structs.push(StructDef {
            name: decl.name.clone(),
            fields,
            size: SizeInfo::fixed(0),
            annotations: decl.annotations.clone(),
        });
    }

    let mut schema = Schema {
        enums,
        structs,
        protocol: None,
        enum_index,
        struct_index,
    };

    compute_sizes(&mut schema)?;

    if let Some(proto) = &defs.protocol {
        schema.protocol = Some(check_protocol(proto, &schema)?);
    }

    Ok(schema)
}

fn check_enum(decl: &ast::EnumDecl) -> Result<EnumDef, SemaError> {
    if !decl.underlying.is_integer() {
        return Err(SemaError::EnumUnderlying(
            decl.name.clone(),
            decl.underlying.name(),
        ));
    }
    let (lo, hi) = decl.underlying.range();
    let mut values = Vec::with_capacity(decl.values.len());
    for v in &decl.values {
        if values.iter().any(|(n, _)| n == &v.name) {
            return Err(SemaError::DuplicateEnumName(decl.name.clone(), v.name.clone()));
        }
        if values.iter().any(|(_, x)| *x == v.value) {
            return Err(SemaError::DuplicateEnumValue(decl.name.clone(), v.value));
        }
        if v.value < lo || v.value > hi {
            return Err(SemaError::EnumValueRange(
                decl.name.clone(),
                v.name.clone(),
                v.value,
                decl.underlying.name(),
            ));
        }
        values.push((v.name.clone(), v.value));
    }
    Ok(EnumDef {
        name: decl.name.clone(),
        underlying: decl.underlying,
        values,
        annotations: decl.annotations.clone(),
    })
}

fn resolve_field(
    decl: &ast::StructDecl,
    field: &ast::FieldDecl,
    enum_index: &HashMap<String, usize>,
    struct_index: &HashMap<String, usize>,
) -> Result<FieldType, SemaError> {
    let here = |e: fn(String, String) -> SemaError| e(decl.name.clone(), field.name.clone());

    let elem = match &field.ty {
        TypeExpr::Prim(p) => ElemType::Prim(*p),
        TypeExpr::Bytes(cap) => {
            let cap = cap.ok_or_else(|| {
                SemaError::MissingCapacity(decl.name.clone(), field.name.clone(), "bytes")
            })?;
            if cap == 0 {
                return Err(here(SemaError::ZeroCapacity));
            }
            let cap = u8::try_from(cap).map_err(|_| {
                SemaError::CapacityTooLarge(decl.name.clone(), field.name.clone(), cap)
            })?;
            ElemType::Bytes(cap)
        }
        TypeExpr::Str(cap) => {
            let cap = cap.ok_or_else(|| {
                SemaError::MissingCapacity(decl.name.clone(), field.name.clone(), "string")
            })?;
            if cap == 0 {
                return Err(here(SemaError::ZeroCapacity));
            }
            ElemType::Str(cap)
        }
        TypeExpr::Named(name) => {
            if let Some(&idx) = enum_index.get(name) {
                ElemType::Enum(idx)
            } else if let Some(&idx) = struct_index.get(name) {
                ElemType::Struct(idx)
            } else {
                return Err(SemaError::UnknownType(
                    decl.name.clone(),
                    field.name.clone(),
                    name.clone(),
                ));
            }
        }
    };

    match field.array {
        None => Ok(FieldType::Elem(elem)),
        Some(cap) => {
            if cap == 0 {
                return Err(here(SemaError::ZeroCapacity));
            }
            let cap = u8::try_from(cap).map_err(|_| {
                SemaError::CapacityTooLarge(decl.name.clone(), field.name.clone(), cap)
            })?;
            Ok(FieldType::Array { elem, cap })
        }
    }
}

/// Compute per-struct sizes in dependency order, rejecting cycles.
fn compute_sizes(schema: &mut Schema) -> Result<(), SemaError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }

    fn visit(
        schema: &mut Schema,
        marks: &mut [Mark],
        idx: usize,
    ) -> Result<SizeInfo, SemaError> {
        match marks[idx] {
            Mark::Black => return Ok(schema.structs[idx].size),
            Mark::Grey => {
                return Err(SemaError::RecursiveStruct(schema.structs[idx].name.clone()))
            }
            Mark::White => {}
        }
        marks[idx] = Mark::Grey;

        let mut total = SizeInfo { min: 0, max: 0 };
        let fields: Vec<FieldType> =
            schema.structs[idx].fields.iter().map(|f| f.ty).collect();
        for ty in fields {
            let elem = match ty {
                FieldType::Elem(e) | FieldType::Array { elem: e, .. } => e,
            };
            if let ElemType::Struct(child) = elem {
                visit(schema, marks, child)?;
            }
            let size = schema.field_size(&ty);
            total.min += size.min;
            total.max += size.max;
        }

        schema.structs[idx].size = total;
        marks[idx] = Mark::Black;
        Ok(total)
    }

    let mut marks = vec![Mark::White; schema.structs.len()];
    for idx in 0..schema.structs.len() {
        visit(schema, &mut marks, idx)?;
    }
    Ok(())
}

fn check_protocol(decl: &ast::ProtocolDecl, schema: &Schema) -> Result<ProtocolDef, SemaError> {
    let mut framing = None;
    let mut crc = CrcKind::None;
    let mut max_length_opt = None;

    for opt in &decl.options {
        let value = opt.value.to_ascii_lowercase();
        match opt.name.as_str() {
            "framing" => {
                framing = Some(match value.as_str() {
                    "cobs" => Framing::Cobs,
                    "none" => Framing::None,
                    _ => return Err(SemaError::BadOption("framing".into(), opt.value.clone())),
                });
            }
            "crc" => {
                crc = CrcKind::parse(&value)
                    .ok_or_else(|| SemaError::BadOption("crc".into(), opt.value.clone()))?;
            }
            "maxLength" => {
                let n: usize = value
                    .parse()
                    .map_err(|_| SemaError::BadOption("maxLength".into(), opt.value.clone()))?;
                if n == 0 {
                    return Err(SemaError::BadOption("maxLength".into(), opt.value.clone()));
                }
                max_length_opt = Some(n);
            }
            other => return Err(SemaError::UnknownOption(other.to_string())),
        }
    }

    let framing = framing.ok_or(SemaError::MissingFraming)?;

    let mut messages: Vec<MessageBinding> = Vec::with_capacity(decl.message_ids.len());
    let mut max_message_size = 0usize;
    for msg in &decl.message_ids {
        if msg.id == 0 {
            return Err(SemaError::ReservedMessageId);
        }
        let id = u8::try_from(msg.id)
            .map_err(|_| SemaError::MessageIdRange(msg.id, msg.name.clone()))?;
        let struct_idx = schema
            .struct_index(&msg.name)
            .ok_or_else(|| SemaError::UnknownMessageStruct(msg.name.clone()))?;
        if messages.iter().any(|m| m.id == id) {
            return Err(SemaError::DuplicateMessageId(id));
        }
        if messages.iter().any(|m| m.struct_idx == struct_idx) {
            return Err(SemaError::DuplicateMessageStruct(msg.name.clone()));
        }
        max_message_size = max_message_size.max(schema.structs[struct_idx].size.max);
        messages.push(MessageBinding { struct_idx, id });
    }

    let max_length = match max_length_opt {
        Some(n) => {
            for m in &messages {
                let size = schema.structs[m.struct_idx].size.max;
                if size + crc.width() > n {
                    return Err(SemaError::MaxLengthTooSmall(n, size, crc.width()));
                }
            }
            n
        }
        None => max_message_size + crc.width(),
    };

    Ok(ProtocolDef {
        framing,
        crc,
        max_length,
        max_message_size,
        messages,
    })
}
