//! Pack and unpack message values against a frozen schema.
//!
//! This is the generic host codec: fields travel as [`Value`] trees and
//! variable-length data lands in owned containers. The byte layout is the
//! one shared by every backend — little-endian primitives, length-prefixed
//! bytes and arrays, null-terminated strings, fields in declaration order
//! with no padding.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::runtime::stream::Buffer;
use crate::sema::{ElemType, FieldType, Schema, StructDef};
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("write past end of buffer")]
    Write,
    #[error("read past end of buffer")]
    Read,
    #[error("unknown struct: {0}")]
    UnknownStruct(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("field {0}: unexpected value type")]
    WrongType(String),
    #[error("field {0}: value out of range")]
    Range(String),
    #[error("field {0}: length {1} exceeds capacity {2}")]
    Capacity(String, usize, usize),
    #[error("field {0}: string contains a NUL byte")]
    EmbeddedNul(String),
}

#[derive(Debug)]
pub struct Codec {
    schema: Schema,
}

impl Codec {
    pub fn new(schema: Schema) -> Self {
        Codec { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Encode a struct's fields (no message id byte) into a fresh vector.
    pub fn encode_message(
        &self,
        name: &str,
        values: &HashMap<String, Value>,
    ) -> Result<Vec<u8>, CodecError> {
        let s = self
            .schema
            .get_struct(name)
            .ok_or_else(|| CodecError::UnknownStruct(name.to_string()))?;
        let mut out = Vec::with_capacity(s.size.max);
        self.encode_struct(&mut out, s, values)?;
        Ok(out)
    }

    /// Encode a struct's fields directly into a bounded buffer, returning
    /// the number of bytes written. This is the framer's zero-copy path.
    pub fn encode_message_into(
        &self,
        name: &str,
        values: &HashMap<String, Value>,
        buf: &mut Buffer<'_>,
    ) -> Result<usize, CodecError> {
        let s = self
            .schema
            .get_struct(name)
            .ok_or_else(|| CodecError::UnknownStruct(name.to_string()))?;
        let start = buf.pos();
        self.encode_struct(buf, s, values)?;
        Ok(buf.pos() - start)
    }

    /// Decode a struct's fields from the given bytes.
    pub fn decode_message(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<HashMap<String, Value>, CodecError> {
        let s = self
            .schema
            .get_struct(name)
            .ok_or_else(|| CodecError::UnknownStruct(name.to_string()))?;
        let mut cursor = Cursor::new(bytes);
        self.decode_struct(&mut cursor, s)
    }

    fn encode_struct<W: Write>(
        &self,
        w: &mut W,
        s: &StructDef,
        values: &HashMap<String, Value>,
    ) -> Result<(), CodecError> {
        for field in &s.fields {
            let value = values
                .get(&field.name)
                .ok_or_else(|| CodecError::MissingField(field.name.clone()))?;
            match &field.ty {
                FieldType::Elem(elem) => self.encode_elem(w, &field.name, elem, value)?,
                FieldType::Array { elem, cap } => {
                    let items = value
                        .as_list()
                        .ok_or_else(|| CodecError::WrongType(field.name.clone()))?;
                    if items.len() > *cap as usize {
                        return Err(CodecError::Capacity(
                            field.name.clone(),
                            items.len(),
                            *cap as usize,
                        ));
                    }
                    wr(w.write_u8(items.len() as u8))?;
                    for item in items {
                        self.encode_elem(w, &field.name, elem, item)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_elem<W: Write>(
        &self,
        w: &mut W,
        field: &str,
        elem: &ElemType,
        value: &Value,
    ) -> Result<(), CodecError> {
        match *elem {
            ElemType::Prim(p) => self.encode_prim(w, field, p, value),
            ElemType::Enum(idx) => {
                self.encode_prim(w, field, self.schema.enums[idx].underlying, value)
            }
            ElemType::Bytes(cap) => {
                let bytes = value
                    .as_bytes()
                    .ok_or_else(|| CodecError::WrongType(field.to_string()))?;
                if bytes.len() > cap as usize {
                    return Err(CodecError::Capacity(
                        field.to_string(),
                        bytes.len(),
                        cap as usize,
                    ));
                }
                wr(w.write_u8(bytes.len() as u8))?;
                wr(w.write_all(bytes))
            }
            ElemType::Str(cap) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| CodecError::WrongType(field.to_string()))?;
                if s.as_bytes().contains(&0) {
                    return Err(CodecError::EmbeddedNul(field.to_string()));
                }
                if s.len() > cap as usize - 1 {
                    return Err(CodecError::Capacity(
                        field.to_string(),
                        s.len(),
                        cap as usize - 1,
                    ));
                }
                wr(w.write_all(s.as_bytes()))?;
                wr(w.write_u8(0))
            }
            ElemType::Struct(idx) => {
                let map = value
                    .as_struct()
                    .ok_or_else(|| CodecError::WrongType(field.to_string()))?;
                self.encode_struct(w, &self.schema.structs[idx], map)
            }
        }
    }

    fn encode_prim<W: Write>(
        &self,
        w: &mut W,
        field: &str,
        p: crate::ast::Primitive,
        value: &Value,
    ) -> Result<(), CodecError> {
        use crate::ast::Primitive::*;

        let wrong = || CodecError::WrongType(field.to_string());
        let range = || CodecError::Range(field.to_string());

        match p {
            Bool => {
                let b = value.as_bool().ok_or_else(wrong)?;
                wr(w.write_u8(b as u8))
            }
            Int8 => {
                let v = value.as_i64().ok_or_else(wrong)?;
                wr(w.write_i8(i8::try_from(v).map_err(|_| range())?))
            }
            Int16 => {
                let v = value.as_i64().ok_or_else(wrong)?;
                wr(w.write_i16::<LittleEndian>(i16::try_from(v).map_err(|_| range())?))
            }
            Int32 => {
                let v = value.as_i64().ok_or_else(wrong)?;
                wr(w.write_i32::<LittleEndian>(i32::try_from(v).map_err(|_| range())?))
            }
            Int64 => {
                let v = value.as_i64().ok_or_else(wrong)?;
                wr(w.write_i64::<LittleEndian>(v))
            }
            UInt8 => {
                let v = value.as_u64().ok_or_else(wrong)?;
                wr(w.write_u8(u8::try_from(v).map_err(|_| range())?))
            }
            UInt16 => {
                let v = value.as_u64().ok_or_else(wrong)?;
                wr(w.write_u16::<LittleEndian>(u16::try_from(v).map_err(|_| range())?))
            }
            UInt32 => {
                let v = value.as_u64().ok_or_else(wrong)?;
                wr(w.write_u32::<LittleEndian>(u32::try_from(v).map_err(|_| range())?))
            }
            UInt64 => {
                let v = value.as_u64().ok_or_else(wrong)?;
                wr(w.write_u64::<LittleEndian>(v))
            }
            Float32 => {
                let v = value.as_f32().ok_or_else(wrong)?;
                wr(w.write_f32::<LittleEndian>(v))
            }
            Float64 => {
                let v = value.as_f64().ok_or_else(wrong)?;
                wr(w.write_f64::<LittleEndian>(v))
            }
        }
    }

    fn decode_struct(
        &self,
        r: &mut Cursor<&[u8]>,
        s: &StructDef,
    ) -> Result<HashMap<String, Value>, CodecError> {
        let mut out = HashMap::with_capacity(s.fields.len());
        for field in &s.fields {
            let value = match &field.ty {
                FieldType::Elem(elem) => self.decode_elem(r, &field.name, elem)?,
                FieldType::Array { elem, cap } => {
                    let len = rd(r.read_u8())? as usize;
                    if len > *cap as usize {
                        return Err(CodecError::Capacity(
                            field.name.clone(),
                            len,
                            *cap as usize,
                        ));
                    }
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        items.push(self.decode_elem(r, &field.name, elem)?);
                    }
                    Value::List(items)
                }
            };
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }

    fn decode_elem(
        &self,
        r: &mut Cursor<&[u8]>,
        field: &str,
        elem: &ElemType,
    ) -> Result<Value, CodecError> {
        match *elem {
            ElemType::Prim(p) => self.decode_prim(r, p),
            ElemType::Enum(idx) => self.decode_prim(r, self.schema.enums[idx].underlying),
            ElemType::Bytes(cap) => {
                let len = rd(r.read_u8())? as usize;
                if len > cap as usize {
                    return Err(CodecError::Capacity(field.to_string(), len, cap as usize));
                }
                let mut bytes = vec![0u8; len];
                rd(r.read_exact(&mut bytes))?;
                Ok(Value::Bytes(bytes))
            }
            ElemType::Str(cap) => {
                // Consume through the terminator; keep at most cap - 1 bytes
                // of content, mirroring the tiny targets' drain rule.
                let mut content = Vec::new();
                loop {
                    let byte = rd(r.read_u8())?;
                    if byte == 0 {
                        break;
                    }
                    content.push(byte);
                }
                content.truncate(cap as usize - 1);
                Ok(Value::Str(String::from_utf8_lossy(&content).into_owned()))
            }
            ElemType::Struct(idx) => Ok(Value::Struct(
                self.decode_struct(r, &self.schema.structs[idx])?,
            )),
        }
    }

    fn decode_prim(
        &self,
        r: &mut Cursor<&[u8]>,
        p: crate::ast::Primitive,
    ) -> Result<Value, CodecError> {
        use crate::ast::Primitive::*;

        Ok(match p {
            Bool => Value::Bool(rd(r.read_u8())? != 0),
            Int8 => Value::I8(rd(r.read_i8())?),
            Int16 => Value::I16(rd(r.read_i16::<LittleEndian>())?),
            Int32 => Value::I32(rd(r.read_i32::<LittleEndian>())?),
            Int64 => Value::I64(rd(r.read_i64::<LittleEndian>())?),
            UInt8 => Value::U8(rd(r.read_u8())?),
            UInt16 => Value::U16(rd(r.read_u16::<LittleEndian>())?),
            UInt32 => Value::U32(rd(r.read_u32::<LittleEndian>())?),
            UInt64 => Value::U64(rd(r.read_u64::<LittleEndian>())?),
            Float32 => Value::F32(rd(r.read_f32::<LittleEndian>())?),
            Float64 => Value::F64(rd(r.read_f64::<LittleEndian>())?),
        })
    }
}

fn wr<T>(result: std::io::Result<T>) -> Result<T, CodecError> {
    result.map_err(|_| CodecError::Write)
}

fn rd<T>(result: std::io::Result<T>) -> Result<T, CodecError> {
    result.map_err(|_| CodecError::Read)
}
