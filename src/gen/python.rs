//! Generic host backend: Python dataclasses with owned containers.

use std::fmt::Write;

use crate::ast::Primitive;
use crate::sema::{ElemType, FieldType, Framing, Schema, StructDef};

use super::{dependency_order, Backend};

pub struct Python;

impl Backend for Python {
    fn target(&self) -> &'static str {
        "python"
    }

    fn generate(&self, schema: &Schema) -> String {
        let mut out = String::new();
        out.push_str(PROLOG);

        for e in &schema.enums {
            emit_enum(&mut out, e);
        }

        for idx in dependency_order(schema) {
            emit_struct(&mut out, schema, &schema.structs[idx]);
        }

        if let Some(proto) = schema.protocol() {
            if proto.framing == Framing::Cobs {
                emit_protocol(&mut out, schema, proto);
            }
        }

        out
    }

    fn runtime(&self) -> Option<String> {
        // The python runtime ships as the `bakelite_runtime` package.
        None
    }
}

const PROLOG: &str = r#""""Generated protocol definitions."""

import struct as _struct
from dataclasses import dataclass
from enum import IntEnum
from typing import ClassVar, Self

from bakelite_runtime.runtime import ProtocolBase
from bakelite_runtime.serialization import SerializationError, Struct

"#;

fn struct_char(p: Primitive) -> char {
    match p {
        Primitive::Bool => '?',
        Primitive::Int8 => 'b',
        Primitive::Int16 => 'h',
        Primitive::Int32 => 'i',
        Primitive::Int64 => 'q',
        Primitive::UInt8 => 'B',
        Primitive::UInt16 => 'H',
        Primitive::UInt32 => 'I',
        Primitive::UInt64 => 'Q',
        Primitive::Float32 => 'f',
        Primitive::Float64 => 'd',
    }
}

fn annotation(schema: &Schema, ty: &FieldType) -> String {
    fn elem(schema: &Schema, e: &ElemType) -> String {
        match *e {
            ElemType::Prim(Primitive::Bool) => "bool".to_string(),
            ElemType::Prim(Primitive::Float32) | ElemType::Prim(Primitive::Float64) => {
                "float".to_string()
            }
            ElemType::Prim(_) => "int".to_string(),
            ElemType::Bytes(_) => "bytes".to_string(),
            ElemType::Str(_) => "str".to_string(),
            ElemType::Enum(idx) => schema.enums[idx].name.clone(),
            ElemType::Struct(idx) => schema.structs[idx].name.clone(),
        }
    }

    match ty {
        FieldType::Elem(e) => elem(schema, e),
        FieldType::Array { elem: e, .. } => format!("list[{}]", elem(schema, e)),
    }
}

fn emit_enum(out: &mut String, e: &crate::sema::EnumDef) {
    let _ = writeln!(out, "class {}(IntEnum):", e.name);
    for (name, value) in &e.values {
        let _ = writeln!(out, "    {} = {}", name, value);
    }
    out.push_str("\n\n");
}

/// Runs of consecutive scalar fields share one `struct` format call.
fn scalar_run(fields: &[crate::sema::Field], start: usize) -> usize {
    let mut end = start;
    while end < fields.len() {
        match fields[end].ty {
            FieldType::Elem(ElemType::Prim(_)) | FieldType::Elem(ElemType::Enum(_)) => end += 1,
            _ => break,
        }
    }
    end
}

fn run_format(schema: &Schema, fields: &[crate::sema::Field], start: usize, end: usize) -> String {
    let mut fmt = String::from("<");
    for field in &fields[start..end] {
        let p = match field.ty {
            FieldType::Elem(ElemType::Prim(p)) => p,
            FieldType::Elem(ElemType::Enum(idx)) => schema.enums[idx].underlying,
            _ => unreachable!("scalar run holds scalars only"),
        };
        fmt.push(struct_char(p));
    }
    fmt
}

fn run_width(schema: &Schema, fields: &[crate::sema::Field], start: usize, end: usize) -> usize {
    fields[start..end]
        .iter()
        .map(|f| schema.field_size(&f.ty).max)
        .sum()
}

fn emit_pack_elem(out: &mut String, schema: &Schema, elem: &ElemType, place: &str, indent: &str) {
    match *elem {
        ElemType::Prim(p) => {
            let _ = writeln!(
                out,
                "{}_buf.extend(_struct.pack(\"<{}\", {}))",
                indent,
                struct_char(p),
                place
            );
        }
        ElemType::Enum(idx) => {
            let _ = writeln!(
                out,
                "{}_buf.extend(_struct.pack(\"<{}\", int({})))",
                indent,
                struct_char(schema.enums[idx].underlying),
                place
            );
        }
        ElemType::Bytes(cap) => {
            let _ = writeln!(out, "{}if len({}) > {}:", indent, place, cap);
            let _ = writeln!(
                out,
                "{}    raise SerializationError(\"{} exceeds {} bytes\")",
                indent, place, cap
            );
            let _ = writeln!(out, "{}_buf.append(len({}))", indent, place);
            let _ = writeln!(out, "{}_buf.extend({})", indent, place);
        }
        ElemType::Str(cap) => {
            let _ = writeln!(out, "{}_enc = {}.encode(\"utf-8\")", indent, place);
            let _ = writeln!(out, "{}if len(_enc) > {}:", indent, cap - 1);
            let _ = writeln!(
                out,
                "{}    raise SerializationError(\"{} exceeds {} bytes\")",
                indent,
                place,
                cap - 1
            );
            let _ = writeln!(out, "{}_buf.extend(_enc)", indent);
            let _ = writeln!(out, "{}_buf.append(0)", indent);
        }
        ElemType::Struct(_) => {
            let _ = writeln!(out, "{}_buf.extend({}.pack())", indent, place);
        }
    }
}

fn emit_unpack_elem(
    out: &mut String,
    schema: &Schema,
    elem: &ElemType,
    target: &str,
    indent: &str,
) {
    match *elem {
        ElemType::Prim(p) => {
            let _ = writeln!(
                out,
                "{}{}, = _struct.unpack_from(\"<{}\", _data, _o)",
                indent,
                target,
                struct_char(p)
            );
            let _ = writeln!(out, "{}_o += {}", indent, p.width());
        }
        ElemType::Enum(idx) => {
            let e = &schema.enums[idx];
            let _ = writeln!(
                out,
                "{}{}, = _struct.unpack_from(\"<{}\", _data, _o)",
                indent,
                target,
                struct_char(e.underlying)
            );
            let _ = writeln!(out, "{}{} = {}({})", indent, target, e.name, target);
            let _ = writeln!(out, "{}_o += {}", indent, e.underlying.width());
        }
        ElemType::Bytes(_) => {
            let _ = writeln!(out, "{}_n = _data[_o]", indent);
            let _ = writeln!(out, "{}_o += 1", indent);
            let _ = writeln!(out, "{}{} = bytes(_data[_o:_o + _n])", indent, target);
            let _ = writeln!(out, "{}_o += _n", indent);
        }
        ElemType::Str(_) => {
            let _ = writeln!(out, "{}_end = _o", indent);
            let _ = writeln!(out, "{}while _data[_end] != 0:", indent);
            let _ = writeln!(out, "{}    _end += 1", indent);
            let _ = writeln!(
                out,
                "{}{} = bytes(_data[_o:_end]).decode(\"utf-8\")",
                indent, target
            );
            let _ = writeln!(out, "{}_o = _end + 1", indent);
        }
        ElemType::Struct(idx) => {
            let _ = writeln!(
                out,
                "{}{}, _n = {}.unpack(_data, _o)",
                indent, target, schema.structs[idx].name
            );
            let _ = writeln!(out, "{}_o += _n", indent);
        }
    }
}

fn emit_struct(out: &mut String, schema: &Schema, s: &StructDef) {
    out.push_str("@dataclass\n");
    let _ = writeln!(out, "class {}(Struct):", s.name);
    for field in &s.fields {
        let _ = writeln!(out, "    {}: {}", field.name, annotation(schema, &field.ty));
    }

    // pack
    out.push_str("\n    def pack(self) -> bytes:\n        _buf = bytearray()\n");
    let mut i = 0;
    while i < s.fields.len() {
        let end = scalar_run(&s.fields, i);
        if end > i {
            let names: Vec<String> = s.fields[i..end]
                .iter()
                .map(|f| format!("self.{}", f.name))
                .collect();
            let _ = writeln!(
                out,
                "        _buf.extend(_struct.pack(\"{}\", {}))",
                run_format(schema, &s.fields, i, end),
                names.join(", ")
            );
            i = end;
            continue;
        }

        let field = &s.fields[i];
        match &field.ty {
            FieldType::Elem(elem) => {
                emit_pack_elem(out, schema, elem, &format!("self.{}", field.name), "        ");
            }
            FieldType::Array { elem, cap } => {
                let _ = writeln!(out, "        if len(self.{}) > {}:", field.name, cap);
                let _ = writeln!(
                    out,
                    "            raise SerializationError(\"{} exceeds {} elements\")",
                    field.name, cap
                );
                let _ = writeln!(out, "        _buf.append(len(self.{}))", field.name);
                let _ = writeln!(out, "        for _item in self.{}:", field.name);
                emit_pack_elem(out, schema, elem, "_item", "            ");
            }
        }
        i += 1;
    }
    out.push_str("        return bytes(_buf)\n");

    // unpack
    out.push_str(
        "\n    @classmethod\n    def unpack(cls, _data: bytes | memoryview, offset: int = 0) \
         -> tuple[Self, int]:\n        _o = offset\n",
    );
    let mut i = 0;
    while i < s.fields.len() {
        let end = scalar_run(&s.fields, i);
        if end > i {
            let names: Vec<&str> = s.fields[i..end].iter().map(|f| f.name.as_str()).collect();
            let target = if names.len() == 1 {
                format!("{},", names[0])
            } else {
                names.join(", ")
            };
            let _ = writeln!(
                out,
                "        {} = _struct.unpack_from(\"{}\", _data, _o)",
                target,
                run_format(schema, &s.fields, i, end)
            );
            let _ = writeln!(out, "        _o += {}", run_width(schema, &s.fields, i, end));
            for field in &s.fields[i..end] {
                if let FieldType::Elem(ElemType::Enum(idx)) = field.ty {
                    let _ = writeln!(
                        out,
                        "        {} = {}({})",
                        field.name, schema.enums[idx].name, field.name
                    );
                }
            }
            i = end;
            continue;
        }

        let field = &s.fields[i];
        match &field.ty {
            FieldType::Elem(elem) => {
                emit_unpack_elem(out, schema, elem, &field.name, "        ");
            }
            FieldType::Array { elem, .. } => {
                let _ = writeln!(out, "        _count = _data[_o]");
                out.push_str("        _o += 1\n");
                let _ = writeln!(out, "        {} = []", field.name);
                out.push_str("        for _ in range(_count):\n");
                emit_unpack_elem(out, schema, elem, "_item", "            ");
                let _ = writeln!(out, "            {}.append(_item)", field.name);
            }
        }
        i += 1;
    }
    let names: Vec<&str> = s.fields.iter().map(|f| f.name.as_str()).collect();
    let _ = writeln!(
        out,
        "        return cls({}), _o - offset\n\n",
        names.join(", ")
    );
}

fn emit_protocol(out: &mut String, schema: &Schema, proto: &crate::sema::ProtocolDef) {
    out.push_str("class Protocol(ProtocolBase):\n");
    out.push_str("    _message_types: ClassVar[dict[int, type[Struct]]] = {\n");
    for m in &proto.messages {
        let _ = writeln!(
            out,
            "        {}: {},",
            m.id, schema.structs[m.struct_idx].name
        );
    }
    out.push_str("    }\n");
    out.push_str("    _message_ids: ClassVar[dict[str, int]] = {\n");
    for m in &proto.messages {
        let _ = writeln!(
            out,
            "        \"{}\": {},",
            schema.structs[m.struct_idx].name, m.id
        );
    }
    out.push_str("    }\n\n");
    out.push_str("    def __init__(self, **kwargs) -> None:\n");
    let _ = writeln!(
        out,
        "        kwargs.setdefault(\"crc\", \"{}\")",
        proto.crc.name().to_uppercase()
    );
    let _ = writeln!(
        out,
        "        kwargs.setdefault(\"max_length\", {})",
        proto.max_length
    );
    out.push_str("        super().__init__(**kwargs)\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::sema::analyze;

    const SCHEMA: &str = r#"
enum Direction: uint8 {
    Up = 0
    Down = 1
}

struct Move {
    direction: Direction
    distance: uint16
    label: string[8]
    waypoints: uint8[4]
}

protocol {
    framing = cobs
    crc = CRC8
    messageIds {
        Move = 1
    }
}
"#;

    #[test]
    fn generates_dataclasses_and_protocol() {
        let schema = analyze(parse(SCHEMA).unwrap()).unwrap();
        let out = Python.generate(&schema);

        assert!(out.contains("class Direction(IntEnum):"));
        assert!(out.contains("class Move(Struct):"));
        assert!(out.contains("direction: Direction"));
        assert!(out.contains("waypoints: list[int]"));
        // direction and distance coalesce into one scalar run.
        assert!(out.contains("_struct.pack(\"<BH\", self.direction, self.distance)"));
        assert!(out.contains("_buf.append(0)"));
        assert!(out.contains("\"Move\": 1,"));
        assert!(out.contains("kwargs.setdefault(\"crc\", \"CRC8\")"));
    }

    #[test]
    fn no_runtime_artifact() {
        assert!(Python.runtime().is_none());
    }
}
