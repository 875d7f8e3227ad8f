//! C99 "tiny" backend: fixed-capacity inline storage, no heap.

use std::fmt::Write;

use crate::ast::Primitive;
use crate::runtime::crc::CrcKind;
use crate::sema::{ElemType, FieldType, Framing, Schema, StructDef};

use super::{c99_runtime_core, dependency_order, overlay_safe, Backend};

pub struct CTiny;

impl Backend for CTiny {
    fn target(&self) -> &'static str {
        "ctiny"
    }

    fn generate(&self, schema: &Schema) -> String {
        let mut out = String::new();
        out.push_str("#ifndef PROTOCOL_H\n#define PROTOCOL_H\n\n");
        out.push_str("#include \"bakelite.h\"\n\n");
        out.push_str(PLATFORM_CHECK);

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

        out.push_str("#endif /* PROTOCOL_H */\n");
        out
    }

    fn runtime(&self) -> Option<String> {
        let mut out = String::new();
        out.push_str(RUNTIME_PROLOG);
        out.push_str(&c99_runtime_core());
        out.push('\n');
        out.push_str(RUNTIME_STREAM);
        out.push('\n');
        out.push_str(RUNTIME_SERIALIZER);
        out.push('\n');
        out.push_str(RUNTIME_FRAMER);
        out.push_str("\n#endif /* BAKELITE_H */\n");
        Some(out)
    }
}

fn prim_ctype(p: Primitive) -> &'static str {
    match p {
        Primitive::Bool => "bool",
        Primitive::Int8 => "int8_t",
        Primitive::Int16 => "int16_t",
        Primitive::Int32 => "int32_t",
        Primitive::Int64 => "int64_t",
        Primitive::UInt8 => "uint8_t",
        Primitive::UInt16 => "uint16_t",
        Primitive::UInt32 => "uint32_t",
        Primitive::UInt64 => "uint64_t",
        Primitive::Float32 => "float",
        Primitive::Float64 => "double",
    }
}

fn prim_suffix(p: Primitive) -> &'static str {
    match p {
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

fn emit_enum(out: &mut String, e: &crate::sema::EnumDef) {
    // A width-exact typedef keeps the packed overlay honest; the names live
    // in a plain enum so they stay usable as constants.
    let _ = writeln!(out, "typedef {} {};", prim_ctype(e.underlying), e.name);
    out.push_str("enum {\n");
    for (name, value) in &e.values {
        let _ = writeln!(out, "  {}_{} = {},", e.name, name, value);
    }
    out.push_str("};\n\n");
}

fn member_decl(schema: &Schema, field: &crate::sema::Field) -> String {
    match &field.ty {
        FieldType::Elem(elem) => match *elem {
            ElemType::Prim(p) => format!("{} {};", prim_ctype(p), field.name),
            ElemType::Enum(idx) => format!("{} {};", schema.enums[idx].name, field.name),
            ElemType::Struct(idx) => format!("{} {};", schema.structs[idx].name, field.name),
            ElemType::Str(cap) => format!("char {}[{}];", field.name, cap),
            ElemType::Bytes(cap) => format!(
                "struct {{ uint8_t data[{}]; uint8_t len; }} {};",
                cap, field.name
            ),
        },
        FieldType::Array { elem, cap } => {
            let inner = match *elem {
                ElemType::Prim(p) => format!("{} data[{}];", prim_ctype(p), cap),
                ElemType::Enum(idx) => format!("{} data[{}];", schema.enums[idx].name, cap),
                ElemType::Struct(idx) => {
                    format!("{} data[{}];", schema.structs[idx].name, cap)
                }
                ElemType::Str(k) => format!("char data[{}][{}];", cap, k),
                ElemType::Bytes(k) => format!(
                    "struct {{ uint8_t data[{}]; uint8_t len; }} data[{}];",
                    k, cap
                ),
            };
            format!("struct {{ {} uint8_t len; }} {};", inner, field.name)
        }
    }
}

fn write_elem(schema: &Schema, elem: &ElemType, place: &str) -> String {
    match *elem {
        ElemType::Prim(p) => format!("bakelite_write_{}(buf, {})", prim_suffix(p), place),
        ElemType::Enum(idx) => format!(
            "bakelite_write_{}(buf, {})",
            prim_suffix(schema.enums[idx].underlying),
            place
        ),
        ElemType::Struct(idx) => {
            format!("{}_pack(&{}, buf)", schema.structs[idx].name, place)
        }
        ElemType::Bytes(_) => format!("bakelite_write_bytes(buf, {p}.data, {p}.len)", p = place),
        ElemType::Str(_) => format!("bakelite_write_string(buf, {})", place),
    }
}

fn read_elem(schema: &Schema, elem: &ElemType, place: &str) -> String {
    match *elem {
        ElemType::Prim(p) => format!("bakelite_read_{}(buf, &{})", prim_suffix(p), place),
        ElemType::Enum(idx) => format!(
            "bakelite_read_{}(buf, &{})",
            prim_suffix(schema.enums[idx].underlying),
            place
        ),
        ElemType::Struct(idx) => {
            format!("{}_unpack(&{}, buf)", schema.structs[idx].name, place)
        }
        ElemType::Bytes(cap) => format!(
            "bakelite_read_bytes(buf, {p}.data, &{p}.len, {cap})",
            p = place,
            cap = cap
        ),
        ElemType::Str(cap) => format!("bakelite_read_string(buf, {}, {})", place, cap),
    }
}

fn emit_struct(out: &mut String, schema: &Schema, s: &StructDef) {
    out.push_str("typedef struct BAKELITE_PACKED {\n");
    for field in &s.fields {
        let _ = writeln!(out, "  {}", member_decl(schema, field));
    }
    let _ = writeln!(out, "}} {};\n", s.name);

    // pack
    let _ = writeln!(
        out,
        "static inline int {}_pack(const {} *self, Bakelite_Buffer *buf) {{",
        s.name, s.name
    );
    out.push_str("  int rcode = 0;\n");
    for field in &s.fields {
        match &field.ty {
            FieldType::Elem(elem) => {
                let op = write_elem(schema, elem, &format!("self->{}", field.name));
                let _ = writeln!(out, "  if ((rcode = {}) != 0) return rcode;", op);
            }
            FieldType::Array { elem, .. } => {
                let _ = writeln!(
                    out,
                    "  if ((rcode = bakelite_write_uint8(buf, self->{}.len)) != 0) return rcode;",
                    field.name
                );
                let _ = writeln!(
                    out,
                    "  for (uint8_t i = 0; i < self->{}.len; i++) {{",
                    field.name
                );
                let op = write_elem(schema, elem, &format!("self->{}.data[i]", field.name));
                let _ = writeln!(out, "    if ((rcode = {}) != 0) return rcode;", op);
                out.push_str("  }\n");
            }
        }
    }
    out.push_str("  return rcode;\n}\n\n");

    // unpack
    let _ = writeln!(
        out,
        "static inline int {}_unpack({} *self, Bakelite_Buffer *buf) {{",
        s.name, s.name
    );
    out.push_str("  int rcode = 0;\n");
    for field in &s.fields {
        match &field.ty {
            FieldType::Elem(elem) => {
                let op = read_elem(schema, elem, &format!("self->{}", field.name));
                let _ = writeln!(out, "  if ((rcode = {}) != 0) return rcode;", op);
            }
            FieldType::Array { elem, cap } => {
                out.push_str("  {\n    uint8_t count;\n");
                out.push_str(
                    "    if ((rcode = bakelite_read_uint8(buf, &count)) != 0) return rcode;\n",
                );
                let _ = writeln!(
                    out,
                    "    if (count > {}) return BAKELITE_ERR_CAPACITY;",
                    cap
                );
                let _ = writeln!(out, "    self->{}.len = count;", field.name);
                out.push_str("    for (uint8_t i = 0; i < count; i++) {\n");
                let op = read_elem(schema, elem, &format!("self->{}.data[i]", field.name));
                let _ = writeln!(out, "      if ((rcode = {}) != 0) return rcode;", op);
                out.push_str("    }\n  }\n");
            }
        }
    }
    out.push_str("  return rcode;\n}\n\n");
}

fn emit_protocol(out: &mut String, schema: &Schema, proto: &crate::sema::ProtocolDef) {
    let crc_const = match proto.crc {
        CrcKind::None => "BAKELITE_CRC_NONE",
        CrcKind::Crc8 => "BAKELITE_CRC_8",
        CrcKind::Crc16 => "BAKELITE_CRC_16",
        CrcKind::Crc32 => "BAKELITE_CRC_32",
    };

    out.push_str("/* Protocol message ids */\ntypedef enum {\n  Protocol_NoMessage = -1,\n");
    for m in &proto.messages {
        let _ = writeln!(
            out,
            "  Protocol_{} = {},",
            schema.structs[m.struct_idx].name, m.id
        );
    }
    out.push_str("} Protocol_Message;\n\n");

    let _ = writeln!(
        out,
        "#define PROTOCOL_MAX_LENGTH {}\n#define PROTOCOL_CRC_SIZE {}",
        proto.max_length,
        proto.crc.width()
    );
    out.push_str(
        "#define PROTOCOL_BUFFER_SIZE \
         BAKELITE_FRAMER_BUFFER_SIZE(PROTOCOL_MAX_LENGTH, PROTOCOL_CRC_SIZE)\n\n",
    );

    out.push_str(
        r#"/* Protocol handler: framer state plus the caller's I/O hooks */
typedef struct {
  int (*read_byte)(void);
  size_t (*write)(const uint8_t *data, size_t length);
  Bakelite_CobsFramer framer;
  uint8_t buffer[PROTOCOL_BUFFER_SIZE];
  Protocol_Message received_message;
  size_t received_length;
} Protocol;

static inline void Protocol_init(Protocol *self,
                                 int (*read_byte)(void),
                                 size_t (*write)(const uint8_t *data, size_t length)) {
  self->read_byte = read_byte;
  self->write = write;
  self->received_message = Protocol_NoMessage;
  self->received_length = 0;
"#,
    );
    let _ = writeln!(
        out,
        "  bakelite_framer_init(&self->framer, self->buffer, PROTOCOL_BUFFER_SIZE,\n\
         \x20                     PROTOCOL_MAX_LENGTH, {});\n}}\n",
        crc_const
    );

    out.push_str(
        r#"static inline Protocol_Message Protocol_poll(Protocol *self) {
  int byte = self->read_byte();
  if (byte < 0) {
    return Protocol_NoMessage;
  }

  Bakelite_DecodeResult result = bakelite_framer_read_byte(&self->framer, (uint8_t)byte);
  if (result.status == BAKELITE_DECODE_OK && result.length > 0) {
    self->received_message = (Protocol_Message)result.data[0];
    self->received_length = result.length - 1;
    return self->received_message;
  }

  return Protocol_NoMessage;
}

/* First payload byte past the message id, for zero-copy access */
static inline uint8_t *Protocol_buffer(Protocol *self) {
  return bakelite_framer_buffer(&self->framer) + 1;
}

"#,
    );

    for m in &proto.messages {
        let s = &schema.structs[m.struct_idx];
        let name = &s.name;

        if overlay_safe(s) {
            let _ = writeln!(
                out,
                r#"/* Zero-copy overlay ({name} is fixed-size, wire == memory) */
static inline {name} *Protocol_message_{name}(Protocol *self) {{
  return ({name} *)(bakelite_framer_buffer(&self->framer) + 1);
}}

static inline int Protocol_send_zerocopy_{name}(Protocol *self) {{
  bakelite_framer_buffer(&self->framer)[0] = (uint8_t)Protocol_{name};
  Bakelite_FramerResult result = bakelite_framer_encode(&self->framer, sizeof({name}) + 1);
  if (result.status != 0) {{
    return result.status;
  }}
  size_t sent = self->write(result.data, result.length);
  return sent == result.length ? 0 : -1;
}}
"#,
            );
        }

        let _ = writeln!(
            out,
            r#"static inline int Protocol_send_{name}(Protocol *self, const {name} *msg) {{
  uint8_t *region = bakelite_framer_buffer(&self->framer);
  region[0] = (uint8_t)Protocol_{name};

  Bakelite_Buffer buf;
  bakelite_buffer_init(&buf, region + 1, bakelite_framer_buffer_size(&self->framer) - 1);
  int rcode = {name}_pack(msg, &buf);
  if (rcode != 0) {{
    return rcode;
  }}

  Bakelite_FramerResult result = bakelite_framer_encode(&self->framer, buf.pos + 1);
  if (result.status != 0) {{
    return result.status;
  }}
  size_t sent = self->write(result.data, result.length);
  return sent == result.length ? 0 : -1;
}}

static inline int Protocol_decode_{name}(Protocol *self, {name} *msg) {{
  if (self->received_message != Protocol_{name}) {{
    return -1;
  }}
  Bakelite_Buffer buf;
  bakelite_buffer_init(&buf, bakelite_framer_buffer(&self->framer) + 1,
                       self->received_length);
  return {name}_unpack(msg, &buf);
}}
"#,
        );
    }
}

const PLATFORM_CHECK: &str = r#"/* The packed overlay relies on unaligned loads. */
#if defined(__AVR__) || (defined(__ARM_ARCH) && __ARM_ARCH >= 7) || \
    defined(__x86_64__) || defined(__i386__) || defined(_M_X64) || defined(_M_IX86)
  #define BAKELITE_UNALIGNED_OK 1
#else
  #define BAKELITE_UNALIGNED_OK 0
#endif

BAKELITE_STATIC_ASSERT(BAKELITE_UNALIGNED_OK, unaligned_access_required);

"#;

const RUNTIME_PROLOG: &str = r#"/* Bakelite runtime support (C99). Generated file; do not edit. */
#ifndef BAKELITE_H
#define BAKELITE_H

#include <stdbool.h>
#include <stddef.h>
#include <stdint.h>
#include <string.h>

#if defined(__GNUC__) || defined(__clang__)
  #define BAKELITE_PACKED __attribute__((packed))
#else
  #define BAKELITE_PACKED
#endif

#define BAKELITE_STATIC_ASSERT(cond, name) \
    typedef char bakelite_static_assert_##name[(cond) ? 1 : -1]

/* Error codes shared by the serializer and generated code */
#define BAKELITE_OK            0
#define BAKELITE_ERR_WRITE    -1
#define BAKELITE_ERR_READ     -2
#define BAKELITE_ERR_SEEK     -3
#define BAKELITE_ERR_CAPACITY -4

"#;

const RUNTIME_STREAM: &str = r#"/* Byte stream over a caller-owned region */
typedef struct {
    uint8_t *data;
    uint32_t size;
    uint32_t pos;
} Bakelite_Buffer;

static inline void bakelite_buffer_init(Bakelite_Buffer *buf, uint8_t *data, uint32_t size) {
    buf->data = data;
    buf->size = size;
    buf->pos = 0;
}

static inline void bakelite_buffer_reset(Bakelite_Buffer *buf) {
    buf->pos = 0;
}

static inline int bakelite_buffer_write(Bakelite_Buffer *buf, const void *data, uint32_t length) {
    if (buf->pos + length > buf->size) {
        return BAKELITE_ERR_WRITE;
    }
    memcpy(buf->data + buf->pos, data, length);
    buf->pos += length;
    return BAKELITE_OK;
}

static inline int bakelite_buffer_read(Bakelite_Buffer *buf, void *data, uint32_t length) {
    if (buf->pos + length > buf->size) {
        return BAKELITE_ERR_READ;
    }
    memcpy(data, buf->data + buf->pos, length);
    buf->pos += length;
    return BAKELITE_OK;
}

static inline int bakelite_buffer_seek(Bakelite_Buffer *buf, uint32_t pos) {
    if (pos >= buf->size) {
        return BAKELITE_ERR_SEEK;
    }
    buf->pos = pos;
    return BAKELITE_OK;
}

static inline uint32_t bakelite_buffer_remaining(const Bakelite_Buffer *buf) {
    return buf->size - buf->pos;
}
"#;

const RUNTIME_SERIALIZER: &str = r#"/* Serializer: little-endian primitives on a little-endian target,
 * length-prefixed bytes, null-terminated strings. */
#define BAKELITE_DEFINE_PRIM(type, name) \
    static inline int bakelite_write_##name(Bakelite_Buffer *buf, type val) { \
        return bakelite_buffer_write(buf, &val, sizeof(val)); \
    } \
    static inline int bakelite_read_##name(Bakelite_Buffer *buf, type *val) { \
        return bakelite_buffer_read(buf, val, sizeof(*val)); \
    }

BAKELITE_DEFINE_PRIM(bool, bool)
BAKELITE_DEFINE_PRIM(int8_t, int8)
BAKELITE_DEFINE_PRIM(uint8_t, uint8)
BAKELITE_DEFINE_PRIM(int16_t, int16)
BAKELITE_DEFINE_PRIM(uint16_t, uint16)
BAKELITE_DEFINE_PRIM(int32_t, int32)
BAKELITE_DEFINE_PRIM(uint32_t, uint32)
BAKELITE_DEFINE_PRIM(int64_t, int64)
BAKELITE_DEFINE_PRIM(uint64_t, uint64)
BAKELITE_DEFINE_PRIM(float, float32)
BAKELITE_DEFINE_PRIM(double, float64)

static inline int bakelite_write_bytes(Bakelite_Buffer *buf, const uint8_t *data, uint8_t len) {
    int rcode = bakelite_write_uint8(buf, len);
    if (rcode != BAKELITE_OK) {
        return rcode;
    }
    return bakelite_buffer_write(buf, data, len);
}

static inline int bakelite_read_bytes(Bakelite_Buffer *buf, uint8_t *data, uint8_t *len,
                                      uint8_t cap) {
    uint8_t n;
    int rcode = bakelite_read_uint8(buf, &n);
    if (rcode != BAKELITE_OK) {
        return rcode;
    }
    if (n > cap) {
        return BAKELITE_ERR_CAPACITY;
    }
    *len = n;
    return bakelite_buffer_read(buf, data, n);
}

static inline int bakelite_write_string(Bakelite_Buffer *buf, const char *val) {
    if (val != NULL) {
        uint32_t len = (uint32_t)strlen(val);
        int rcode = bakelite_buffer_write(buf, val, len);
        if (rcode != BAKELITE_OK) {
            return rcode;
        }
    }
    return bakelite_write_uint8(buf, 0);
}

/* Copy until the terminator; when the storage fills first, drain the
 * stream and terminate at cap - 1. */
static inline int bakelite_read_string(Bakelite_Buffer *buf, char *val, uint32_t cap) {
    uint32_t i = 0;
    while (i < cap - 1) {
        int rcode = bakelite_buffer_read(buf, &val[i], 1);
        if (rcode != BAKELITE_OK) {
            return rcode;
        }
        if (val[i] == '\0') {
            return BAKELITE_OK;
        }
        i++;
    }
    char c;
    do {
        int rcode = bakelite_buffer_read(buf, &c, 1);
        if (rcode != BAKELITE_OK) {
            return rcode;
        }
    } while (c != '\0');
    val[cap - 1] = '\0';
    return BAKELITE_OK;
}
"#;

const RUNTIME_FRAMER: &str = r#"/* Framer buffer layout */
#define BAKELITE_FRAMER_BUFFER_SIZE(MAX_LENGTH, CRC_SIZE) \
    (BAKELITE_COBS_OVERHEAD((MAX_LENGTH) + (CRC_SIZE)) + (MAX_LENGTH) + (CRC_SIZE) + 1)
#define BAKELITE_FRAMER_MESSAGE_OFFSET(MAX_LENGTH, CRC_SIZE) \
    BAKELITE_COBS_OVERHEAD((MAX_LENGTH) + (CRC_SIZE))

typedef enum {
    BAKELITE_DECODE_OK = 0,
    BAKELITE_DECODE_NOT_READY,
    BAKELITE_DECODE_FAILURE,
    BAKELITE_DECODE_CRC_FAILURE,
    BAKELITE_DECODE_BUFFER_OVERRUN
} Bakelite_DecodeState;

typedef enum {
    BAKELITE_CRC_NONE = 0,
    BAKELITE_CRC_8,
    BAKELITE_CRC_16,
    BAKELITE_CRC_32
} Bakelite_CrcType;

typedef struct {
    int status;
    size_t length;
    uint8_t *data;
} Bakelite_FramerResult;

typedef struct {
    Bakelite_DecodeState status;
    size_t length;
    uint8_t *data;
} Bakelite_DecodeResult;

typedef struct {
    uint8_t *buffer;
    size_t buffer_size;
    size_t max_length;
    size_t message_offset;
    size_t crc_size;
    Bakelite_CrcType crc_type;
    uint8_t *read_pos;
} Bakelite_CobsFramer;

static inline size_t bakelite_crc_size(Bakelite_CrcType crc_type) {
    switch (crc_type) {
        case BAKELITE_CRC_8:  return 1;
        case BAKELITE_CRC_16: return 2;
        case BAKELITE_CRC_32: return 4;
        default: return 0;
    }
}

static inline void bakelite_framer_init(Bakelite_CobsFramer *framer,
                                        uint8_t *buffer, size_t buffer_size,
                                        size_t max_length,
                                        Bakelite_CrcType crc_type) {
    framer->buffer = buffer;
    framer->buffer_size = buffer_size;
    framer->max_length = max_length;
    framer->crc_type = crc_type;
    framer->crc_size = bakelite_crc_size(crc_type);
    framer->message_offset = BAKELITE_FRAMER_MESSAGE_OFFSET(max_length, framer->crc_size);
    framer->read_pos = buffer;
}

/* Message area: id byte plus payload */
static inline uint8_t *bakelite_framer_buffer(Bakelite_CobsFramer *framer) {
    return framer->buffer + framer->message_offset;
}

static inline size_t bakelite_framer_buffer_size(Bakelite_CobsFramer *framer) {
    return framer->max_length + 1;
}

static inline void bakelite_framer_append_crc(Bakelite_CobsFramer *framer,
                                              uint8_t *data, size_t length) {
    switch (framer->crc_type) {
        case BAKELITE_CRC_8: {
            uint8_t crc = bakelite_crc8(data, length, 0);
            memcpy(data + length, &crc, sizeof(crc));
            break;
        }
        case BAKELITE_CRC_16: {
            uint16_t crc = bakelite_crc16(data, length, 0);
            memcpy(data + length, &crc, sizeof(crc));
            break;
        }
        case BAKELITE_CRC_32: {
            uint32_t crc = bakelite_crc32(data, length, 0);
            memcpy(data + length, &crc, sizeof(crc));
            break;
        }
        default:
            break;
    }
}

static inline bool bakelite_framer_check_crc(Bakelite_CobsFramer *framer,
                                             const uint8_t *data, size_t length) {
    switch (framer->crc_type) {
        case BAKELITE_CRC_8: {
            uint8_t expected;
            memcpy(&expected, data + length, sizeof(expected));
            return bakelite_crc8(data, length, 0) == expected;
        }
        case BAKELITE_CRC_16: {
            uint16_t expected;
            memcpy(&expected, data + length, sizeof(expected));
            return bakelite_crc16(data, length, 0) == expected;
        }
        case BAKELITE_CRC_32: {
            uint32_t expected;
            memcpy(&expected, data + length, sizeof(expected));
            return bakelite_crc32(data, length, 0) == expected;
        }
        default:
            return true;
    }
}

/* Frame the first `length` bytes of the message area. */
static inline Bakelite_FramerResult bakelite_framer_encode(Bakelite_CobsFramer *framer,
                                                           size_t length) {
    uint8_t *msg = framer->buffer + framer->message_offset;

    if (framer->crc_size > 0) {
        bakelite_framer_append_crc(framer, msg, length);
    }

    Bakelite_CobsEncodeResult result = bakelite_cobs_encode(
        framer->buffer, framer->buffer_size,
        msg, length + framer->crc_size);

    if (result.status != 0 || result.out_len >= framer->buffer_size) {
        Bakelite_FramerResult failure = { 1, 0, NULL };
        return failure;
    }

    framer->buffer[result.out_len] = 0;
    Bakelite_FramerResult ok = { 0, result.out_len + 1, framer->buffer };
    return ok;
}

static inline Bakelite_FramerResult bakelite_framer_encode_copy(Bakelite_CobsFramer *framer,
                                                                const uint8_t *data,
                                                                size_t length) {
    memcpy(framer->buffer + framer->message_offset, data, length);
    return bakelite_framer_encode(framer, length);
}

static inline Bakelite_DecodeResult bakelite_framer_decode_frame(Bakelite_CobsFramer *framer,
                                                                 size_t length) {
    Bakelite_DecodeResult failure = { BAKELITE_DECODE_FAILURE, 0, NULL };

    if (length == 1) {
        return failure;
    }
    length--; /* discard the terminator */

    Bakelite_CobsDecodeResult result = bakelite_cobs_decode(
        framer->buffer, framer->buffer_size,
        framer->buffer, length);

    if (result.status != 0 || result.out_len < framer->crc_size) {
        return failure;
    }

    length = result.out_len - framer->crc_size;
    if (length > framer->max_length + 1) {
        return failure;
    }

    if (framer->crc_size > 0) {
        if (!bakelite_framer_check_crc(framer, framer->buffer, length)) {
            Bakelite_DecodeResult bad_crc = { BAKELITE_DECODE_CRC_FAILURE, 0, NULL };
            return bad_crc;
        }
    }

    /* Rebase the payload so the send-path overlay pointer stays valid. */
    if (framer->message_offset > 0) {
        memmove(framer->buffer + framer->message_offset, framer->buffer, length);
    }

    Bakelite_DecodeResult ok = {
        BAKELITE_DECODE_OK,
        length,
        framer->buffer + framer->message_offset
    };
    return ok;
}

static inline Bakelite_DecodeResult bakelite_framer_read_byte(Bakelite_CobsFramer *framer,
                                                              uint8_t byte) {
    *framer->read_pos = byte;
    size_t length = (size_t)(framer->read_pos - framer->buffer) + 1;

    if (byte == 0) {
        framer->read_pos = framer->buffer;
        return bakelite_framer_decode_frame(framer, length);
    }
    if (length == framer->buffer_size) {
        framer->read_pos = framer->buffer;
        Bakelite_DecodeResult overrun = { BAKELITE_DECODE_BUFFER_OVERRUN, 0, NULL };
        return overrun;
    }

    framer->read_pos++;
    Bakelite_DecodeResult not_ready = { BAKELITE_DECODE_NOT_READY, 0, NULL };
    return not_ready;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::sema::analyze;

    const SCHEMA: &str = r#"
enum Mode: uint8 {
    Idle = 0
    Active = 1
}

struct Reading {
    mode: Mode
    raw: int16
}

struct Report {
    count: uint8
    readings: Reading[4]
    label: string[8]
}

protocol {
    maxLength = 64
    framing = cobs
    crc = CRC16
    messageIds {
        Report = 1
    }
}
"#;

    #[test]
    fn generates_structs_and_protocol() {
        let schema = analyze(parse(SCHEMA).unwrap()).unwrap();
        let out = CTiny.generate(&schema);

        assert!(out.contains("typedef uint8_t Mode;"));
        assert!(out.contains("Mode_Active = 1,"));
        assert!(out.contains("struct { Reading data[4]; uint8_t len; } readings;"));
        assert!(out.contains("char label[8];"));
        assert!(out.contains("Reading_pack"));
        assert!(out.contains("if (count > 4) return BAKELITE_ERR_CAPACITY;"));
        assert!(out.contains("#define PROTOCOL_MAX_LENGTH 64"));
        assert!(out.contains("#define PROTOCOL_CRC_SIZE 2"));
        assert!(out.contains("Protocol_send_Report"));
        assert!(out.contains("Protocol_decode_Report"));
        // Report has variable-length fields, so no overlay helpers.
        assert!(!out.contains("Protocol_send_zerocopy_Report"));
        // Reading is defined before Report, which uses it.
        assert!(out.find("} Reading;").unwrap() < out.find("} Report;").unwrap());
    }

    #[test]
    fn overlay_emitted_for_fixed_messages() {
        let src = r#"
struct Ping {
    seq: uint32
}
protocol {
    framing = cobs
    crc = CRC8
    messageIds {
        Ping = 7
    }
}
"#;
        let schema = analyze(parse(src).unwrap()).unwrap();
        let out = CTiny.generate(&schema);
        assert!(out.contains("Protocol_send_zerocopy_Ping"));
        assert!(out.contains("Protocol_message_Ping"));
    }

    #[test]
    fn runtime_is_self_contained() {
        let rt = CTiny.runtime().unwrap();
        assert!(rt.contains("#ifndef BAKELITE_H"));
        assert!(rt.contains("bakelite_crc16"));
        assert!(rt.contains("bakelite_read_string"));
        assert!(rt.contains("bakelite_framer_read_byte"));
        assert!(rt.contains("BAKELITE_ERR_CAPACITY"));
    }
}
