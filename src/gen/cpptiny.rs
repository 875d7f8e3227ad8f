//! C++ "tiny" backend: fixed-capacity containers, templates over the byte
//! stream, no heap.

use std::fmt::Write;

use crate::ast::Primitive;
use crate::runtime::crc::CrcKind;
use crate::sema::{ElemType, FieldType, Framing, Schema, StructDef};

use super::{c99_runtime_core, dependency_order, overlay_safe, Backend};

pub struct CppTiny;

impl Backend for CppTiny {
    fn target(&self) -> &'static str {
        "cpptiny"
    }

    fn generate(&self, schema: &Schema) -> String {
        let mut out = String::new();
        out.push_str("#pragma once\n\n#include \"bakelite.h\"\n\n");
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

        out
    }

    fn runtime(&self) -> Option<String> {
        let mut out = String::new();
        out.push_str(RUNTIME_PROLOG);
        out.push_str(&c99_runtime_core());
        out.push('\n');
        out.push_str(RUNTIME_NAMESPACE);
        Some(out)
    }
}

fn prim_cpptype(p: Primitive) -> &'static str {
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

fn emit_enum(out: &mut String, e: &crate::sema::EnumDef) {
    let _ = writeln!(
        out,
        "enum class {} : {} {{",
        e.name,
        prim_cpptype(e.underlying)
    );
    for (name, value) in &e.values {
        let _ = writeln!(out, "  {} = {},", name, value);
    }
    out.push_str("};\n\n");
}

fn member_decl(schema: &Schema, field: &crate::sema::Field) -> String {
    fn elem_type(schema: &Schema, elem: &ElemType) -> String {
        match *elem {
            ElemType::Prim(p) => prim_cpptype(p).to_string(),
            ElemType::Enum(idx) => schema.enums[idx].name.clone(),
            ElemType::Struct(idx) => schema.structs[idx].name.clone(),
            ElemType::Bytes(cap) => format!("Bakelite::SizedArray<uint8_t, {}>", cap),
            ElemType::Str(_) => unreachable!("strings declare as char arrays"),
        }
    }

    match &field.ty {
        FieldType::Elem(ElemType::Str(cap)) => format!("char {}[{}];", field.name, cap),
        FieldType::Elem(elem) => format!("{} {};", elem_type(schema, elem), field.name),
        FieldType::Array { elem: ElemType::Str(k), cap } => format!(
            "Bakelite::SizedArray<Bakelite::FixedString<{}>, {}> {};",
            k, cap, field.name
        ),
        FieldType::Array { elem, cap } => format!(
            "Bakelite::SizedArray<{}, {}> {};",
            elem_type(schema, elem),
            cap,
            field.name
        ),
    }
}

fn pack_stmt(schema: &Schema, field: &crate::sema::Field) -> Vec<String> {
    fn elem_pack(schema: &Schema, elem: &ElemType, place: &str) -> String {
        match *elem {
            ElemType::Prim(_) => format!("Bakelite::write(stream, {})", place),
            ElemType::Enum(idx) => format!(
                "Bakelite::write(stream, static_cast<{}>({}))",
                prim_cpptype(schema.enums[idx].underlying),
                place
            ),
            ElemType::Struct(_) => format!("{}.pack(stream)", place),
            ElemType::Bytes(_) => format!("Bakelite::writeBytes(stream, {})", place),
            ElemType::Str(_) => format!("Bakelite::writeString(stream, {})", place),
        }
    }

    match &field.ty {
        FieldType::Elem(elem) => vec![format!(
            "if ((rcode = {}) != 0) return rcode;",
            elem_pack(schema, elem, &field.name)
        )],
        FieldType::Array { elem, .. } => {
            let inner = match elem {
                ElemType::Str(_) => format!(
                    "Bakelite::writeString(stream, {}.data[i].chars)",
                    field.name
                ),
                _ => elem_pack(schema, elem, &format!("{}.data[i]", field.name)),
            };
            vec![
                format!(
                    "if ((rcode = Bakelite::write(stream, {}.len)) != 0) return rcode;",
                    field.name
                ),
                format!("for (uint8_t i = 0; i < {}.len; i++) {{", field.name),
                format!("  if ((rcode = {}) != 0) return rcode;", inner),
                "}".to_string(),
            ]
        }
    }
}

fn unpack_stmt(schema: &Schema, field: &crate::sema::Field) -> Vec<String> {
    fn elem_unpack(schema: &Schema, elem: &ElemType, place: &str) -> String {
        match *elem {
            ElemType::Prim(_) => format!("Bakelite::read(stream, &{})", place),
            ElemType::Enum(idx) => format!(
                "Bakelite::readEnum<{}>(stream, &{})",
                prim_cpptype(schema.enums[idx].underlying),
                place
            ),
            ElemType::Struct(_) => format!("{}.unpack(stream)", place),
            ElemType::Bytes(_) => format!("Bakelite::readBytes(stream, {})", place),
            ElemType::Str(_) => format!("Bakelite::readString(stream, {})", place),
        }
    }

    match &field.ty {
        FieldType::Elem(elem) => vec![format!(
            "if ((rcode = {}) != 0) return rcode;",
            elem_unpack(schema, elem, &field.name)
        )],
        FieldType::Array { elem, cap } => {
            let inner = match elem {
                ElemType::Str(_) => format!(
                    "Bakelite::readString(stream, {}.data[i].chars)",
                    field.name
                ),
                _ => elem_unpack(schema, elem, &format!("{}.data[i]", field.name)),
            };
            vec![
                "{".to_string(),
                "  uint8_t count;".to_string(),
                "  if ((rcode = Bakelite::read(stream, &count)) != 0) return rcode;".to_string(),
                format!("  if (count > {}) return -4;", cap),
                format!("  {}.len = count;", field.name),
                "  for (uint8_t i = 0; i < count; i++) {".to_string(),
                format!("    if ((rcode = {}) != 0) return rcode;", inner),
                "  }".to_string(),
                "}".to_string(),
            ]
        }
    }
}

fn emit_struct(out: &mut String, schema: &Schema, s: &StructDef) {
    let _ = writeln!(out, "struct BAKELITE_PACKED {} {{", s.name);
    for field in &s.fields {
        let _ = writeln!(out, "  {}", member_decl(schema, field));
    }

    out.push_str("\n  template<class T>\n  int pack(T &stream) const {\n    int rcode = 0;\n");
    for field in &s.fields {
        for line in pack_stmt(schema, field) {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out.push_str("    return rcode;\n  }\n");

    out.push_str("\n  template<class T>\n  int unpack(T &stream) {\n    int rcode = 0;\n");
    for field in &s.fields {
        for line in unpack_stmt(schema, field) {
            let _ = writeln!(out, "    {}", line);
        }
    }
    out.push_str("    return rcode;\n  }\n};\n\n");
}

fn emit_protocol(out: &mut String, schema: &Schema, proto: &crate::sema::ProtocolDef) {
    let crc_class = match proto.crc {
        CrcKind::None => "Bakelite::CrcNoop",
        CrcKind::Crc8 => "Bakelite::Crc8",
        CrcKind::Crc16 => "Bakelite::Crc16",
        CrcKind::Crc32 => "Bakelite::Crc32",
    };

    let _ = writeln!(
        out,
        "template <class F = Bakelite::CobsFramer<{}, {}>>\nclass ProtocolBase {{\npublic:",
        crc_class, proto.max_length
    );
    out.push_str(
        r#"  using ReadFn  = int (*)();
  using WriteFn = size_t (*)(const char *data, size_t length);

  enum class Message {
    NoMessage = -1,
"#,
    );
    for m in &proto.messages {
        let _ = writeln!(
            out,
            "    {} = {},",
            schema.structs[m.struct_idx].name, m.id
        );
    }
    out.push_str("  };\n\n");

    out.push_str(
        r#"  ProtocolBase(ReadFn read, WriteFn write): m_readFn(read), m_writeFn(write) {}

  Message poll() {
    int byte = (*m_readFn)();
    if (byte < 0) {
      return Message::NoMessage;
    }

    auto result = m_framer.readFrameByte((char)byte);
    if (result.status == Bakelite::CobsDecodeState::Decoded && result.length > 0) {
      m_receivedMessage = (Message)(uint8_t)result.data[0];
      m_receivedLength = result.length - 1;
      return m_receivedMessage;
    }

    return Message::NoMessage;
  }

  // Zero-copy access to the decoded payload, past the message id.
  template<typename T>
  T& message() {
    return *reinterpret_cast<T*>(m_framer.buffer() + 1);
  }

"#,
    );

    for m in &proto.messages {
        let s = &schema.structs[m.struct_idx];
        let name = &s.name;

        if overlay_safe(s) {
            let _ = writeln!(
                out,
                r#"  // {name} is fixed-size: the packed struct is the wire image.
  int send(const {name}*) {{
    m_framer.buffer()[0] = static_cast<char>(Message::{name});
    auto result = m_framer.encodeFrame(sizeof({name}) + 1);
    if (result.status != 0) {{
      return result.status;
    }}
    size_t sent = (*m_writeFn)(result.data, result.length);
    return sent == result.length ? 0 : -1;
  }}
"#,
            );
        }

        let _ = writeln!(
            out,
            r#"  int send(const {name} &val) {{
    Bakelite::BufferStream stream(m_framer.buffer() + 1, m_framer.bufferSize() - 1);
    m_framer.buffer()[0] = static_cast<char>(Message::{name});
    int rcode = val.pack(stream);
    if (rcode != 0) {{
      return rcode;
    }}
    auto result = m_framer.encodeFrame(stream.pos() + 1);
    if (result.status != 0) {{
      return result.status;
    }}
    size_t sent = (*m_writeFn)(result.data, result.length);
    return sent == result.length ? 0 : -1;
  }}

  int decode({name} &val) {{
    if (m_receivedMessage != Message::{name}) {{
      return -1;
    }}
    Bakelite::BufferStream stream(m_framer.buffer() + 1, m_receivedLength);
    return val.unpack(stream);
  }}
"#,
        );
    }

    out.push_str(
        r#"  // Zero-copy send: the caller filled message<T>() in place.
  template<typename T>
  int send() {
    return send(static_cast<const T*>(nullptr));
  }

private:
  ReadFn m_readFn;
  WriteFn m_writeFn;
  F m_framer;

  size_t m_receivedLength = 0;
  Message m_receivedMessage = Message::NoMessage;
};

using Protocol = ProtocolBase<>;
"#,
    );
}

const PLATFORM_CHECK: &str = r#"// The packed overlay relies on unaligned loads.
#if defined(__AVR__) || (defined(__ARM_ARCH) && __ARM_ARCH >= 7) || \
    defined(__x86_64__) || defined(__i386__) || defined(_M_X64) || defined(_M_IX86)
  #define BAKELITE_UNALIGNED_OK 1
#else
  #define BAKELITE_UNALIGNED_OK 0
#endif

static_assert(BAKELITE_UNALIGNED_OK,
  "zero-copy packed structs require unaligned memory access");

"#;

const RUNTIME_PROLOG: &str = r#"// Bakelite runtime support (C++). Generated file; do not edit.
#pragma once

#include <stddef.h>
#include <stdint.h>
#include <string.h>

#if defined(__GNUC__) || defined(__clang__)
  #define BAKELITE_PACKED __attribute__((packed))
#else
  #define BAKELITE_PACKED
#endif

"#;

const RUNTIME_NAMESPACE: &str = r#"
namespace Bakelite {

/// Fixed-capacity array with a runtime length.
template<typename T, size_t N, typename SizeT = uint8_t>
struct SizedArray {
  T data[N];
  SizeT len = 0;

  void assign(const T *src, size_t count) {
    len = static_cast<SizeT>(count < N ? count : N);
    memcpy(data, src, len * sizeof(T));
  }

  size_t size() const { return len; }
  size_t capacity() const { return N; }

  T &operator[](size_t i) { return data[i]; }
  const T &operator[](size_t i) const { return data[i]; }

  T *begin() { return data; }
  T *end() { return data + len; }
  const T *begin() const { return data; }
  const T *end() const { return data + len; }
};

/// Inline storage for one string element inside an array.
template<size_t N>
struct FixedString {
  char chars[N];
};

class BufferStream {
public:
  BufferStream(char *buf, size_t size) :
    m_buf(buf),
    m_size(size),
    m_pos(0)
  {}

  int write(const char *data, size_t length) {
    size_t end = m_pos + length;
    if (end > m_size) {
      return -1;
    }
    memcpy(m_buf + m_pos, data, length);
    m_pos = end;
    return 0;
  }

  int read(char *data, size_t length) {
    size_t end = m_pos + length;
    if (end > m_size) {
      return -2;
    }
    memcpy(data, m_buf + m_pos, length);
    m_pos = end;
    return 0;
  }

  int seek(size_t pos) {
    if (pos >= m_size) {
      return -3;
    }
    m_pos = pos;
    return 0;
  }

  size_t size() const { return m_size; }
  size_t pos() const { return m_pos; }

private:
  char *m_buf;
  size_t m_size;
  size_t m_pos;
};

template <class T, class V>
int write(T &stream, V val) {
  return stream.write((const char *)&val, sizeof(val));
}

template <class T, class V>
int read(T &stream, V *val) {
  return stream.read((char *)val, sizeof(*val));
}

template <class U, class T, class E>
int readEnum(T &stream, E *val) {
  U raw;
  int rcode = read(stream, &raw);
  if (rcode != 0)
    return rcode;
  *val = static_cast<E>(raw);
  return 0;
}

template <class T, size_t N, typename SizeT>
int writeBytes(T &stream, const SizedArray<uint8_t, N, SizeT> &val) {
  int rcode = write(stream, static_cast<SizeT>(val.len));
  if (rcode != 0)
    return rcode;
  return stream.write((const char *)val.data, val.len);
}

template <class T, size_t N, typename SizeT>
int readBytes(T &stream, SizedArray<uint8_t, N, SizeT> &val) {
  SizeT size = 0;
  int rcode = read(stream, &size);
  if (rcode != 0)
    return rcode;
  if (size > N) {
    return -4;
  }
  val.len = size;
  return stream.read((char *)val.data, size);
}

template <class T>
int writeString(T &stream, const char *val) {
  size_t len = strlen(val);
  int rcode = stream.write(val, len);
  if (rcode != 0)
    return rcode;
  return write(stream, (uint8_t)0);
}

// Copy until the terminator; when the storage fills first, drain the
// stream and terminate at N - 1.
template <class T, size_t N>
int readString(T &stream, char (&val)[N]) {
  size_t i = 0;
  while (i < N - 1) {
    int rcode = stream.read(&val[i], 1);
    if (rcode != 0)
      return rcode;
    if (val[i] == '\0') {
      return 0;
    }
    i++;
  }
  char c;
  do {
    int rcode = stream.read(&c, 1);
    if (rcode != 0)
      return rcode;
  } while (c != '\0');
  val[N - 1] = '\0';
  return 0;
}

class CrcNoop {
public:
  constexpr static size_t size() { return 0; }
  uint8_t value() const { return 0; }
  void update(const char *, size_t) {}
};

class Crc8 {
public:
  constexpr static size_t size() { return sizeof(uint8_t); }
  uint8_t value() const { return m_val; }
  void update(const char *data, size_t length) {
    m_val = bakelite_crc8((const uint8_t *)data, length, m_val);
  }
private:
  uint8_t m_val = 0;
};

class Crc16 {
public:
  constexpr static size_t size() { return sizeof(uint16_t); }
  uint16_t value() const { return m_val; }
  void update(const char *data, size_t length) {
    m_val = bakelite_crc16((const uint8_t *)data, length, m_val);
  }
private:
  uint16_t m_val = 0;
};

class Crc32 {
public:
  constexpr static size_t size() { return sizeof(uint32_t); }
  uint32_t value() const { return m_val; }
  void update(const char *data, size_t length) {
    m_val = bakelite_crc32((const uint8_t *)data, length, m_val);
  }
private:
  uint32_t m_val = 0;
};

enum class CobsDecodeState {
  NotReady = 0,
  Decoded,
  DecodeFailure,
  CrcFailure,
  BufferOverrun
};

template<class Crc, size_t MaxLength>
class CobsFramer {
public:
  struct EncodeResult {
    int status;
    size_t length;
    char *data;
  };

  struct DecodeResult {
    CobsDecodeState status;
    size_t length;
    char *data;
  };

  /// Message area: id byte plus payload.
  char *buffer() {
    return m_buffer + MessageOffset;
  }

  size_t bufferSize() const {
    return MaxLength + 1;
  }

  EncodeResult encodeFrame(const char *data, size_t length) {
    memcpy(m_buffer + MessageOffset, data, length);
    return encodeFrame(length);
  }

  EncodeResult encodeFrame(size_t length) {
    char *msg = m_buffer + MessageOffset;

    if (CrcSize > 0) {
      Crc crc;
      crc.update(msg, length);
      auto value = crc.value();
      memcpy(msg + length, &value, CrcSize);
    }

    auto result = bakelite_cobs_encode(m_buffer, sizeof(m_buffer), msg, length + CrcSize);
    if (result.status != 0 || result.out_len >= sizeof(m_buffer)) {
      return { 1, 0, nullptr };
    }

    m_buffer[result.out_len] = 0;
    return { 0, result.out_len + 1, m_buffer };
  }

  DecodeResult readFrameByte(char byte) {
    *m_readPos = byte;
    size_t length = (size_t)(m_readPos - m_buffer) + 1;

    if (byte == 0) {
      m_readPos = m_buffer;
      return decodeFrame(length);
    }
    if (length == sizeof(m_buffer)) {
      m_readPos = m_buffer;
      return { CobsDecodeState::BufferOverrun, 0, nullptr };
    }

    m_readPos++;
    return { CobsDecodeState::NotReady, 0, nullptr };
  }

private:
  DecodeResult decodeFrame(size_t length) {
    if (length == 1) {
      return { CobsDecodeState::DecodeFailure, 0, nullptr };
    }
    length--; // discard the terminator

    auto result = bakelite_cobs_decode(m_buffer, sizeof(m_buffer), m_buffer, length);
    if (result.status != 0 || result.out_len < CrcSize) {
      return { CobsDecodeState::DecodeFailure, 0, nullptr };
    }

    length = result.out_len - CrcSize;
    if (length > MaxLength + 1) {
      return { CobsDecodeState::DecodeFailure, 0, nullptr };
    }

    if (CrcSize > 0) {
      Crc crc;
      crc.update(m_buffer, length);
      auto expected = crc.value();
      if (memcmp(&expected, m_buffer + length, CrcSize) != 0) {
        return { CobsDecodeState::CrcFailure, 0, nullptr };
      }
    }

    // Rebase the payload so the send-path overlay pointer stays valid.
    memmove(m_buffer + MessageOffset, m_buffer, length);
    return { CobsDecodeState::Decoded, length, m_buffer + MessageOffset };
  }

  static constexpr size_t CrcSize = Crc::size();
  static constexpr size_t MessageOffset =
      BAKELITE_COBS_OVERHEAD(MaxLength + CrcSize);
  static constexpr size_t BufferSize =
      MessageOffset + MaxLength + CrcSize + 1;

  char m_buffer[BufferSize];
  char *m_readPos = m_buffer;
};

} // namespace Bakelite
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::sema::analyze;

    const SCHEMA: &str = r#"
enum Level: uint8 {
    Low = 0
    High = 1
}

struct Sample {
    level: Level
    reading: float32
    tags: bytes[12]
    note: string[10]
}

protocol {
    maxLength = 40
    framing = cobs
    crc = CRC32
    messageIds {
        Sample = 3
    }
}
"#;

    #[test]
    fn generates_struct_and_protocol() {
        let schema = analyze(parse(SCHEMA).unwrap()).unwrap();
        let out = CppTiny.generate(&schema);

        assert!(out.contains("enum class Level : uint8_t {"));
        assert!(out.contains("Bakelite::SizedArray<uint8_t, 12> tags;"));
        assert!(out.contains("char note[10];"));
        assert!(out.contains("template<class T>\n  int pack(T &stream) const {"));
        assert!(out.contains("Bakelite::CobsFramer<Bakelite::Crc32, 40>"));
        assert!(out.contains("int decode(Sample &val)"));
        // Sample carries variable fields: no pointer-overload zero-copy send.
        assert!(!out.contains("int send(const Sample*)"));
    }

    #[test]
    fn runtime_carries_framer_and_serializer() {
        let rt = CppTiny.runtime().unwrap();
        assert!(rt.contains("namespace Bakelite {"));
        assert!(rt.contains("struct SizedArray"));
        assert!(rt.contains("class BufferStream"));
        assert!(rt.contains("class CobsFramer"));
        assert!(rt.contains("readFrameByte"));
        assert!(rt.contains("bakelite_crc32"));
    }
}
