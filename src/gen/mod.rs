//! Code generation backends: one per target runtime.
//!
//! A backend is a function from the frozen schema to source text. All
//! backends read the same size/wire model, and the CRC tables emitted into
//! the tiny runtimes are formatted from the very tables the host runtime
//! computes at compile time, so the targets cannot drift apart.

pub mod cpptiny;
pub mod ctiny;
pub mod python;

use std::fmt::Write;

use crate::runtime::crc::{CRC16_TABLE, CRC32_TABLE, CRC8_TABLE};
use crate::sema::{ElemType, Schema, StructDef};

pub trait Backend {
    /// Target name as used on the command line.
    fn target(&self) -> &'static str;

    /// Render the per-protocol source artifact.
    fn generate(&self, schema: &Schema) -> String;

    /// Render the one-time runtime support artifact, when the target has
    /// one. Output is a pure function of the target.
    fn runtime(&self) -> Option<String>;
}

/// Resolve a target language name to its backend.
pub fn backend_for(lang: &str) -> Option<Box<dyn Backend>> {
    match lang {
        "python" => Some(Box::new(python::Python)),
        "ctiny" => Some(Box::new(ctiny::CTiny)),
        "cpptiny" => Some(Box::new(cpptiny::CppTiny)),
        _ => None,
    }
}

/// Struct indices in dependency order: every struct appears after the
/// structs its fields reference. The analyzer already rejected cycles.
pub(crate) fn dependency_order(schema: &Schema) -> Vec<usize> {
    fn visit(schema: &Schema, seen: &mut [bool], order: &mut Vec<usize>, idx: usize) {
        if seen[idx] {
            return;
        }
        seen[idx] = true;
        for field in &schema.structs[idx].fields {
            let elem = match field.ty {
                crate::sema::FieldType::Elem(e) => e,
                crate::sema::FieldType::Array { elem, .. } => elem,
            };
            if let ElemType::Struct(child) = elem {
                visit(schema, seen, order, child);
            }
        }
        order.push(idx);
    }

    let mut seen = vec![false; schema.structs.len()];
    let mut order = Vec::with_capacity(schema.structs.len());
    for idx in 0..schema.structs.len() {
        visit(schema, &mut seen, &mut order, idx);
    }
    order
}

/// True when the packed in-memory layout equals the wire layout, which is
/// what the zero-copy overlay requires. Variable-length fields store a
/// capacity plus a length in memory but not on the wire, so only
/// fixed-size messages qualify.
pub(crate) fn overlay_safe(s: &StructDef) -> bool {
    s.size.is_fixed()
}

fn format_table(values: &[u32], per_row: usize, width: usize) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i % per_row == 0 {
            out.push_str("    ");
        }
        let _ = write!(out, "0x{:0w$X}U,", v, w = width);
        if i % per_row == per_row - 1 {
            out.push('\n');
        }
    }
    out
}

/// The shared C99 CRC + COBS core embedded in both tiny runtime headers.
pub(crate) fn c99_runtime_core() -> String {
    let crc8_rows = format_table(
        &CRC8_TABLE.iter().map(|&v| v as u32).collect::<Vec<_>>(),
        8,
        2,
    );
    let crc16_rows = format_table(
        &CRC16_TABLE.iter().map(|&v| v as u32).collect::<Vec<_>>(),
        8,
        4,
    );
    let crc32_rows = format_table(&CRC32_TABLE, 4, 8);

    format!(
        r#"/* Table placement hook; flash/progmem builds may override these. */
#ifndef BAKELITE_FLASH
#define BAKELITE_FLASH
#define BAKELITE_FLASH_READ_8(x)  (x)
#define BAKELITE_FLASH_READ_16(x) (x)
#define BAKELITE_FLASH_READ_32(x) (x)
#endif

/* CRC-8, polynomial 0x107, init 0 */
static inline uint8_t bakelite_crc8(const uint8_t *data, size_t len, uint8_t crc) {{
    static const uint8_t table[256] BAKELITE_FLASH = {{
{crc8_rows}    }};

    while (len > 0) {{
        crc = BAKELITE_FLASH_READ_8(table[*data ^ crc]);
        data++;
        len--;
    }}
    return crc;
}}

/* CRC-16, polynomial 0x18005, reflected, init 0 */
static inline uint16_t bakelite_crc16(const uint8_t *data, size_t len, uint16_t crc) {{
    static const uint16_t table[256] BAKELITE_FLASH = {{
{crc16_rows}    }};

    while (len > 0) {{
        crc = BAKELITE_FLASH_READ_16(table[*data ^ (uint8_t)crc]) ^ (crc >> 8);
        data++;
        len--;
    }}
    return crc;
}}

/* CRC-32, polynomial 0x104C11DB7, reflected, init and final xor 0xFFFFFFFF */
static inline uint32_t bakelite_crc32(const uint8_t *data, size_t len, uint32_t crc) {{
    static const uint32_t table[256] BAKELITE_FLASH = {{
{crc32_rows}    }};

    crc = crc ^ 0xFFFFFFFFU;
    while (len > 0) {{
        crc = BAKELITE_FLASH_READ_32(table[*data ^ (uint8_t)crc]) ^ (crc >> 8);
        data++;
        len--;
    }}
    return crc ^ 0xFFFFFFFFU;
}}

/* COBS buffer arithmetic */
#define BAKELITE_COBS_OVERHEAD(LEN)              (((LEN) + 253u) / 254u)
#define BAKELITE_COBS_ENCODE_DST_LEN_MAX(LEN)    ((LEN) + BAKELITE_COBS_OVERHEAD(LEN))
#define BAKELITE_COBS_DECODE_DST_LEN_MAX(LEN)    (((LEN) == 0) ? 0u : ((LEN) - 1u))

typedef enum {{
    BAKELITE_COBS_ENCODE_OK = 0x00,
    BAKELITE_COBS_ENCODE_NULL_POINTER = 0x01,
    BAKELITE_COBS_ENCODE_OUT_BUFFER_OVERFLOW = 0x02
}} Bakelite_CobsEncodeStatus;

typedef enum {{
    BAKELITE_COBS_DECODE_OK = 0x00,
    BAKELITE_COBS_DECODE_NULL_POINTER = 0x01,
    BAKELITE_COBS_DECODE_OUT_BUFFER_OVERFLOW = 0x02,
    BAKELITE_COBS_DECODE_ZERO_BYTE_IN_INPUT = 0x04,
    BAKELITE_COBS_DECODE_INPUT_TOO_SHORT = 0x08
}} Bakelite_CobsDecodeStatus;

typedef struct {{
    size_t out_len;
    int status;
}} Bakelite_CobsEncodeResult;

typedef struct {{
    size_t out_len;
    int status;
}} Bakelite_CobsDecodeResult;

static inline Bakelite_CobsEncodeResult bakelite_cobs_encode(void *dst_ptr, size_t dst_len,
                                                             const void *src_ptr, size_t src_len) {{
    Bakelite_CobsEncodeResult result = {{0, BAKELITE_COBS_ENCODE_OK}};
    const uint8_t *src_read = (const uint8_t *)src_ptr;
    const uint8_t *src_end = src_read + src_len;
    uint8_t *dst_start = (uint8_t *)dst_ptr;
    uint8_t *dst_end = dst_start + dst_len;
    uint8_t *code_write = dst_start;
    uint8_t *dst_write = code_write + 1;
    uint8_t search_len = 1;

    if (dst_ptr == NULL || src_ptr == NULL) {{
        result.status = BAKELITE_COBS_ENCODE_NULL_POINTER;
        return result;
    }}

    if (src_len != 0) {{
        for (;;) {{
            if (dst_write >= dst_end) {{
                result.status |= BAKELITE_COBS_ENCODE_OUT_BUFFER_OVERFLOW;
                break;
            }}

            uint8_t byte = *src_read++;
            if (byte == 0) {{
                *code_write = search_len;
                code_write = dst_write++;
                search_len = 1;
                if (src_read >= src_end) {{
                    break;
                }}
            }} else {{
                *dst_write++ = byte;
                search_len++;
                if (src_read >= src_end) {{
                    break;
                }}
                if (search_len == 0xFF) {{
                    *code_write = search_len;
                    code_write = dst_write++;
                    search_len = 1;
                }}
            }}
        }}
    }}

    if (code_write >= dst_end) {{
        result.status |= BAKELITE_COBS_ENCODE_OUT_BUFFER_OVERFLOW;
        dst_write = dst_end;
    }} else {{
        *code_write = search_len;
    }}

    result.out_len = (size_t)(dst_write - dst_start);
    return result;
}}

/* In-place decode (dst == src) is supported: the writer trails the reader. */
static inline Bakelite_CobsDecodeResult bakelite_cobs_decode(void *dst_ptr, size_t dst_len,
                                                             const void *src_ptr, size_t src_len) {{
    Bakelite_CobsDecodeResult result = {{0, BAKELITE_COBS_DECODE_OK}};
    const uint8_t *src_read = (const uint8_t *)src_ptr;
    const uint8_t *src_end = src_read + src_len;
    uint8_t *dst_start = (uint8_t *)dst_ptr;
    uint8_t *dst_end = dst_start + dst_len;
    uint8_t *dst_write = dst_start;
    size_t remaining;
    uint8_t block;

    if (dst_ptr == NULL || src_ptr == NULL) {{
        result.status = BAKELITE_COBS_DECODE_NULL_POINTER;
        return result;
    }}

    if (src_len != 0) {{
        for (;;) {{
            block = *src_read++;
            if (block == 0) {{
                result.status |= BAKELITE_COBS_DECODE_ZERO_BYTE_IN_INPUT;
                break;
            }}
            block--;

            remaining = (size_t)(src_end - src_read);
            if (block > remaining) {{
                result.status |= BAKELITE_COBS_DECODE_INPUT_TOO_SHORT;
                block = (uint8_t)remaining;
            }}

            remaining = (size_t)(dst_end - dst_write);
            if (block > remaining) {{
                result.status |= BAKELITE_COBS_DECODE_OUT_BUFFER_OVERFLOW;
                block = (uint8_t)remaining;
            }}

            for (uint8_t i = block; i != 0; i--) {{
                uint8_t byte = *src_read++;
                if (byte == 0) {{
                    result.status |= BAKELITE_COBS_DECODE_ZERO_BYTE_IN_INPUT;
                }}
                *dst_write++ = byte;
            }}

            if (src_read >= src_end) {{
                break;
            }}

            if (block != 0xFE) {{
                if (dst_write >= dst_end) {{
                    result.status |= BAKELITE_COBS_DECODE_OUT_BUFFER_OVERFLOW;
                    break;
                }}
                *dst_write++ = 0;
            }}
        }}
    }}

    result.out_len = (size_t)(dst_write - dst_start);
    return result;
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_core_carries_the_reference_tables() {
        let core = c99_runtime_core();
        // First rows of each CRC table.
        assert!(core.contains("0x00U,0x07U,0x0EU,0x09U"));
        assert!(core.contains("0x0000U,0xC0C1U,0xC181U,0x0140U"));
        assert!(core.contains("0x00000000U,0x77073096U,0xEE0E612CU,0x990951BAU"));
        assert!(core.contains("bakelite_cobs_encode"));
        assert!(core.contains("bakelite_cobs_decode"));
    }
}
