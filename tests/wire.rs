//! Host codec tests: byte-exact encoding per field shape and round-trips.

use std::collections::HashMap;

use bakelite::runtime::Buffer;
use bakelite::{analyze, parse, Codec, CodecError, Value};

const TYPES: &str = "
enum Direction: uint8 {
    Up = 0
    Down = 1
    Left = 2
    Right = 3
}

enum Speed: uint8 {
    Slow = 1
    Fast = 255
}

struct Ack {
    code: uint8
}

struct TestStruct {
    int1: int8
    int2: int32
    uint1: uint8
    uint2: uint16
    float1: float32
    b1: bool
    b2: bool
    b3: bool
    data: bytes[4]
    str: string[8]
}

struct EnumStruct {
    direction: Direction
    speed: Speed
}

struct SubA {
    b1: bool
    b2: bool
}

struct SubB {
    num: int8
}

struct NestedStruct {
    a: SubA
    b: SubB
    num: int8
}

struct ArrayStruct {
    a: Direction[4]
    b: Ack[3]
    c: string[4][3]
}

struct VariableLength {
    a: bytes[32]
    b: string[32]
    c: uint8[16]
}
";

fn codec() -> Codec {
    Codec::new(analyze(parse(TYPES).unwrap()).unwrap())
}

fn vals(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn simple_struct() {
    let codec = codec();
    let values = vals(&[("code", Value::U8(123))]);

    let packed = codec.encode_message("Ack", &values).unwrap();
    assert_eq!(packed, vec![0x7B]);

    let decoded = codec.decode_message("Ack", &packed).unwrap();
    assert_eq!(decoded.get("code"), Some(&Value::U8(123)));
}

#[test]
fn complex_struct() {
    let codec = codec();
    let values = vals(&[
        ("int1", Value::I8(5)),
        ("int2", Value::I32(-1234)),
        ("uint1", Value::U8(31)),
        ("uint2", Value::U16(1234)),
        ("float1", Value::F32(-1.23)),
        ("b1", Value::Bool(true)),
        ("b2", Value::Bool(true)),
        ("b3", Value::Bool(false)),
        ("data", Value::Bytes(vec![1, 2, 3, 4])),
        ("str", Value::Str("hey".to_string())),
    ]);

    let packed = codec.encode_message("TestStruct", &values).unwrap();
    let expected: Vec<u8> = [
        &[0x05][..],
        &[0x2E, 0xFB, 0xFF, 0xFF],
        &[0x1F],
        &[0xD2, 0x04],
        &[0xA4, 0x70, 0x9D, 0xBF],
        &[0x01, 0x01, 0x00],
        &[0x04, 0x01, 0x02, 0x03, 0x04],
        b"hey\x00",
    ]
    .concat();
    assert_eq!(packed, expected);

    let decoded = codec.decode_message("TestStruct", &packed).unwrap();
    assert_eq!(decoded.get("int1"), Some(&Value::I8(5)));
    assert_eq!(decoded.get("int2"), Some(&Value::I32(-1234)));
    assert_eq!(decoded.get("uint1"), Some(&Value::U8(31)));
    assert_eq!(decoded.get("uint2"), Some(&Value::U16(1234)));
    match decoded.get("float1") {
        Some(Value::F32(f)) => assert!((f + 1.23).abs() < 0.001),
        other => panic!("float1 decoded as {:?}", other),
    }
    assert_eq!(decoded.get("b1"), Some(&Value::Bool(true)));
    assert_eq!(decoded.get("b3"), Some(&Value::Bool(false)));
    assert_eq!(decoded.get("data"), Some(&Value::Bytes(vec![1, 2, 3, 4])));
    assert_eq!(decoded.get("str"), Some(&Value::Str("hey".to_string())));
}

#[test]
fn enum_struct() {
    let codec = codec();
    let values = vals(&[("direction", Value::U8(2)), ("speed", Value::U8(255))]);

    let packed = codec.encode_message("EnumStruct", &values).unwrap();
    assert_eq!(packed, vec![0x02, 0xFF]);

    let decoded = codec.decode_message("EnumStruct", &packed).unwrap();
    assert_eq!(decoded.get("direction"), Some(&Value::U8(2)));
    assert_eq!(decoded.get("speed"), Some(&Value::U8(255)));
}

#[test]
fn nested_struct() {
    let codec = codec();
    let values = vals(&[
        (
            "a",
            Value::Struct(vals(&[("b1", Value::Bool(true)), ("b2", Value::Bool(false))])),
        ),
        ("b", Value::Struct(vals(&[("num", Value::I8(127))]))),
        ("num", Value::I8(-4)),
    ]);

    let packed = codec.encode_message("NestedStruct", &values).unwrap();
    assert_eq!(packed, vec![0x01, 0x00, 0x7F, 0xFC]);

    let decoded = codec.decode_message("NestedStruct", &packed).unwrap();
    let a = decoded.get("a").and_then(Value::as_struct).unwrap();
    assert_eq!(a.get("b1"), Some(&Value::Bool(true)));
    assert_eq!(a.get("b2"), Some(&Value::Bool(false)));
    assert_eq!(decoded.get("num"), Some(&Value::I8(-4)));
}

#[test]
fn array_struct() {
    let codec = codec();
    let values = vals(&[
        (
            "a",
            Value::List(vec![Value::U8(2), Value::U8(3), Value::U8(1)]),
        ),
        (
            "b",
            Value::List(vec![
                Value::Struct(vals(&[("code", Value::U8(127))])),
                Value::Struct(vals(&[("code", Value::U8(64))])),
            ]),
        ),
        (
            "c",
            Value::List(vec![
                Value::Str("abc".into()),
                Value::Str("def".into()),
                Value::Str("ghi".into()),
            ]),
        ),
    ]);

    let packed = codec.encode_message("ArrayStruct", &values).unwrap();
    let expected: Vec<u8> = [
        &[0x03, 0x02, 0x03, 0x01][..],
        &[0x02, 0x7F, 0x40],
        &[0x03],
        b"abc\x00def\x00ghi\x00",
    ]
    .concat();
    assert_eq!(packed, expected);

    let decoded = codec.decode_message("ArrayStruct", &packed).unwrap();
    assert_eq!(
        decoded.get("c").and_then(Value::as_list).map(|l| l.len()),
        Some(3)
    );
}

#[test]
fn variable_length_fields() {
    let codec = codec();
    let values = vals(&[
        ("a", Value::Bytes(b"hello\x00World".to_vec())),
        ("b", Value::Str("This is a test string!".into())),
        (
            "c",
            Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(3), Value::U8(4)]),
        ),
    ]);

    let packed = codec.encode_message("VariableLength", &values).unwrap();
    let expected: Vec<u8> =
        [&b"\x0bhello\x00World"[..], b"This is a test string!\x00", &[0x04, 1, 2, 3, 4]].concat();
    assert_eq!(packed, expected);

    let decoded = codec.decode_message("VariableLength", &packed).unwrap();
    assert_eq!(decoded.get("a"), Some(&Value::Bytes(b"hello\x00World".to_vec())));
    assert_eq!(
        decoded.get("b"),
        Some(&Value::Str("This is a test string!".into()))
    );
    assert_eq!(
        decoded.get("c").and_then(Value::as_list).map(|l| l.len()),
        Some(4)
    );
}

#[test]
fn string_fills_capacity_minus_terminator() {
    let codec = codec();
    // str is string[8]: seven content bytes exactly fill the storage.
    let values = base_test_struct(Value::Str("sevench".into()));
    let packed = codec.encode_message("TestStruct", &values).unwrap();
    let decoded = codec.decode_message("TestStruct", &packed).unwrap();
    assert_eq!(decoded.get("str"), Some(&Value::Str("sevench".into())));

    // Eight content bytes exceed the capacity.
    let values = base_test_struct(Value::Str("eightchr".into()));
    assert!(matches!(
        codec.encode_message("TestStruct", &values),
        Err(CodecError::Capacity(_, 8, 7))
    ));
}

fn base_test_struct(s: Value) -> HashMap<String, Value> {
    vals(&[
        ("int1", Value::I8(0)),
        ("int2", Value::I32(0)),
        ("uint1", Value::U8(0)),
        ("uint2", Value::U16(0)),
        ("float1", Value::F32(0.0)),
        ("b1", Value::Bool(false)),
        ("b2", Value::Bool(false)),
        ("b3", Value::Bool(false)),
        ("data", Value::Bytes(vec![])),
        ("str", s),
    ])
}

#[test]
fn rejects_oversized_values() {
    let codec = codec();

    let mut values = base_test_struct(Value::Str("ok".into()));
    values.insert("data".into(), Value::Bytes(vec![0x55; 5]));
    assert!(matches!(
        codec.encode_message("TestStruct", &values),
        Err(CodecError::Capacity(_, 5, 4))
    ));

    let values = vals(&[
        ("a", Value::Bytes(vec![])),
        ("b", Value::Str(String::new())),
        ("c", Value::List(vec![Value::U8(0); 17])),
    ]);
    assert!(matches!(
        codec.encode_message("VariableLength", &values),
        Err(CodecError::Capacity(_, 17, 16))
    ));
}

#[test]
fn rejects_embedded_nul_in_string() {
    let codec = codec();
    let values = base_test_struct(Value::Str("a\u{0}b".into()));
    assert!(matches!(
        codec.encode_message("TestStruct", &values),
        Err(CodecError::EmbeddedNul(_))
    ));
}

#[test]
fn rejects_missing_and_mistyped_fields() {
    let codec = codec();

    let values = vals(&[("code", Value::Str("nope".into()))]);
    assert!(matches!(
        codec.encode_message("Ack", &values),
        Err(CodecError::WrongType(_))
    ));

    let values = vals(&[]);
    assert!(matches!(
        codec.encode_message("Ack", &values),
        Err(CodecError::MissingField(_))
    ));

    assert!(matches!(
        codec.encode_message("Ghost", &vals(&[])),
        Err(CodecError::UnknownStruct(_))
    ));
}

#[test]
fn rejects_out_of_range_integers() {
    let codec = codec();
    let values = vals(&[("code", Value::U16(300))]);
    assert!(matches!(
        codec.encode_message("Ack", &values),
        Err(CodecError::Range(_))
    ));
}

#[test]
fn decode_of_truncated_input_fails() {
    let codec = codec();
    let values = vals(&[("direction", Value::U8(1)), ("speed", Value::U8(1))]);
    let packed = codec.encode_message("EnumStruct", &values).unwrap();
    assert!(matches!(
        codec.decode_message("EnumStruct", &packed[..1]),
        Err(CodecError::Read)
    ));
}

#[test]
fn decode_rejects_oversized_length_prefixes() {
    let codec = codec();
    // 15 bytes of fixed fields, then bytes[4] claiming five content bytes.
    let mut input = vec![0x00; 15];
    input.extend_from_slice(&[0x05, 1, 2, 3, 4, 5]);
    input.extend_from_slice(b"x\x00");
    assert!(matches!(
        codec.decode_message("TestStruct", &input),
        Err(CodecError::Capacity(_, 5, 4))
    ));
}

#[test]
fn encode_into_bounded_buffer_reports_write_error() {
    let codec = codec();
    let values = vals(&[("code", Value::U8(9))]);

    let mut small = [0u8; 0];
    let mut buf = Buffer::new(&mut small);
    assert!(matches!(
        codec.encode_message_into("Ack", &values, &mut buf),
        Err(CodecError::Write)
    ));

    let mut fits = [0u8; 1];
    let mut buf = Buffer::new(&mut fits);
    assert_eq!(codec.encode_message_into("Ack", &values, &mut buf).unwrap(), 1);
    assert_eq!(fits[0], 9);
}
