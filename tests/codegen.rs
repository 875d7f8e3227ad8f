//! Backend artifact tests: structure of the generated sources and
//! cross-target consistency of the runtime headers.

use bakelite::gen::{backend_for, Backend};
use bakelite::{analyze, parse, Schema};

const REFERENCE: &str = "
enum Direction: uint8 {
    Up = 0
    Down = 1
    Left = 2
    Right = 3
}

struct Vec2 {
    x: int16
    y: int16
}

struct Telemetry {
    seq: uint32
    heading: Direction
    pos: Vec2
    name: string[12]
    blob: bytes[20]
    samples: uint16[6]
}

struct Heartbeat {
    uptime: uint32
}

protocol {
    maxLength = 80
    framing = cobs
    crc = CRC16
    messageIds {
        Telemetry = 1
        Heartbeat = 2
    }
}
";

fn schema() -> Schema {
    analyze(parse(REFERENCE).unwrap()).unwrap()
}

#[test]
fn backend_lookup() {
    assert!(backend_for("python").is_some());
    assert!(backend_for("ctiny").is_some());
    assert!(backend_for("cpptiny").is_some());
    assert!(backend_for("rust").is_none());
    assert_eq!(backend_for("ctiny").unwrap().target(), "ctiny");
}

#[test]
fn python_artifact_structure() {
    let out = backend_for("python").unwrap().generate(&schema());

    assert!(out.contains("class Direction(IntEnum):"));
    assert!(out.contains("class Telemetry(Struct):"));
    assert!(out.contains("class Heartbeat(Struct):"));
    assert!(out.contains("def pack(self) -> bytes:"));
    assert!(out.contains("def unpack(cls"));
    assert!(out.contains("class Protocol(ProtocolBase):"));
    assert!(out.contains("\"Telemetry\": 1,"));
    assert!(out.contains("\"Heartbeat\": 2,"));
    assert!(out.contains("kwargs.setdefault(\"crc\", \"CRC16\")"));
    // Vec2 is emitted before Telemetry, which embeds it.
    assert!(out.find("class Vec2").unwrap() < out.find("class Telemetry").unwrap());
}

#[test]
fn ctiny_artifact_structure() {
    let backend = backend_for("ctiny").unwrap();
    let out = backend.generate(&schema());

    assert!(out.contains("typedef uint8_t Direction;"));
    assert!(out.contains("Direction_Left = 2,"));
    assert!(out.contains("char name[12];"));
    assert!(out.contains("struct { uint8_t data[20]; uint8_t len; } blob;"));
    assert!(out.contains("struct { uint16_t data[6]; uint8_t len; } samples;"));
    assert!(out.contains("Telemetry_pack"));
    assert!(out.contains("Telemetry_unpack"));
    assert!(out.contains("Protocol_Telemetry = 1,"));
    assert!(out.contains("#define PROTOCOL_MAX_LENGTH 80"));
    assert!(out.contains("#define PROTOCOL_CRC_SIZE 2"));
    assert!(out.contains("Protocol_poll"));
    // Heartbeat is fixed-size: it gets the overlay helpers. Telemetry not.
    assert!(out.contains("Protocol_send_zerocopy_Heartbeat"));
    assert!(out.contains("Protocol_message_Heartbeat"));
    assert!(!out.contains("Protocol_send_zerocopy_Telemetry"));

    let runtime = backend.runtime().unwrap();
    assert!(runtime.contains("bakelite_crc8"));
    assert!(runtime.contains("bakelite_cobs_decode"));
    assert!(runtime.contains("bakelite_framer_read_byte"));
    assert!(runtime.contains("BAKELITE_FRAMER_BUFFER_SIZE"));
}

#[test]
fn cpptiny_artifact_structure() {
    let backend = backend_for("cpptiny").unwrap();
    let out = backend.generate(&schema());

    assert!(out.contains("enum class Direction : uint8_t {"));
    assert!(out.contains("struct BAKELITE_PACKED Telemetry {"));
    assert!(out.contains("Bakelite::SizedArray<uint8_t, 20> blob;"));
    assert!(out.contains("Bakelite::SizedArray<uint16_t, 6> samples;"));
    assert!(out.contains("Bakelite::CobsFramer<Bakelite::Crc16, 80>"));
    assert!(out.contains("int decode(Telemetry &val)"));
    assert!(out.contains("int send(const Heartbeat*)"));
    assert!(!out.contains("int send(const Telemetry*)"));

    let runtime = backend.runtime().unwrap();
    assert!(runtime.contains("namespace Bakelite {"));
    assert!(runtime.contains("class CobsFramer"));
    assert!(runtime.contains("readFrameByte"));
}

#[test]
fn tiny_runtimes_embed_identical_crc_tables() {
    let ctiny = backend_for("ctiny").unwrap().runtime().unwrap();
    let cpptiny = backend_for("cpptiny").unwrap().runtime().unwrap();

    for row in [
        "0x00U,0x07U,0x0EU,0x09U",
        "0x0000U,0xC0C1U,0xC181U,0x0140U",
        "0x00000000U,0x77073096U,0xEE0E612CU,0x990951BAU",
    ] {
        assert!(ctiny.contains(row), "ctiny runtime misses {}", row);
        assert!(cpptiny.contains(row), "cpptiny runtime misses {}", row);
    }

    // Full table bodies are identical between the two artifacts.
    let extract = |text: &str, anchor: &str| -> String {
        let start = text.find(anchor).unwrap();
        text[start..start + 2000].to_string()
    };
    assert_eq!(
        extract(&ctiny, "0x0000U,0xC0C1U"),
        extract(&cpptiny, "0x0000U,0xC0C1U")
    );
}

#[test]
fn runtime_artifacts_are_idempotent() {
    let a = backend_for("ctiny").unwrap().runtime().unwrap();
    let b = backend_for("ctiny").unwrap().runtime().unwrap();
    assert_eq!(a, b);

    let a = backend_for("cpptiny").unwrap().runtime().unwrap();
    let b = backend_for("cpptiny").unwrap().runtime().unwrap();
    assert_eq!(a, b);
}

#[test]
fn python_has_no_runtime_artifact() {
    assert!(backend_for("python").unwrap().runtime().is_none());
}

#[test]
fn codec_only_schema_generates_without_protocol_section() {
    let schema = analyze(parse("struct Just { x: uint8 }").unwrap()).unwrap();

    let out = backend_for("ctiny").unwrap().generate(&schema);
    assert!(out.contains("Just_pack"));
    assert!(!out.contains("Protocol_poll"));

    let out = backend_for("python").unwrap().generate(&schema);
    assert!(out.contains("class Just(Struct):"));
    assert!(!out.contains("class Protocol(ProtocolBase):"));
}

#[test]
fn framing_none_skips_protocol_section() {
    let schema = analyze(
        parse(
            "
struct M { x: uint8 }
protocol {
    framing = none
    messageIds {
        M = 1
    }
}
",
        )
        .unwrap(),
    )
    .unwrap();

    let out = backend_for("cpptiny").unwrap().generate(&schema);
    assert!(out.contains("struct BAKELITE_PACKED M {"));
    assert!(!out.contains("class ProtocolBase"));
}
