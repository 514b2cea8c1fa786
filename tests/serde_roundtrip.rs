//! Confirms the `serde-types` feature's derived `Serialize`/`Deserialize`
//! impls actually produce and consume well-formed JSON, the way the
//! originating codebase's own `serde_json` round-trip tests check its
//! wire-facing types.

#![cfg(feature = "serde-types")]

use ai_vm::{OpCode, StringRef, StringStore, Value, OPCODE_MAX};

#[test]
fn value_round_trips_through_json() {
    let values = [
        Value::void(),
        Value::int(-42),
        Value::bool(true),
        Value::null_string(),
        Value::string(StringRef::new(StringStore::Arena, 4, 9)),
        Value::node(7),
    ];

    for value in values {
        let encoded = serde_json::to_string(&value).expect("value serializes");
        let decoded: Value = serde_json::from_str(&encoded).expect("value deserializes");
        assert_eq!(decoded, value);
    }
}

#[test]
fn opcode_round_trips_through_json() {
    for raw in 0..=OPCODE_MAX {
        let opcode = OpCode::from_u32(raw).expect("raw value within range decodes");
        let encoded = serde_json::to_string(&opcode).expect("opcode serializes");
        let decoded: OpCode = serde_json::from_str(&encoded).expect("opcode deserializes");
        assert_eq!(decoded, opcode);
    }
}
