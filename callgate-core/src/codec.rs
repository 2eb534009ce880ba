//! Byte sequences to host strings and back.
//!
//! Payloads cross the boundary as UTF-8 text. Encoding validates the bytes;
//! decoding always yields UTF-8, so a round trip preserves any valid input.

use crate::error::BridgeError;
use crate::host::Interpreter;

pub fn encode<E: Interpreter>(env: &mut E, bytes: &[u8]) -> Result<E::Local, BridgeError> {
    let text = std::str::from_utf8(bytes)?;
    env.new_string(text)
}

pub fn decode<E: Interpreter>(env: &mut E, value: &E::Local) -> Result<Vec<u8>, BridgeError> {
    Ok(env.read_string(value)?.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    #[test]
    fn test_round_trip_preserves_text() {
        let runtime = FakeRuntime::new();
        let mut env = runtime.env();
        let long = "x".repeat(64 * 1024);
        let samples: [&[u8]; 7] = [
            b"",
            b"{\"call\":\"ping\"}",
            "ünïcødé €".as_bytes(),
            "astral 😀 𝄞".as_bytes(),
            b"embedded\0nul",
            "\u{7f}\u{80}\u{7ff}\u{800}\u{ffff}\u{10000}\u{10ffff}".as_bytes(),
            long.as_bytes(),
        ];
        for payload in samples {
            let local = encode(&mut env, payload).unwrap();
            assert_eq!(decode(&mut env, &local).unwrap(), payload);
        }
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let runtime = FakeRuntime::new();
        let mut env = runtime.env();
        let err = encode(&mut env, &[0x66, 0xff, 0x6f]).err().unwrap();
        assert!(matches!(err, BridgeError::InvalidText(_)));
    }
}
