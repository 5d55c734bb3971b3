//! Record codec for the mesh and long-range hops
//!
//! Both hops carry flat JSON objects, one record per datagram or packet:
//! ```text
//! mesh:       {"device_id":"A1","water_level_cm":42}
//! long-range: {"device_id":"A1","timestamp":1000,"water_level_cm":42}
//! fallback:   {"water_level":"12.5","received_at":30512}
//! ```
//!
//! Neither radio fragments, so every encoded record must fit in a single
//! frame. Oversized input is rejected, never truncated.

use bytes::Bytes;
use thiserror::Error;

use crate::link::{MAX_LORA_PAYLOAD, MAX_MESH_PAYLOAD};
use crate::record::{FallbackRecord, SensorRecord};

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Empty payload")]
    Empty,

    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Strip the NUL padding C-string senders leave behind
fn trim_nul(payload: &[u8]) -> &[u8] {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    &payload[..end]
}

/// Decode a mesh datagram into a sensor record
///
/// The record must carry at least `device_id` and a water level; any other
/// keys the sensor sent are dropped.
pub fn decode_datagram(payload: &[u8]) -> Result<SensorRecord, CodecError> {
    if payload.len() > MAX_MESH_PAYLOAD {
        return Err(CodecError::MessageTooLarge {
            size: payload.len(),
            max: MAX_MESH_PAYLOAD,
        });
    }

    let payload = trim_nul(payload);
    if payload.is_empty() {
        return Err(CodecError::Empty);
    }

    Ok(serde_json::from_slice(payload)?)
}

/// Encode a sensor record as a single long-range packet
pub fn encode_sensor_record(record: &SensorRecord) -> Result<Bytes, CodecError> {
    let encoded = serde_json::to_vec(record)?;

    if encoded.len() > MAX_LORA_PAYLOAD {
        return Err(CodecError::MessageTooLarge {
            size: encoded.len(),
            max: MAX_LORA_PAYLOAD,
        });
    }

    Ok(Bytes::from(encoded))
}

/// Decode a long-range packet as text, without its line terminator
pub fn decode_text(packet: &[u8]) -> Result<&str, CodecError> {
    if packet.len() > MAX_LORA_PAYLOAD {
        return Err(CodecError::MessageTooLarge {
            size: packet.len(),
            max: MAX_LORA_PAYLOAD,
        });
    }

    let text = std::str::from_utf8(trim_nul(packet))?.trim_end_matches(['\r', '\n']);
    if text.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(text)
}

/// Syntactic check for an already-structured record
///
/// This is deliberately not a parse: anything brace-delimited is forwarded
/// verbatim and left for the cloud store to accept or reject.
pub fn is_structured(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}')
}

/// Encode a fallback record as an upload body
pub fn encode_fallback(record: &FallbackRecord) -> Result<String, CodecError> {
    Ok(serde_json::to_string(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WaterLevel;

    #[test]
    fn test_decode_datagram() {
        let record = decode_datagram(br#"{"device_id":"A1","water_level_cm":42}"#)
            .expect("decode failed");
        assert_eq!(record.device_id, "A1");
        assert_eq!(record.water_level, WaterLevel::from(42));
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn test_decode_strips_nul_terminator() {
        let mut payload = br#"{"device_id":"A1","water_level_cm":42}"#.to_vec();
        payload.extend_from_slice(&[0, 0, 0]);
        assert!(decode_datagram(&payload).is_ok());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let result = decode_datagram(br#"{"device_id":"A1"}"#);
        assert!(matches!(result, Err(CodecError::Json(_))));

        let result = decode_datagram(br#"{"water_level_cm":42}"#);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_datagram(b"not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode_datagram(b"\0\0"), Err(CodecError::Empty)));
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let payload = vec![b' '; MAX_MESH_PAYLOAD + 1];
        let result = decode_datagram(&payload);
        assert!(matches!(
            result,
            Err(CodecError::MessageTooLarge { size, max: MAX_MESH_PAYLOAD }) if size == MAX_MESH_PAYLOAD + 1
        ));
    }

    #[test]
    fn test_encode_drops_unknown_keys() {
        let record = decode_datagram(
            br#"{"device_id":"A1","battery":87,"water_level_cm":42,"rssi":-60}"#,
        )
        .expect("decode failed");
        let encoded = encode_sensor_record(&record.with_timestamp(1000)).expect("encode failed");
        assert_eq!(
            &encoded[..],
            br#"{"device_id":"A1","timestamp":1000,"water_level_cm":42}"#
        );
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let record = SensorRecord::new("x".repeat(MAX_LORA_PAYLOAD), 1);
        let result = encode_sensor_record(&record);
        assert!(matches!(result, Err(CodecError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"12.5").unwrap(), "12.5");
        assert_eq!(decode_text(b"12.5\0").unwrap(), "12.5");
        assert_eq!(decode_text(b"{\"a\":1}\r\n").unwrap(), "{\"a\":1}");
        assert!(matches!(decode_text(b"\r\n"), Err(CodecError::Empty)));
        assert!(matches!(decode_text(b""), Err(CodecError::Empty)));
        assert!(matches!(decode_text(&[0xff, 0xfe]), Err(CodecError::InvalidUtf8(_))));
    }

    #[test]
    fn test_decode_text_rejects_oversized() {
        let packet = vec![b'7'; MAX_LORA_PAYLOAD];
        assert_eq!(decode_text(&packet).unwrap().len(), MAX_LORA_PAYLOAD);

        let packet = vec![b'7'; MAX_LORA_PAYLOAD + 1];
        assert!(matches!(
            decode_text(&packet),
            Err(CodecError::MessageTooLarge { max: MAX_LORA_PAYLOAD, .. })
        ));
    }

    #[test]
    fn test_is_structured() {
        assert!(is_structured(r#"{"device_id":"A1"}"#));
        assert!(is_structured("{}"));
        assert!(!is_structured("12.5"));
        assert!(!is_structured(r#"{"device_id":"A1""#));
        assert!(!is_structured(r#" {"a":1}"#));
    }

    #[test]
    fn test_fallback_escapes_text() {
        let body = encode_fallback(&FallbackRecord::new(r#"say "hi""#, 9)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["water_level"], r#"say "hi""#);
        assert_eq!(value["received_at"], 9);
    }
}
