//! Wire envelope: `{topic, ts, payload}` as JSON, routed by topic.

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;

use crate::error::DecodeSnafu;
use crate::error::EncodeSnafu;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    /// Unix seconds at creation.
    pub ts: i64,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wrap `payload`, stamping the current time.
    pub fn new<T: Serialize + ?Sized>(topic: &str, payload: &T) -> Result<Self> {
        let payload = serde_json::to_value(payload).context(EncodeSnafu { topic })?;
        Ok(Self {
            topic: topic.to_string(),
            ts: chrono::Utc::now().timestamp(),
            payload,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context(EncodeSnafu { topic: self.topic.as_str() })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context(DecodeSnafu)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let env = Envelope::new("overlay.register", &json!({"action": "register"})).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();
        assert_eq!(value["topic"], "overlay.register");
        assert_eq!(value["payload"]["action"], "register");
        assert!(value["ts"].as_i64().unwrap() > 1_600_000_000);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Envelope::decode(b"not json").is_err());
    }
}
