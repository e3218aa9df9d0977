//! Wire-level shapes of the platform API envelope.
use serde::Deserialize;
use serde_json::Value;

/// Standard response wrapper: `{ success, data, error }`. Every field is
/// defaulted so a structurally valid but sparse body still parses; anything
/// that fails to parse as this shape is treated as malformed upstream.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

/// Payload of `v3/oauth/verify-token`.
#[derive(Debug, Deserialize)]
pub struct VerifyData {
    #[serde(default, rename = "isVerified")]
    pub is_verified: bool,
}
