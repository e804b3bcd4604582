use crate::error::{PushError, Result};
use std::fmt;
use std::str::FromStr;

pub const DEVICE_TOKEN_LEN: usize = 32;

/// A 32-byte APNs device token.
///
/// On the API boundary tokens travel as 64 hex characters. Whitespace is
/// ignored while parsing since tokens are often copied in the `<aaaa bbbb>`
/// form Xcode prints them in.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceToken([u8; DEVICE_TOKEN_LEN]);

impl DeviceToken {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DEVICE_TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    /// # Errors
    /// Returns `PushError::Encoding` unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; DEVICE_TOKEN_LEN] = bytes.try_into().map_err(|_| {
            PushError::Encoding(format!("device token must be {DEVICE_TOKEN_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(raw))
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DEVICE_TOKEN_LEN] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for DeviceToken {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&compact).map_err(|e| PushError::Encoding(format!("invalid device token: {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_token() {
        let token: DeviceToken = "a1".repeat(32).parse().unwrap();
        assert_eq!(token.as_bytes(), &[0xa1; 32]);
        assert_eq!(token.to_string(), "a1".repeat(32));
    }

    #[test]
    fn test_parse_ignores_spaces() {
        let spaced = ["a1a1a1a1"; 8].join(" ");
        let token: DeviceToken = spaced.parse().unwrap();
        assert_eq!(token.as_bytes(), &[0xa1; 32]);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = "a1".repeat(31).parse::<DeviceToken>().unwrap_err();
        assert!(matches!(err, PushError::Encoding(_)));

        let err = DeviceToken::from_slice(&[0u8; 33]).unwrap_err();
        assert!(matches!(err, PushError::Encoding(_)));
    }

    #[test]
    fn test_rejects_non_hex() {
        let err = "zz".repeat(32).parse::<DeviceToken>().unwrap_err();
        assert!(matches!(err, PushError::Encoding(_)));
    }
}
