use sha2::{Digest, Sha256};

/// Locally generated stand-in for an asset that could not be shown.
///
/// Derived from the URL alone, so the same URL always renders the same
/// placeholder across sessions and devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placeholder {
    /// First 16 hex chars of SHA-256(url).
    pub seed: String,
    /// Background hue in degrees, `0..360`.
    pub hue: u16,
    /// Pattern variant, `0..8`.
    pub pattern: u8,
}

impl Placeholder {
    pub fn for_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
        Self {
            seed: hex::encode(&digest[..8]),
            hue,
            pattern: digest[2] % 8,
        }
    }
}
