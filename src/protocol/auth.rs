//! HMAC challenge authentication
//!
//! The ingest answers `HMAC` with a hex-encoded salt. The client proves key
//! possession by sending back `hex(HMAC-SHA512(key = stream key, message =
//! decoded salt))` in the `CONNECT` command. The stream key itself never
//! crosses the wire.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha512;

use crate::error::{FtlError, Result};

type HmacSha512 = Hmac<Sha512>;

/// Number of random salt bytes an ingest hands out
pub const SALT_LEN: usize = 16;

/// Compute the hex proof for a challenge salt
///
/// Fails if the salt is not valid hex, which means the ingest is not
/// speaking the protocol we expect.
pub fn proof(stream_key: &[u8], salt_hex: &str) -> Result<String> {
    let salt = hex::decode(salt_hex.trim())
        .map_err(|e| FtlError::internal(format_args!("ingest sent invalid hmac salt: {}", e)))?;

    let mut mac =
        HmacSha512::new_from_slice(stream_key).expect("HMAC can take key of any size");
    mac.update(&salt);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a client proof against the salt it was issued
///
/// Used by ingest-side test doubles. Accepts hex in either case; anything
/// undecodable is simply a failed proof.
pub fn verify(stream_key: &[u8], salt_hex: &str, proof_hex: &str) -> bool {
    let salt = match hex::decode(salt_hex.trim()) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let claimed = match hex::decode(proof_hex.trim()) {
        Ok(p) => p,
        Err(_) => return false,
    };

    let mut mac =
        HmacSha512::new_from_slice(stream_key).expect("HMAC can take key of any size");
    mac.update(&salt);
    mac.verify_slice(&claimed).is_ok()
}

/// Generate a fresh hex salt, ingest style
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt[..]);
    hex::encode(salt)
}
