//! Frame authentication
//!
//! HMAC-SHA1 over the frame header and every field of the message except the
//! digest itself. The raw value is never covered; its integrity is what an
//! entry's tag/algorithm is for.
//!
//! ```text
//! digest = HMAC-SHA1(key, header[9] ‖ be64(identity) ‖ be32(len(command)) ‖ command)
//! ```

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{KineticError, Result};

use super::codec::Frame;

type HmacSha1 = Hmac<Sha1>;

/// Length of an HMAC-SHA1 digest
pub const DIGEST_LEN: usize = 20;

pub type Digest = [u8; DIGEST_LEN];

fn keyed(header: &[u8], identity: i64, command: &[u8], key: &[u8]) -> Result<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|_| KineticError::Authentication)?;
    mac.update(header);
    mac.update(&identity.to_be_bytes());
    mac.update(&(command.len() as u32).to_be_bytes());
    mac.update(command);
    Ok(mac)
}

/// Compute the digest for a header, sender identity and command
pub fn sign(header: &[u8], identity: i64, command: &[u8], key: &[u8]) -> Result<Digest> {
    let output = keyed(header, identity, command, key)?.finalize().into_bytes();
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&output);
    Ok(digest)
}

/// Constant-time check of `digest` against header, identity and command
pub fn verify_digest(
    header: &[u8],
    identity: i64,
    command: &[u8],
    key: &[u8],
    digest: &[u8],
) -> bool {
    match keyed(header, identity, command, key) {
        Ok(mac) => mac.verify_slice(digest).is_ok(),
        Err(_) => false,
    }
}

/// Verify a received frame; a frame without a digest never verifies
pub fn verify(frame: &Frame, key: &[u8]) -> bool {
    match frame.message.hmac.as_deref() {
        Some(digest) => verify_digest(
            &frame.header.to_bytes(),
            frame.message.identity,
            &frame.message.command,
            key,
            digest,
        ),
        None => false,
    }
}
