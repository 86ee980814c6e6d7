use rand::rngs::SysRng;
use rand::TryRng;

use crate::TurnstileError;

/// Draws a fresh 32-bit session key from the platform's cryptographic
/// random source (`/dev/urandom` on POSIX via `OsRng`). Zero is a valid
/// element of the key space: callers must track "reserved" as a separate
/// bit rather than treating a zero key as a free-slot sentinel.
pub fn generate_session_key() -> Result<u32, TurnstileError> {
    let mut buf = [0u8; 4];
    SysRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| TurnstileError::KeySourceFailed(e.to_string()))?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_varying_keys() {
        let a = generate_session_key().unwrap();
        let b = generate_session_key().unwrap();
        // Not a hard guarantee, but collision odds are 1 in 2^32.
        assert_ne!(a, b);
    }
}
