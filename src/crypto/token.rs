use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;

/// The size of a session auth token in bytes, before encoding.
pub const AUTH_TOKEN_SIZE: usize = 32;

/// Fills `buf` from the operating system's CSPRNG.
///
/// There is no fallback source. If the OS cannot supply entropy the process
/// aborts, since every token and key minted afterwards would be suspect.
pub fn fill_random(buf: &mut [u8]) {
    if let Err(e) = OsRng.try_fill_bytes(buf) {
        tracing::error!("❌ OS entropy source unavailable, aborting: {}", e);
        std::process::abort();
    }
}

/// Returns a fixed-size array from the OS CSPRNG.
pub fn generate_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    fill_random(&mut bytes);
    bytes
}

/// Generates a new random auth token.
///
/// # Returns
///
/// A URL-safe base64-encoded token of [`AUTH_TOKEN_SIZE`] random bytes.
pub fn generate_auth_token() -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(generate_array::<AUTH_TOKEN_SIZE>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn arrays_are_not_all_zero() {
        let a = generate_array::<32>();
        let b = generate_array::<32>();
        assert_ne!(a, [0u8; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn auth_tokens_are_url_safe_and_distinct() {
        let tokens: HashSet<String> = (0..256).map(|_| generate_auth_token()).collect();
        assert_eq!(tokens.len(), 256);
        for token in &tokens {
            // 32 bytes -> 43 base64 characters without padding
            assert_eq!(token.len(), 43);
            assert!(
                token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
        }
    }
}
