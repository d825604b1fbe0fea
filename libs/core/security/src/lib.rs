// [libs/core/security/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL PRIMITIVES
 * CLASIFICACIÓN: CORE LIBRARY (ESTRATO L1)
 * RESPONSABILIDAD: GENERACIÓN Y COMPARACIÓN SEGURA DE CREDENCIALES
 *
 * Toda comparación de credenciales (tokens, OTPs, claves de API) entra
 * y sale por este módulo para que ningún llamador tenga la tentación de
 * usar `==` sobre un secreto. `subtle::ConstantTimeEq` evita que la
 * duración de la comparación filtre cuántos bytes del prefijo coinciden.
 * =================================================================
 */

use rand::RngCore;
use subtle::ConstantTimeEq;

/// Mints a 256-bit random token, hex-encoded. Used for worker access
/// tokens, build access tokens, and VM tokens alike — the entropy source
/// is the only thing that matters, not the label attached to the value.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Mints a short numeric one-time code for the build authenticate flow.
/// Six digits, zero-padded — enough entropy for a short-lived, single-use
/// secret handed over an already-authenticated channel.
pub fn generate_otp() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    let value = u32::from_be_bytes(bytes) % 1_000_000;
    format!("{value:06}")
}

/// Constant-time equality check for secrets of equal expected length.
/// Returns `false` (never panics) on a length mismatch, since leaking a
/// length mismatch via an early return is not a side-channel: lengths of
/// tokens and OTPs are public knowledge, only their contents are secret.
pub fn secure_compare(supplied: &str, expected: &str) -> bool {
    let supplied = supplied.as_bytes();
    let expected = expected.as_bytes();
    if supplied.len() != expected.len() {
        return false;
    }
    supplied.ct_eq(expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_otps_are_six_digits() {
        let otp = generate_otp();
        assert_eq!(otp.len(), 6);
        assert!(otp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn secure_compare_matches_equal_strings() {
        assert!(secure_compare("sekrit-value", "sekrit-value"));
    }

    #[test]
    fn secure_compare_rejects_mismatches_and_length_differences() {
        assert!(!secure_compare("sekrit-value", "sekrit-valuf"));
        assert!(!secure_compare("short", "much-longer-value"));
    }
}
