use sha2::{Digest, Sha256};

/// SHA-256 of the password, rendered as uppercase hex.
#[must_use]
pub fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Cut a digest down to the store's value ceiling.
///
/// Lossy: two passwords sharing the kept prefix compare equal.
#[must_use]
pub fn fit_to_ceiling(mut digest: String, ceiling: Option<usize>) -> String {
    if let Some(max) = ceiling {
        // hex output is ASCII, any index is a char boundary
        digest.truncate(max);
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_uppercase_sha256_hex() {
        assert_eq!(
            password_digest("abc"),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        );
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(password_digest("Secret1!"), password_digest("Secret1!"));
        assert_ne!(password_digest("Secret1!"), password_digest("secret1!"));
    }

    #[test]
    fn digest_does_not_trim_input() {
        assert_ne!(password_digest(" Secret1!"), password_digest("Secret1!"));
    }

    #[test]
    fn ceiling_truncates() {
        let digest = fit_to_ceiling(password_digest("abc"), Some(55));
        assert_eq!(digest.len(), 55);
        assert_eq!(
            digest,
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF6"
        );
    }

    #[test]
    fn ceiling_above_length_is_noop() {
        let digest = fit_to_ceiling(password_digest("abc"), Some(128));
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn no_ceiling_keeps_full_digest() {
        assert_eq!(fit_to_ceiling(password_digest("abc"), None).len(), 64);
    }
}
