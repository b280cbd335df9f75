//! `bastion keygen`

use bastion_core::AccessTokenCodec;

/// Generate a fresh access token key
pub fn run() -> String {
    AccessTokenCodec::generate_key()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_is_usable() {
        let key = run();
        assert!(AccessTokenCodec::new(&key).is_ok());
        assert_ne!(key, run());
    }
}
