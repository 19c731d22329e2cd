use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// Alphanumeric string from the OS rng, used for session tokens
pub fn random_string(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod test {
    use super::random_string;

    #[test]
    fn has_requested_length() {
        let token = random_string(32);

        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, random_string(32));
    }
}
