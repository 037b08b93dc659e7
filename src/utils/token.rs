use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn generate_secure_id(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_ids_are_alphanumeric_and_sized() {
        let id = generate_secure_id(32);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn secure_ids_do_not_repeat() {
        let a = generate_secure_id(32);
        let b = generate_secure_id(32);
        assert_ne!(a, b);
    }
}
