pub mod incident;
pub mod knowledge;
pub mod lesson;
pub mod serde_helpers;
pub mod solution;

pub use incident::*;
pub use knowledge::*;
pub use lesson::*;
pub use solution::*;

/// PocketBase-style record identifier (15 lowercase alphanumerics)
pub type RecordId = String;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 15;

/// Generate a record id in the same shape PocketBase uses
pub fn generate_record_id() -> RecordId {
    use rand::Rng;

    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_shape() {
        let id = generate_record_id();
        assert_eq!(id.len(), 15);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(id, generate_record_id());
    }
}
