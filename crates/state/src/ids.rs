use rand::RngCore;

/// Produces identifiers for new backup metadata records.
///
/// Identifiers only need to be unused at insert time; the catalog still
/// asserts non-existence when writing.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 128 random bits rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{:032x}", u128::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_ids_are_hex_and_distinct() {
        let generator = RandomIdGenerator;
        let ids: HashSet<String> = (0..100).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 100);
        for id in &ids {
            assert_eq!(id.len(), 32);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()), "{id}");
        }
    }
}
