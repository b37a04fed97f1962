use rand::Rng;
use uuid::Uuid;

/// Generate a deterministic v4-format UUID from a seeded RNG.
pub fn generate_uuid(rng: &mut impl Rng) -> Uuid {
    let bytes: [u8; 16] = rng.gen();
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Stable, sortable ids for entities created during play: `mission_0001`.
///
/// Padded to four digits, so lexical order matches creation order only up to
/// `_9999`. Later ids widen (`mission_10000`) and sort before `mission_9999`;
/// maps keyed by these ids stay deterministic but not chronological.
pub fn sequential_id(prefix: &str, counter: &mut u64) -> String {
    *counter += 1;
    format!("{prefix}_{:04}", *counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn uuid_is_reproducible_for_a_seed() {
        let first = generate_uuid(&mut ChaCha8Rng::seed_from_u64(7));
        let second = generate_uuid(&mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(first, second);
        assert_eq!(first.get_version(), Some(uuid::Version::Random));
    }

    #[test]
    fn sequential_ids_sort_in_creation_order() {
        let mut counter = 8;
        let ninth = sequential_id("mission", &mut counter);
        let tenth = sequential_id("mission", &mut counter);
        assert_eq!(ninth, "mission_0009");
        assert_eq!(tenth, "mission_0010");
        assert!(ninth < tenth);
        assert_eq!(counter, 10);
    }

    #[test]
    fn sequential_ids_widen_past_four_digits() {
        let mut counter = 9998;
        let last_padded = sequential_id("mission", &mut counter);
        let widened = sequential_id("mission", &mut counter);
        assert_eq!(last_padded, "mission_9999");
        assert_eq!(widened, "mission_10000");
        assert_ne!(last_padded, widened);
        assert!(widened < last_padded);
    }
}
