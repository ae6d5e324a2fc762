use crate::utils::types::HashPos;

/// Maps arbitrary bytes onto the hash ring. Every node derives its position
/// from its `ip:port` address, so the function must stay identical across
/// the whole ring.
pub fn hash(bytes: &[u8]) -> HashPos {
    let digest = blake3::hash(bytes);
    let mut truncated = [0u8; std::mem::size_of::<HashPos>()];
    truncated.copy_from_slice(&digest.as_bytes()[..std::mem::size_of::<HashPos>()]);
    HashPos::from_be_bytes(truncated)
}

/// Ring arithmetic on the position type.
pub trait HashRingKey: Sized {
    /// Number of finger table entries, one per bit of the ring.
    fn finger_count() -> usize;

    /// Start position of the k-th finger: `self + 2^k` on the ring.
    fn finger_start(self, k: usize) -> Self;
}

impl HashRingKey for HashPos {
    fn finger_count() -> usize {
        HashPos::BITS as usize
    }

    fn finger_start(self, k: usize) -> HashPos {
        self.wrapping_add(1_u64.wrapping_shl(k as u32))
    }
}

/// Modular interval test on the ring, going clockwise from `lower` to
/// `upper`. With both flags false the interval is open on both sides; the
/// flags close the respective endpoint.
///
/// When `lower == upper` the open interval covers the whole ring except
/// that single point.
pub fn is_between(
    pos: HashPos,
    lower: HashPos,
    upper: HashPos,
    include_lower: bool,
    include_upper: bool,
) -> bool {
    if include_lower && pos == lower {
        return true;
    }
    if include_upper && pos == upper {
        return true;
    }
    if lower == upper {
        pos != lower
    } else if lower < upper {
        lower < pos && pos < upper
    } else {
        pos > lower || pos < upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_interval_without_wrap() {
        assert!(is_between(50, 10, 100, false, false));
        assert!(!is_between(10, 10, 100, false, false));
        assert!(!is_between(100, 10, 100, false, false));
        assert!(!is_between(150, 10, 100, false, false));
    }

    #[test]
    fn open_interval_with_wrap() {
        assert!(is_between(250, 200, 10, false, false));
        assert!(is_between(5, 200, 10, false, false));
        assert!(!is_between(100, 200, 10, false, false));
        assert!(!is_between(200, 200, 10, false, false));
        assert!(!is_between(10, 200, 10, false, false));
    }

    #[test]
    fn collapsed_interval_covers_ring_minus_one_point() {
        assert!(is_between(1, 42, 42, false, false));
        assert!(is_between(HashPos::MAX, 42, 42, false, false));
        assert!(!is_between(42, 42, 42, false, false));
    }

    #[test]
    fn closed_endpoints() {
        // (a, b]
        assert!(is_between(100, 10, 100, false, true));
        assert!(!is_between(10, 10, 100, false, true));
        // [a, b)
        assert!(is_between(10, 10, 100, true, false));
        assert!(!is_between(100, 10, 100, true, false));
    }

    #[test]
    fn finger_starts_are_powers_of_two_apart() {
        let pos: HashPos = 42;
        assert_eq!(pos.finger_start(0), 43);
        assert_eq!(pos.finger_start(3), 50);
        assert_eq!(pos.finger_start(63), 42_u64.wrapping_add(1 << 63));
    }

    #[test]
    fn finger_start_wraps_around_the_ring() {
        assert_eq!(HashPos::MAX.finger_start(0), 0);
        assert_eq!(HashPos::MAX.finger_start(1), 1);
    }

    #[test]
    fn hash_is_deterministic_and_spreads() {
        assert_eq!(hash(b"127.0.0.1:5601"), hash(b"127.0.0.1:5601"));
        assert_ne!(hash(b"127.0.0.1:5601"), hash(b"127.0.0.1:5602"));
    }

    #[test]
    fn finger_count_matches_ring_width() {
        assert_eq!(HashPos::finger_count(), 64);
    }
}
