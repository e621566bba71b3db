//! CPU-bound sample workload for benchmarks and demos.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `input`.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hashes the decimal form of `seed`, then hashes the hex digest again,
/// `rounds` times in total.
pub fn sha256_chain(seed: u64, rounds: usize) -> String {
    let mut value = seed.to_string();
    for _ in 0..rounds {
        value = sha256_hex(&value);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_digest() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_chain() {
        assert_eq!(sha256_chain(7, 0), "7");
        assert_eq!(sha256_chain(7, 1), sha256_hex("7"));
        assert_eq!(sha256_chain(7, 2), sha256_hex(&sha256_hex("7")));
        assert_eq!(sha256_chain(7, 3).len(), 64);
    }
}
