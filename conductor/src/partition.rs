//! Work partitioning across active conductors
//!
//! Rendezvous hashing: every (conductor, brick) pair gets a score and the
//! highest-scoring conductor owns the brick. Each brick maps to exactly
//! one owner for a given conductor set, with no ring state to rebalance.

use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Partitioner {
    host: String,
    conductors: Vec<String>,
}

impl Partitioner {
    /// `host` is this conductor; `conductors` the active set. The local
    /// host is always part of the set.
    pub fn new(host: String, mut conductors: Vec<String>) -> Self {
        if !conductors.contains(&host) {
            conductors.push(host.clone());
        }
        conductors.sort();
        conductors.dedup();
        Self { host, conductors }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn conductors(&self) -> &[String] {
        &self.conductors
    }

    /// The conductor that owns this brick.
    pub fn owner(&self, brick_id: &Uuid) -> &str {
        self.conductors
            .iter()
            .max_by_key(|conductor| (score(conductor, brick_id), conductor.as_str()))
            .map(|s| s.as_str())
            .expect("conductor set is never empty")
    }

    /// Whether this conductor owns the brick.
    pub fn owns(&self, brick_id: &Uuid) -> bool {
        self.owner(brick_id) == self.host
    }
}

fn score(conductor: &str, brick_id: &Uuid) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(conductor.as_bytes());
    hasher.update(b"\0");
    hasher.update(brick_id.as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_conductor_owns_everything() {
        let partitioner = Partitioner::new("cond-1".to_string(), vec![]);
        for _ in 0..32 {
            assert!(partitioner.owns(&Uuid::new_v4()));
        }
    }

    #[test]
    fn test_exactly_one_owner_per_brick() {
        let hosts = vec![
            "cond-1".to_string(),
            "cond-2".to_string(),
            "cond-3".to_string(),
        ];
        let partitioners: Vec<Partitioner> = hosts
            .iter()
            .map(|h| Partitioner::new(h.clone(), hosts.clone()))
            .collect();

        for _ in 0..64 {
            let brick_id = Uuid::new_v4();
            let owners = partitioners.iter().filter(|p| p.owns(&brick_id)).count();
            assert_eq!(owners, 1);
        }
    }

    #[test]
    fn test_ownership_is_stable_and_order_insensitive() {
        let brick_id = Uuid::new_v4();
        let forward = Partitioner::new(
            "cond-1".to_string(),
            vec!["cond-1".to_string(), "cond-2".to_string(), "cond-3".to_string()],
        );
        let reversed = Partitioner::new(
            "cond-1".to_string(),
            vec!["cond-3".to_string(), "cond-2".to_string(), "cond-1".to_string()],
        );

        assert_eq!(forward.owner(&brick_id), reversed.owner(&brick_id));
        assert_eq!(forward.owner(&brick_id), forward.owner(&brick_id));
    }
}
