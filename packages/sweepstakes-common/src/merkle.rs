use sha2::{Digest, Sha256};

use crate::types::ParticipantEntry;

/// Compute the leaf hash for one pool entry.
///
/// `leaf_hash = sha256( 0x00 || msisdn_bytes || cumulative_start_u128_be || cumulative_end_u128_be )`
///
/// The 0x00 prefix separates leaves from internal nodes (0x01).
pub fn compute_leaf_hash(msisdn: &str, cumulative_start: u128, cumulative_end: u128) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(msisdn.as_bytes());
    hasher.update(cumulative_start.to_be_bytes());
    hasher.update(cumulative_end.to_be_bytes());
    hasher.finalize().into()
}

/// Sorted-pair internal node hash: smaller value first.
pub fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    if a.as_slice() <= b.as_slice() {
        hasher.update(a);
        hasher.update(b);
    } else {
        hasher.update(b);
        hasher.update(a);
    }
    hasher.finalize().into()
}

/// Half-open cumulative weight ranges `[start, end)` for entries in pool order.
pub fn cumulative_ranges(entries: &[ParticipantEntry]) -> Vec<(u128, u128)> {
    let mut cursor = 0u128;
    entries
        .iter()
        .map(|entry| {
            let start = cursor;
            cursor += u128::from(entry.weight);
            (start, cursor)
        })
        .collect()
}

pub fn pool_leaves(entries: &[ParticipantEntry]) -> Vec<[u8; 32]> {
    entries
        .iter()
        .zip(cumulative_ranges(entries))
        .map(|(entry, (start, end))| compute_leaf_hash(&entry.msisdn, start, end))
        .collect()
}

/// Root of the tree built bottom-up; an odd node at the end of a level is carried up as is.
/// An empty leaf set has the all-zero root.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Sibling path for the leaf at `index`, leaf level first.
pub fn merkle_proof(leaves: &[[u8; 32]], index: usize) -> Option<Vec<[u8; 32]>> {
    if index >= leaves.len() {
        return None;
    }
    let mut proof = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;
    while level.len() > 1 {
        let sibling = position ^ 1;
        if sibling < level.len() {
            proof.push(level[sibling]);
        }
        level = next_level(&level);
        position /= 2;
    }
    Some(proof)
}

fn next_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [a, b] => hash_pair(a, b),
            [a] => *a,
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Verify a Merkle proof against a known root.
///
/// All values are 32-byte hashes represented as hex strings.
///
/// Returns true if the computed root matches the expected root.
pub fn verify_merkle_proof(root_hex: &str, proof_hex: &[String], leaf_hash: &[u8; 32]) -> bool {
    let expected_root = match hex::decode(root_hex) {
        Ok(v) => v,
        Err(_) => return false,
    };
    if expected_root.len() != 32 {
        return false;
    }

    let mut current = *leaf_hash;

    for sibling_hex in proof_hex {
        let sibling: [u8; 32] = match hex::decode(sibling_hex).map(<[u8; 32]>::try_from) {
            Ok(Ok(v)) => v,
            _ => return false,
        };
        current = hash_pair(&current, &sibling);
    }

    current.as_slice() == expected_root.as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(msisdn: &str, weight: u64) -> ParticipantEntry {
        ParticipantEntry {
            msisdn: msisdn.to_string(),
            weight,
        }
    }

    fn sample_entries() -> Vec<ParticipantEntry> {
        vec![
            entry("2348030000001", 30),
            entry("2348030000002", 10),
            entry("2348030000003", 5),
            entry("2348030000004", 5),
            entry("2348030000005", 1),
        ]
    }

    #[test]
    fn test_compute_leaf_hash() {
        let hash1 = compute_leaf_hash("2348030000001", 0, 100);
        let hash2 = compute_leaf_hash("2348030000001", 0, 100);
        assert_eq!(hash1, hash2);

        let hash3 = compute_leaf_hash("2348030000001", 0, 200);
        assert_ne!(hash1, hash3);

        let hash4 = compute_leaf_hash("2348030000002", 0, 100);
        assert_ne!(hash1, hash4);
    }

    #[test]
    fn test_cumulative_ranges() {
        let ranges = cumulative_ranges(&sample_entries());
        assert_eq!(ranges, vec![(0, 30), (30, 40), (40, 45), (45, 50), (50, 51)]);
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        let leaves = pool_leaves(&sample_entries());
        let root_hex = hex::encode(merkle_root(&leaves));

        for (i, leaf) in leaves.iter().enumerate() {
            let proof: Vec<String> = merkle_proof(&leaves, i)
                .unwrap()
                .iter()
                .map(hex::encode)
                .collect();
            assert!(verify_merkle_proof(&root_hex, &proof, leaf), "leaf {i}");
        }
        assert!(merkle_proof(&leaves, leaves.len()).is_none());
    }

    #[test]
    fn test_verify_merkle_proof_invalid() {
        let leaves = pool_leaves(&sample_entries());
        let root_hex = hex::encode(merkle_root(&leaves));

        // Proof for leaf 0 presented with leaf 2
        let proof: Vec<String> = merkle_proof(&leaves, 0)
            .unwrap()
            .iter()
            .map(hex::encode)
            .collect();
        assert!(!verify_merkle_proof(&root_hex, &proof, &leaves[2]));

        let wrong_root = hex::encode([0u8; 32]);
        assert!(!verify_merkle_proof(&wrong_root, &proof, &leaves[0]));
        assert!(!verify_merkle_proof("zz", &proof, &leaves[0]));
    }

    #[test]
    fn test_weight_change_changes_root() {
        let mut entries = sample_entries();
        let before = merkle_root(&pool_leaves(&entries));
        entries[3].weight += 1;
        assert_ne!(before, merkle_root(&pool_leaves(&entries)));
    }

    #[test]
    fn test_single_leaf_tree() {
        let leaf = compute_leaf_hash("2348030000001", 0, 1000);
        assert_eq!(merkle_root(&[leaf]), leaf);

        let proof: Vec<String> = vec![];
        assert!(verify_merkle_proof(&hex::encode(leaf), &proof, &leaf));
    }
}
