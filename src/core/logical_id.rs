//! Stable CloudFormation logical ids derived from construct paths.
//!
//! A resource at `Svc/LB/Resource` becomes `SvcLB` followed by an eight
//! character hash of the full path, so two paths that collapse to the same
//! human-readable part still get distinct ids.

use sha2::{Digest, Sha256};

const HIDDEN_ID: &str = "Default";
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;

pub fn logical_id(path: &str) -> String {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

    // Direct children of the stack keep their id untouched.
    if components.len() == 1 {
        return remove_non_alphanumeric(components[0]);
    }

    let human: Vec<String> = remove_dupes(
        components
            .iter()
            .filter(|c| **c != HIDDEN_ID && **c != HIDDEN_FROM_HUMAN_ID)
            .map(|c| remove_non_alphanumeric(c))
            .filter(|c| !c.is_empty())
            .collect(),
    );

    let mut human = human.concat();
    human.truncate(MAX_HUMAN_LEN);
    format!("{}{}", human, path_hash(&components))
}

fn path_hash(components: &[&str]) -> String {
    let digest = Sha256::digest(components.join("/").as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02X}", b)).collect();
    hex[..HASH_LEN].to_string()
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn remove_dupes(components: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(components.len());
    for c in components {
        if out.last() != Some(&c) {
            out.push(c);
        }
    }
    out
}
