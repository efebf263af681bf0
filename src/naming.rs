//! Logical id allocation.
//!
//! Logical ids are derived from construct paths so they are stable across
//! synthesis runs and independent of declaration order:
//!
//! - a top-level construct keeps its id, minus non-alphanumeric characters;
//! - nested paths become the concatenation of their alphanumeric components
//!   plus the first 8 hex digits (uppercase) of the MD5 of the joined path.
//!
//! Components named `Default` are dropped before hashing, and `Resource` is
//! dropped from the human-readable part only. This keeps ids compatible with
//! templates produced by the CDK for the same construct tree.

/// Separator between construct path components.
pub const PATH_SEP: char = '/';

const HIDDEN_ID: &str = "Default";
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;
const MAX_ID_LEN: usize = 255;

/// Compute the logical id for a construct path such as
/// `Athena-POC-VPC/PublicSubnet1/Subnet`.
///
/// Returns `None` for an empty path.
pub fn logical_id(path: &str) -> Option<String> {
    let components: Vec<&str> = path
        .split(PATH_SEP)
        .filter(|c| !c.is_empty() && *c != HIDDEN_ID)
        .collect();

    if components.is_empty() {
        return None;
    }

    if components.len() == 1 {
        let candidate = remove_non_alphanumeric(components[0]);
        if !candidate.is_empty() && candidate.len() <= MAX_ID_LEN {
            return Some(candidate);
        }
    }

    let hash = path_hash(&components);
    let human: String = remove_dupes(&components)
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect::<String>()
        .chars()
        .take(MAX_HUMAN_LEN)
        .collect();

    Some(format!("{}{}", human, hash))
}

/// Human-friendly unique name for a construct path, used where a resource
/// needs a name property (policy names, tag values).
pub fn unique_name(path: &str) -> String {
    logical_id(path).unwrap_or_default()
}

fn path_hash(components: &[&str]) -> String {
    let joined = components.join(&PATH_SEP.to_string());
    let digest = md5::compute(joined.as_bytes());
    format!("{:x}", digest)[..HASH_LEN].to_uppercase()
}

fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&'a str> = Vec::with_capacity(components.len());
    for component in components {
        match out.last() {
            Some(last) if last.ends_with(component) => {}
            _ => out.push(component),
        }
    }
    out
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}
