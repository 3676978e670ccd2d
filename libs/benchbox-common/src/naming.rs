use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Sandbox naming semantics - defines only naming, not runtime logic.
/// Names must be stable across process restarts so repeated CLI
/// invocations against the same problem land in the same warm sandbox.

pub const SANDBOX_PREFIX: &str = "benchbox";
pub const SENTINEL_SUFFIX: &str = ".lastused";

const MAX_SLUG_LEN: usize = 40;

/// Generate the deterministic sandbox name for a problem/language/image identity.
///
/// The readable part is lossy (path separators collapse to `-`), so a
/// name-based UUID over the raw inputs is appended to keep distinct
/// identities distinct.
pub fn sandbox_name(platform: &str, problem_path: &str, language: &str, image: &str) -> String {
    let mut key = Vec::new();
    for part in [platform, problem_path, language, image] {
        key.extend_from_slice(part.as_bytes());
        key.push(0);
    }
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, &key).simple().to_string();

    format!(
        "{}-{}-{}-{}-{}",
        SANDBOX_PREFIX,
        slug(platform),
        slug(problem_path),
        slug(language),
        &digest[..12]
    )
}

/// Path of the last-used sentinel for a sandbox
pub fn sentinel_path(state_dir: &Path, sandbox: &str) -> PathBuf {
    state_dir.join(format!("{}{}", sandbox, SENTINEL_SUFFIX))
}

/// Recover the sandbox name from a sentinel file name, if it has our prefix
pub fn sandbox_from_sentinel<'a>(file_name: &'a str, prefix: &str) -> Option<&'a str> {
    let name = file_name.strip_suffix(SENTINEL_SUFFIX)?;
    name.starts_with(prefix).then_some(name)
}

fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    let mut slug: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push('x');
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_name_deterministic() {
        let a = sandbox_name("leetcode", "two-sum", "python", "benchbox-python:3.12");
        let b = sandbox_name("leetcode", "two-sum", "python", "benchbox-python:3.12");
        assert_eq!(a, b);
        assert!(a.starts_with("benchbox-leetcode-two-sum-python-"));
    }

    #[test]
    fn test_sandbox_name_changes_with_each_input() {
        let base = sandbox_name("leetcode", "two-sum", "python", "img:1");
        assert_ne!(base, sandbox_name("aoc", "two-sum", "python", "img:1"));
        assert_ne!(base, sandbox_name("leetcode", "three-sum", "python", "img:1"));
        assert_ne!(base, sandbox_name("leetcode", "two-sum", "go", "img:1"));
        assert_ne!(base, sandbox_name("leetcode", "two-sum", "python", "img:2"));
    }

    #[test]
    fn test_lossy_slug_does_not_collide() {
        // Both slugs read "2024-day1" but the identities differ
        let a = sandbox_name("aoc", "2024/day1", "go", "img");
        let b = sandbox_name("aoc", "2024-day1", "go", "img");
        assert_ne!(a, b);
    }

    #[test]
    fn test_sandbox_name_is_docker_safe() {
        let name = sandbox_name("Leet Code", "../weird//path\\name", "JavaScript", "img");
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!name.contains("--"));
    }

    #[test]
    fn test_sentinel_round_trip() {
        let path = sentinel_path(Path::new("/tmp"), "benchbox-a-b-python-123");
        assert_eq!(path, PathBuf::from("/tmp/benchbox-a-b-python-123.lastused"));

        assert_eq!(
            sandbox_from_sentinel("benchbox-a-b-python-123.lastused", SANDBOX_PREFIX),
            Some("benchbox-a-b-python-123")
        );
        assert_eq!(sandbox_from_sentinel("other-x.lastused", SANDBOX_PREFIX), None);
        assert_eq!(sandbox_from_sentinel("benchbox-x.txt", SANDBOX_PREFIX), None);
    }
}
