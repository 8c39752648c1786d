//! Path normalisation for the change-journal replayer.
//!
//! All paths stored in or queried against [`crate::journal::JournalReplayer`]
//! go through [`normalise`] first: lowercased, forward slashes, leading drive
//! letter stripped, consecutive slashes collapsed.

/// Normalise a path per the replayer's comparison contract.
///
/// `normalise(normalise(p)) == normalise(p)` for all `p` — repeated
/// normalisation is a no-op.
pub fn normalise(path: &str) -> String {
    let mut s = path.replace('\\', "/");

    if s.len() >= 2 && s.as_bytes()[1] == b':' {
        s = s[2..].to_string();
    }

    let collapsed = s.split('/').filter(|seg| !seg.is_empty());
    let joined = collapsed.collect::<Vec<_>>().join("/");

    joined.to_lowercase()
}

/// Every strict ancestor directory of a normalised path, shallowest first.
///
/// Does not include `path` itself. `ancestors("a/b/c")` yields `["a", "a/b"]`.
pub fn ancestors(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut out = Vec::with_capacity(segments.len().saturating_sub(1));
    for i in 1..segments.len() {
        out.push(segments[..i].join("/"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_drive_and_lowercases() {
        assert_eq!(normalise("C:\\Users\\Bob\\File.TXT"), "users/bob/file.txt");
    }

    #[test]
    fn collapses_consecutive_slashes() {
        assert_eq!(normalise("a//b///c"), "a/b/c");
    }

    #[test]
    fn is_idempotent() {
        for p in ["C:\\a\\b", "a/b/c", "", "/leading/slash/"] {
            let once = normalise(p);
            assert_eq!(normalise(&once), once);
        }
    }

    #[test]
    fn ancestors_excludes_self() {
        assert_eq!(ancestors("a/b/c"), vec!["a", "a/b"]);
        assert_eq!(ancestors("a"), Vec::<String>::new());
        assert_eq!(ancestors(""), Vec::<String>::new());
    }
}
