//! Pure auto-allow predicate for tool approval. Interactive confirmation
//! and the process-wide serialization lock are I/O concerns and live
//! behind the `ApprovalPolicy` port in the application layer.

use std::collections::HashMap;

/// Key used for entries that apply regardless of server.
pub const WILDCARD_SERVER: &str = "*";
/// Entry that auto-allows every tool on a server.
pub const WILDCARD_TOOL: &str = "*";

/// Normalize a tool name for comparison: lowercase, `-` and `_`
/// treated as equivalent.
pub fn canon(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

/// `true` if `(server, tool)` is covered by `allowed`, a map of
/// `server -> [tool_or_wildcard]` where the synthetic key
/// [`WILDCARD_SERVER`] applies globally.
///
/// Checks, in order: global wildcard, per-server wildcard, bare tool
/// name (either list), qualified `server__tool` name (either list).
/// Name comparison is normalized per [`canon`].
pub fn is_auto_allowed(server: &str, tool: &str, allowed: &HashMap<String, Vec<String>>) -> bool {
    let tool = canon(tool);
    let qualified = canon(&crate::tool::qualify(server, &tool));

    let global = allowed.get(WILDCARD_SERVER).map(Vec::as_slice).unwrap_or(&[]);
    let per_server = allowed
        .get(&canon(server))
        .or_else(|| allowed.get(server))
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for list in [global, per_server] {
        for entry in list {
            let entry = canon(entry);
            if entry == WILDCARD_TOOL || entry == tool || entry == qualified {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn global_wildcard_allows_everything() {
        let map = allowed(&[("*", &["*"])]);
        assert!(is_auto_allowed("fs", "read", &map));
        assert!(is_auto_allowed("anything", "whatever", &map));
    }

    #[test]
    fn per_server_wildcard_is_scoped() {
        let map = allowed(&[("fs", &["*"])]);
        assert!(is_auto_allowed("fs", "read", &map));
        assert!(!is_auto_allowed("shell", "execute", &map));
    }

    #[test]
    fn bare_name_and_qualified_name_both_match() {
        let map = allowed(&[("fs", &["read"]), ("shell", &["shell__execute"])]);
        assert!(is_auto_allowed("fs", "read", &map));
        assert!(is_auto_allowed("shell", "execute", &map));
    }

    #[test]
    fn unmatched_defaults_to_false() {
        let map = allowed(&[("fs", &["read"])]);
        assert!(!is_auto_allowed("fs", "write", &map));
    }

    #[test]
    fn name_normalization_is_symmetric() {
        let map = allowed(&[("fs", &["read_file"])]);
        assert_eq!(
            is_auto_allowed("fs", "read-file", &map),
            is_auto_allowed("fs", &canon("read-file"), &map)
        );
        assert!(is_auto_allowed("fs", "READ-FILE", &map));
    }
}
