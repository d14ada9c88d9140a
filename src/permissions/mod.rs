//! Standing permission grants and the path-sensitive tool set.

mod grant;
mod store;

pub use grant::PermissionGrant;
pub use store::{MemoryPermissionStore, PermissionStore};

/// Tools that mutate or execute arbitrary filesystem/OS state.
pub const PATH_SENSITIVE_TOOLS: &[&str] =
    &["write_file", "delete_file", "run_command", "execute_command"];

/// Every tool in this namespace drives the host desktop.
pub const PATH_SENSITIVE_NAMESPACES: &[&str] = &["mcp__computer__"];

/// Path-sensitive tools that may still receive a `*` grant.
pub const WILDCARD_EXEMPT_TOOLS: &[&str] = &["mcp__computer__screenshot"];

pub const WILDCARD: &str = "*";

/// `write_file` and namespaced forms like `mcp__fs__write_file` both count.
pub fn is_path_sensitive(tool_name: &str) -> bool {
    let base = tool_name.rsplit("__").next().unwrap_or(tool_name);
    PATH_SENSITIVE_TOOLS.contains(&base)
        || PATH_SENSITIVE_NAMESPACES
            .iter()
            .any(|ns| tool_name.starts_with(ns))
}

/// Whether `tool_name` may be remembered for every path.
pub fn wildcard_allowed(tool_name: &str) -> bool {
    WILDCARD_EXEMPT_TOOLS.contains(&tool_name) || !is_path_sensitive(tool_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_path_sensitive() {
        assert!(is_path_sensitive("write_file"));
        assert!(is_path_sensitive("run_command"));
        assert!(is_path_sensitive("mcp__fs__delete_file"));
        assert!(is_path_sensitive("mcp__computer__click"));
        assert!(!is_path_sensitive("ask_user"));
        assert!(!is_path_sensitive("skill__summarize"));
        assert!(!is_path_sensitive("read_file"));
    }

    #[test]
    fn test_wildcard_allowed() {
        assert!(!wildcard_allowed("run_command"));
        assert!(!wildcard_allowed("mcp__shell__execute_command"));
        assert!(!wildcard_allowed("mcp__computer__click"));
        assert!(wildcard_allowed("mcp__computer__screenshot"));
        assert!(wildcard_allowed("skill__summarize"));
    }
}
