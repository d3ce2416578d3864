//! Export name filtering at the module boundary.

pub trait NameFilter {
    fn filter(&self, name: &str) -> String;
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`, so mangled
/// source names survive as valid export identifiers.
pub struct DefaultNameFilter;

impl NameFilter for DefaultNameFilter {
    fn filter(&self, name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}
