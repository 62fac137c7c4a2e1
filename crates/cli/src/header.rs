//! Magic header comments (`# fmtb: true` / `# fmtb: false`).

use regex::Regex;
use std::sync::LazyLock;

/// Only this many leading bytes are searched.
const HEADER_WINDOW: usize = 500;

static MAGIC_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#\s*fmtb:\s*(?P<enabled>true|false)\s*$").expect("valid regex")
});

/// Which header rules apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderPolicy {
    /// Only format files that say `# fmtb: true`.
    pub opt_in: bool,
    /// Skip files that say `# fmtb: false`.
    pub opt_out: bool,
}

impl HeaderPolicy {
    /// Whether a file with this content should be formatted.
    pub fn allows(&self, source: &str) -> bool {
        if !self.opt_in && !self.opt_out {
            return true;
        }

        match magic_value(source) {
            Some(true) => true,
            Some(false) => false,
            None => !self.opt_in,
        }
    }
}

fn magic_value(source: &str) -> Option<bool> {
    let mut end = source.len().min(HEADER_WINDOW);
    while !source.is_char_boundary(end) {
        end += 1;
    }

    MAGIC_COMMENT
        .captures(&source[..end])
        .and_then(|c| c.name("enabled"))
        .map(|m| m.as_str() == "true")
}
