use regex::Regex;
use std::sync::LazyLock;

// Service names and method names share one grammar: dotted segments, each
// starting with a letter, continuing with letters, digits or underscores.
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)*$").unwrap()
});

/// Whether `name` is a valid service name: `xxx.xxx.xxx` where each segment
/// is a valid identifier.
#[inline]
pub fn is_valid_service_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Whether `name` is a valid method name; same grammar as service names.
#[inline]
pub fn is_valid_method_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["a", "A", "abc", "a1", "a_b", "svc.Method", "a.b.c", "Echo", "x9_z.y0"] {
            assert!(is_valid_service_name(name), "{:?} should be valid", name);
            assert!(is_valid_method_name(name), "{:?} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".", "a.", ".a", "1a", "_a", "a b", "a..b", "a.*", "a-b", "bad.service.name.*"] {
            assert!(!is_valid_service_name(name), "{:?} should be invalid", name);
            assert!(!is_valid_method_name(name), "{:?} should be invalid", name);
        }
    }
}
