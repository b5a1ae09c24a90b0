//! Cache key derivation and Redis glob matching.
//!
//! Keys follow `"{domain}:{subdomain}:{serialized args}"`, for example
//! `vocabulary:stats:["user-123"]`.

use serde::Serialize;

use crate::cache::store::CacheError;

/// Derive the key for `args` under `prefix`.
pub fn cache_key<A: Serialize + ?Sized>(prefix: &str, args: &A) -> Result<String, CacheError> {
    Ok(format!("{}:{}", prefix, serde_json::to_string(args)?))
}

/// Escape glob metacharacters so `input` only matches itself.
pub fn escape_pattern(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Match `text` against a Redis glob: `*`, `?`, `[abc]`, `[^a-z]`, `\x`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            let mut rest = p;
            while rest.first() == Some(&'*') {
                rest = &rest[1..];
            }
            if rest.is_empty() {
                return true;
            }
            (0..=t.len()).any(|i| match_from(rest, &t[i..]))
        }
        Some('?') => !t.is_empty() && match_from(&p[1..], &t[1..]),
        Some('[') => {
            let Some(&c) = t.first() else {
                return false;
            };
            match match_class(&p[1..], c) {
                Some((matched, used)) => matched && match_from(&p[1 + used..], &t[1..]),
                // Unterminated class: the bracket is a literal.
                None => c == '[' && match_from(&p[1..], &t[1..]),
            }
        }
        Some('\\') if p.len() > 1 => t.first() == Some(&p[1]) && match_from(&p[2..], &t[1..]),
        Some(&c) => t.first() == Some(&c) && match_from(&p[1..], &t[1..]),
    }
}

/// Match `c` against a class body (after `[`); returns the outcome and how
/// many pattern chars the class used including the closing `]`.
fn match_class(p: &[char], c: char) -> Option<(bool, usize)> {
    let negate = p.first() == Some(&'^');
    let mut i = usize::from(negate);
    let start = i;
    let mut matched = false;

    while i < p.len() {
        if p[i] == ']' && i > start {
            return Some((matched != negate, i + 1));
        }
        let (lo, next) = if p[i] == '\\' && i + 1 < p.len() {
            (p[i + 1], i + 2)
        } else {
            (p[i], i + 1)
        };
        if next + 1 < p.len() && p[next] == '-' && p[next + 1] != ']' {
            let hi = p[next + 1];
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            matched |= (lo..=hi).contains(&c);
            i = next + 2;
        } else {
            matched |= c == lo;
            i = next;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_shapes() {
        assert_eq!(
            cache_key("vocabulary:stats", &("user-123",)).unwrap(),
            r#"vocabulary:stats:["user-123"]"#
        );
        assert_eq!(cache_key("practice:words", &("u1", 20)).unwrap(), r#"practice:words:["u1",20]"#);
        assert_eq!(cache_key("global:config", &()).unwrap(), "global:config:null");
    }

    #[test]
    fn test_glob_wildcards() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("vocabulary:*", "vocabulary:stats:[\"u1\"]"));
        assert!(glob_match(r#"vocabulary:*"u1"*"#, r#"vocabulary:stats:["u1"]"#));
        assert!(!glob_match(r#"vocabulary:*"u1"*"#, r#"vocabulary:stats:["u12"]"#));
        assert!(glob_match("h?llo", "hello"));
        assert!(!glob_match("h?llo", "hllo"));
    }

    #[test]
    fn test_glob_classes() {
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[^e]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("v[0-9]", "v7"));
        assert!(!glob_match("v[0-9]", "vx"));
        assert!(glob_match("a[b", "a[b"));
    }

    #[test]
    fn test_escaped_input_matches_literally() {
        let id = "we*ird?[id]";
        let pattern = format!("user:{}", escape_pattern(id));
        assert!(glob_match(&pattern, "user:we*ird?[id]"));
        assert!(!glob_match(&pattern, "user:weXirdY[id]"));
    }
}
