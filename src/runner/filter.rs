//! Test selection.

use super::args::RunnerArgs;

/// Which suites and tests a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFilter {
    pub file_pattern: String,
    pub includes: Vec<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub excludes: Vec<String>,
}

impl TestFilter {
    pub fn from_args(args: &RunnerArgs) -> Self {
        Self {
            file_pattern: args.file.clone(),
            includes: args.filter.clone(),
            before: args.before.clone(),
            after: args.after.clone(),
            excludes: args.exclude.clone(),
        }
    }

    pub fn matches_file(&self, file_name: &str) -> bool {
        wildcard_match(&self.file_pattern, file_name)
    }

    /// Name-based selection: any include, inside the before/after bounds, and no exclude.
    pub fn matches(&self, test_name: &str) -> bool {
        if !self.includes.is_empty() && !self.includes.iter().any(|s| test_name.contains(s.as_str())) {
            return false;
        }
        if self.before.as_deref().is_some_and(|b| test_name > b) {
            return false;
        }
        if self.after.as_deref().is_some_and(|a| test_name < a) {
            return false;
        }
        !self.excludes.iter().any(|s| test_name.contains(s.as_str()))
    }

    /// Human-readable list of what was applied, for "No tests matching".
    pub fn descriptions(&self) -> Vec<String> {
        let mut applied = vec![format!("file: {}", self.file_pattern)];
        if !self.includes.is_empty() {
            applied.push(format!("filters: {}", self.includes.join(", ")));
        }
        if let Some(before) = &self.before {
            applied.push(format!("before: {before}"));
        }
        if let Some(after) = &self.after {
            applied.push(format!("after: {after}"));
        }
        if !self.excludes.is_empty() {
            applied.push(format!("excludes: {}", self.excludes.join(", ")));
        }
        applied
    }
}

/// Glob match with `*` (any run) and `?` (any one character).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                // backtrack: let the last star swallow one more character
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wildcards() {
        assert!(wildcard_match("test_*", "test_pets.rs"));
        assert!(wildcard_match("test_*", "test_"));
        assert!(!wildcard_match("test_*", "pets_test.rs"));
        assert!(wildcard_match("*pets*", "test_pets.rs"));
        assert!(wildcard_match("test_?ets.rs", "test_pets.rs"));
        assert!(!wildcard_match("test_?ets.rs", "test_ets.rs"));
        assert!(wildcard_match("a*b*c", "aXbYbZc"));
        assert!(!wildcard_match("a*b*c", "aXbYbZ"));
        assert!(wildcard_match("", ""));
        assert!(!wildcard_match("", "x"));
    }

    #[test]
    fn test_includes_and_excludes() {
        let filter = TestFilter {
            file_pattern: "*".into(),
            includes: vec!["pet".into(), "owner".into()],
            excludes: vec!["slow".into()],
            ..Default::default()
        };
        assert!(filter.matches("test_pet_create"));
        assert!(filter.matches("test_owner_list"));
        assert!(!filter.matches("test_store"));
        assert!(!filter.matches("test_pet_slow"));
    }

    #[test]
    fn test_before_and_after_are_inclusive() {
        let filter = TestFilter {
            before: Some("test_m".into()),
            after: Some("test_c".into()),
            ..Default::default()
        };
        assert!(filter.matches("test_c"));
        assert!(filter.matches("test_m"));
        assert!(filter.matches("test_d_anything"));
        assert!(!filter.matches("test_b"));
        assert!(!filter.matches("test_ma"));
    }

    #[test]
    fn test_descriptions() {
        let filter = TestFilter {
            file_pattern: "test_*".into(),
            includes: vec!["a".into(), "b".into()],
            before: Some("x".into()),
            after: Some("c".into()),
            excludes: vec!["slow".into(), "flaky".into()],
        };
        assert_eq!(
            filter.descriptions(),
            vec!["file: test_*", "filters: a, b", "before: x", "after: c", "excludes: slow, flaky"]
        );
        let bare = TestFilter {
            file_pattern: "test_*".into(),
            ..Default::default()
        };
        assert_eq!(bare.descriptions(), vec!["file: test_*"]);
    }

    proptest! {
        #[test]
        fn star_matches_anything(text in "[a-z_.]{0,12}") {
            prop_assert!(wildcard_match("*", &text));
            prop_assert!(wildcard_match(&text, &text));
            let prefixed = format!("{}*", text);
            let extended = format!("{}tail", text);
            prop_assert!(wildcard_match(&prefixed, &extended));
        }
    }
}
