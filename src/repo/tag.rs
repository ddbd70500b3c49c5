// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tag resolution.
//!
//! Users rarely type a tag name exactly. They type "2.1" and expect
//! "release-2.1" to be found. So a keyword is first compared against every
//! tag for an exact match, and only if none exists is it treated as a
//! substring of the tag name. When several tags contain the keyword, the one
//! enumerated _last_ wins.
//!
//! Resolution never conflates "nothing matched" with a real tag: the result
//! is an [`Option`], so a tag literally named "" is still resolvable.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Tag selected for a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagMatch {
    /// Keyword equals the tag name.
    Exact(String),

    /// Keyword is a substring of the tag name.
    Fuzzy(String),
}

impl TagMatch {
    /// Name of the matched tag.
    pub fn name(&self) -> &str {
        match self {
            Self::Exact(name) | Self::Fuzzy(name) => name.as_str(),
        }
    }

    pub fn into_name(self) -> String {
        match self {
            Self::Exact(name) | Self::Fuzzy(name) => name,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

impl Display for TagMatch {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// Resolve keyword against tags in enumeration order.
///
/// Matching is case-sensitive. Returns `None` when no tag equals or contains
/// the keyword.
pub fn resolve<I, S>(tags: I, keyword: &str) -> Option<TagMatch>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut fuzzy = None;
    for tag in tags {
        let tag = tag.as_ref();
        if tag == keyword {
            return Some(TagMatch::Exact(tag.to_owned()));
        }

        // INVARIANT: Later substring matches overwrite earlier ones.
        if tag.contains(keyword) {
            fuzzy = Some(tag.to_owned());
        }
    }

    fuzzy.map(TagMatch::Fuzzy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(&["v1_RC", "v2_Release", "v1_Final"], "v1", Some(TagMatch::Fuzzy("v1_Final".into())); "last fuzzy match wins")]
    #[test_case(&["1.0", "1.0.1", "1.0-rc"], "1.0", Some(TagMatch::Exact("1.0".into())); "exact beats later fuzzy")]
    #[test_case(&["1.0-rc", "1.0.1", "1.0"], "1.0", Some(TagMatch::Exact("1.0".into())); "exact beats earlier fuzzy")]
    #[test_case(&["1.0", "2.0"], "2", Some(TagMatch::Fuzzy("2.0".into())); "single fuzzy match")]
    #[test_case(&["1.0"], "2", None; "no tag contains keyword")]
    #[test_case(&[], "2", None; "repository without tags")]
    #[test_case(&["Release-1"], "release", None; "matching is case sensitive")]
    #[test]
    fn resolve_keyword(tags: &[&str], keyword: &str, expect: Option<TagMatch>) {
        assert_eq!(resolve(tags, keyword), expect);
    }

    #[test]
    fn empty_tag_name_is_not_a_miss() {
        let result = resolve(["", "v1"], "");
        assert_eq!(result, Some(TagMatch::Exact(String::new())));
        assert_eq!(resolve(Vec::<String>::new(), ""), None);
    }

    #[test]
    fn tag_match_exposes_name() {
        let result = TagMatch::Fuzzy("v2_Release".into());
        assert!(!result.is_exact());
        assert_eq!(result.name(), "v2_Release");
        assert_eq!(result.to_string(), "v2_Release");
        assert_eq!(result.into_name(), "v2_Release");
    }
}
