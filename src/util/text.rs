/// Split trailing `#tag` words off a task's text.
///
/// Only tags at the end are collected; a `#` in the middle of the text stays
/// part of the text.
pub fn parse_text_and_tags(s: &str) -> (String, Vec<String>) {
    let s = s.trim_end();
    if s.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut tags = Vec::new();
    let mut remaining = s;

    loop {
        let trimmed = remaining.trim_end();
        if trimmed.is_empty() {
            break;
        }

        let (head, last_word) = match trimmed.rfind(' ') {
            Some(last_space) => (&trimmed[..last_space], &trimmed[last_space + 1..]),
            None => ("", trimmed),
        };
        if let Some(tag) = last_word.strip_prefix('#')
            && !tag.is_empty()
            && !tag.contains('#')
        {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
            remaining = head;
            continue;
        }
        break;
    }

    tags.reverse();
    (remaining.trim_end().to_string(), tags)
}

/// Case-insensitive substring test
pub fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_tags_are_split_off() {
        let (text, tags) = parse_text_and_tags("Buy milk #errand #home");
        assert_eq!(text, "Buy milk");
        assert_eq!(tags, vec!["errand", "home"]);
    }

    #[test]
    fn plain_text_has_no_tags() {
        let (text, tags) = parse_text_and_tags("Fix parser crash");
        assert_eq!(text, "Fix parser crash");
        assert!(tags.is_empty());
    }

    #[test]
    fn only_tags() {
        let (text, tags) = parse_text_and_tags("#core #cc");
        assert!(text.is_empty());
        assert_eq!(tags, vec!["core", "cc"]);
    }

    #[test]
    fn inner_hash_stays_in_text() {
        let (text, tags) = parse_text_and_tags("Fix #3 parser crash #bug");
        assert_eq!(text, "Fix #3 parser crash");
        assert_eq!(tags, vec!["bug"]);
    }

    #[test]
    fn duplicate_tags_collapse() {
        let (_, tags) = parse_text_and_tags("Call #work #work");
        assert_eq!(tags, vec!["work"]);
    }

    #[test]
    fn contains_ci_ignores_case() {
        assert!(contains_ci("Write REPORT", "report"));
        assert!(!contains_ci("Write", "report"));
    }
}
