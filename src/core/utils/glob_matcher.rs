/// Check if a pattern contains wildcards.
pub fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Match a language tag against a requested language.
///
/// Comparison is case-insensitive: `EN-gb` matches `en-GB`, `en-*` matches
/// `en-US` and `en-GB`.
pub fn matches_language(pattern: &str, tag: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let tag = tag.to_lowercase();
    if !is_glob_pattern(&pattern) {
        return pattern == tag;
    }
    wildcard_matches(&pattern, &tag)
}

/// Names matching `pattern`, sorted.
///
/// Unlike language tags, names are compared case-sensitively.
pub fn expand_glob_pattern<'a>(
    pattern: &str,
    names: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let mut matched: Vec<String> = names
        .into_iter()
        .filter(|name| {
            if is_glob_pattern(pattern) {
                wildcard_matches(pattern, name)
            } else {
                pattern == name.as_str()
            }
        })
        .cloned()
        .collect();
    matched.sort();
    matched
}

/// `*` matches 0 or more characters, `?` exactly one.
fn wildcard_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    p = star + 1;
                    t = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
