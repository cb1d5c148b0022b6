//! Project and file name sanitization.

use std::sync::LazyLock;

use regex::Regex;

/// Name used when neither a hint nor the prompt yields usable keywords.
pub const DEFAULT_PROJECT_NAME: &str = "python_project";

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap());

const STOP_WORDS: &[&str] = &[
    "create",
    "generate",
    "implement",
    "build",
    "develop",
    "write",
    "python",
    "code",
    "the",
    "and",
    "for",
];

/// Derive a project name from the first keywords of `prompt`.
///
/// Looks at the first three words of three or more letters, drops stop
/// words, and joins up to two of the survivors with `_`.
pub fn derive_project_name(prompt: &str) -> String {
    let lowered = prompt.to_lowercase();
    let keywords: Vec<&str> = WORD_RE
        .find_iter(&lowered)
        .take(3)
        .map(|m| m.as_str())
        .filter(|word| !STOP_WORDS.contains(word))
        .take(2)
        .collect();
    if keywords.is_empty() {
        return DEFAULT_PROJECT_NAME.to_string();
    }
    sanitize_project_name(&keywords.join("_"))
}

/// Restrict `name` to ASCII alphanumerics and `_`.
pub fn sanitize_project_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        return DEFAULT_PROJECT_NAME.to_string();
    }
    cleaned
}

/// Restrict `name` to ASCII alphanumerics, `.`, `_` and `-`.
///
/// Names made only of dots (`.`, `..`) are replaced with `_` so they can never
/// address a parent directory.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|ch| ch == '.') {
        return "_".to_string();
    }
    cleaned
}

/// `"todo_list_api"` -> `"Todo List Api"`.
pub fn display_title(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_from_leading_keywords() {
        assert_eq!(
            derive_project_name("Create a CSV parser with validation"),
            "csv_parser"
        );
    }

    #[test]
    fn derives_default_when_only_stop_words() {
        assert_eq!(derive_project_name("write python code"), DEFAULT_PROJECT_NAME);
        assert_eq!(derive_project_name("!!"), DEFAULT_PROJECT_NAME);
    }

    #[test]
    fn project_name_keeps_only_safe_characters() {
        assert_eq!(sanitize_project_name("my-app v2"), "my_app_v2");
        assert_eq!(sanitize_project_name("   "), DEFAULT_PROJECT_NAME);
    }

    #[test]
    fn file_name_neutralizes_traversal() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name(".."), "_");
        assert_eq!(sanitize_file_name(""), "_");
        assert_eq!(sanitize_file_name("main.py"), "main.py");
    }

    #[test]
    fn display_title_capitalizes_segments() {
        assert_eq!(display_title("todo_list_api"), "Todo List Api");
    }
}
