//! Helpers for pulling structured fragments out of free-form model output.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:python|py)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap());

static OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Return the contents of every ```` ```python ```` block joined by newlines,
/// or the whole trimmed response when no block is present.
pub fn extract_code(response: &str) -> String {
    let blocks: Vec<&str> = CODE_FENCE_RE
        .captures_iter(response)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();
    if blocks.is_empty() {
        return response.trim().to_string();
    }
    blocks.join("\n")
}

/// Return the widest `{ ... }` span in `response`, if any.
///
/// The span runs from the first `{` to the last `}` so that nested objects
/// stay intact; whether it decodes is the caller's concern.
pub fn object_fragment(response: &str) -> Option<&str> {
    OBJECT_RE.find(response).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_python_block() {
        let response = "Here you go:\n```python\ndef add(a, b):\n    return a + b\n```\nEnjoy.";
        assert_eq!(extract_code(response), "def add(a, b):\n    return a + b");
    }

    #[test]
    fn joins_multiple_blocks() {
        let response = "```python\nimport os\n```\ntext\n```py\nx = 1\n```";
        assert_eq!(extract_code(response), "import os\nx = 1");
    }

    #[test]
    fn falls_back_to_whole_response() {
        assert_eq!(extract_code("  x = 1\n"), "x = 1");
    }

    #[test]
    fn ignores_other_languages() {
        let response = "```bash\nls\n```";
        assert_eq!(extract_code(response), "```bash\nls\n```");
    }

    #[test]
    fn object_fragment_spans_first_to_last_brace() {
        let response = "Plan follows {\"steps\": [{\"title\": \"a\"}]} thanks";
        assert_eq!(
            object_fragment(response),
            Some("{\"steps\": [{\"title\": \"a\"}]}")
        );
        assert_eq!(object_fragment("no braces here"), None);
    }
}
