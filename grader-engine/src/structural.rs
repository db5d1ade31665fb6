//! Comparison for challenges that only need their syntax repaired.

/// Drops line-comment suffixes, trims each line and discards blank lines.
///
/// Block comments and comment tokens inside string literals are not
/// recognized.
pub fn normalize(source: &str, comment_token: &str) -> String {
    source
        .lines()
        .map(|line| match line.find(comment_token) {
            Some(pos) => &line[..pos],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn equivalent(submitted: &str, reference: &str, comment_token: &str) -> bool {
    normalize(submitted, comment_token) == normalize(reference, comment_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = "
int main() {
    int s;
    return 0;
}
";

    #[test]
    fn identical_texts_match() {
        assert!(equivalent(REFERENCE, REFERENCE, "//"));
    }

    #[test]
    fn comments_and_whitespace_are_ignored() {
        let submitted = "int main() {   // entry\n\n\tint s; // fixed\n  return 0;\n}\n// trailing";
        assert!(equivalent(submitted, REFERENCE, "//"));
        assert_eq!(
            normalize(submitted, "//"),
            "int main() {\nint s;\nreturn 0;\n}"
        );
    }

    #[test]
    fn missing_semicolon_differs() {
        let submitted = REFERENCE.replace("int s;", "int s");
        assert!(!equivalent(&submitted, REFERENCE, "//"));
    }

    #[test]
    fn token_depends_on_track() {
        assert!(equivalent("x = 1  # set\n", "x = 1", "#"));
        assert!(!equivalent("x = 1  # set\n", "x = 1", "//"));
        assert_eq!(normalize("a\r\nb\r\n", "#"), "a\nb");
    }
}
