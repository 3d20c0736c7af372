use std::path::{Path, PathBuf};

/// Join two paths, only including the normal components.
pub fn join_normalized(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let mut out = base.as_ref().to_path_buf();
    out.extend(path.as_ref().components().filter(|v| matches!(v, std::path::Component::Normal(_))));
    out
}

/// Remove every occurrence of `prefix` (and the separator following it) from `text`.
pub fn strip_path_prefix(text: &str, prefix: &Path) -> String {
    let prefix = prefix.to_string_lossy();
    let prefix = prefix.trim_end_matches(std::path::MAIN_SEPARATOR);
    if prefix.is_empty() {
        return text.to_string();
    }
    let with_sep = format!("{prefix}{}", std::path::MAIN_SEPARATOR);
    text.replace(&with_sep, "").replace(prefix, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_normalized() {
        let cases: &[(&str, &str)] = &[
            ("src/main.py", "/ws/src/main.py"),
            ("../../etc/passwd", "/ws/etc/passwd"),
            ("/abs/file.js", "/ws/abs/file.js"),
            ("./a/./b.js", "/ws/a/b.js"),
        ];
        for &(path, expected) in cases {
            assert_eq!(join_normalized("/ws", path), PathBuf::from(expected));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_strip_path_prefix() {
        let root = Path::new("/tmp/github-code-checker-1700000000000-0000beef");
        let text = "/tmp/github-code-checker-1700000000000-0000beef/src/a.py:1:1: F401 'os' \
                    imported but unused";
        assert_eq!(strip_path_prefix(text, root), "src/a.py:1:1: F401 'os' imported but unused");
        assert_eq!(strip_path_prefix("no paths here", root), "no paths here");
        assert_eq!(
            strip_path_prefix("/tmp/github-code-checker-1700000000000-0000beef", root),
            ""
        );
    }
}
