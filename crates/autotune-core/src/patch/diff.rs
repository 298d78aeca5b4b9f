//! Unified-diff inspection helpers.

/// Count changed lines in a unified diff.
///
/// Lines starting with `+` or `-` are counted; the `+++`/`---` file headers
/// are not.
pub fn count_diff_lines(diff: &str) -> usize {
    diff.lines()
        .filter(|line| {
            (line.starts_with('+') && !line.starts_with("+++"))
                || (line.starts_with('-') && !line.starts_with("---"))
        })
        .count()
}

/// Paths touched by a unified diff, de-duplicated in first-seen order.
///
/// Taken from `+++ b/<path>` headers with the first path component stripped
/// (`-p1`); for deletions (`+++ /dev/null`) the `--- a/<path>` header is used.
pub fn touched_files(diff: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    let mut pending_old: Option<String> = None;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("--- ") {
            pending_old = header_path(rest);
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let path = header_path(rest).or_else(|| pending_old.take());
            if let Some(path) = path {
                if !files.contains(&path) {
                    files.push(path);
                }
            }
            pending_old = None;
        }
    }
    files
}

fn header_path(rest: &str) -> Option<String> {
    // Headers may carry a tab-separated timestamp.
    let raw = rest.split('\t').next()?.trim();
    if raw.is_empty() || raw == "/dev/null" {
        return None;
    }
    let stripped = match raw.split_once('/') {
        Some((_, tail)) if !tail.is_empty() => tail,
        _ => raw,
    };
    Some(stripped.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_excludes_headers() {
        assert_eq!(count_diff_lines("--- a\n+++ b\n@@ -1 +1 @@\n-old\n+new\n"), 2);
    }

    #[test]
    fn test_count_ignores_context_lines() {
        let diff = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n ctx\n-old\n+new\n ctx\n";
        assert_eq!(count_diff_lines(diff), 2);
    }

    #[test]
    fn test_count_empty() {
        assert_eq!(count_diff_lines(""), 0);
    }

    #[test]
    fn test_touched_files_strips_prefix() {
        let diff = "--- a/src/app.ts\n+++ b/src/app.ts\n@@ -1 +1 @@\n-a\n+b\n\
                    --- a/src/util.ts\n+++ b/src/util.ts\n@@ -1 +1 @@\n-c\n+d\n";
        assert_eq!(
            touched_files(diff),
            vec!["src/app.ts".to_string(), "src/util.ts".to_string()]
        );
    }

    #[test]
    fn test_touched_files_handles_deletion_and_timestamps() {
        let diff = "--- a/old.py\t2024-01-01 00:00:00\n+++ /dev/null\n@@ -1 +0,0 @@\n-x\n";
        assert_eq!(touched_files(diff), vec!["old.py".to_string()]);
    }

    #[test]
    fn test_touched_files_dedupes() {
        let diff = "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n--- a/x\n+++ b/x\n@@ -5 +5 @@\n-c\n+d\n";
        assert_eq!(touched_files(diff), vec!["x".to_string()]);
    }
}
