//! Token-level rewrites of shell command lines.
//!
//! Commands are treated as whitespace-separated tokens. Quoting is not
//! interpreted; remediations only touch bare flags and program names. A
//! command with no matching token is returned byte-for-byte.

/// Whether `cmd` contains `token` as a whole whitespace-separated word.
pub fn has_token(cmd: &str, token: &str) -> bool {
    cmd.split_whitespace().any(|t| t == token)
}

/// Whether any token of `cmd` starts with `prefix`.
pub fn has_token_prefix(cmd: &str, prefix: &str) -> bool {
    cmd.split_whitespace().any(|t| t.starts_with(prefix))
}

/// Replace every token equal to `from` with `to`.
pub fn replace_token(cmd: &str, from: &str, to: &str) -> String {
    if !has_token(cmd, from) {
        return cmd.to_string();
    }
    cmd.split_whitespace()
        .map(|t| if t == from { to } else { t })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace the two-token sequence `a b` with `to`, e.g. `npm ci` -> `npm install`.
pub fn replace_pair(cmd: &str, a: &str, b: &str, to: &str) -> String {
    let tokens: Vec<&str> = cmd.split_whitespace().collect();
    if !tokens.windows(2).any(|w| w[0] == a && w[1] == b) {
        return cmd.to_string();
    }
    let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] == a && tokens.get(i + 1) == Some(&b) {
            out.push(to);
            i += 2;
        } else {
            out.push(tokens[i]);
            i += 1;
        }
    }
    out.join(" ")
}

/// Drop tokens equal to `flag`, or of the form `flag=...`.
pub fn remove_flag(cmd: &str, flag: &str) -> String {
    if !cmd.split_whitespace().any(|t| is_flag(t, flag)) {
        return cmd.to_string();
    }
    cmd.split_whitespace()
        .filter(|t| !is_flag(t, flag))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop `flag` together with the value token that follows it, plus any
/// `flag=value` form.
pub fn remove_flag_with_value(cmd: &str, flag: &str) -> String {
    if !cmd.split_whitespace().any(|t| is_flag(t, flag)) {
        return cmd.to_string();
    }
    let mut out: Vec<&str> = Vec::new();
    let mut tokens = cmd.split_whitespace();
    while let Some(t) = tokens.next() {
        if t == flag {
            tokens.next();
            continue;
        }
        if is_flag(t, flag) {
            continue;
        }
        out.push(t);
    }
    out.join(" ")
}

/// `flag` itself or `flag=value`.
fn is_flag(token: &str, flag: &str) -> bool {
    token == flag
        || token
            .strip_prefix(flag)
            .is_some_and(|rest| rest.starts_with('='))
}

/// Insert `args` right after the first occurrence of the `a b` sequence.
pub fn insert_after_pair(cmd: &str, a: &str, b: &str, args: &str) -> Option<String> {
    let tokens: Vec<&str> = cmd.split_whitespace().collect();
    let pos = tokens.windows(2).position(|w| w[0] == a && w[1] == b)?;
    let mut out: Vec<&str> = tokens[..pos + 2].to_vec();
    out.push(args);
    out.extend_from_slice(&tokens[pos + 2..]);
    Some(out.join(" "))
}

/// Append arguments meant for the program a script runner wraps.
///
/// `npm test` and `npm run x` need a `--` separator; an existing separator is
/// reused.
pub fn append_passthrough(cmd: &str, args: &str) -> String {
    let trimmed = cmd.trim_end();
    if has_token(trimmed, "--") {
        return format!("{trimmed} {args}");
    }
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let npm_script = tokens.first() == Some(&"npm")
        && matches!(tokens.get(1), Some(&"test") | Some(&"run") | Some(&"run-script") | Some(&"t"));
    if npm_script {
        format!("{trimmed} -- {args}")
    } else {
        format!("{trimmed} {args}")
    }
}

/// Append plain arguments to the command.
pub fn append_args(cmd: &str, args: &str) -> String {
    format!("{} {args}", cmd.trim_end())
}

/// Run `before` ahead of `cmd` in the same shell.
pub fn prepend_command(before: &str, cmd: &str) -> String {
    format!("{before} && {}", cmd.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_pair() {
        assert_eq!(replace_pair("npm ci --silent", "npm", "ci", "npm install"), "npm install --silent");
        assert_eq!(replace_pair("npm install", "npm", "ci", "npm install"), "npm install");
    }

    #[test]
    fn test_remove_flag_handles_values() {
        assert_eq!(remove_flag("yarn install --frozen-lockfile", "--frozen-lockfile"), "yarn install");
        assert_eq!(
            remove_flag("pnpm install --frozen-lockfile=true", "--frozen-lockfile"),
            "pnpm install"
        );
        assert_eq!(remove_flag("cargo build --locked-ish", "--locked"), "cargo build --locked-ish");
    }

    #[test]
    fn test_remove_flag_with_value() {
        assert_eq!(remove_flag_with_value("pytest -n auto -q", "-n"), "pytest -q");
        assert_eq!(remove_flag_with_value("pytest --numprocesses=4", "--numprocesses"), "pytest");
    }

    #[test]
    fn test_unmatched_command_keeps_its_spacing() {
        let cmd = "cargo test -- \"a  b\"";
        assert_eq!(remove_flag(&remove_flag(cmd, "--locked"), "--frozen"), cmd);
        assert_eq!(replace_token(cmd, "./gradlew", "gradle"), cmd);
        assert_eq!(replace_pair(cmd, "npm", "ci", "npm install"), cmd);
        assert_eq!(remove_flag_with_value(cmd, "-n"), cmd);
    }

    #[test]
    fn test_matched_command_is_rewritten() {
        assert_eq!(replace_token("./mvnw  -q verify", "./mvnw", "mvn"), "mvn -q verify");
        assert_eq!(remove_flag("cargo  build --locked", "--locked"), "cargo build");
    }

    #[test]
    fn test_append_passthrough() {
        assert_eq!(append_passthrough("npm test", "--runInBand"), "npm test -- --runInBand");
        assert_eq!(
            append_passthrough("npm run test -- --ci", "--runInBand"),
            "npm run test -- --ci --runInBand"
        );
        assert_eq!(append_passthrough("yarn test", "--runInBand"), "yarn test --runInBand");
    }

    #[test]
    fn test_insert_after_pair() {
        assert_eq!(
            insert_after_pair("go test ./...", "go", "test", "-p 1").as_deref(),
            Some("go test -p 1 ./...")
        );
        assert!(insert_after_pair("make test", "go", "test", "-p 1").is_none());
    }
}
