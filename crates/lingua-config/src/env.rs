use std::sync::OnceLock;

use regex::{Captures, Regex};

/// `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Resolve a single placeholder
fn resolve(captures: &Captures<'_>) -> anyhow::Result<String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let Some(name) = key.strip_prefix("env.").filter(|n| !n.is_empty() && !n.contains('.')) else {
        anyhow::bail!("only variables scoped with 'env.' are supported: `{key}`");
    };

    match (std::env::var(name), captures.get(2)) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.as_str().to_owned()),
        (Err(_), None) => anyhow::bail!("environment variable not found: `{name}`"),
    }
}

/// Substitute environment placeholders in raw TOML text
///
/// Comment lines are left untouched so commented-out settings never need
/// their variables set.
pub fn expand_env(input: &str) -> anyhow::Result<String> {
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut last = 0;
        for captures in placeholder().captures_iter(line) {
            let Some(whole) = captures.get(0) else { continue };
            output.push_str(&line[last..whole.start()]);
            output.push_str(&resolve(&captures)?);
            last = whole.end();
        }
        output.push_str(&line[last..]);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_unchanged() {
        let input = "[upstream]\nprovider = \"anthropic\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn variables_are_substituted() {
        temp_env::with_vars([("LINGUA_KEY", Some("sk-1")), ("LINGUA_HOST", Some("example.com"))], || {
            let result = expand_env("api_key = \"{{ env.LINGUA_KEY }}\"\nbase_url = \"https://{{env.LINGUA_HOST}}/v1\"")
                .unwrap();
            assert_eq!(result, "api_key = \"sk-1\"\nbase_url = \"https://example.com/v1\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("LINGUA_MISSING", || {
            let err = expand_env("api_key = \"{{ env.LINGUA_MISSING }}\"").unwrap_err();
            assert!(err.to_string().contains("LINGUA_MISSING"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("LINGUA_TIMEOUT", || {
            let result = expand_env("timeout = \"{{ env.LINGUA_TIMEOUT | default(\"30s\") }}\"").unwrap();
            assert_eq!(result, "timeout = \"30s\"");
        });
        temp_env::with_var("LINGUA_TIMEOUT", Some("5s"), || {
            let result = expand_env("timeout = \"{{ env.LINGUA_TIMEOUT | default(\"30s\") }}\"").unwrap();
            assert_eq!(result, "timeout = \"5s\"");
        });
    }

    #[test]
    fn other_scopes_are_rejected() {
        let err = expand_env("key = \"{{ secrets.KEY }}\"").unwrap_err();
        assert!(err.to_string().contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_vars([("LINGUA_SET", Some("x")), ("LINGUA_UNSET", None::<&str>)], || {
            let input = "  # api_key = \"{{ env.LINGUA_UNSET }}\"\nkey = \"{{ env.LINGUA_SET }}\"\n";
            let result = expand_env(input).unwrap();
            assert_eq!(result, "  # api_key = \"{{ env.LINGUA_UNSET }}\"\nkey = \"x\"\n");
        });
    }
}
