//! Variable interpolation for application definitions.
//!
//! Supports variables like:
//! - `${app.name}` - Application name
//! - `${app.account}` - Target account
//! - `${app.region}` - Target region
//! - `${git.sha}` - Full git commit SHA
//! - `${git.short_sha}` - Short (7 char) git commit SHA
//! - `${git.branch}` - Current branch name
//! - `${env.VAR_NAME}` - Environment variable
//! - `${timestamp}` - Unix timestamp
//! - `${date}` - ISO date (YYYY-MM-DD)
//! - `${datetime}` - ISO datetime
//! - `${name}` - Custom variable from the `variables` block
//!
//! `${secrets.NAME}` is left untouched: secret values are resolved by the
//! provisioning engine, never written into a synthesis.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Application-related variables
    pub app: AppContext,
    /// Git-related variables
    pub git: GitContext,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Custom variables defined by user
    pub custom: HashMap<String, String>,
}

/// Application context for variable interpolation.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    pub name: String,
    pub account: Option<String>,
    pub region: Option<String>,
}

/// Git context for variable interpolation.
#[derive(Debug, Clone, Default)]
pub struct GitContext {
    pub sha: String,
    pub short_sha: String,
    pub branch: String,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate git context from environment variables (CI environment).
    pub fn populate_git_from_env(&mut self) {
        self.git.sha = std::env::var("RIGGING_COMMIT_SHA")
            .or_else(|_| std::env::var("GIT_COMMIT"))
            .or_else(|_| std::env::var("GITHUB_SHA"))
            .or_else(|_| std::env::var("CI_COMMIT_SHA"))
            .unwrap_or_default();

        if !self.git.sha.is_empty() {
            self.git.short_sha = self.git.sha.chars().take(7).collect();
        }

        self.git.branch = std::env::var("RIGGING_BRANCH")
            .or_else(|_| std::env::var("GIT_BRANCH"))
            .or_else(|_| std::env::var("GITHUB_REF_NAME"))
            .or_else(|_| std::env::var("CI_COMMIT_BRANCH"))
            .unwrap_or_default();
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Add a custom variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.custom.insert(name.to_string(), value.into());
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["app", "name"] => Some(self.app.name.clone()),
            ["app", "account"] => self.app.account.clone(),
            ["app", "region"] => self.app.region.clone(),

            ["git", "sha"] => non_empty(&self.git.sha),
            ["git", "short_sha"] => non_empty(&self.git.short_sha),
            ["git", "branch"] => non_empty(&self.git.branch),

            ["env", name] => self.env.get(*name).cloned(),
            ["secrets", _] => None,

            ["timestamp"] => Some(chrono::Utc::now().timestamp().to_string()),
            ["date"] => Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),
            ["datetime"] => Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),

            // Single-part names check custom variables
            [name] => self.custom.get(*name).cloned(),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Variables are specified as `${var_name}` or `${namespace.var_name}`.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate every string inside a JSON value.
    pub fn interpolate_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.interpolate(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.interpolate_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Variables in `input` that cannot be resolved, excluding secrets.
    pub fn find_unresolved(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .filter(|name| !name.starts_with("secrets.") && self.resolve(name).is_none())
            .collect()
    }

    /// Get a list of all secret variable names used in a string.
    pub fn find_secrets_in_string(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .filter_map(|caps| {
                let var_name = &caps[1];
                if var_name.starts_with("secrets.") {
                    Some(var_name.to_string())
                } else {
                    None
                }
            })
            .collect()
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_app(
        mut self,
        name: impl Into<String>,
        account: Option<&str>,
        region: Option<&str>,
    ) -> Self {
        self.ctx.app.name = name.into();
        self.ctx.app.account = account.map(str::to_string);
        self.ctx.app.region = region.map(str::to_string);
        self
    }

    pub fn with_git_sha(mut self, sha: impl Into<String>) -> Self {
        let sha = sha.into();
        self.ctx.git.short_sha = sha.chars().take(7).collect();
        self.ctx.git.sha = sha;
        self
    }

    pub fn with_git_branch(mut self, branch: impl Into<String>) -> Self {
        self.ctx.git.branch = branch.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.custom.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_app_interpolation() {
        let ctx = VariableContextBuilder::new()
            .with_app("HelloWorld", Some("123456789012"), Some("eu-west-1"))
            .with_custom("repo", "hello")
            .build();

        let result = ctx.interpolate("${app.account}.dkr.ecr.${app.region}.amazonaws.com/${repo}");
        assert_eq!(result, "123456789012.dkr.ecr.eu-west-1.amazonaws.com/hello");
    }

    #[test]
    fn test_short_sha() {
        let ctx = VariableContextBuilder::new()
            .with_git_sha("abc1234567890def")
            .build();

        let result = ctx.interpolate("tag-${git.short_sha}");
        assert_eq!(result, "tag-abc1234");
    }

    #[test]
    fn test_env_variables() {
        let ctx = VariableContextBuilder::new()
            .with_env("MY_VAR", "hello")
            .with_env("ANOTHER", "world")
            .build();

        let result = ctx.interpolate("${env.MY_VAR} ${env.ANOTHER}!");
        assert_eq!(result, "hello world!");
    }

    #[test]
    fn test_secrets_pass_through() {
        let ctx = VariableContextBuilder::new()
            .with_custom("token", "not-a-secret")
            .build();

        let result = ctx.interpolate("auth ${secrets.github-token} ${secrets.GITHUB_TOKEN}");
        assert_eq!(result, "auth ${secrets.github-token} ${secrets.GITHUB_TOKEN}");
        assert!(ctx.find_unresolved(&result).is_empty());
        assert_eq!(
            ctx.find_secrets_in_string(&result),
            vec!["secrets.GITHUB_TOKEN".to_string()]
        );
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        let result = ctx.interpolate("Unknown: ${unknown.var} ${git.sha}");
        assert_eq!(result, "Unknown: ${unknown.var} ${git.sha}");
        assert_eq!(
            ctx.find_unresolved(&result),
            vec!["unknown.var".to_string(), "git.sha".to_string()]
        );
    }

    #[test]
    fn test_interpolate_value_recurses() {
        let ctx = VariableContextBuilder::new()
            .with_custom("name", "hello")
            .build();

        let value = json!({
            "repository": "${name}",
            "tags": ["${name}:latest", 3],
            "nested": { "enabled": true, "label": "x-${name}" }
        });
        assert_eq!(
            ctx.interpolate_value(&value),
            json!({
                "repository": "hello",
                "tags": ["hello:latest", 3],
                "nested": { "enabled": true, "label": "x-hello" }
            })
        );
    }

    #[test]
    fn test_custom_variables() {
        let mut ctx = VariableContext::new();
        ctx.set("version", "1.2.3");
        ctx.set("app_name", "myapp");

        let result = ctx.interpolate("${app_name} v${version}");
        assert_eq!(result, "myapp v1.2.3");
    }

    #[test]
    fn test_date_variable() {
        let ctx = VariableContext::new();
        let result = ctx.interpolate("${date}");
        assert_eq!(result.len(), 10);
        assert!(result.contains('-'));
    }

    #[test]
    fn test_nested_braces() {
        let ctx = VariableContextBuilder::new().with_git_sha("abc123").build();

        let result = ctx.interpolate(r#"{"sha": "${git.sha}"}"#);
        assert_eq!(result, r#"{"sha": "abc123"}"#);
    }
}
