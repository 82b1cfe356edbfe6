//! Declarative sequence configs.
//!
//! Loads a YAML or JSON sequence document, resolves `@namespace.key`
//! tokens against pluggable resolvers, and produces an immutable
//! [`SequenceConfig`]. Structural faults (unreadable file, bad syntax, no
//! steps) are errors; unresolvable tokens become null with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::sequence::{SequenceConfig, SequenceMetadata, SequenceStepConfig};

#[derive(Error, Debug)]
pub enum SequenceConfigError {
    #[error("sequence config not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid sequence document {path}: {message}")]
    Parse { path: String, message: String },
    #[error("sequence {0} has no steps")]
    MissingSteps(String),
}

/// One resolved token, recorded in the config metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedToken {
    /// The literal token, e.g. `@playbook.primarySeed`.
    pub token: String,
    pub value: serde_json::Value,
}

/// Resolves key paths for one token namespace.
pub trait TokenResolver: Send + Sync {
    fn namespace(&self) -> &str;
    /// Resolve a dotted key path (with optional `[idx]` segments).
    fn resolve(&self, path: &str) -> Option<serde_json::Value>;
}

/// Host-specific defaults supplied by an external service.
pub trait PlaybookProvider: Send + Sync {
    fn defaults_for(&self, host: &str) -> serde_json::Value;
}

/// Provider used when no playbook service is wired up.
pub struct NullPlaybook;

impl PlaybookProvider for NullPlaybook {
    fn defaults_for(&self, _host: &str) -> serde_json::Value {
        serde_json::json!({})
    }
}

/// `@cli.*`: the caller's start URL, shared overrides, and any extra CLI
/// override JSON.
pub struct CliResolver {
    values: serde_json::Value,
}

impl CliResolver {
    pub fn new(
        start_url: Option<&str>,
        shared_overrides: &serde_json::Value,
        cli_overrides: &serde_json::Value,
    ) -> Self {
        let mut values = serde_json::Map::new();
        if let Some(url) = start_url {
            values.insert("startUrl".to_string(), serde_json::json!(url));
        }
        values.insert("sharedOverrides".to_string(), shared_overrides.clone());
        if let serde_json::Value::Object(extra) = cli_overrides {
            for (k, v) in extra {
                values.insert(k.clone(), v.clone());
            }
        }
        Self {
            values: serde_json::Value::Object(values),
        }
    }
}

impl TokenResolver for CliResolver {
    fn namespace(&self) -> &str {
        "cli"
    }

    fn resolve(&self, path: &str) -> Option<serde_json::Value> {
        lookup_path(&self.values, path)
    }
}

/// `@playbook.*`: host defaults from the playbook provider.
pub struct PlaybookResolver {
    defaults: serde_json::Value,
}

impl PlaybookResolver {
    pub fn new(provider: &dyn PlaybookProvider, host: Option<&str>) -> Self {
        Self {
            defaults: host
                .map(|h| provider.defaults_for(h))
                .unwrap_or_else(|| serde_json::json!({})),
        }
    }
}

impl TokenResolver for PlaybookResolver {
    fn namespace(&self) -> &str {
        "playbook"
    }

    fn resolve(&self, path: &str) -> Option<serde_json::Value> {
        lookup_path(&self.defaults, path)
    }
}

/// `@config.*`: the global config snapshot, including `featureFlags.*`.
pub struct ConfigResolver {
    snapshot: serde_json::Value,
}

impl ConfigResolver {
    pub fn new(snapshot: serde_json::Value) -> Self {
        Self { snapshot }
    }
}

impl TokenResolver for ConfigResolver {
    fn namespace(&self) -> &str {
        "config"
    }

    fn resolve(&self, path: &str) -> Option<serde_json::Value> {
        lookup_path(&self.snapshot, path)
    }
}

/// Traverse a dotted key path with optional `[idx]` array segments, e.g.
/// `seedPatterns[0]` or `featureFlags.topicDiscovery`.
fn lookup_path(root: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    let mut current = root;
    for segment in path.split('.') {
        let (key, indexes) = split_indexes(segment)?;
        if !key.is_empty() {
            current = current.get(key)?;
        }
        for idx in indexes {
            current = current.get(idx)?;
        }
    }
    Some(current.clone())
}

/// Split `key[0][2]` into ("key", [0, 2]).
fn split_indexes(segment: &str) -> Option<(&str, Vec<usize>)> {
    match segment.find('[') {
        None => Some((segment, Vec::new())),
        Some(start) => {
            let key = &segment[..start];
            let mut indexes = Vec::new();
            let mut rest = &segment[start..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let end = stripped.find(']')?;
                indexes.push(stripped[..end].parse().ok()?);
                rest = &stripped[end + 1..];
            }
            rest.is_empty().then_some((key, indexes))
        }
    }
}

/// Read just the `host` field of a sequence document, pre-resolution.
/// Used to pick the playbook scope before tokens are resolved.
pub fn peek_host(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
    let document: serde_json::Value = if is_json {
        serde_json::from_str(&raw).ok()?
    } else {
        serde_yaml::from_str(&raw).ok()?
    };
    document
        .get("host")
        .and_then(|h| h.as_str())
        .map(|h| h.to_string())
}

/// Locate a sequence config file by name: `<dir>/<host>/<name>.{yaml,yml,json}`
/// first when a host is given, then `<dir>/<name>.{yaml,yml,json}`.
pub fn resolve_config_path(dir: &Path, host: Option<&str>, name: &str) -> Option<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Some(host) = host {
        roots.push(dir.join(host));
    }
    roots.push(dir.to_path_buf());

    for root in roots {
        for ext in ["yaml", "yml", "json"] {
            let path = root.join(format!("{}.{}", name, ext));
            if path.is_file() {
                return Some(path);
            }
        }
    }
    None
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepFile {
    #[serde(default)]
    id: Option<String>,
    operation: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    start_url: Option<String>,
    #[serde(default)]
    overrides: serde_json::Value,
    #[serde(default)]
    continue_on_error: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SequenceFile {
    name: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    start_url: Option<String>,
    #[serde(default)]
    shared_overrides: serde_json::Value,
    #[serde(default)]
    continue_on_error: bool,
    #[serde(default)]
    steps: Vec<StepFile>,
}

/// Load a sequence config file and resolve its tokens.
pub fn load_sequence_config(
    path: &Path,
    resolvers: &[&dyn TokenResolver],
) -> Result<SequenceConfig, SequenceConfigError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| SequenceConfigError::Io {
        path: display.clone(),
        source,
    })?;

    let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
    let mut document: serde_json::Value = if is_json {
        serde_json::from_str(&raw).map_err(|e| SequenceConfigError::Parse {
            path: display.clone(),
            message: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(&raw).map_err(|e| SequenceConfigError::Parse {
            path: display.clone(),
            message: e.to_string(),
        })?
    };

    let mut resolved_tokens = Vec::new();
    let mut warnings = Vec::new();
    resolve_tokens(&mut document, resolvers, &mut resolved_tokens, &mut warnings);

    let file: SequenceFile =
        serde_json::from_value(document).map_err(|e| SequenceConfigError::Parse {
            path: display.clone(),
            message: e.to_string(),
        })?;

    let name = file.name.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sequence".to_string())
    });
    if file.steps.is_empty() {
        return Err(SequenceConfigError::MissingSteps(name));
    }

    let steps = file
        .steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| SequenceStepConfig {
            id: step
                .id
                .unwrap_or_else(|| format!("{}#{}", step.operation, index)),
            operation: step.operation,
            label: step.label,
            start_url: step.start_url,
            overrides: step.overrides,
            continue_on_error: step.continue_on_error,
        })
        .collect();

    Ok(SequenceConfig {
        name,
        host: file.host,
        start_url: file.start_url,
        shared_overrides: file.shared_overrides,
        continue_on_error: file.continue_on_error,
        steps,
        metadata: SequenceMetadata {
            source: display,
            resolved_tokens,
            warnings,
        },
    })
}

/// Walk the document and resolve `@namespace.path` tokens. A string that
/// is exactly one token takes the resolved value (any JSON type); tokens
/// inside larger strings are interpolated as text. Unresolved tokens
/// become null (full tokens) or an empty string (interpolations), with a
/// warning either way.
fn resolve_tokens(
    value: &mut serde_json::Value,
    resolvers: &[&dyn TokenResolver],
    resolved: &mut Vec<ResolvedToken>,
    warnings: &mut Vec<String>,
) {
    match value {
        serde_json::Value::String(s) => {
            if let Some((namespace, path)) = parse_full_token(s) {
                let token = s.clone();
                match resolve_one(resolvers, &namespace, &path) {
                    Some(v) => {
                        debug!("resolved token {} -> {}", token, v);
                        resolved.push(ResolvedToken {
                            token,
                            value: v.clone(),
                        });
                        *value = v;
                    }
                    None => {
                        warnings.push(format!("unresolved token {}", token));
                        *value = serde_json::Value::Null;
                    }
                }
            } else if s.contains('@') {
                let (replaced, mut token_records, mut token_warnings) =
                    interpolate(s, resolvers);
                resolved.append(&mut token_records);
                warnings.append(&mut token_warnings);
                *value = serde_json::Value::String(replaced);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                resolve_tokens(item, resolvers, resolved, warnings);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                resolve_tokens(item, resolvers, resolved, warnings);
            }
        }
        _ => {}
    }
}

/// Parse a string that is exactly one `@namespace.path` token.
fn parse_full_token(s: &str) -> Option<(String, String)> {
    let stripped = s.strip_prefix('@')?;
    let (namespace, path) = stripped.split_once('.')?;
    if namespace.is_empty()
        || path.is_empty()
        || !namespace.chars().all(|c| c.is_ascii_alphanumeric())
        || path.chars().any(|c| c.is_whitespace())
    {
        return None;
    }
    Some((namespace.to_string(), path.to_string()))
}

fn resolve_one(
    resolvers: &[&dyn TokenResolver],
    namespace: &str,
    path: &str,
) -> Option<serde_json::Value> {
    resolvers
        .iter()
        .find(|r| r.namespace() == namespace)
        .and_then(|r| r.resolve(path))
}

/// Replace embedded `@ns.path` tokens inside a larger string.
fn interpolate(
    s: &str,
    resolvers: &[&dyn TokenResolver],
) -> (String, Vec<ResolvedToken>, Vec<String>) {
    let pattern = regex::Regex::new(r"@([A-Za-z0-9]+)\.([A-Za-z0-9_.\[\]-]+)")
        .expect("static pattern");
    let mut resolved = Vec::new();
    let mut warnings = Vec::new();

    let replaced = pattern
        .replace_all(s, |caps: &regex::Captures| {
            let token = caps[0].to_string();
            match resolve_one(resolvers, &caps[1], &caps[2]) {
                Some(v) => {
                    let text = match &v {
                        serde_json::Value::String(inner) => inner.clone(),
                        other => other.to_string(),
                    };
                    resolved.push(ResolvedToken { token, value: v });
                    text
                }
                None => {
                    warnings.push(format!("unresolved token {}", token));
                    String::new()
                }
            }
        })
        .into_owned();

    (replaced, resolved, warnings)
}

/// Build the standard resolver set for one load.
pub fn standard_resolvers(
    start_url: Option<&str>,
    shared_overrides: &serde_json::Value,
    cli_overrides: &serde_json::Value,
    playbook: &dyn PlaybookProvider,
    host: Option<&str>,
    config_snapshot: serde_json::Value,
) -> (CliResolver, PlaybookResolver, ConfigResolver) {
    (
        CliResolver::new(start_url, shared_overrides, cli_overrides),
        PlaybookResolver::new(playbook, host),
        ConfigResolver::new(config_snapshot),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct TestPlaybook;

    impl PlaybookProvider for TestPlaybook {
        fn defaults_for(&self, host: &str) -> serde_json::Value {
            serde_json::json!({
                "primarySeed": format!("https://{}.example/", host),
                "seedPatterns": ["/world/{slug}", "/news/{slug}"],
                "countryCode": "gb",
            })
        }
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_with_tokens() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "evening-sequence.yaml",
            r#"
name: evening-sequence
host: uk
startUrl: "@playbook.primarySeed"
sharedOverrides:
  plannerVerbosity: 2
  pattern: "@playbook.seedPatterns[0]"
continueOnError: false
steps:
  - id: ensureHubs
    operation: ensureCountryHubs
    overrides: { apply: true }
  - operation: exploreCountryHubs
    continueOnError: true
"#,
        );

        let playbook = TestPlaybook;
        let (cli, pb, cfg) = standard_resolvers(
            Some("https://cli.test/"),
            &serde_json::json!({}),
            &serde_json::json!({}),
            &playbook,
            Some("uk"),
            serde_json::json!({"featureFlags": {"topics": true}}),
        );
        let resolvers: Vec<&dyn TokenResolver> = vec![&cli, &pb, &cfg];
        let config = load_sequence_config(&path, &resolvers).unwrap();

        assert_eq!(config.name, "evening-sequence");
        assert_eq!(config.start_url.as_deref(), Some("https://uk.example/"));
        assert_eq!(
            config.shared_overrides["pattern"],
            serde_json::json!("/world/{slug}")
        );
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.steps[0].id, "ensureHubs");
        // Default id is {operation}#{index}
        assert_eq!(config.steps[1].id, "exploreCountryHubs#1");
        assert!(config.steps[1].continue_on_error);
        assert_eq!(config.metadata.resolved_tokens.len(), 2);
        assert!(config.metadata.warnings.is_empty());
    }

    #[test]
    fn test_unresolved_token_warns_not_errors() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "seq.yaml",
            r#"
name: seq
startUrl: "@playbook.missingKey"
steps:
  - operation: ensureCountryHubs
"#,
        );

        let config = load_sequence_config(&path, &[]).unwrap();
        assert_eq!(config.start_url, None);
        assert_eq!(config.metadata.warnings.len(), 1);
        assert!(config.metadata.warnings[0].contains("@playbook.missingKey"));
    }

    #[test]
    fn test_string_interpolation() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "seq.yaml",
            r#"
name: seq
sharedOverrides:
  note: "seed for @config.featureFlags.region is live"
steps:
  - operation: ensureCountryHubs
"#,
        );

        let cfg = ConfigResolver::new(serde_json::json!({
            "featureFlags": {"region": "emea"}
        }));
        let resolvers: Vec<&dyn TokenResolver> = vec![&cfg];
        let config = load_sequence_config(&path, &resolvers).unwrap();
        assert_eq!(
            config.shared_overrides["note"],
            serde_json::json!("seed for emea is live")
        );
    }

    #[test]
    fn test_missing_steps_is_structural_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "empty.yaml", "name: empty\nsteps: []\n");
        assert!(matches!(
            load_sequence_config(&path, &[]),
            Err(SequenceConfigError::MissingSteps(_))
        ));
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "bad.yaml", "name: [unclosed\n");
        assert!(matches!(
            load_sequence_config(&path, &[]),
            Err(SequenceConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_json_documents_load() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "seq.json",
            r#"{"name": "seq", "steps": [{"operation": "ensureCountryHubs"}]}"#,
        );
        let config = load_sequence_config(&path, &[]).unwrap();
        assert_eq!(config.steps[0].id, "ensureCountryHubs#0");
    }

    #[test]
    fn test_resolve_config_path_host_first() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uk")).unwrap();
        write(dir.path(), "seq.yaml", "name: root\nsteps: []\n");
        write(&dir.path().join("uk"), "seq.yaml", "name: uk\nsteps: []\n");

        let found = resolve_config_path(dir.path(), Some("uk"), "seq").unwrap();
        assert!(found.ends_with("uk/seq.yaml"));

        let fallback = resolve_config_path(dir.path(), Some("fr"), "seq").unwrap();
        assert!(fallback.ends_with("seq.yaml"));
        assert!(!fallback.to_string_lossy().contains("/fr/"));

        assert!(resolve_config_path(dir.path(), None, "nothere").is_none());
    }

    #[test]
    fn test_lookup_path_array_indexing() {
        let value = serde_json::json!({"a": {"b": [10, 20, 30]}});
        assert_eq!(lookup_path(&value, "a.b[1]"), Some(serde_json::json!(20)));
        assert_eq!(lookup_path(&value, "a.b[9]"), None);
        assert_eq!(lookup_path(&value, "a.missing"), None);
    }
}
