//! Translation of a volume's flat option map into per-backend invocation plans
//!
//! The option map is only untyped at the plugin boundary. Everything the
//! backends consume goes through [`CommunityPlan::from_options`] or
//! [`ManagedPlan::from_options`], both pure functions of the map.

use std::collections::{BTreeMap, HashMap};

use crate::env::{parse_env_option, MountEnv};
use crate::redact::SecretRedactor;

/// Reserved option holding extra `KEY=VALUE` environment assignments
pub const ENV_OPTION: &str = "env";

/// Managed-mode bearer token option
pub const TOKEN_OPTION: &str = "token";

/// Options consumed by `juicefs format` in community mode
pub const COMMUNITY_FORMAT_OPTIONS: &[&str] = &[
    "block-size",
    "compress",
    "shards",
    "storage",
    "bucket",
    "access-key",
    "secret-key",
    "encrypt-rsa-key",
    "trash-days",
];

/// Boolean `juicefs mount` flags in community mode
pub const COMMUNITY_MOUNT_FLAGS: &[&str] = &[
    "cache-partial-only",
    "enable-xattr",
    "no-syslog",
    "no-usage-report",
    "writeback",
];

/// Boolean `juicefs mount` flags in managed mode
pub const MANAGED_MOUNT_FLAGS: &[&str] = &[
    "external",
    "internal",
    "gc",
    "dry",
    "flip",
    "no-sync",
    "allow-other",
    "allow-root",
    "enable-xattr",
];

/// Storage credential spellings, in the order their env vars are assigned
const CREDENTIAL_ENV: &[(&str, &str)] = &[
    ("access-key", "ACCESS_KEY"),
    ("accesskey", "ACCESS_KEY"),
    ("access-key2", "ACCESS_KEY2"),
    ("accesskey2", "ACCESS_KEY2"),
    ("secret-key", "SECRET_KEY"),
    ("secretkey", "SECRET_KEY"),
    ("secret-key2", "SECRET_KEY2"),
    ("secretkey2", "SECRET_KEY2"),
];

/// Keys never rendered as managed-mode mount arguments
const MANAGED_STRIPPED: &[&str] = &[
    "access-key",
    "accesskey",
    "access-key2",
    "accesskey2",
    "secret-key",
    "secretkey",
    "secret-key2",
    "secretkey2",
    "bucket",
    "bucket2",
    "storage",
];

/// Option values that must be masked in logs
const SECRET_OPTIONS: &[&str] = &[
    "token",
    "access-key",
    "accesskey",
    "access-key2",
    "accesskey2",
    "secret-key",
    "secretkey",
    "secret-key2",
    "secretkey2",
];

/// Which CLI flow drives a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Self-hosted: `source` is a metadata-service URL
    Community,
    /// Managed: `source` is an opaque volume name, authenticated by token
    Managed,
}

impl BackendMode {
    /// A `://` scheme in the source selects community mode
    pub fn for_source(source: &str) -> Self {
        if source.contains("://") {
            BackendMode::Community
        } else {
            BackendMode::Managed
        }
    }
}

/// Map compact alias spellings to the hyphenated managed-mode names
pub fn canonicalize(key: &str) -> &str {
    match key {
        "accesskey" => "access-key",
        "accesskey2" => "access-key2",
        "secretkey" => "secret-key",
        "secretkey2" => "secret-key2",
        other => other,
    }
}

/// Collect every secret value present in the options
pub fn collect_secrets(options: &HashMap<String, String>) -> SecretRedactor {
    SecretRedactor::new(
        SECRET_OPTIONS
            .iter()
            .filter_map(|k| options.get(*k).cloned()),
    )
}

fn env_from_options(options: &HashMap<String, String>) -> MountEnv {
    let mut env = MountEnv::new();
    if let Some(value) = options.get(ENV_OPTION) {
        env.extend(parse_env_option(value));
    }
    env
}

/// Arguments and environment for the community flow
#[derive(Debug, Clone)]
pub struct CommunityPlan {
    /// `--flag=value` arguments for `juicefs format`
    pub format_args: Vec<String>,
    /// Bare flags followed by `--key=value` arguments for `juicefs mount`
    pub mount_args: Vec<String>,
    /// Extra environment from the `env` option
    pub env: MountEnv,
    pub secrets: SecretRedactor,
}

impl CommunityPlan {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        let env = env_from_options(options);
        let secrets = collect_secrets(options);

        let mut remaining: BTreeMap<&str, &str> = options
            .iter()
            .filter(|(k, _)| k.as_str() != ENV_OPTION)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut format_args = Vec::new();
        for name in COMMUNITY_FORMAT_OPTIONS {
            if let Some(val) = remaining.remove(name) {
                format_args.push(format!("--{}={}", name, val));
            }
        }

        let mut mount_args = Vec::new();
        for name in COMMUNITY_MOUNT_FLAGS {
            if remaining.remove(name).is_some() {
                mount_args.push(format!("--{}", name));
            }
        }
        for (key, val) in remaining {
            mount_args.push(format!("--{}={}", key, val));
        }

        Self {
            format_args,
            mount_args,
            env,
            secrets,
        }
    }
}

/// Arguments and environment for the managed flow
#[derive(Debug, Clone)]
pub struct ManagedPlan {
    /// Token used by `juicefs auth` and re-appended to mount arguments
    pub token: Option<String>,
    /// Bare flags, `--key=value` arguments, then `--token=...` if present
    pub mount_args: Vec<String>,
    /// `env` option assignments plus storage credentials
    pub env: MountEnv,
    pub secrets: SecretRedactor,
}

impl ManagedPlan {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        let mut env = env_from_options(options);
        let secrets = collect_secrets(options);

        for (key, var) in CREDENTIAL_ENV {
            if let Some(val) = options.get(*key).filter(|v| !v.is_empty()) {
                env.set(*var, val.clone());
            }
        }

        let mut remaining: BTreeMap<&str, &str> = options
            .iter()
            .filter(|(k, _)| k.as_str() != ENV_OPTION)
            .map(|(k, v)| (canonicalize(k), v.as_str()))
            .collect();

        let token = remaining
            .remove(TOKEN_OPTION)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        for key in MANAGED_STRIPPED {
            remaining.remove(key);
        }

        let mut mount_args = Vec::new();
        for name in MANAGED_MOUNT_FLAGS {
            if remaining.remove(name).is_some() {
                mount_args.push(format!("--{}", name));
            }
        }
        for (key, val) in remaining {
            mount_args.push(format!("--{}={}", key, val));
        }
        if let Some(token) = &token {
            mount_args.push(format!("--token={}", token));
        }

        Self {
            token,
            mount_args,
            env,
            secrets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_backend_mode_from_scheme() {
        assert_eq!(
            BackendMode::for_source("redis://host/db"),
            BackendMode::Community
        );
        assert_eq!(BackendMode::for_source("myvol"), BackendMode::Managed);
    }

    #[test]
    fn test_community_partition() {
        let plan = CommunityPlan::from_options(&opts(&[
            ("block-size", "4M"),
            ("enable-xattr", ""),
            ("foo", "bar"),
        ]));

        assert_eq!(plan.format_args, vec!["--block-size=4M"]);
        assert_eq!(plan.mount_args, vec!["--enable-xattr", "--foo=bar"]);
        assert!(!plan.format_args.iter().any(|a| a.contains("xattr")));
        assert!(!plan.mount_args.iter().any(|a| a.contains("block-size")));
    }

    #[test]
    fn test_community_env_option_not_forwarded() {
        let plan = CommunityPlan::from_options(&opts(&[
            ("env", "META_PASSWORD=pw,FOO=1"),
            ("cache-size", "1024"),
        ]));

        assert_eq!(plan.mount_args, vec!["--cache-size=1024"]);
        assert!(plan.format_args.is_empty());
        assert_eq!(plan.env.get("META_PASSWORD"), Some("pw"));
        assert_eq!(plan.env.get("FOO"), Some("1"));
    }

    #[test]
    fn test_community_format_order_is_fixed() {
        let plan = CommunityPlan::from_options(&opts(&[
            ("trash-days", "0"),
            ("storage", "s3"),
            ("bucket", "https://b.s3"),
            ("access-key", "AK"),
        ]));

        assert_eq!(
            plan.format_args,
            vec![
                "--storage=s3",
                "--bucket=https://b.s3",
                "--access-key=AK",
                "--trash-days=0"
            ]
        );
        assert!(plan.mount_args.is_empty());
        assert_eq!(plan.secrets.redact("AK"), "****");
    }

    #[test]
    fn test_community_does_not_canonicalize() {
        let plan = CommunityPlan::from_options(&opts(&[("accesskey", "AK")]));
        assert!(plan.format_args.is_empty());
        assert_eq!(plan.mount_args, vec!["--accesskey=AK"]);
    }

    #[test]
    fn test_managed_credentials_go_to_env() {
        let plan = ManagedPlan::from_options(&opts(&[
            ("accesskey", "AK1"),
            ("secret-key", "SK1"),
            ("bucket", "b"),
            ("storage", "s3"),
            ("cache-size", "100"),
        ]));

        assert!(!plan.mount_args.iter().any(|a| a.contains("AK1")));
        assert!(!plan.mount_args.iter().any(|a| a.contains("SK1")));
        assert!(!plan.mount_args.iter().any(|a| a.contains("bucket")));
        assert!(!plan.mount_args.iter().any(|a| a.contains("storage")));
        assert_eq!(plan.mount_args, vec!["--cache-size=100"]);
        assert_eq!(plan.env.get("ACCESS_KEY"), Some("AK1"));
        assert_eq!(plan.env.get("SECRET_KEY"), Some("SK1"));
    }

    #[test]
    fn test_managed_second_key_slot() {
        let plan = ManagedPlan::from_options(&opts(&[
            ("accesskey2", "AK2"),
            ("secretkey2", "SK2"),
            ("bucket2", "b2"),
        ]));

        assert!(plan.mount_args.is_empty());
        assert_eq!(plan.env.get("ACCESS_KEY2"), Some("AK2"));
        assert_eq!(plan.env.get("SECRET_KEY2"), Some("SK2"));
    }

    #[test]
    fn test_managed_token_appended_last() {
        let plan = ManagedPlan::from_options(&opts(&[
            ("token", "T0K"),
            ("allow-other", ""),
            ("cache-dir", "/var/jfsCache"),
        ]));

        assert_eq!(plan.token.as_deref(), Some("T0K"));
        assert_eq!(
            plan.mount_args,
            vec!["--allow-other", "--cache-dir=/var/jfsCache", "--token=T0K"]
        );
        assert_eq!(plan.secrets.redact("auth T0K"), "auth ****");
    }

    #[test]
    fn test_managed_empty_token_dropped() {
        let plan = ManagedPlan::from_options(&opts(&[("token", "")]));
        assert!(plan.token.is_none());
        assert!(plan.mount_args.is_empty());
    }

    #[test]
    fn test_managed_env_option_merged_with_credentials() {
        let plan = ManagedPlan::from_options(&opts(&[
            ("env", "HTTP_PROXY=http://proxy:3128"),
            ("access-key", "AK"),
        ]));

        assert!(plan.mount_args.is_empty());
        assert_eq!(plan.env.get("HTTP_PROXY"), Some("http://proxy:3128"));
        assert_eq!(plan.env.get("ACCESS_KEY"), Some("AK"));
    }

    #[test]
    fn test_partition_is_deterministic() {
        let options = opts(&[("b", "2"), ("a", "1"), ("c", "3"), ("gc", "")]);
        let first = ManagedPlan::from_options(&options).mount_args;
        for _ in 0..10 {
            assert_eq!(ManagedPlan::from_options(&options).mount_args, first);
        }
        assert_eq!(first, vec!["--gc", "--a=1", "--b=2", "--c=3"]);
    }
}
