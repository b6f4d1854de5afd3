//! Configuration: command-line options, an optional TOML file, and the
//! validated [`Settings`] every command runs with.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CODENAME: &str = "stable";
pub const DEFAULT_COMPONENT: &str = "main";
pub const DEFAULT_GPG_COMMAND: &str = "gpg";
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 60;
pub const DEFAULT_LOCK_WAIT_SECS: u64 = 10;

/// Who may read the objects written to the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Authenticated,
}

impl Visibility {
    /// The canned ACL objects are written with.
    pub fn canned_acl(&self) -> &'static str {
        match self {
            Visibility::Public => "public-read",
            Visibility::Private => "private",
            Visibility::Authenticated => "authenticated-read",
        }
    }
}

/// A static access key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Where the repository lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        /// `None` uses the ambient AWS credential chain.
        credentials: Option<Credentials>,
        force_path_style: bool,
    },
    /// A directory tree laid out like the bucket.
    Local { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningConfig {
    /// `None` signs with gpg's default key.
    pub key: Option<String>,
    pub command: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub wait: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: DEFAULT_LOCK_ATTEMPTS,
            wait: Duration::from_secs(DEFAULT_LOCK_WAIT_SECS),
        }
    }
}

/// Fully resolved settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub storage: StorageConfig,
    pub prefix: Option<String>,
    pub visibility: Visibility,
    pub encryption: bool,
    pub cache_control: Option<String>,
    pub codename: String,
    pub component: String,
    pub origin: Option<String>,
    pub suite: Option<String>,
    pub signing: Option<SigningConfig>,
    pub lock: LockConfig,
}

/// Repository options accepted on the command line.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// TOML file providing defaults for any of these options.
    #[arg(long, env = "DEB_S3_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// The name of the S3 bucket to upload to.
    #[arg(long, short, env = "DEB_S3_BUCKET", global = true)]
    pub bucket: Option<String>,

    /// The path prefix to use when storing on S3.
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// The origin to use in the repository Release file.
    #[arg(long, short, global = true)]
    pub origin: Option<String>,

    /// The suite to use in the repository Release file.
    #[arg(long, global = true)]
    pub suite: Option<String>,

    /// The codename of the APT repository [default: stable].
    #[arg(long, short, global = true)]
    pub codename: Option<String>,

    /// The component of the APT repository [default: main].
    #[arg(long, short = 'm', alias = "section", global = true)]
    pub component: Option<String>,

    /// The access key for connecting to S3.
    #[arg(long, env = "AWS_ACCESS_KEY_ID", global = true, hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// The secret key for connecting to S3.
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", global = true, hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// The region for connecting to S3.
    #[arg(long, env = "AWS_REGION", global = true)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing.
    #[arg(long, global = true)]
    pub force_path_style: bool,

    /// Keep the repository in a local directory instead of a bucket.
    #[arg(long, global = true, conflicts_with = "bucket")]
    pub local_root: Option<PathBuf>,

    /// The access policy for uploaded files [default: public].
    #[arg(long, value_enum, global = true)]
    pub visibility: Option<Visibility>,

    /// GPG sign the Release file, with KEY if given.
    #[arg(long, value_name = "KEY", num_args = 0..=1, default_missing_value = "", global = true)]
    pub sign: Option<String>,

    /// The gpg executable used for signing [default: gpg].
    #[arg(long, global = true)]
    pub gpg_command: Option<String>,

    /// Additional command line options to pass to GPG when signing.
    #[arg(long, allow_hyphen_values = true, global = true)]
    pub gpg_options: Option<String>,

    /// Use server-side encryption.
    #[arg(long, short, global = true)]
    pub encryption: bool,

    /// Cache-Control header for index files.
    #[arg(long, global = true)]
    pub cache_control: Option<String>,

    /// Take a repository lock for the duration of mutating commands.
    #[arg(long, short, global = true)]
    pub lock: bool,
}

/// The TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub origin: Option<String>,
    pub suite: Option<String>,
    pub codename: Option<String>,
    pub component: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: Option<bool>,
    pub local_root: Option<PathBuf>,
    pub visibility: Option<Visibility>,
    pub sign: Option<String>,
    pub gpg_command: Option<String>,
    pub gpg_options: Option<String>,
    pub encryption: Option<bool>,
    pub cache_control: Option<String>,
    pub lock: Option<bool>,
    pub lock_attempts: Option<u32>,
    pub lock_wait_secs: Option<u64>,
}

impl ConfigFile {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))
    }
}

impl Settings {
    /// Defaults for everything but the backend.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            prefix: None,
            visibility: Visibility::default(),
            encryption: false,
            cache_control: None,
            codename: DEFAULT_CODENAME.to_string(),
            component: DEFAULT_COMPONENT.to_string(),
            origin: None,
            suite: None,
            signing: None,
            lock: LockConfig::default(),
        }
    }

    /// Combine command-line options with the configuration file, the
    /// command line taking precedence, and validate the result.
    pub fn resolve(args: &GlobalArgs, file: Option<ConfigFile>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let storage = match args.local_root.clone().or(file.local_root) {
            Some(root) if args.bucket.is_none() => StorageConfig::Local { root },
            _ => {
                let bucket = args
                    .bucket
                    .clone()
                    .or(file.bucket)
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| Error::Config("No value provided for required option --bucket".to_string()))?;
                let credentials = match (
                    args.access_key_id.clone().or(file.access_key_id),
                    args.secret_access_key.clone().or(file.secret_access_key),
                ) {
                    (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                        access_key_id,
                        secret_access_key,
                    }),
                    (None, None) => None,
                    _ => {
                        return Err(Error::Config(
                            "--access-key-id and --secret-access-key must be given together"
                                .to_string(),
                        ))
                    }
                };
                StorageConfig::S3 {
                    bucket,
                    region: args.region.clone().or(file.region),
                    endpoint: args.endpoint.clone().or(file.endpoint),
                    credentials,
                    force_path_style: args.force_path_style
                        || file.force_path_style.unwrap_or(false),
                }
            }
        };

        let codename = args
            .codename
            .clone()
            .or(file.codename)
            .unwrap_or_else(|| DEFAULT_CODENAME.to_string());
        validate_name("codename", &codename)?;
        let component = args
            .component
            .clone()
            .or(file.component)
            .unwrap_or_else(|| DEFAULT_COMPONENT.to_string());
        validate_name("component", &component)?;

        let signing = match args.sign.clone().or(file.sign) {
            Some(key) => {
                let options = match args.gpg_options.clone().or(file.gpg_options) {
                    Some(options) => shlex::split(&options).ok_or_else(|| {
                        Error::Config(format!("Unable to parse --gpg-options: {}", options))
                    })?,
                    None => Vec::new(),
                };
                Some(SigningConfig {
                    key: Some(key).filter(|k| !k.is_empty()),
                    command: args
                        .gpg_command
                        .clone()
                        .or(file.gpg_command)
                        .unwrap_or_else(|| DEFAULT_GPG_COMMAND.to_string()),
                    options,
                })
            }
            None => None,
        };

        let lock = LockConfig {
            enabled: args.lock || file.lock.unwrap_or(false),
            max_attempts: file.lock_attempts.unwrap_or(DEFAULT_LOCK_ATTEMPTS),
            wait: Duration::from_secs(file.lock_wait_secs.unwrap_or(DEFAULT_LOCK_WAIT_SECS)),
        };

        Ok(Settings {
            storage,
            prefix: args
                .prefix
                .clone()
                .or(file.prefix)
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            visibility: args.visibility.or(file.visibility).unwrap_or_default(),
            encryption: args.encryption || file.encryption.unwrap_or(false),
            cache_control: args.cache_control.clone().or(file.cache_control),
            codename,
            component,
            origin: args.origin.clone().or(file.origin),
            suite: args.suite.clone().or(file.suite),
            signing,
            lock,
        })
    }
}

/// Codenames, components and architectures become path segments.
pub fn validate_name(what: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value.contains('/')
        || value.chars().any(char::is_whitespace)
        || value == "."
        || value == ".."
    {
        return Err(Error::Config(format!("Invalid {}: {:?}", what, value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: GlobalArgs,
    }

    fn args(argv: &[&str]) -> GlobalArgs {
        Cli::parse_from(std::iter::once("deb-s3").chain(argv.iter().copied())).args
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&args(&["--bucket", "repo"]), None).unwrap();
        assert_eq!(settings.codename, "stable");
        assert_eq!(settings.component, "main");
        assert_eq!(settings.visibility, Visibility::Public);
        assert_eq!(settings.signing, None);
        assert_eq!(settings.lock, LockConfig::default());
        assert!(matches!(
            settings.storage,
            StorageConfig::S3 { ref bucket, .. } if bucket == "repo"
        ));
    }

    #[test]
    fn test_missing_bucket() {
        let err = Settings::resolve(&args(&[]), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let mut a = args(&["--bucket", "repo"]);
        a.access_key_id = Some("AKIA".to_string());
        a.secret_access_key = None;
        assert!(matches!(
            Settings::resolve(&a, None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_visibility_acl() {
        let settings =
            Settings::resolve(&args(&["--bucket", "b", "--visibility", "authenticated"]), None)
                .unwrap();
        assert_eq!(settings.visibility.canned_acl(), "authenticated-read");
        assert_eq!(Visibility::Private.canned_acl(), "private");
        assert_eq!(Visibility::Public.canned_acl(), "public-read");
    }

    #[test]
    fn test_invalid_visibility_rejected_by_parser() {
        assert!(Cli::try_parse_from(["deb-s3", "--visibility", "world"]).is_err());
    }

    #[test]
    fn test_sign_without_key_uses_default() {
        let settings = Settings::resolve(
            &args(&["--bucket", "b", "--sign", "--gpg-options", "--homedir '/tmp/my keys'"]),
            None,
        )
        .unwrap();
        let signing = settings.signing.unwrap();
        assert_eq!(signing.key, None);
        assert_eq!(signing.command, "gpg");
        assert_eq!(signing.options, vec!["--homedir", "/tmp/my keys"]);
    }

    #[test]
    fn test_sign_with_key() {
        let settings =
            Settings::resolve(&args(&["--bucket", "b", "--sign=ABCD1234"]), None).unwrap();
        assert_eq!(settings.signing.unwrap().key.as_deref(), Some("ABCD1234"));
    }

    #[test]
    fn test_file_values_and_overrides() {
        let file = ConfigFile::parse(
            r#"
bucket = "from-file"
prefix = "/apt/"
codename = "jammy"
visibility = "private"
lock = true
lock_attempts = 3
lock_wait_secs = 1
"#,
        )
        .unwrap();
        let settings = Settings::resolve(&args(&["--codename", "noble"]), Some(file)).unwrap();
        assert_eq!(settings.codename, "noble");
        assert_eq!(settings.prefix.as_deref(), Some("apt"));
        assert_eq!(settings.visibility, Visibility::Private);
        assert!(settings.lock.enabled);
        assert_eq!(settings.lock.max_attempts, 3);
        assert_eq!(settings.lock.wait, Duration::from_secs(1));
        assert!(matches!(
            settings.storage,
            StorageConfig::S3 { ref bucket, .. } if bucket == "from-file"
        ));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        assert!(ConfigFile::parse("bukket = \"typo\"\n").is_err());
    }

    #[test]
    fn test_local_root() {
        let settings = Settings::resolve(&args(&["--local-root", "/srv/apt"]), None).unwrap();
        assert_eq!(
            settings.storage,
            StorageConfig::Local {
                root: PathBuf::from("/srv/apt")
            }
        );
    }

    #[test]
    fn test_invalid_codename() {
        assert!(Settings::resolve(&args(&["--bucket", "b", "--codename", "a/b"]), None).is_err());
    }
}
