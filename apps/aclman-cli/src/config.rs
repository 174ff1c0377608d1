// config.rs - Tool settings from /etc/aclman.toml.

use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use aclman_policy::{ResolveOptions, DEFAULT_CONFIG_FILE_NAME};

/// Settings file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/aclman.toml";

/// Extensions of files that are data, never programs.
const NON_EXEC_EXTENSIONS: &[&str] = &[
    "7z", "ani", "avi", "bat", "bik", "bin", "bmp", "bup", "bz2", "c", "cab", "cfg", "chm",
    "civ5mod", "class", "cmd", "conf", "cpp", "crt", "csr", "css", "csv", "cue", "dat", "db",
    "deb", "desc", "dll", "dmg", "doc", "docx", "ds_store", "dtd", "dvr-ms", "ear", "exe", "gif",
    "gz", "h", "hlp", "htm", "html", "ico", "ifo", "img", "inf", "ini", "iso", "jar", "java",
    "jpg", "kdbx", "key", "ldif", "lnk", "log", "m3u", "manifest", "md5", "mdf", "mds", "mkv",
    "mov", "mp3", "mp4", "mpeg", "mpg", "msi", "nfo", "nrg", "odg", "ods", "odt", "otg", "ots",
    "ott", "pdf", "pdx", "pem", "pit", "png", "ppt", "pptx", "properties", "rar", "reg", "rpm",
    "rtf", "sd7", "srt", "sub", "svg", "sxc", "sxw", "tar", "tgz", "tif", "torrent", "ttf", "txt",
    "url", "vbox-extpack", "vdf", "vob", "war", "wav", "wma", "wmv", "xls", "xlsx", "xml", "zip",
    "zoo",
];

/// Top-level tool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AclmanConfig {
    /// Name of the per-directory policy files.
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,

    /// Directory items processed in parallel. `--workers` overrides.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Force root ownership and a read-only ACL on matched policy files.
    #[serde(default = "default_true")]
    pub protect_config_files: bool,

    /// Files with these extensions never get execute bits.
    #[serde(default = "default_non_exec_extensions")]
    pub non_exec_extensions: Vec<String>,

    /// Program used to read ACLs (name on PATH or a path).
    #[serde(default = "default_getfacl")]
    pub getfacl: String,

    /// Program used to write ACLs.
    #[serde(default = "default_setfacl")]
    pub setfacl: String,
}

impl Default for AclmanConfig {
    fn default() -> Self {
        Self {
            config_file_name: default_config_file_name(),
            workers: default_workers(),
            protect_config_files: true,
            non_exec_extensions: default_non_exec_extensions(),
            getfacl: default_getfacl(),
            setfacl: default_setfacl(),
        }
    }
}

fn default_config_file_name() -> String {
    DEFAULT_CONFIG_FILE_NAME.to_string()
}

fn default_workers() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_non_exec_extensions() -> Vec<String> {
    NON_EXEC_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

fn default_getfacl() -> String {
    "getfacl".to_string()
}

fn default_setfacl() -> String {
    "setfacl".to_string()
}

impl AclmanConfig {
    /// Read and validate a settings file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("invalid {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid {}", path.display()))?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file means built-in defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.config_file_name.is_empty() || self.config_file_name.contains('/') {
            bail!(
                "config_file_name must be a plain file name, got '{}'",
                self.config_file_name
            );
        }
        Ok(())
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            config_file_name: self.config_file_name.clone(),
            protect_config_files: self.protect_config_files,
            non_exec_extensions: self
                .non_exec_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
        }
    }
}
