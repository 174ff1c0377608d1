// loader.rs - Reads policy files from disk.

use std::path::Path;

use aclman_policy::{ConfigSource, ConfigText};

/// Looks for a policy file with a fixed name in each directory.
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    file_name: String,
}

impl FileConfigLoader {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for FileConfigLoader {
    fn default() -> Self {
        Self::new(aclman_policy::DEFAULT_CONFIG_FILE_NAME)
    }
}

impl ConfigSource for FileConfigLoader {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn read_config(&self, dir: &Path) -> std::io::Result<Option<ConfigText>> {
        let path = dir.join(&self.file_name);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(ConfigText { path, text })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_existing_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("..aclman"), "[/*]\nOWNER=root\n").unwrap();
        let loader = FileConfigLoader::default();
        let config = loader.read_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.path, dir.path().join("..aclman"));
        assert!(config.text.contains("OWNER=root"));
    }

    #[test]
    fn missing_policy_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileConfigLoader::new(".policy");
        assert!(loader.read_config(dir.path()).unwrap().is_none());
        assert_eq!(loader.file_name(), ".policy");
    }

    #[test]
    fn unreadable_policy_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be can't be read as text.
        std::fs::create_dir(dir.path().join("..aclman")).unwrap();
        let loader = FileConfigLoader::default();
        assert!(loader.read_config(dir.path()).is_err());
    }
}
