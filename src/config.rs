use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One configured log source: a stream name and a file or directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    pub entity: String,
    pub path: PathBuf,
}

/// Tap configuration as read from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TapConfig {
    /// Inline list of log sources.
    #[serde(default)]
    pub files: Option<Vec<FileConfig>>,

    /// Path to a JSON file holding the same array as `files`. Takes
    /// precedence over `files` when set.
    #[serde(default)]
    pub apachelog_files_definition: Option<PathBuf>,
}

impl TapConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot open config '{}': {e}", path.display()))
        })?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        debug!(path = %path.display(), "loaded tap config");
        Ok(config)
    }

    /// Resolve the list of file sources, from the external definitions file
    /// when one is configured, otherwise from the inline `files` list.
    pub fn file_configs(&self) -> Result<Vec<FileConfig>> {
        let files = match &self.apachelog_files_definition {
            Some(definition) => Some(load_definitions(definition)?),
            None => self.files.clone(),
        };

        match files {
            Some(files) if !files.is_empty() => Ok(files),
            _ => Err(Error::InvalidConfiguration(
                "no Apache log file definitions found".to_string(),
            )),
        }
    }
}

fn load_definitions(definition: &Path) -> Result<Vec<FileConfig>> {
    if !definition.is_file() {
        return Err(Error::InvalidConfiguration(format!(
            "'{}' file not found",
            definition.display()
        )));
    }
    let file = File::open(definition).map_err(|e| Error::io(definition, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn inline_files() {
        let config: TapConfig = serde_json::from_str(
            r#"{"files": [{"entity": "web", "path": "/var/log/apache2"}]}"#,
        )
        .unwrap();
        let files = config.file_configs().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].entity, "web");
        assert_eq!(files[0].path, PathBuf::from("/var/log/apache2"));
    }

    #[test]
    fn definitions_file_wins_over_inline() {
        let dir = TempDir::new().unwrap();
        let defs = dir.path().join("files.json");
        fs::write(&defs, r#"[{"entity": "ext", "path": "/tmp/ext.log"}]"#).unwrap();

        let config = TapConfig {
            files: Some(vec![FileConfig {
                entity: "inline".into(),
                path: "/tmp/inline.log".into(),
            }]),
            apachelog_files_definition: Some(defs),
        };
        let files = config.file_configs().unwrap();
        assert_eq!(files[0].entity, "ext");
    }

    #[test]
    fn missing_definitions_file_is_invalid() {
        let config = TapConfig {
            files: None,
            apachelog_files_definition: Some("/definitely/not/here.json".into()),
        };
        assert!(matches!(
            config.file_configs(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn empty_or_absent_list_is_invalid() {
        assert!(matches!(
            TapConfig::default().file_configs(),
            Err(Error::InvalidConfiguration(_))
        ));
        let empty: TapConfig = serde_json::from_str(r#"{"files": []}"#).unwrap();
        assert!(matches!(
            empty.file_configs(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"files": [{"entity": "a", "path": "a.log"}]}"#).unwrap();
        let config = TapConfig::load(&path).unwrap();
        assert_eq!(config.file_configs().unwrap()[0].entity, "a");

        assert!(matches!(
            TapConfig::load(&dir.path().join("missing.json")),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
