use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "MEDRAG_DATA_DIR";

const CONFIG_DB: &str = "config.redb";
const STORE_DB: &str = "store.redb";
const LEXICAL_DIR: &str = "lexical";

/// Where medrag keeps its settings, local vector store and lexical index.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The MEDRAG_DATA_DIR environment variable, if non-empty
    /// 3. The XDG data directory (~/.local/share/medrag/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, |name| std::env::var(name).ok())
    }

    /// Like [`resolve`](Self::resolve), with `env` standing in for the
    /// process environment.
    pub fn resolve_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match env(DATA_DIR_ENV_VAR).filter(|v| !v.is_empty()) {
                Some(val) => PathBuf::from(val),
                None => xdg::BaseDirectories::with_prefix("medrag")
                    .get_data_home()
                    .ok_or_else(|| {
                        Error::Config(
                            "could not determine XDG data home directory".into(),
                        )
                    })?,
            },
        };

        ensure_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings written by `medrag config set`.
    pub fn config_db(&self) -> PathBuf {
        self.root.join(CONFIG_DB)
    }

    /// Segment vectors and payloads for the local vector store.
    pub fn store_db(&self) -> PathBuf {
        self.root.join(STORE_DB)
    }

    /// The tantivy index directory, created on first use.
    pub fn lexical_dir(&self) -> Result<PathBuf> {
        let path = self.root.join(LEXICAL_DIR);
        ensure_dir(&path)?;
        Ok(path)
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "cannot create directory");
        Error::DataDir(path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn explicit_path_lays_out_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve_with(Some(tmp.path()), no_env).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.config_db(), tmp.path().join("config.redb"));
        assert_eq!(dir.store_db(), tmp.path().join("store.redb"));
    }

    #[test]
    fn explicit_path_beats_env() {
        let tmp = tempfile::tempdir().unwrap();
        let from_env = tmp.path().join("env");
        let explicit = tmp.path().join("flag");
        let env_value = from_env.to_string_lossy().to_string();

        let dir = DataDir::resolve_with(Some(&explicit), |_| {
            Some(env_value.clone())
        })
        .unwrap();
        assert_eq!(dir.root(), explicit);
        assert!(!from_env.exists());
    }

    #[test]
    fn env_path_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let value = nested.to_string_lossy().to_string();

        let dir = DataDir::resolve_with(None, |name| {
            (name == DATA_DIR_ENV_VAR).then(|| value.clone())
        })
        .unwrap();
        assert_eq!(dir.root(), nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn unusable_root_is_a_data_dir_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, "not a directory").unwrap();

        let err = DataDir::resolve_with(Some(&file.join("medrag")), no_env)
            .unwrap_err();
        assert!(matches!(err, Error::DataDir(p) if p == file.join("medrag")));
    }

    #[test]
    fn lexical_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve_with(Some(tmp.path()), no_env).unwrap();
        let lexical = dir.lexical_dir().unwrap();

        assert!(lexical.is_dir());
        assert_eq!(lexical, tmp.path().join("lexical"));
    }
}
