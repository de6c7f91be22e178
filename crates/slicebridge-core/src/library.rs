use crate::CoreError;
use slicebridge_profile::{ParamTable, Profile, ProfileError};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROFILE_EXTENSION: &str = "profile";

/// Directory of stored profiles, one `<name>.profile` file each.
#[derive(Debug, Clone)]
pub struct ProfileLibrary {
    dir: PathBuf,
}

impl ProfileLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing profile `name`. Names are the sanitised form produced
    /// on import and may not contain path separators.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, CoreError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ProfileError::InvalidName(name.to_owned()).into());
        }
        Ok(self.dir.join(format!("{name}.{PROFILE_EXTENSION}")))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_ok_and(|p| p.is_file())
    }

    pub fn load(&self, table: &ParamTable, name: &str) -> Result<Profile, CoreError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(ProfileError::NotFound(name.to_owned()).into());
        }
        Ok(Profile::load(table, &path)?)
    }

    pub fn save(
        &self,
        name: &str,
        profile: &Profile,
        allow_overwrite: bool,
    ) -> Result<PathBuf, CoreError> {
        let path = self.path_for(name)?;
        std::fs::create_dir_all(&self.dir)?;
        profile.save(&path, allow_overwrite)?;
        debug!("stored profile {name} at {}", path.display());
        Ok(path)
    }

    /// Names of all stored profiles, sorted.
    pub fn list(&self) -> Result<Vec<String>, CoreError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
