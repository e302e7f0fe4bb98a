use std::{
    fs, io,
    path::{Path, PathBuf},
};

use storyline_core::resources::ResourceFs;

/// Resource tree on the host filesystem. Store paths are resolved against
/// `base`; an empty base leaves them relative to the working directory.
#[derive(Clone, Debug, Default)]
pub struct StdResourceFs {
    base: PathBuf,
}

impl StdResourceFs {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path)
    }
}

impl ResourceFs for StdResourceFs {
    type Error = io::Error;

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn size(&self, path: &str) -> Result<usize, Self::Error> {
        let len = fs::metadata(self.resolve(path))?.len();
        usize::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large"))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, Self::Error> {
        fs::read(self.resolve(path))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, Self::Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(dir))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort_unstable();
        Ok(names)
    }
}
