use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zip::ZipArchive;

/// Where the GTFS tables live: an unpacked directory or the original zip.
pub enum Source {
    Dir(PathBuf),
    Zip(ZipArchive<fs_err::File>),
}

impl Source {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Ok(Self::Dir(path.to_path_buf()));
        }
        let file = fs_err::File::open(path)?;
        let archive =
            ZipArchive::new(file).with_context(|| format!("{} isn't a zip", path.display()))?;
        Ok(Self::Zip(archive))
    }

    /// Reads one table entirely. Zips sometimes nest everything in a folder, so match by the
    /// final path component.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        match self {
            Self::Dir(dir) => Ok(fs_err::read(dir.join(name))?),
            Self::Zip(archive) => {
                let full_name = find_in_zip(archive, name)
                    .ok_or_else(|| anyhow!("{name} isn't in the GTFS zip"))?;
                let mut file = archive
                    .by_name(&full_name)
                    .map_err(|err| anyhow!("{full_name}: {err}"))?;
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    pub fn has(&self, name: &str) -> bool {
        match self {
            Self::Dir(dir) => dir.join(name).exists(),
            Self::Zip(archive) => find_in_zip(archive, name).is_some(),
        }
    }
}

fn find_in_zip(archive: &ZipArchive<fs_err::File>, name: &str) -> Option<String> {
    let suffix = format!("/{name}");
    archive
        .file_names()
        .find(|x| *x == name || x.ends_with(&suffix))
        .map(|x| x.to_string())
}
