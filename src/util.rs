use crate::error::{Error, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub fn make_path_and_create(path: impl Into<PathBuf>) -> Result<PathBuf> {
    let path = path.into();

    fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}

/// Writes through a sibling `.part` file so readers never see half a file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        make_path_and_create(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();

    tmp.push(".part");

    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}
