//! Normalizes the supported output destinations to an absolute filesystem path.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// An output stream that may be backed by a file on disk
pub trait FileBackedStream {
    /// The path of the underlying file, `None` for streams without a file
    fn file_path(&self) -> Option<&Path>;
}

/// Output stream writing to a file
pub struct FileOutputStream {
    _file: File,
    path: PathBuf,
}

impl FileOutputStream {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Ok(FileOutputStream {
            _file: File::create(path)?,
            path: path.to_path_buf(),
        })
    }
}

impl FileBackedStream for FileOutputStream {
    fn file_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// The destination of a write operation
pub enum OutputTarget {
    Path(PathBuf),
    Stream(Box<dyn FileBackedStream>),
    /// Url, only the `file` scheme is supported
    Url(String),
}

impl std::fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::Path(path) => f.debug_tuple("Path").field(path).finish(),
            OutputTarget::Stream(stream) => f.debug_tuple("Stream").field(&stream.file_path()).finish(),
            OutputTarget::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

impl From<PathBuf> for OutputTarget {
    fn from(path: PathBuf) -> Self {
        OutputTarget::Path(path)
    }
}

impl From<&Path> for OutputTarget {
    fn from(path: &Path) -> Self {
        OutputTarget::Path(path.to_path_buf())
    }
}

impl From<FileOutputStream> for OutputTarget {
    fn from(stream: FileOutputStream) -> Self {
        OutputTarget::Stream(Box::new(stream))
    }
}

impl From<url::Url> for OutputTarget {
    fn from(url: url::Url) -> Self {
        OutputTarget::Url(url.into())
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidOutputTarget("Empty output path".to_string()));
    }

    std::path::absolute(path)
        .map_err(|e| Error::InvalidOutputTarget(format!("Failed to obtain absolute path of '{}' ({e})", path.display())))
}

fn path_from_url(url: &str) -> Result<PathBuf> {
    let parsed = url::Url::parse(url).map_err(|e| Error::InvalidOutputTarget(format!("Invalid url '{url}' ({e})")))?;
    if parsed.scheme() != "file" {
        return Err(Error::InvalidOutputTarget(format!(
            "Unsupported url scheme '{}', only file urls can be written to",
            parsed.scheme()
        )));
    }

    parsed
        .to_file_path()
        .map_err(|_| Error::InvalidOutputTarget(format!("Url '{url}' does not represent a local file")))
}

/// Resolves the target to the absolute path of the file that will be written
pub fn resolve_output_target(target: &OutputTarget) -> Result<PathBuf> {
    let path = match target {
        OutputTarget::Path(path) => path.clone(),
        OutputTarget::Stream(stream) => stream
            .file_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::InvalidOutputTarget("Output stream is not backed by a file".to_string()))?,
        OutputTarget::Url(url) => path_from_url(url)?,
    };

    absolute_path(&path)
}
