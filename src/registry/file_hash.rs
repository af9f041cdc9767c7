//! Content hashing and path normalization for change tracking.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// SHA256 of a file's content, read `chunk_size` bytes at a time.
pub fn hash_file(path: &Path, chunk_size: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Project-relative, `/`-separated form of `path`.
///
/// Absolute paths under `project_root` lose the root prefix; `.` segments are
/// dropped and `..` segments fold into their parent. Leading `..` segments of
/// a relative path are kept. Absolute paths outside the root keep their full
/// form.
pub fn normalize_path(project_root: &Path, path: &Path) -> String {
    let relative = if path.is_absolute() {
        strip_root(project_root, path).unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    };

    let mut parts: Vec<String> = Vec::new();
    let mut rooted = false;
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ if !rooted => parts.push("..".to_string()),
                _ => {}
            },
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => rooted = true,
        }
    }

    let joined = parts.join("/");
    if rooted { format!("/{joined}") } else { joined }
}

fn strip_root(project_root: &Path, path: &Path) -> Option<PathBuf> {
    if let Ok(stripped) = path.strip_prefix(project_root) {
        return Some(stripped.to_path_buf());
    }
    // Symlinked roots such as /tmp on macOS
    let root = project_root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}
