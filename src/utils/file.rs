use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;


/// Creates every directory in `dirs` (and parents) that does not exist yet.
/// Re-running is a no-op.
///
/// # Arguments
/// * `dirs` - Directories to create, in order.
///
/// # Returns
/// The directories that were actually created by this call.
pub fn ensure_dirs(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in dirs {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {}", dir.display()))?;
        created.push(dir.clone());
    }
    Ok(created)
}


/// Moves a file or directory, like `mv`. Falls back to copy-and-delete for
/// plain files when the rename crosses filesystems.
pub fn move_entry(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices && from.is_file() => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}


/// Recursive directory listing in the spirit of `ls -R`: one `dir:` header per
/// directory followed by its sorted entries, directories suffixed with `/`.
pub fn tree_listing(root: &Path) -> Result<String> {
    let mut out = String::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        let label = match dir.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => format!("./{}", rel.display()),
            Err(_) => dir.display().to_string(),
        };
        out.push_str(&label);
        out.push_str(":\n");

        let mut names: Vec<String> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if e.path().is_dir() { format!("{}/", name) } else { name }
            })
            .collect();
        names.sort();
        for name in names {
            out.push_str(&name);
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dirs_idempotent() -> Result<()> {
        let tmp = tempdir()?;
        let dirs = vec![
            tmp.path().join("knife"),
            tmp.path().join("knife/index"),
            tmp.path().join("knife/denovo_scripts/index"),
        ];

        let first = ensure_dirs(&dirs)?;
        assert_eq!(first.len(), 3);
        assert!(dirs.iter().all(|d| d.is_dir()));

        let second = ensure_dirs(&dirs)?;
        assert!(second.is_empty());
        assert!(dirs.iter().all(|d| d.is_dir()));
        Ok(())
    }

    #[test]
    fn test_ensure_dirs_fails_on_file_in_the_way() -> Result<()> {
        let tmp = tempdir()?;
        fs::write(tmp.path().join("knife"), "not a directory")?;
        let result = ensure_dirs(&[tmp.path().join("knife/index")]);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_move_entry_renames() -> Result<()> {
        let tmp = tempdir()?;
        let from = tmp.path().join("a.txt");
        let to = tmp.path().join("b.txt");
        fs::write(&from, "x")?;
        move_entry(&from, &to)?;
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to)?, "x");
        Ok(())
    }

    #[test]
    fn test_tree_listing() -> Result<()> {
        let tmp = tempdir()?;
        fs::create_dir_all(tmp.path().join("index"))?;
        fs::write(tmp.path().join("completeRun.sh"), "")?;
        fs::write(tmp.path().join("index/hg19.1.bt2"), "")?;

        let listing = tree_listing(tmp.path())?;
        assert_eq!(listing, ".:\ncompleteRun.sh\nindex/\n\n./index:\nhg19.1.bt2\n\n");
        Ok(())
    }
}
