// # Hosts Writer
//
// Regenerates a hosts file from its original lines and a store, and commits
// the result atomically.
//
// ## Layout
//
// 1. Original lines in order, minus the lines the store owns
// 2. One line per store entry, in write order
//
// Every line is terminated with CRLF regardless of platform.
//
// ## Crash Safety
//
// - Atomic writes: buffer goes to `<name>.tmp` next to the target, is synced
//   to stable storage and verified, then renamed over the target
// - Backup: optionally keeps `<name>.backup` with the previous content
// - The original file is never opened for writing

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::HostsStore;

/// Line terminator written for every output line
pub const LINE_ENDING: &[u8] = b"\r\n";

/// Options controlling how a rendered buffer is committed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Copy the current file to `<name>.backup` before replacing it
    pub backup: bool,
}

/// Render the regenerated file contents
///
/// # Panics
///
/// Panics if the store owns a line index outside `original_lines`. A store
/// must only be rendered against the lines it was loaded from.
pub fn render<L: AsRef<[u8]>>(store: &HostsStore, original_lines: &[L]) -> Vec<u8> {
    if let Some(&last) = store.owned_lines().last() {
        assert!(
            last < original_lines.len(),
            "store owns line {} but only {} original lines were supplied",
            last,
            original_lines.len()
        );
    }

    let mut out = Vec::new();
    for (index, line) in original_lines.iter().enumerate() {
        if store.owns_line(index) {
            continue;
        }
        out.extend_from_slice(line.as_ref());
        out.extend_from_slice(LINE_ENDING);
    }

    for entry in store.entries() {
        out.extend_from_slice(entry.to_line().as_bytes());
        out.extend_from_slice(LINE_ENDING);
    }
    out
}

/// Render and atomically write the hosts file at `path`
///
/// Returns the number of bytes written.
pub async fn commit<L: AsRef<[u8]>>(
    path: &Path,
    store: &HostsStore,
    original_lines: &[L],
    options: CommitOptions,
) -> Result<usize> {
    let buffer = render(store, original_lines);
    write_atomically(path, &buffer, options).await?;
    info!(
        "Committed {} entries to {} ({} bytes)",
        store.len(),
        path.display(),
        buffer.len()
    );
    Ok(buffer.len())
}

/// Replace the file at `path` with `contents`
///
/// Either the old or the new content is left at `path`; a failure before the
/// rename leaves the original untouched and removes the temporary file.
pub async fn write_atomically(path: &Path, contents: &[u8], options: CommitOptions) -> Result<()> {
    let temp_path = temp_path(path);

    if let Err(e) = write_temp(&temp_path, contents).await {
        discard(&temp_path).await;
        return Err(e);
    }

    // Keep the target's permissions on the replacement
    if let Ok(metadata) = fs::metadata(path).await {
        if let Err(e) = fs::set_permissions(&temp_path, metadata.permissions()).await {
            warn!(
                "Failed to copy permissions of {} to {}: {}",
                path.display(),
                temp_path.display(),
                e
            );
        }
    }

    if options.backup && fs::try_exists(path).await.unwrap_or(false) {
        let backup = backup_path(path);
        match fs::copy(path, &backup).await {
            Ok(_) => debug!("Backed up {} to {}", path.display(), backup.display()),
            Err(e) => warn!("Failed to create backup {}: {}", backup.display(), e),
        }
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        discard(&temp_path).await;
        return Err(Error::hosts_file(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        )));
    }

    sync_parent_dir(path).await;
    Ok(())
}

/// Write, flush and verify the temporary file
async fn write_temp(temp_path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp_path).await.map_err(|e| {
        Error::hosts_file(format!(
            "Failed to create temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;

    file.write_all(contents).await.map_err(|e| {
        Error::hosts_file(format!(
            "Failed to write to temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;

    file.flush().await.map_err(|e| {
        Error::hosts_file(format!(
            "Failed to flush temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;

    file.sync_all().await.map_err(|e| {
        Error::hosts_file(format!(
            "Failed to sync temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    drop(file);

    let written = fs::metadata(temp_path)
        .await
        .map_err(|e| {
            Error::hosts_file(format!(
                "Failed to stat temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?
        .len();
    let expected = contents.len() as u64;
    if written != expected {
        return Err(Error::PartialWrite {
            path: temp_path.to_path_buf(),
            expected,
            written,
        });
    }
    Ok(())
}

async fn discard(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }
    }
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    match fs::File::open(parent).await {
        Ok(dir) => {
            if let Err(e) = dir.sync_all().await {
                warn!("Failed to sync directory {}: {}", parent.display(), e);
            }
        }
        Err(e) => warn!("Failed to open directory {}: {}", parent.display(), e),
    }
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) {}

/// Get path to temporary file for atomic writes
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// Get path to backup file
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".backup")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("hosts"));
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::HostEntry;
    use std::io;
    use tempfile::tempdir;

    fn load(lines: &[&str], filter: &str) -> HostsStore {
        HostsStore::load(
            lines.iter().map(|l| Ok::<_, io::Error>(l.as_bytes())),
            filter,
        )
        .unwrap()
    }

    #[test]
    fn test_render_drops_owned_and_appends_entries() {
        let lines = [
            "# header",
            "127.0.0.1 localhost",
            "10.0.0.5 vm1 vm2 # managed by api",
            "",
        ];
        let store = load(&lines, "managed by api");
        let out = render(&store, &lines);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "# header\r\n\
             127.0.0.1 localhost\r\n\
             \r\n\
             10.0.0.5 vm1    # managed by api\r\n\
             10.0.0.5 vm2    # managed by api\r\n"
        );
    }

    #[test]
    fn test_render_entry_without_comment() {
        let mut store = HostsStore::new("");
        store.add(HostEntry::new("10.0.0.1", "plain", "")).unwrap();
        let lines: [&str; 0] = [];
        assert_eq!(render(&store, &lines), b"10.0.0.1 plain\r\n");
    }

    #[test]
    fn test_render_preserves_unowned_bytes() {
        let lines: Vec<&[u8]> = vec![
            b"10.0.0.1\tweird\xff".as_slice(),
            b"   # indented comment  ".as_slice(),
        ];
        let store = HostsStore::load(lines.iter().map(|l| Ok::<_, io::Error>(*l)), "").unwrap();
        assert!(store.is_empty());
        assert_eq!(
            render(&store, &lines),
            b"10.0.0.1\tweird\xff\r\n   # indented comment  \r\n".to_vec()
        );
    }

    #[test]
    #[should_panic(expected = "store owns line")]
    fn test_render_against_foreign_lines_panics() {
        let store = load(&["# c", "10.0.0.1 a"], "");
        let shorter = ["# c"];
        render(&store, &shorter);
    }

    #[test]
    fn test_suffix_paths() {
        let path = Path::new("/etc/hosts");
        assert_eq!(temp_path(path), PathBuf::from("/etc/hosts.tmp"));
        assert_eq!(backup_path(path), PathBuf::from("/etc/hosts.backup"));
    }

    #[tokio::test]
    async fn test_write_atomically_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, b"old\n").await.unwrap();

        write_atomically(&path, b"new\r\n", CommitOptions::default())
            .await
            .unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"new\r\n");
        assert!(!temp_path(&path).exists());
        assert!(!backup_path(&path).exists());
    }

    #[tokio::test]
    async fn test_write_atomically_keeps_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, b"old\n").await.unwrap();

        write_atomically(&path, b"new\r\n", CommitOptions { backup: true })
            .await
            .unwrap();

        assert_eq!(fs::read(backup_path(&path)).await.unwrap(), b"old\n");
    }

    #[tokio::test]
    async fn test_write_atomically_into_missing_dir_leaves_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("hosts");

        let err = write_atomically(&path, b"x", CommitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HostsFile(_)));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_atomically_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, b"old\n").await.unwrap();
        fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640))
            .await
            .unwrap();

        write_atomically(&path, b"new\r\n", CommitOptions::default())
            .await
            .unwrap();

        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
