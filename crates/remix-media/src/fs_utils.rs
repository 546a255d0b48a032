//! File placement helpers.
//!
//! Outputs are written to a sibling `.partial` path and moved into place only
//! once FFmpeg has finished, so a final path never holds a half-written file.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE: i32 = 18;

/// Scratch path next to `final_path` (`out.mp4` -> `out.partial.mp4`).
pub fn partial_path(final_path: &Path) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = match final_path.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    final_path.with_file_name(name)
}

async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Move `src` to `dst`, copying when they sit on different filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            fs::copy(src, dst).await?;
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!("Failed to remove {} after copy: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Byte-for-byte copy of `src` to `dst`.
pub async fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<u64> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    ensure_parent(dst).await?;
    Ok(fs::copy(src, dst).await?)
}

/// Remove a scratch file, ignoring absence.
pub async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/work/run/final.mp4")),
            PathBuf::from("/work/run/final.partial.mp4")
        );
        assert_eq!(partial_path(Path::new("track")), PathBuf::from("track.partial"));
    }

    #[tokio::test]
    async fn test_move_file_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.partial.mp4");
        let dst = dir.path().join("out").join("a.mp4");
        fs::write(&src, b"video").await.unwrap();

        assert_ok!(move_file(&src, &dst).await);

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_copy_file_is_exact() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("track.mp3");
        let dst = dir.path().join("aligned").join("track.mp3");
        let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        fs::write(&src, &bytes).await.unwrap();

        assert_eq!(copy_file(&src, &dst).await.unwrap(), 10_000);
        assert_eq!(fs::read(&dst).await.unwrap(), bytes);
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_discard_missing_file() {
        let dir = TempDir::new().unwrap();
        discard(&dir.path().join("nope")).await;
    }
}
