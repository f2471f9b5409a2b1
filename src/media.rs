//! Asset discovery and path resolution below the assets directory.
//!
//! Images live in `<assets>/images`, BDF fonts in `<assets>/fonts`. Request
//! paths are always relative to the assets directory and must stay inside it.

use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Information about a single image file.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ImageEntry {
    /// Filename (e.g., "logo.png")
    pub name: String,
    /// Relative path from the assets dir (e.g., "images/logo.png")
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.contains(&e.to_ascii_lowercase().as_str()))
}

/// Scan the images directory for PNG and JPEG files.
pub fn list_images(assets_dir: &Path) -> Vec<ImageEntry> {
    let images_dir = assets_dir.join("images");
    let mut entries = Vec::new();

    let read_dir = match fs::read_dir(&images_dir) {
        Ok(rd) => rd,
        Err(_) => return entries,
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() || !has_extension(&path, &["png", "jpg", "jpeg"]) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let rel_path = format!("images/{name}");

        entries.push(ImageEntry {
            name,
            path: rel_path,
            size,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// Scan the fonts directory for BDF fonts, returning paths like
/// `fonts/7x13.bdf`.
pub fn list_fonts(assets_dir: &Path) -> Vec<String> {
    let fonts_dir = assets_dir.join("fonts");
    let mut fonts = Vec::new();

    let read_dir = match fs::read_dir(&fonts_dir) {
        Ok(rd) => rd,
        Err(_) => return fonts,
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_file() && has_extension(&path, &["bdf"]) {
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                fonts.push(format!("fonts/{name}"));
            }
        }
    }

    fonts.sort();
    fonts
}

/// Resolve a request path against the assets directory.
///
/// Absolute paths and `..` components are refused before the filesystem is
/// touched. Both paths are then canonicalized, so symlinks can't lead
/// outside the assets directory either.
pub fn resolve_asset(assets_dir: &Path, relative_path: &str) -> Result<PathBuf> {
    let relative = Path::new(relative_path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::OutsideAssets(relative.to_path_buf()));
    }

    let full_path = assets_dir.join(relative);

    let canonical = full_path
        .canonicalize()
        .map_err(|_| Error::NotFound(PathBuf::from(relative_path)))?;
    let canonical_assets = assets_dir
        .canonicalize()
        .map_err(|_| Error::NotFound(assets_dir.to_path_buf()))?;

    if !canonical.starts_with(&canonical_assets) {
        return Err(Error::OutsideAssets(PathBuf::from(relative_path)));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"fake").unwrap();
    }

    #[test]
    fn list_images_finds_supported_formats() {
        let tmp = TempDir::new().unwrap();
        let images_dir = tmp.path().join("images");
        std::fs::create_dir(&images_dir).unwrap();

        create_file(&images_dir, "photo.png");
        create_file(&images_dir, "pic.jpg");
        create_file(&images_dir, "SHOT.JPEG");
        create_file(&images_dir, "readme.txt");

        let entries = list_images(tmp.path());
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["SHOT.JPEG", "photo.png", "pic.jpg"]);
        assert_eq!(entries[2].path, "images/pic.jpg");
        assert_eq!(entries[2].size, 4);
    }

    #[test]
    fn list_images_returns_empty_when_no_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(list_images(tmp.path()).is_empty());
    }

    #[test]
    fn list_fonts_finds_bdf_files() {
        let tmp = TempDir::new().unwrap();
        let fonts_dir = tmp.path().join("fonts");
        std::fs::create_dir_all(&fonts_dir).unwrap();

        create_file(&fonts_dir, "9x18.bdf");
        create_file(&fonts_dir, "7x13.bdf");
        create_file(&fonts_dir, "readme.txt");

        assert_eq!(
            list_fonts(tmp.path()),
            vec!["fonts/7x13.bdf", "fonts/9x18.bdf"]
        );
    }

    #[test]
    fn list_fonts_returns_empty_when_no_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(list_fonts(tmp.path()).is_empty());
    }

    #[test]
    fn resolve_asset_inside_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("images")).unwrap();
        create_file(&tmp.path().join("images"), "logo.png");

        let resolved = resolve_asset(tmp.path(), "images/logo.png").unwrap();
        assert!(resolved.ends_with("images/logo.png"));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn resolve_asset_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            resolve_asset(tmp.path(), "images/none.png"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn resolve_asset_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        std::fs::create_dir(&assets).unwrap();
        create_file(tmp.path(), "secret.txt");

        assert!(matches!(
            resolve_asset(&assets, "../secret.txt"),
            Err(Error::OutsideAssets(_))
        ));
    }

    #[rstest]
    #[case("../does-not-exist")]
    #[case("images/../../does-not-exist")]
    #[case("/etc/passwd")]
    #[case("..")]
    fn resolve_asset_refuses_escapes_without_probing(#[case] path: &str) {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            resolve_asset(tmp.path(), path),
            Err(Error::OutsideAssets(_))
        ));
    }

    #[test]
    fn resolve_asset_allows_current_dir_prefix() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("images")).unwrap();
        create_file(&tmp.path().join("images"), "logo.png");
        assert!(resolve_asset(tmp.path(), "./images/logo.png").is_ok());
    }
}
