//! Image enumeration and scan ordering.
//!
//! Product photo sets tend to put the spec sheet (and with it the model
//! number) first or last, so the scan walks the sorted list from both ends
//! towards the middle instead of front to back.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Extensions accepted as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tif", "tiff"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// List eligible images in `folder`, sorted and then interleaved from both ends.
pub fn list_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && is_image_path(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(interleave_ends(files))
}

/// Reorder `[a0, a1, .., an-1]` into `[a0, an-1, a1, an-2, ..]`.
pub fn interleave_ends<T>(items: Vec<T>) -> Vec<T> {
    let mut remaining: std::collections::VecDeque<T> = items.into();
    let mut ordered = Vec::with_capacity(remaining.len());
    while let Some(front) = remaining.pop_front() {
        ordered.push(front);
        if let Some(back) = remaining.pop_back() {
            ordered.push(back);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_interleave_five() {
        let order = interleave_ends(vec!["a", "b", "c", "d", "e"]);
        assert_eq!(order, vec!["a", "e", "b", "d", "c"]);
    }

    #[test]
    fn test_interleave_even_count() {
        let order = interleave_ends(vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(order, vec![1, 6, 2, 5, 3, 4]);
    }

    #[test]
    fn test_interleave_small_inputs_unchanged() {
        assert_eq!(interleave_ends(Vec::<u8>::new()), Vec::<u8>::new());
        assert_eq!(interleave_ends(vec!["only"]), vec!["only"]);
    }

    #[test]
    fn test_interleave_is_permutation() {
        for n in 0..40usize {
            let input: Vec<usize> = (0..n).collect();
            let mut order = interleave_ends(input.clone());
            assert_eq!(order.len(), n);
            order.sort_unstable();
            assert_eq!(order, input);
        }
    }

    #[test]
    fn test_extension_allowlist_case_insensitive() {
        assert!(is_image_path(Path::new("a/IMG_01.JPG")));
        assert!(is_image_path(Path::new("scan.TiFf")));
        assert!(is_image_path(Path::new("photo.webp")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("README")));
        assert!(!is_image_path(Path::new("archive.png.zip")));
    }

    #[test]
    fn test_list_images_filters_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["03.png", "01.jpg", "02.JPEG", "04.bmp", "skip.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["01.jpg", "04.bmp", "02.JPEG", "03.png"]);
    }

    #[test]
    fn test_list_images_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_images(dir.path()).unwrap().is_empty());
    }
}
