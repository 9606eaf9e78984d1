//! Document assembler — combines accepted uploads into one multi-page PDF.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use printpdf::{Image as PdfImage, ImageTransform, Mm, PdfDocument};

use crate::error::AssemblyError;

/// Pages are rendered at their pixel dimensions at this density.
const RENDER_DPI: f64 = 300.0;

/// Result of a finish: a delivered document, an empty collection, or a
/// caught failure. Cleanup has already run in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    Document { page_count: usize },
    Empty,
    Failed { reason: String },
}

/// Scoped-release guard for scratch files.
///
/// Owns every source blob plus the generated artifact; dropping the guard
/// deletes them all, so cleanup holds on success, assembly failure, and
/// delivery failure alike.
pub struct ScratchGuard {
    paths: Vec<PathBuf>,
}

impl ScratchGuard {
    pub fn new() -> Self {
        Self { paths: Vec::new() }
    }

    pub fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

impl Default for ScratchGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                // The artifact never exists when assembly failed early
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("failed to remove scratch file {}: {e}", path.display());
                }
            }
        }
    }
}

/// Combine the source images, in order, into one PDF at `out_path`.
/// Returns the page count.
///
/// Decode and encode are CPU-bound, so the work runs on the blocking pool.
pub async fn combine(sources: Vec<PathBuf>, out_path: PathBuf) -> Result<usize, AssemblyError> {
    tokio::task::spawn_blocking(move || combine_blocking(&sources, &out_path))
        .await
        .map_err(|e| AssemblyError::Task(e.to_string()))?
}

fn combine_blocking(sources: &[PathBuf], out_path: &Path) -> Result<usize, AssemblyError> {
    let mut pages: Vec<DynamicImage> = Vec::with_capacity(sources.len());
    for (index, path) in sources.iter().enumerate() {
        // Scratch names carry no extension, so sniff the format from content
        let decoded = image::io::Reader::open(path)
            .map_err(|e| AssemblyError::Decode {
                index,
                reason: e.to_string(),
            })?
            .with_guessed_format()
            .map_err(|e| AssemblyError::Decode {
                index,
                reason: e.to_string(),
            })?
            .decode()
            .map_err(|e| AssemblyError::Decode {
                index,
                reason: e.to_string(),
            })?;
        // Normalize color representation; PDF pages are plain RGB
        pages.push(DynamicImage::ImageRgb8(decoded.to_rgb8()));
    }

    let Some(first) = pages.first() else {
        return Err(AssemblyError::Encode("no source images".into()));
    };

    let (doc, first_page, first_layer) = PdfDocument::new(
        "Collected documents",
        px_to_mm(first.width()),
        px_to_mm(first.height()),
        "page",
    );
    {
        let layer = doc.get_page(first_page).get_layer(first_layer);
        PdfImage::from_dynamic_image(first).add_to_layer(layer, ImageTransform::default());
    }
    for img in &pages[1..] {
        let (page, layer) = doc.add_page(px_to_mm(img.width()), px_to_mm(img.height()), "page");
        let layer = doc.get_page(page).get_layer(layer);
        PdfImage::from_dynamic_image(img).add_to_layer(layer, ImageTransform::default());
    }

    let file = File::create(out_path)?;
    doc.save(&mut BufWriter::new(file))
        .map_err(|e| AssemblyError::Encode(e.to_string()))?;

    Ok(sources.len())
}

fn px_to_mm(px: u32) -> Mm {
    Mm((px as f64 * 25.4 / RENDER_DPI) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{ImageFormat, Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(8, 8, Rgb(color))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn combines_two_images_into_two_pages() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a", [255, 0, 0]);
        let b = write_png(dir.path(), "b", [0, 255, 0]);
        let out = dir.path().join("combined.pdf");

        let pages = combine(vec![a, b], out.clone()).await.unwrap();
        assert_eq!(pages, 2);

        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"%PDF"), "output should be a PDF");
    }

    #[tokio::test]
    async fn decode_failure_names_the_bad_upload() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_png(dir.path(), "good", [0, 0, 255]);
        let bad = dir.path().join("bad");
        std::fs::write(&bad, b"definitely not an image").unwrap();
        let out = dir.path().join("combined.pdf");

        let err = combine(vec![good, bad], out.clone()).await.unwrap_err();
        match err {
            AssemblyError::Decode { index, .. } => assert_eq!(index, 1),
            other => panic!("expected decode error, got {other}"),
        }
        assert!(!out.exists(), "no artifact on failure");
    }

    #[tokio::test]
    async fn extensionless_sources_decode_by_content() {
        let dir = tempfile::tempdir().unwrap();
        // Scratch files are named by UUID, no extension
        let src = write_png(dir.path(), "b0e9ee6c-2f58-4f4c-9a3c-000000000001", [9, 9, 9]);
        let out = dir.path().join("combined.pdf");

        assert_eq!(combine(vec![src], out).await.unwrap(), 1);
    }

    #[test]
    fn scratch_guard_removes_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept");
        let doomed = dir.path().join("doomed");
        std::fs::write(&kept, b"k").unwrap();
        std::fs::write(&doomed, b"d").unwrap();

        {
            let mut guard = ScratchGuard::new();
            guard.track(doomed.clone());
        }
        assert!(!doomed.exists());
        assert!(kept.exists());
    }

    #[test]
    fn scratch_guard_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut guard = ScratchGuard::new();
        guard.track(dir.path().join("never_created"));
        drop(guard); // must not panic
    }

    #[test]
    fn px_to_mm_at_render_dpi() {
        // 300 px at 300 dpi is one inch
        assert!((px_to_mm(300).0 - 25.4).abs() < 1e-9);
    }
}
