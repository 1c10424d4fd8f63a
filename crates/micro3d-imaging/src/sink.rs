//! Image output
//!
//! Captures are written as PNG files. Grid scans additionally list every file
//! in a PTO project so a panorama stitcher can pick them up; orientation and
//! translation fields are left at zero for the optimizer to fill in.

use image::DynamicImage;
use micro3d_core::{CaptureError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for captured frames
pub trait ImageSink: Send {
    /// Store `image` under `name` and return where it went
    fn save(&mut self, name: &str, image: &DynamicImage) -> Result<PathBuf>;
}

/// Writes PNG files into one directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path for `name`, with `.png` appended when missing
    pub fn path_for(&self, name: &str) -> PathBuf {
        let has_png = Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if has_png {
            self.dir.join(name)
        } else {
            self.dir.join(format!("{}.png", name))
        }
    }
}

impl ImageSink for DirectorySink {
    fn save(&mut self, name: &str, image: &DynamicImage) -> Result<PathBuf> {
        let path = self.path_for(name);
        let save_error = |reason: String| CaptureError::Save {
            path: path.display().to_string(),
            reason,
        };
        std::fs::create_dir_all(&self.dir).map_err(|e| save_error(e.to_string()))?;
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| save_error(e.to_string()))?;
        tracing::info!("Image saved to {}", path.display());
        Ok(path)
    }
}

/// Stitching project listing the captured images
pub struct PtoProject {
    path: PathBuf,
    width: u32,
    height: u32,
    writer: BufWriter<File>,
    images: usize,
}

impl PtoProject {
    /// File name used inside the output directory
    pub const FILE_NAME: &'static str = "capture.pto";

    /// Start `capture.pto` in `dir` for frames of `width` x `height`
    pub fn create(dir: &Path, width: u32, height: u32) -> Result<Self> {
        let path = dir.join(Self::FILE_NAME);
        let file = std::fs::create_dir_all(dir)
            .and_then(|_| File::create(&path))
            .map_err(|e| CaptureError::Save {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            path,
            width,
            height,
            writer: BufWriter::new(file),
            images: 0,
        })
    }

    /// Image line for one file
    pub fn image_line(file_name: &str, width: u32, height: u32) -> String {
        format!(
            "i w{} h{} f0 v29.97 n\"{}\" TrX0 TrY0 y0 p0 r0",
            width, height, file_name
        )
    }

    /// Append one image and flush, so an interrupted scan leaves a usable file
    pub fn push(&mut self, file_name: &str) -> Result<()> {
        writeln!(
            self.writer,
            "{}",
            Self::image_line(file_name, self.width, self.height)
        )?;
        self.writer.flush()?;
        self.images += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images
    }

    pub fn is_empty(&self) -> bool {
        self.images == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close, returning the project path
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        tracing::info!(images = self.images, "Wrote {}", self.path.display());
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    #[test]
    fn test_png_extension_added_once() {
        let sink = DirectorySink::new("/data/scan");
        assert_eq!(sink.path_for("focus_1.20_350"), PathBuf::from("/data/scan/focus_1.20_350.png"));
        assert_eq!(sink.path_for("stack_0001.PNG"), PathBuf::from("/data/scan/stack_0001.PNG"));
    }

    #[test]
    fn test_directory_created_on_save() {
        let dir = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out"));
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 3, Luma([128])));
        let path = sink.save("frame", &image).unwrap();
        assert!(path.ends_with("out/frame.png"));
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (4, 3));
    }

    #[test]
    fn test_pto_lines() {
        let dir = TempDir::new().unwrap();
        let mut pto = PtoProject::create(dir.path(), 640, 480).unwrap();
        pto.push("grid_0000_1.00_2.00.png").unwrap();
        pto.push("grid_0001_1.20_2.00.png").unwrap();
        assert_eq!(pto.len(), 2);
        let path = pto.finish().unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "i w640 h480 f0 v29.97 n\"grid_0000_1.00_2.00.png\" TrX0 TrY0 y0 p0 r0",
                "i w640 h480 f0 v29.97 n\"grid_0001_1.20_2.00.png\" TrX0 TrY0 y0 p0 r0",
            ]
        );
    }
}
