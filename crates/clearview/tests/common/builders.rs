//! Builders for intake files.

#![allow(dead_code)]

use clearview::IntakeFile;

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
pub const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
pub const GIF_MAGIC: &[u8] = b"GIF89a\x01\0\x01\0";

pub fn png(name: &str) -> IntakeFile {
    IntakeFile::new(name, PNG_MAGIC.to_vec()).with_media_type("image/png")
}

pub fn jpeg(name: &str) -> IntakeFile {
    IntakeFile::new(name, JPEG_MAGIC.to_vec()).with_media_type("image/jpeg")
}

/// Builder for a batch of intake files, mixing valid and invalid ones.
#[derive(Default)]
pub struct IntakeBatch {
    files: Vec<IntakeFile>,
}

impl IntakeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn png(mut self, name: &str) -> Self {
        self.files.push(png(name));
        self
    }

    pub fn jpeg(mut self, name: &str) -> Self {
        self.files.push(jpeg(name));
        self
    }

    /// An image type that is not accepted.
    pub fn gif(mut self, name: &str) -> Self {
        self.files.push(IntakeFile::new(name, GIF_MAGIC.to_vec()));
        self
    }

    /// Content that is not an image at all.
    pub fn text(mut self, name: &str) -> Self {
        self.files
            .push(IntakeFile::new(name, b"just some notes".to_vec()).with_media_type("image/png"));
        self
    }

    pub fn empty(mut self, name: &str) -> Self {
        self.files.push(IntakeFile::new(name, Vec::new()));
        self
    }

    pub fn build(self) -> Vec<IntakeFile> {
        self.files
    }
}

pub fn pngs(names: &[&str]) -> Vec<IntakeFile> {
    names.iter().map(|name| png(name)).collect()
}
