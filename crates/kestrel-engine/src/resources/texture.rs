use std::path::Path;

use crate::coords::FrameRect;
use crate::device::{GpuDevice, ImageDesc, ImageId};
use crate::error::{EngineError, Result};
use crate::handle::{Handle, HandleTable};

pub type TextureHandle = Handle<Texture>;

/// Decoded image, expanded to RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    /// Channel count of the source file (1 to 4).
    channels: u8,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// Decodes a PNG, JPEG or BMP file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|e| EngineError::Asset {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let channels = decoded.color().channel_count();
        let rgba = decoded.into_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            width,
            height,
            channels,
            pixels: rgba.into_raw(),
        })
    }

    /// Wraps tightly packed RGBA8 pixels.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(EngineError::InvalidArgument(format!(
                "{width}x{height} RGBA image needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels: 4,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// True if the source has four channels and any pixel is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.channels == 4 && self.pixels.chunks_exact(4).any(|px| px[3] < u8::MAX)
    }
}

/// A loaded texture: decoded pixels, sprite-sheet frames and the GPU image.
#[derive(Debug)]
pub struct Texture {
    image: DecodedImage,
    frames: Vec<FrameRect>,
    gpu: Option<ImageId>,
    transparent: bool,
}

impl Texture {
    pub fn image(&self) -> &DecodedImage {
        &self.image
    }

    pub fn frames(&self) -> &[FrameRect] {
        &self.frames
    }

    pub fn gpu_image(&self) -> Option<ImageId> {
        self.gpu
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn size(&self) -> (u32, u32) {
        (self.image.width, self.image.height)
    }
}

/// Owns every texture.
#[derive(Debug)]
pub struct TextureManager {
    table: HandleTable<Texture>,
}

impl TextureManager {
    pub fn new(growth: usize) -> Self {
        Self {
            table: HandleTable::with_growth("texture", growth),
        }
    }

    /// Loads `path` and uploads it with `frame_count` frames (at least one),
    /// each covering the whole image until `set_frame` is called.
    pub fn load(
        &mut self,
        device: &mut impl GpuDevice,
        path: impl AsRef<Path>,
        frame_count: usize,
    ) -> Result<TextureHandle> {
        let path = path.as_ref();
        let image = DecodedImage::open(path)?;
        let handle = self.create(device, image, frame_count)?;
        log::debug!("texture {handle} loaded from {}", path.display());
        Ok(handle)
    }

    /// Uploads an already decoded image.
    ///
    /// On GPU failure the partially built texture is destroyed before the
    /// error is returned.
    pub fn create(
        &mut self,
        device: &mut impl GpuDevice,
        image: DecodedImage,
        frame_count: usize,
    ) -> Result<TextureHandle> {
        let full = FrameRect::full(image.width, image.height);
        let transparent = image.has_transparency();

        let handle = self.table.insert(Texture {
            frames: vec![full; frame_count.max(1)],
            image,
            gpu: None,
            transparent,
        })?;

        let texture = self.table.get_mut(handle)?;
        let desc = ImageDesc {
            width: texture.image.width,
            height: texture.image.height,
            pixels: &texture.image.pixels,
        };
        match device.create_image(&desc) {
            Some(id) => texture.gpu = Some(id),
            None => {
                self.destroy(device, handle)?;
                return Err(EngineError::GpuObjectCreation("texture image"));
            }
        }

        Ok(handle)
    }

    /// Releases the GPU image and frees the slot.
    pub fn destroy(&mut self, device: &mut impl GpuDevice, texture: TextureHandle) -> Result<()> {
        let texture = self.table.remove(texture)?;
        if let Some(image) = texture.gpu {
            device.destroy_image(image);
        }
        Ok(())
    }

    /// Sets the pixel rectangle of frame `index`.
    pub fn set_frame(&mut self, texture: TextureHandle, index: usize, rect: FrameRect) -> Result<()> {
        let t = self.table.get_mut(texture)?;
        let (w, h) = (t.image.width, t.image.height);

        if rect.is_empty() || !rect.fits_within(w, h) {
            return Err(EngineError::InvalidArgument(format!(
                "frame {rect:?} outside {w}x{h} texture {texture}"
            )));
        }
        let count = t.frames.len();
        let slot = t.frames.get_mut(index).ok_or_else(|| {
            EngineError::InvalidArgument(format!("frame {index} of {count} in texture {texture}"))
        })?;
        *slot = rect;
        Ok(())
    }

    /// UV bounds `(u0, v0, u1, v1)` of frame `index`.
    pub fn frame_uv(&self, texture: TextureHandle, index: usize) -> Result<(f32, f32, f32, f32)> {
        let t = self.table.get(texture)?;
        let rect = t.frames.get(index).ok_or_else(|| {
            EngineError::InvalidArgument(format!("frame {index} of {} in texture {texture}", t.frames.len()))
        })?;
        Ok(rect.uv_bounds(t.image.width, t.image.height))
    }

    pub fn get(&self, texture: TextureHandle) -> Result<&Texture> {
        self.table.get(texture)
    }

    pub fn contains(&self, texture: TextureHandle) -> bool {
        self.table.contains(texture)
    }

    pub fn handles(&self) -> Vec<TextureHandle> {
        self.table.handles()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
