//! SDL2 video sink
//!
//! Window, accelerated canvas and one streaming IYUV texture. The GPU
//! does the YUV to RGB conversion; the CPU side only uploads the three
//! planes of the decoded frame and positions the display rectangle.

use crate::media::VideoSlot;
use crate::utils::config::WindowConfig;
use crate::utils::error::{IntoPlayerError, Result};
use ffmpeg_next as ffmpeg;
use sdl2::pixels::PixelFormatEnum;
use sdl2::rect::Rect;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::VideoSubsystem;

pub struct VideoRenderer {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    /// Created lazily on the first frame, once the picture size is known.
    texture: Option<Texture>,
}

impl VideoRenderer {
    pub fn new(video: &VideoSubsystem, config: &WindowConfig) -> Result<Self> {
        let window = video
            .window(&config.title, config.width, config.height)
            .position_centered()
            .resizable()
            .opengl()
            .build()
            .video_err("creating window")?;

        let canvas = window
            .into_canvas()
            .accelerated()
            .present_vsync()
            .build()
            .video_err("creating renderer")?;

        let texture_creator = canvas.texture_creator();

        Ok(Self {
            canvas,
            texture_creator,
            texture: None,
        })
    }

    /// Upload the slot's YUV planes and present the frame, letterboxed
    /// or pillarboxed into the current window.
    pub fn render(&mut self, slot: &VideoSlot) -> Result<()> {
        if slot.width == 0 || slot.height == 0 {
            return Ok(());
        }
        self.ensure_texture(slot.width, slot.height)?;
        let Some(texture) = self.texture.as_mut() else {
            return Ok(());
        };

        let frame = &slot.frame;
        texture
            .update_yuv(
                None,
                frame.data(0),
                frame.stride(0),
                frame.data(1),
                frame.stride(1),
                frame.data(2),
                frame.stride(2),
            )
            .video_err("uploading YUV planes")?;

        let (window_width, window_height) = self.canvas.window().size();
        let rect = display_rect(window_width, window_height, slot.width, slot.height, slot.sar);

        self.canvas.clear();
        self.canvas
            .copy(texture, None, Some(rect))
            .video_err("blitting frame")?;
        self.canvas.present();
        Ok(())
    }

    fn ensure_texture(&mut self, width: u32, height: u32) -> Result<()> {
        let rebuild = match &self.texture {
            Some(texture) => {
                let query = texture.query();
                query.width != width || query.height != height
            }
            None => true,
        };
        if rebuild {
            self.texture = Some(
                self.texture_creator
                    .create_texture_streaming(PixelFormatEnum::IYUV, width, height)
                    .video_err("creating streaming texture")?,
            );
        }
        Ok(())
    }
}

/// Compute the display rectangle for a picture inside a window.
///
/// Display aspect ratio = sample aspect ratio x picture aspect ratio;
/// an invalid SAR counts as square pixels. The picture fills the window
/// along the constraining axis, is centered, and both dimensions are
/// forced even for the chroma subsampling of YUV420.
pub fn display_rect(
    window_width: u32,
    window_height: u32,
    picture_width: u32,
    picture_height: u32,
    sar: ffmpeg::Rational,
) -> Rect {
    let sar = if sar.numerator() <= 0 || sar.denominator() <= 0 {
        1.0
    } else {
        f64::from(sar)
    };
    let aspect_ratio = sar * picture_width as f64 / picture_height as f64;

    let mut height = i64::from(window_height);
    let mut width = ((height as f64 * aspect_ratio).round() as i64) & !1;
    if width > i64::from(window_width) {
        width = i64::from(window_width) & !1;
        height = ((width as f64 / aspect_ratio).round() as i64) & !1;
    }
    let x = (i64::from(window_width) - width) / 2;
    let y = (i64::from(window_height) - height) / 2;

    Rect::new(x as i32, y as i32, width.max(1) as u32, height.max(1) as u32)
}
