//! SDL2 Window Display Module
//! Shows canonical frames in a window through an IYUV streaming texture.

use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use tracing::info;

use super::RenderSink;
use crate::capture::frame::Frame;
use crate::error::{Error, Result};
use crate::DisplayConfig;

/// SDL2 Window Display
/// Owns the SDL context, so it must stay on the thread that created it.
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    frame_width: u32,
    frame_height: u32,
    _sdl: sdl2::Sdl,
}

impl Sdl2Display {
    /// Open a window sized per `config` for frames of `frame_width`x`frame_height`.
    pub fn new(config: &DisplayConfig, frame_width: u32, frame_height: u32) -> Result<Self> {
        let sdl = sdl2::init().map_err(Error::config)?;
        let video_subsystem = sdl.video().map_err(Error::config)?;

        let window = video_subsystem
            .window(&config.title, config.width, config.height)
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| Error::config(e.to_string()))?;

        let canvas = window
            .into_canvas()
            .present_vsync()
            .build()
            .map_err(|e| Error::config(e.to_string()))?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl.event_pump().map_err(Error::config)?;

        info!(
            window = ?(config.width, config.height),
            frame = ?(frame_width, frame_height),
            "display ready"
        );

        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            frame_width,
            frame_height,
            _sdl: sdl,
        })
    }

    /// Drain pending window events. Fails with [`Error::SinkClosed`] once
    /// the operator closes the window.
    fn pump_events(&mut self) -> Result<()> {
        for event in self.event_pump.poll_iter() {
            if let Event::Quit { .. } = event {
                info!("Quit event received");
                return Err(Error::SinkClosed);
            }
        }
        Ok(())
    }
}

impl RenderSink for Sdl2Display {
    fn draw(&mut self, frame: &Frame) -> Result<()> {
        self.pump_events()?;

        if frame.width() != self.frame_width || frame.height() != self.frame_height {
            return Err(Error::config(format!(
                "display opened for {}x{}, got {}x{} frame",
                self.frame_width,
                self.frame_height,
                frame.width(),
                frame.height()
            )));
        }

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::IYUV, self.frame_width, self.frame_height)
            .map_err(|e| Error::device("display", e))?;

        let chroma_pitch = frame.chroma_width() as usize;
        texture
            .update_yuv(
                None,
                frame.y(),
                frame.width() as usize,
                frame.u(),
                chroma_pitch,
                frame.v(),
                chroma_pitch,
            )
            .map_err(|e| Error::device("display", e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| Error::device("display", e))?;
        self.canvas.present();
        Ok(())
    }
}
