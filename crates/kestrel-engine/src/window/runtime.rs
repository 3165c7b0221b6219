use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{CursorGrabMode, Window as WinitWindow, WindowAttributes, WindowId};

use crate::coords::Viewport;
use crate::core::{Engine, EngineConfig};
use crate::device::{Gpu, GpuDevice, GpuInit, WgpuDevice};
use crate::input::InputState;
use crate::input::platform::apply_window_event;
use crate::paint::Color;
use crate::time::FrameClock;

/// Pumps allowed while waiting for the platform to hand out the window.
const CREATE_PUMPS: usize = 200;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    /// Outer position in physical pixels.
    pub x: i32,
    pub y: i32,
    /// Inner size in physical pixels.
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    /// A hidden cursor is also grabbed, and raw motion is reported as cursor delta.
    pub cursor_visible: bool,
    pub gpu: GpuInit,
    pub engine: EngineConfig,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "kestrel".to_string(),
            x: 0,
            y: 0,
            width: 800,
            height: 600,
            vsync: true,
            cursor_visible: true,
            gpu: GpuInit::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Receives winit callbacks during a pump and records what the frame needs.
struct Host {
    attributes: Option<WindowAttributes>,
    window: Option<Arc<WinitWindow>>,
    error: Option<anyhow::Error>,

    input: InputState,
    resized: Option<PhysicalSize<u32>>,
    close_requested: bool,
}

impl Host {
    fn new(attributes: WindowAttributes) -> Self {
        Self {
            attributes: Some(attributes),
            window: None,
            error: None,
            input: InputState::new(),
            resized: None,
            close_requested: false,
        }
    }
}

impl ApplicationHandler for Host {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => {
                self.error = Some(anyhow::Error::new(e).context("failed to create window"));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if apply_window_event(&mut self.input, &event) {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.close_requested = true,
            WindowEvent::Resized(size) => self.resized = Some(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    self.resized = Some(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.raw_motion(dx as f32, dy as f32);
        }
    }
}

/// A platform window driving one engine.
///
/// The event loop runs in pump mode so the caller owns the main loop:
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// let mut window = kestrel_engine::window::Window::create(Default::default())?;
/// while window.prepare() {
///     window.render();
/// }
/// window.destroy();
/// # Ok(())
/// # }
/// ```
pub struct Window {
    // Field order is drop order: the engine's surface must go before the window.
    engine: Engine<WgpuDevice>,
    window: Arc<WinitWindow>,
    host: Host,
    event_loop: EventLoop<()>,

    clock: FrameClock,
    focused: bool,
    vsync: bool,
    cursor_visible: bool,
}

impl Window {
    pub fn create(config: WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("failed to create winit EventLoop")?;

        let attributes = WinitWindow::default_attributes()
            .with_title(config.title.clone())
            .with_position(PhysicalPosition::new(config.x, config.y))
            .with_inner_size(PhysicalSize::new(config.width.max(1), config.height.max(1)));
        let mut host = Host::new(attributes);

        let mut pumps = 0;
        let window = loop {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::from_millis(5)), &mut host)
            {
                if let Some(e) = host.error.take() {
                    return Err(e);
                }
                bail!("event loop exited with code {code} before the window opened");
            }
            if let Some(e) = host.error.take() {
                return Err(e);
            }
            if let Some(window) = &host.window {
                break Arc::clone(window);
            }
            pumps += 1;
            if pumps >= CREATE_PUMPS {
                bail!("platform never resumed the event loop");
            }
        };

        let size = window.inner_size();
        log::info!("window \"{}\" opened at {}x{}", config.title, size.width, size.height);

        let gpu = pollster::block_on(Gpu::new(Arc::clone(&window), config.gpu, config.vsync))
            .context("failed to initialize GPU for window")?;
        let device = WgpuDevice::new(gpu)?;
        let mut engine = Engine::new(device, config.engine).context("failed to create engine")?;

        let clear = engine.clear_color();
        engine.device_mut().begin_frame(clear);

        let mut this = Self {
            engine,
            window,
            host,
            event_loop,
            clock: FrameClock::new(),
            focused: true,
            vsync: config.vsync,
            cursor_visible: true,
        };
        this.set_cursor_visible(config.cursor_visible);
        Ok(this)
    }

    /// Tears down every engine resource, then the window.
    pub fn destroy(mut self) {
        if let Err(e) = self.engine.clear() {
            log::error!("engine teardown failed: {e}");
        }
        self.engine.device_mut().end_frame();
        log::info!("window \"{}\" closed", self.window.title());
    }

    /// Polls platform events and runs one engine frame.
    ///
    /// Returns false once the window was asked to close; the frame is not
    /// advanced in that case.
    pub fn prepare(&mut self) -> bool {
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.host);
        if let PumpStatus::Exit(code) = status {
            log::debug!("event loop exited with code {code}");
            self.host.close_requested = true;
        }

        if let Some(size) = self.host.resized.take() {
            self.engine.device_mut().resize(size.width, size.height);
        }
        if self.host.close_requested {
            return false;
        }

        // Time spent unfocused does not count as one long frame.
        let focused = self.host.input.is_focused();
        if focused && !self.focused {
            self.clock.reset();
        }
        self.focused = focused;

        let dt = self.clock.tick();
        let height = self.window.inner_size().height as f32;
        let sample = self.host.input.sample(height, !self.cursor_visible);
        self.engine.advance_frame(f64::from(dt), &sample);
        self.engine.swap_buffers();
        true
    }

    /// Draws every batch into the current frame.
    pub fn render(&mut self) {
        self.engine.render();
    }

    pub fn engine(&self) -> &Engine<WgpuDevice> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<WgpuDevice> {
        &mut self.engine
    }

    // ── window properties ─────────────────────────────────────────────────

    /// Outer position, or `None` where the platform does not report it.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.window.outer_position().ok().map(|p| (p.x, p.y))
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.window.set_outer_position(PhysicalPosition::new(x, y));
    }

    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Requests a new inner size. Platforms that resize synchronously apply it
    /// at once; the rest report it through the next `prepare`.
    pub fn set_size(&mut self, width: u32, height: u32) {
        let requested = PhysicalSize::new(width.max(1), height.max(1));
        if let Some(size) = self.window.request_inner_size(requested) {
            self.engine.device_mut().resize(size.width, size.height);
        }
    }

    pub fn title(&self) -> String {
        self.window.title()
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
        self.engine.device_mut().set_vsync(vsync);
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    /// Shows or hides the cursor. A hidden cursor is locked to the window,
    /// or confined where locking is unsupported.
    pub fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor_visible = visible;
        self.window.set_cursor_visible(visible);

        let grab = if visible {
            self.window.set_cursor_grab(CursorGrabMode::None)
        } else {
            self.window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined))
        };
        if let Err(e) = grab {
            log::warn!("cursor grab unavailable: {e}");
        }
    }

    pub fn clear_color(&self) -> Color {
        self.engine.clear_color()
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.engine.set_clear_color(color);
    }

    pub fn viewport(&self) -> Viewport {
        self.engine.viewport()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> crate::Result<()> {
        self.engine.set_viewport(viewport)
    }

    pub fn depth_test(&self) -> bool {
        self.engine.depth_test()
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.engine.set_depth_test(enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_visible_vsynced_window() {
        let config = WindowConfig::default();
        assert!(config.vsync);
        assert!(config.cursor_visible);
        assert!(config.width > 0 && config.height > 0);
        assert_eq!(config.engine, EngineConfig::default());
    }
}
