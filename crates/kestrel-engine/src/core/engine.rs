use std::path::Path;

use crate::coords::{FrameRect, Transform, Vec3, Viewport};
use crate::device::{GpuDevice, PassSettings};
use crate::error::{EngineError, Result};
use crate::handle::DEFAULT_GROWTH;
use crate::input::{Cursor, InputSample, Key, KeyState, Keyboard};
use crate::paint::Color;
use crate::render::{BatchConfig, BatchManager, Camera, Projection};
use crate::resources::{DecodedImage, Shader, ShaderHandle, ShaderManager, Texture, TextureHandle, TextureManager};
use crate::scene::{Entity, EntityHandle, EntityStore, Vertex};
use crate::time::{Clock, ClockHandle, ClockManager};

const FULL_UV: (f32, f32, f32, f32) = (0.0, 0.0, 1.0, 1.0);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EngineConfig {
    /// Slots added each time a resource table runs out.
    pub growth: usize,
    pub batches: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            growth: DEFAULT_GROWTH,
            batches: BatchConfig::default(),
        }
    }
}

/// The engine context: every resource table, the batches and the device.
///
/// All state lives here; nothing is global. The window runtime drives it
/// once per frame with `advance_frame`, `swap_buffers` and `render`, and
/// tests drive it the same way over a `HeadlessDevice`.
pub struct Engine<D: GpuDevice> {
    device: D,

    entities: EntityStore,
    textures: TextureManager,
    shaders: ShaderManager,
    batches: BatchManager,
    clocks: ClockManager<Engine<D>>,

    fps_clock: ClockHandle,
    frames_since_tick: u32,
    frame_rate: u32,

    keyboard: Keyboard,
    cursor: Cursor,

    camera: Camera,
    clear_color: Color,
    viewport: Viewport,
    depth_test: bool,
}

impl<D: GpuDevice> Engine<D> {
    pub fn new(device: D, config: EngineConfig) -> Result<Self> {
        let mut clocks = ClockManager::with_growth(config.growth);
        let fps_clock = clocks.create()?;
        clocks.set_interval(fps_clock, 1.0)?;
        clocks.start(fps_clock)?;

        Ok(Self {
            device,
            entities: EntityStore::new(config.growth),
            textures: TextureManager::new(config.growth),
            shaders: ShaderManager::new(config.growth),
            batches: BatchManager::new(config.batches, config.growth),
            clocks,
            fps_clock,
            frames_since_tick: 0,
            frame_rate: 0,
            keyboard: Keyboard::new(),
            cursor: Cursor::default(),
            camera: Camera::default(),
            clear_color: Color::BLACK,
            viewport: Viewport::FULL,
            depth_test: true,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn batches(&self) -> &BatchManager {
        &self.batches
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    // ── frame ─────────────────────────────────────────────────────────────

    /// Runs one frame of engine time.
    ///
    /// Updates the cursor and key states from `sample`, then advances every
    /// active clock by `dt` seconds and runs the callbacks of those that fired.
    pub fn advance_frame(&mut self, dt: f64, sample: &InputSample) {
        self.cursor.update(sample);
        self.keyboard.update(&sample.pressed);
        self.frames_since_tick += 1;

        for clock in self.clocks.advance(dt) {
            if clock == self.fps_clock {
                self.frame_rate = self.frames_since_tick;
                self.frames_since_tick = 0;
                continue;
            }
            if let Some(mut callback) = self.clocks.take_callback(clock) {
                callback(self, clock);
                self.clocks.restore_callback(clock, callback);
            }
        }
    }

    /// Presents the current frame and starts the next one cleared to the clear color.
    pub fn swap_buffers(&mut self) {
        self.device.end_frame();
        self.device.begin_frame(self.clear_color);
    }

    /// Issues one indirect multi-draw per non-empty batch.
    pub fn render(&mut self) {
        let (width, height) = self.device.surface_size();
        let (_, _, vw, vh) = self.viewport.to_pixels(width, height);
        let pass = PassSettings {
            viewport: self.viewport,
            depth_test: self.depth_test,
            view_projection: self.camera.view_projection(vw.round() as u32, vh.round() as u32),
        };

        let textures = &self.textures;
        let shaders = &self.shaders;
        let draws = self.batches.draws(|batch| {
            let program = batch
                .shader()
                .and_then(|s| shaders.get(s).ok())
                .and_then(Shader::program);
            let image = batch
                .texture()
                .and_then(|t| textures.get(t).ok())
                .and_then(Texture::gpu_image);
            (program, image)
        });
        self.device.draw(&pass, &draws);
    }

    /// Frames counted during the last full second.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    // ── input ─────────────────────────────────────────────────────────────

    pub fn key_state(&self, key: Key) -> KeyState {
        self.keyboard.state(key)
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    // ── view ──────────────────────────────────────────────────────────────

    pub fn activate_camera(&mut self, projection: Projection) {
        self.camera.projection = projection;
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color.clamped();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        if !viewport.is_valid() {
            return Err(EngineError::InvalidArgument(format!("degenerate viewport {viewport:?}")));
        }
        self.viewport = viewport;
        Ok(())
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    // ── textures ──────────────────────────────────────────────────────────

    pub fn create_texture(&mut self, path: impl AsRef<Path>, frame_count: usize) -> Result<TextureHandle> {
        self.textures.load(&mut self.device, path, frame_count)
    }

    pub fn create_texture_from_image(&mut self, image: DecodedImage, frame_count: usize) -> Result<TextureHandle> {
        self.textures.create(&mut self.device, image, frame_count)
    }

    /// Destroys the texture's batches, clears entity references, then the texture.
    pub fn destroy_texture(&mut self, texture: TextureHandle) -> Result<()> {
        self.textures.get(texture)?;
        let batches = self.batches.destroy_where(&mut self.device, &mut self.entities, |b| {
            b.texture() == Some(texture)
        })?;
        let entities = self.entities.clear_texture(texture);
        self.textures.destroy(&mut self.device, texture)?;
        log::debug!("texture {texture} destroyed ({batches} batches, {entities} entities)");
        Ok(())
    }

    pub fn texture(&self, texture: TextureHandle) -> Result<&Texture> {
        self.textures.get(texture)
    }

    /// Sets a frame rectangle and refreshes every entity showing that frame.
    pub fn set_texture_frame(&mut self, texture: TextureHandle, index: usize, rect: FrameRect) -> Result<()> {
        self.textures.set_frame(texture, index, rect)?;
        let uv = self.textures.frame_uv(texture, index)?;

        let showing: Vec<EntityHandle> = self
            .entities
            .iter()
            .filter(|(_, e)| e.texture() == Some(texture) && e.frame() == index)
            .map(|(h, _)| h)
            .collect();
        for entity in showing {
            self.entities.set_frame(entity, index, uv)?;
            self.batches.sync_vertices(&mut self.device, &self.entities, entity)?;
        }
        Ok(())
    }

    // ── shaders ───────────────────────────────────────────────────────────

    pub fn create_shader(
        &mut self,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<ShaderHandle> {
        self.shaders.load(&mut self.device, vertex_path, fragment_path)
    }

    pub fn create_shader_from_source(&mut self, vertex: &str, fragment: &str) -> Result<ShaderHandle> {
        self.shaders.create(&mut self.device, vertex.to_owned(), fragment.to_owned())
    }

    /// Destroys the shader's batches, clears entity references, then the shader.
    pub fn destroy_shader(&mut self, shader: ShaderHandle) -> Result<()> {
        self.shaders.get(shader)?;
        let batches = self.batches.destroy_where(&mut self.device, &mut self.entities, |b| {
            b.shader() == Some(shader)
        })?;
        let entities = self.entities.clear_shader(shader);
        self.shaders.destroy(&mut self.device, shader)?;
        log::debug!("shader {shader} destroyed ({batches} batches, {entities} entities)");
        Ok(())
    }

    // ── clocks ────────────────────────────────────────────────────────────

    /// Creates a stopped clock with a one second interval.
    pub fn create_clock(&mut self) -> Result<ClockHandle> {
        self.clocks.create()
    }

    pub fn destroy_clock(&mut self, clock: ClockHandle) -> Result<()> {
        self.check_user_clock(clock)?;
        self.clocks.destroy(clock)
    }

    pub fn clock(&self, clock: ClockHandle) -> Result<&Clock> {
        self.clocks.get(clock)
    }

    pub fn start_clock(&mut self, clock: ClockHandle) -> Result<()> {
        self.clocks.start(clock)
    }

    pub fn stop_clock(&mut self, clock: ClockHandle) -> Result<()> {
        self.check_user_clock(clock)?;
        self.clocks.stop(clock)
    }

    pub fn reset_clock(&mut self, clock: ClockHandle) -> Result<()> {
        self.clocks.reset(clock)
    }

    pub fn set_clock_interval(&mut self, clock: ClockHandle, seconds: f64) -> Result<()> {
        self.check_user_clock(clock)?;
        self.clocks.set_interval(clock, seconds)
    }

    /// Installs `callback`, run each time the clock's interval elapses.
    pub fn set_clock_callback(
        &mut self,
        clock: ClockHandle,
        callback: impl FnMut(&mut Self, ClockHandle) + 'static,
    ) -> Result<()> {
        self.check_user_clock(clock)?;
        self.clocks.set_callback(clock, Some(Box::new(callback)))
    }

    pub fn clear_clock_callback(&mut self, clock: ClockHandle) -> Result<()> {
        self.clocks.set_callback(clock, None)
    }

    pub fn clock_elapsed(&self, clock: ClockHandle) -> Result<f64> {
        self.clocks.elapsed(clock)
    }

    /// Fraction of the current interval elapsed, in `[0, 1]`.
    pub fn clock_progress(&self, clock: ClockHandle) -> Result<f64> {
        self.clocks.progress(clock)
    }

    /// The reserved clock measuring `frame_rate`.
    pub fn frame_rate_clock(&self) -> ClockHandle {
        self.fps_clock
    }

    fn check_user_clock(&self, clock: ClockHandle) -> Result<()> {
        if clock == self.fps_clock {
            return Err(EngineError::InvalidArgument(format!(
                "clock {clock} is reserved for the frame rate"
            )));
        }
        Ok(())
    }

    // ── entities ──────────────────────────────────────────────────────────

    pub fn create_sprite(&mut self, width: f32, height: f32) -> Result<EntityHandle> {
        self.entities.create_sprite(width, height)
    }

    pub fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<EntityHandle> {
        self.entities.create_mesh(vertices, indices)
    }

    /// Hides the entity, then frees it.
    pub fn destroy_entity(&mut self, entity: EntityHandle) -> Result<()> {
        self.set_visible(entity, false)?;
        self.entities.release(entity)?;
        Ok(())
    }

    pub fn entity(&self, entity: EntityHandle) -> Result<&Entity> {
        self.entities.get(entity)
    }

    /// Adds the entity to the batch for its texture/shader pair, or takes it
    /// out. Setting the current state again does nothing.
    pub fn set_visible(&mut self, entity: EntityHandle, visible: bool) -> Result<()> {
        let e = self.entities.get(entity)?;
        if e.is_visible() == visible {
            return Ok(());
        }
        if visible {
            let transparent = match e.texture() {
                Some(t) => self.textures.get(t)?.is_transparent(),
                None => false,
            };
            self.batches.add(&mut self.device, &mut self.entities, entity, transparent)?;
        } else {
            self.batches.remove(&mut self.device, &mut self.entities, entity)?;
        }
        Ok(())
    }

    pub fn is_visible(&self, entity: EntityHandle) -> Result<bool> {
        Ok(self.entities.get(entity)?.is_visible())
    }

    /// Binds a texture (`None` for plain white) and resets the frame to 0.
    ///
    /// A visible entity moves to the batch for its new pair.
    pub fn set_entity_texture(&mut self, entity: EntityHandle, texture: Option<TextureHandle>) -> Result<()> {
        let uv = match texture {
            Some(t) => self.textures.frame_uv(t, 0)?,
            None => FULL_UV,
        };
        let visible = self.is_visible(entity)?;
        self.set_visible(entity, false)?;

        self.entities.get_mut(entity)?.texture = texture;
        self.entities.set_frame(entity, 0, uv)?;
        self.set_visible(entity, visible)
    }

    /// Binds a shader (`None` for the built-in sprite program).
    ///
    /// A visible entity moves to the batch for its new pair.
    pub fn set_entity_shader(&mut self, entity: EntityHandle, shader: Option<ShaderHandle>) -> Result<()> {
        if let Some(s) = shader {
            self.shaders.get(s)?;
        }
        let visible = self.is_visible(entity)?;
        self.set_visible(entity, false)?;

        self.entities.get_mut(entity)?.shader = shader;
        self.set_visible(entity, visible)
    }

    /// Shows frame `index` of the entity's texture.
    pub fn set_entity_frame(&mut self, entity: EntityHandle, index: usize) -> Result<()> {
        let uv = match self.entities.get(entity)?.texture() {
            Some(t) => self.textures.frame_uv(t, index)?,
            None if index == 0 => FULL_UV,
            None => {
                return Err(EngineError::InvalidArgument(format!(
                    "entity {entity} has no texture to take frame {index} from"
                )));
            }
        };
        self.entities.set_frame(entity, index, uv)?;
        self.batches.sync_vertices(&mut self.device, &self.entities, entity)
    }

    // ── transforms ────────────────────────────────────────────────────────

    /// Adds `delta` to the position.
    pub fn move_entity(&mut self, entity: EntityHandle, delta: Vec3) -> Result<()> {
        self.edit_transform(entity, |t| t.translate(delta))
    }

    /// Multiplies the scale component-wise by `factor`.
    pub fn scale_entity(&mut self, entity: EntityHandle, factor: Vec3) -> Result<()> {
        self.edit_transform(entity, |t| t.scale_by(factor))
    }

    /// Adds `degrees` to the rotation.
    pub fn rotate_entity(&mut self, entity: EntityHandle, degrees: Vec3) -> Result<()> {
        self.edit_transform(entity, |t| t.rotate(degrees))
    }

    pub fn set_position(&mut self, entity: EntityHandle, position: Vec3) -> Result<()> {
        self.edit_transform(entity, |t| t.position = position)
    }

    pub fn set_scale(&mut self, entity: EntityHandle, scale: Vec3) -> Result<()> {
        self.edit_transform(entity, |t| t.scale = scale)
    }

    pub fn set_rotation(&mut self, entity: EntityHandle, degrees: Vec3) -> Result<()> {
        self.edit_transform(entity, |t| t.rotation = degrees)
    }

    pub fn position(&self, entity: EntityHandle) -> Result<Vec3> {
        Ok(self.entities.get(entity)?.position())
    }

    pub fn scale(&self, entity: EntityHandle) -> Result<Vec3> {
        Ok(self.entities.get(entity)?.scale())
    }

    pub fn rotation(&self, entity: EntityHandle) -> Result<Vec3> {
        Ok(self.entities.get(entity)?.rotation())
    }

    /// Recomposes the matrix and pushes only this entity's transform slot.
    fn edit_transform(&mut self, entity: EntityHandle, edit: impl FnOnce(&mut Transform)) -> Result<()> {
        self.entities.update_transform(entity, edit)?;
        self.batches.sync_transform(&mut self.device, &self.entities, entity)
    }

    // ── teardown ──────────────────────────────────────────────────────────

    /// Destroys every batch, entity, texture, shader and user clock.
    ///
    /// The frame-rate clock survives.
    pub fn clear(&mut self) -> Result<()> {
        self.batches.clear(&mut self.device, &mut self.entities)?;
        for entity in self.entities.handles() {
            self.entities.release(entity)?;
        }
        for texture in self.textures.handles() {
            self.textures.destroy(&mut self.device, texture)?;
        }
        for shader in self.shaders.handles() {
            self.shaders.destroy(&mut self.device, shader)?;
        }
        for clock in self.clocks.handles() {
            if clock != self.fps_clock {
                self.clocks.destroy(clock)?;
            }
        }
        log::debug!("engine cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::device::HeadlessDevice;
    use crate::render::BatchHandle;

    const VS: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";
    const FS: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

    fn engine() -> Engine<HeadlessDevice> {
        Engine::new(HeadlessDevice::new(800, 800), EngineConfig::default()).unwrap()
    }

    fn image(alpha: u8) -> DecodedImage {
        DecodedImage::from_rgba(4, 2, [255, 255, 255, alpha].repeat(8)).unwrap()
    }

    fn batch_of(engine: &Engine<HeadlessDevice>, entity: EntityHandle) -> BatchHandle {
        engine.entity(entity).unwrap().membership().unwrap().batch
    }

    fn frame(engine: &mut Engine<HeadlessDevice>, dt: f64, keys: &[Key]) {
        engine.advance_frame(dt, &InputSample::with_keys(keys));
        engine.swap_buffers();
        engine.render();
    }

    // ── entities ──────────────────────────────────────────────────────────

    #[test]
    fn visible_sprite_reads_back_identity() {
        let mut engine = engine();
        let e = engine.create_sprite(2.0, 2.0).unwrap();
        engine.set_visible(e, true).unwrap();

        assert_eq!(engine.position(e).unwrap(), Vec3::ZERO);
        assert_eq!(engine.scale(e).unwrap(), Vec3::ONE);
        assert!(engine.is_visible(e).unwrap());
    }

    #[test]
    fn set_visible_is_idempotent() {
        let mut engine = engine();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.set_visible(e, true).unwrap();
        engine.set_visible(e, true).unwrap();
        assert_eq!(engine.batches().get(batch_of(&engine, e)).unwrap().len(), 1);

        engine.set_visible(e, false).unwrap();
        engine.set_visible(e, false).unwrap();
        assert!(engine.batches().is_empty());
    }

    #[test]
    fn scale_then_move_composes() {
        let mut engine = engine();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.scale_entity(e, Vec3::new(2.0, 1.0, 1.0)).unwrap();
        engine.move_entity(e, Vec3::new(5.0, 0.0, 0.0)).unwrap();

        let m = engine.entity(e).unwrap().matrix();
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(m.transform_point3(Vec3::new(0.5, 0.0, 0.0)), Vec3::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn deltas_accumulate() {
        let mut engine = engine();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.move_entity(e, Vec3::new(0.0, 5.0, 0.0)).unwrap();
        engine.move_entity(e, Vec3::new(-5.0, 0.0, 0.0)).unwrap();
        engine.rotate_entity(e, Vec3::new(0.0, 0.0, 2.0)).unwrap();
        engine.rotate_entity(e, Vec3::new(0.0, 0.0, 2.0)).unwrap();

        assert_eq!(engine.position(e).unwrap(), Vec3::new(-5.0, 5.0, 0.0));
        assert_eq!(engine.rotation(e).unwrap(), Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn destroy_entity_drops_its_batch() {
        let mut engine = engine();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.set_visible(e, true).unwrap();
        engine.destroy_entity(e).unwrap();

        assert!(engine.batches().is_empty());
        assert!(matches!(engine.entity(e), Err(EngineError::InvalidHandle { .. })));
        assert_eq!(engine.device().live_buffers(), 0);
    }

    #[test]
    fn stale_entity_handle_is_rejected() {
        let mut engine = engine();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.destroy_entity(e).unwrap();

        assert!(engine.move_entity(e, Vec3::X).is_err());
        assert!(engine.set_visible(e, true).is_err());
        assert!(engine.destroy_entity(e).is_err());
    }

    #[test]
    fn mesh_entities_are_unsupported() {
        let mut engine = engine();
        assert!(matches!(engine.create_mesh(&[], &[]), Err(EngineError::Unsupported(_))));
    }

    // ── bindings ──────────────────────────────────────────────────────────

    #[test]
    fn rebinding_texture_moves_entity_between_batches() {
        let mut engine = engine();
        let t = engine.create_texture_from_image(image(255), 1).unwrap();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.set_visible(e, true).unwrap();
        assert_eq!(engine.batches().find(None, None), Some(batch_of(&engine, e)));

        engine.set_entity_texture(e, Some(t)).unwrap();

        assert_eq!(engine.batches().find(None, None), None);
        assert_eq!(engine.batches().len(), 1);
        let textured = batch_of(&engine, e);
        assert_eq!(engine.batches().get(textured).unwrap().texture(), Some(t));
        assert!(engine.is_visible(e).unwrap());
    }

    #[test]
    fn rebinding_hidden_entity_keeps_it_hidden() {
        let mut engine = engine();
        let s = engine.create_shader_from_source(VS, FS).unwrap();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.set_entity_shader(e, Some(s)).unwrap();

        assert!(!engine.is_visible(e).unwrap());
        assert_eq!(engine.entity(e).unwrap().shader(), Some(s));
    }

    #[test]
    fn entity_frame_selects_uvs() {
        let mut engine = engine();
        let t = engine.create_texture_from_image(image(255), 2).unwrap();
        engine.set_texture_frame(t, 1, FrameRect::new(2, 0, 2, 2)).unwrap();

        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.set_entity_texture(e, Some(t)).unwrap();
        engine.set_entity_frame(e, 1).unwrap();

        let uvs: Vec<_> = engine.entity(e).unwrap().geometry().vertices().iter().map(|v| v.uv).collect();
        assert_eq!(uvs, vec![[0.5, 1.0], [1.0, 1.0], [1.0, 0.0], [0.5, 0.0]]);
        assert!(engine.set_entity_frame(e, 2).is_err());
    }

    // ── cascades ──────────────────────────────────────────────────────────

    #[test]
    fn destroying_texture_clears_batches_and_entities() {
        let mut engine = engine();
        let t = engine.create_texture_from_image(image(255), 1).unwrap();
        let a = engine.create_sprite(1.0, 1.0).unwrap();
        let b = engine.create_sprite(1.0, 1.0).unwrap();
        let other = engine.create_sprite(1.0, 1.0).unwrap();
        for e in [a, b] {
            engine.set_entity_texture(e, Some(t)).unwrap();
            engine.set_visible(e, true).unwrap();
        }
        engine.set_visible(other, true).unwrap();

        engine.destroy_texture(t).unwrap();

        for e in [a, b] {
            let entity = engine.entity(e).unwrap();
            assert_eq!(entity.texture(), None);
            assert!(!entity.is_visible());
        }
        assert!(engine.is_visible(other).unwrap());
        assert!(engine.batches().iter().all(|(_, batch)| batch.texture() != Some(t)));
        assert_eq!(engine.device().live_images(), 0);
        assert!(engine.destroy_texture(t).is_err());
    }

    #[test]
    fn destroying_shader_clears_batches_and_entities() {
        let mut engine = engine();
        let s = engine.create_shader_from_source(VS, FS).unwrap();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.set_entity_shader(e, Some(s)).unwrap();
        engine.set_visible(e, true).unwrap();

        engine.destroy_shader(s).unwrap();

        assert_eq!(engine.entity(e).unwrap().shader(), None);
        assert!(engine.batches().is_empty());
        assert_eq!(engine.device().live_programs(), 0);
        assert_eq!(engine.device().live_stages(), 0);
    }

    #[test]
    fn invalid_shader_file_rolls_back() {
        let mut engine = engine();
        let dir = std::env::temp_dir();
        let vs = dir.join(format!("kestrel-engine-{}.vert.wgsl", std::process::id()));
        let fs = dir.join(format!("kestrel-engine-{}.frag.wgsl", std::process::id()));
        std::fs::write(&vs, VS).unwrap();
        std::fs::write(&fs, "fn broken(").unwrap();

        assert!(engine.create_shader(&vs, &fs).is_err());
        assert!(engine.shaders().is_empty());
        assert_eq!(engine.device().live_stages(), 0);
        assert_eq!(engine.device().live_programs(), 0);

        std::fs::remove_file(vs).unwrap();
        std::fs::remove_file(fs).unwrap();
    }

    // ── frame driver ──────────────────────────────────────────────────────

    #[test]
    fn key_edges_follow_polls() {
        let mut engine = engine();
        let mut seen = Vec::new();
        for held in [true, true, true, false, false] {
            let keys: &[Key] = if held { &[Key::W] } else { &[] };
            frame(&mut engine, 0.016, keys);
            seen.push(engine.key_state(Key::W));
        }
        assert_eq!(
            seen,
            vec![KeyState::Pressed, KeyState::Down, KeyState::Down, KeyState::Released, KeyState::Up]
        );
    }

    #[test]
    fn clock_callback_fires_twice_in_two_and_a_half_seconds() {
        let mut engine = engine();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        let clock = engine.create_clock().unwrap();
        let fired = Rc::new(Cell::new(0));

        let count = Rc::clone(&fired);
        engine
            .set_clock_callback(clock, move |engine, _| {
                count.set(count.get() + 1);
                engine.move_entity(e, Vec3::X).unwrap();
            })
            .unwrap();
        engine.start_clock(clock).unwrap();

        for _ in 0..10 {
            frame(&mut engine, 0.25, &[]);
        }

        assert_eq!(fired.get(), 2);
        assert_eq!(engine.position(e).unwrap(), Vec3::new(2.0, 0.0, 0.0));
        assert!(engine.clock(clock).unwrap().accumulated() < 1.0);
        assert_eq!(engine.clock_elapsed(clock).unwrap(), 2.5);
        assert_eq!(engine.clock_progress(clock).unwrap(), 0.5);
    }

    #[test]
    fn callback_may_destroy_its_clock() {
        let mut engine = engine();
        let clock = engine.create_clock().unwrap();
        engine.set_clock_interval(clock, 0.5).unwrap();
        engine
            .set_clock_callback(clock, |engine, me| engine.destroy_clock(me).unwrap())
            .unwrap();
        engine.start_clock(clock).unwrap();

        frame(&mut engine, 1.0, &[]);
        assert!(engine.clock(clock).is_err());
    }

    #[test]
    fn callback_may_clear_itself() {
        let mut engine = engine();
        let clock = engine.create_clock().unwrap();
        let fired = Rc::new(Cell::new(0));

        let count = Rc::clone(&fired);
        engine
            .set_clock_callback(clock, move |engine, me| {
                count.set(count.get() + 1);
                engine.clear_clock_callback(me).unwrap();
            })
            .unwrap();
        engine.start_clock(clock).unwrap();

        for _ in 0..3 {
            frame(&mut engine, 1.0, &[]);
        }
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn replacement_clock_does_not_inherit_callback() {
        let mut engine = engine();
        let clock = engine.create_clock().unwrap();
        let fired = Rc::new(Cell::new(0));
        let reborn = Rc::new(Cell::new(None));

        let (count, slot) = (Rc::clone(&fired), Rc::clone(&reborn));
        engine
            .set_clock_callback(clock, move |engine, me| {
                count.set(count.get() + 1);
                engine.destroy_clock(me).unwrap();
                let next = engine.create_clock().unwrap();
                engine.start_clock(next).unwrap();
                slot.set(Some(next));
            })
            .unwrap();
        engine.start_clock(clock).unwrap();

        for _ in 0..3 {
            frame(&mut engine, 1.0, &[]);
        }
        assert_eq!(fired.get(), 1);
        assert_eq!(reborn.get(), Some(clock));
        assert!(engine.clock(clock).unwrap().is_active());
    }

    #[test]
    fn infinite_frame_delta_is_ignored() {
        let mut engine = engine();
        let clock = engine.create_clock().unwrap();
        engine.set_clock_interval(clock, 0.01).unwrap();
        engine.start_clock(clock).unwrap();

        frame(&mut engine, f64::INFINITY, &[]);
        assert_eq!(engine.clock_elapsed(clock).unwrap(), 0.0);

        frame(&mut engine, 1.0e6, &[]);
        assert_eq!(engine.clock_elapsed(clock).unwrap(), 1.0e6);
    }

    #[test]
    fn frame_rate_counts_frames_per_second() {
        let mut engine = engine();
        assert_eq!(engine.frame_rate_clock().raw(), 1);
        for _ in 0..4 {
            frame(&mut engine, 0.25, &[]);
        }
        assert_eq!(engine.frame_rate(), 4);
    }

    #[test]
    fn frame_rate_clock_is_reserved() {
        let mut engine = engine();
        let fps = engine.frame_rate_clock();
        assert!(engine.destroy_clock(fps).is_err());
        assert!(engine.stop_clock(fps).is_err());
        assert!(engine.set_clock_interval(fps, 2.0).is_err());
    }

    #[test]
    fn render_draws_each_batch_once() {
        let mut engine = engine();
        let t = engine.create_texture_from_image(image(100), 1).unwrap();
        let sprites: Vec<_> = (0..3).map(|_| engine.create_sprite(1.0, 1.0).unwrap()).collect();
        for &e in &sprites {
            engine.set_visible(e, true).unwrap();
        }
        engine.set_entity_texture(sprites[2], Some(t)).unwrap();
        engine.set_clear_color(Color::BLUE);

        frame(&mut engine, 0.016, &[]);

        let draws = engine.device().draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].commands.len(), 2);
        assert_eq!(draws[0].image, None);
        assert!(draws[1].image.is_some());
        assert_eq!(engine.device().last_clear(), Some(Color::BLUE));
        assert!(engine.device().violations().is_empty());
    }

    #[test]
    fn swap_presents_previous_frame() {
        let mut engine = engine();
        frame(&mut engine, 0.016, &[]);
        frame(&mut engine, 0.016, &[]);
        assert_eq!(engine.device().frames_presented(), 1);
    }

    #[test]
    fn viewport_must_have_extent() {
        let mut engine = engine();
        assert!(engine.set_viewport(Viewport::new(0.0, 0.0, 0.0, 1.0)).is_err());
        engine.set_viewport(Viewport::new(0.0, 0.0, 0.5, 0.5)).unwrap();
        frame(&mut engine, 0.016, &[]);

        let pass = engine.device().last_pass().unwrap();
        assert_eq!(pass.viewport, Viewport::new(0.0, 0.0, 0.5, 0.5));
        assert!(pass.depth_test);
    }

    #[test]
    fn depth_test_is_on_until_disabled() {
        let mut engine = engine();
        assert!(engine.depth_test());
        engine.set_depth_test(false);
        frame(&mut engine, 0.016, &[]);
        assert!(!engine.device().last_pass().unwrap().depth_test);
    }

    // ── teardown ──────────────────────────────────────────────────────────

    #[test]
    fn clear_releases_everything() {
        let mut engine = engine();
        let t = engine.create_texture_from_image(image(255), 1).unwrap();
        let s = engine.create_shader_from_source(VS, FS).unwrap();
        let e = engine.create_sprite(1.0, 1.0).unwrap();
        engine.set_entity_texture(e, Some(t)).unwrap();
        engine.set_entity_shader(e, Some(s)).unwrap();
        engine.set_visible(e, true).unwrap();
        engine.create_clock().unwrap();

        engine.clear().unwrap();

        let device = engine.device();
        assert_eq!(
            (device.live_buffers(), device.live_formats(), device.live_images()),
            (0, 0, 0)
        );
        assert_eq!((device.live_stages(), device.live_programs()), (0, 0));
        assert!(engine.entities().is_empty());
        assert!(engine.clock(engine.frame_rate_clock()).is_ok());
        assert!(device.violations().is_empty());
    }
}
