use anyhow::Result;

use kestrel_engine::coords::Vec3;
use kestrel_engine::input::{Key, KeyState};
use kestrel_engine::logging::{init_logging, LoggingConfig};
use kestrel_engine::paint::Color;
use kestrel_engine::render::Projection;
use kestrel_engine::resources::DecodedImage;
use kestrel_engine::window::{Window, WindowConfig};

const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders");

const MOVE_STEP: f32 = 5.0;
const TURN_STEP: f32 = 2.0;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let mut window = Window::create(WindowConfig {
        title: "Example".to_string(),
        x: 100,
        y: 100,
        width: 800,
        height: 800,
        ..WindowConfig::default()
    })?;

    let result = run(&mut window);
    window.destroy();
    result
}

fn run(window: &mut Window) -> Result<()> {
    window.set_clear_color(Color::rgb(0.08, 0.09, 0.12));

    let engine = window.engine_mut();
    engine.activate_camera(Projection::Orthographic);

    let texture = engine.create_texture_from_image(checkerboard(64, 8)?, 1)?;
    let shader = engine.create_shader(
        format!("{SHADER_DIR}/sprite.vert.wgsl"),
        format!("{SHADER_DIR}/sprite.frag.wgsl"),
    )?;

    let sprite = engine.create_sprite(0.5, 0.5)?;
    engine.set_entity_texture(sprite, Some(texture))?;
    engine.set_entity_shader(sprite, Some(shader))?;
    engine.scale_entity(sprite, Vec3::new(200.0, 200.0, 1.0))?;
    engine.set_visible(sprite, true)?;

    let fps_log = engine.create_clock()?;
    engine.set_clock_callback(fps_log, |engine, _| {
        log::info!("{} fps", engine.frame_rate());
    })?;
    engine.start_clock(fps_log)?;

    while window.prepare() {
        let engine = window.engine_mut();
        if engine.key_state(Key::Escape) == KeyState::Pressed {
            break;
        }

        let mut step = Vec3::ZERO;
        if engine.key_state(Key::W).is_held() {
            step.y += MOVE_STEP;
        }
        if engine.key_state(Key::S).is_held() {
            step.y -= MOVE_STEP;
        }
        if engine.key_state(Key::A).is_held() {
            step.x -= MOVE_STEP;
        }
        if engine.key_state(Key::D).is_held() {
            step.x += MOVE_STEP;
        }
        if step != Vec3::ZERO {
            engine.move_entity(sprite, step)?;
        }

        if engine.key_state(Key::Q).is_held() {
            engine.rotate_entity(sprite, Vec3::new(0.0, 0.0, -TURN_STEP))?;
        }
        if engine.key_state(Key::E).is_held() {
            engine.rotate_entity(sprite, Vec3::new(0.0, 0.0, TURN_STEP))?;
        }

        window.render();
    }

    Ok(())
}

/// Two-tone RGBA checkerboard, `size` pixels square with `cells` cells per side.
fn checkerboard(size: u32, cells: u32) -> kestrel_engine::Result<DecodedImage> {
    let cell = (size / cells.max(1)).max(1);
    let light = [236, 228, 212, 255];
    let dark = [52, 120, 168, 255];

    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        for x in 0..size {
            let even = (x / cell + y / cell) % 2 == 0;
            pixels.extend_from_slice(if even { &light } else { &dark });
        }
    }
    DecodedImage::from_rgba(size, size, pixels)
}
