//! Opens a render surface and clears it with a slowly cycling colour
//!
//! Keys: `f` toggles fullscreen, `r` halves or restores the window size,
//! `q` quits. Settings are read from `demo_app.toml` when it exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vk_platform::config::Config;
use vk_platform::foundation::logging;
use vk_platform::prelude::*;
use vk_platform::surface::KeyboardEvent;

const CONFIG_PATH: &str = "demo_app.toml";
const HUE_PER_SECOND: f32 = 0.05;

/// Fully saturated colour at `hue` in [0, 1), darkened for comfort
fn hue_to_rgb(hue: f32) -> [f32; 4] {
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    [r * 0.6, g * 0.6, b * 0.6, 1.0]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PlatformConfig::load_or_default(CONFIG_PATH)?;
    logging::init_with_level(&config.logging.default_filter);
    config.validate()?;

    let platform = Arc::new(VulkanPlatform::new(config.renderer)?);
    let hints = config.surface;
    let (width, height) = (hints.width, hints.height);

    let frames = Arc::new(AtomicU64::new(0));
    let frame_counter = Arc::clone(&frames);
    let start = Instant::now();
    let mut commands: Option<Arc<CommandBuffer<VulkanDevice>>> = None;

    let surface = RenderSurface::open(platform, hints, move |ctx| {
        ctx.set_clear_color(hue_to_rgb(start.elapsed().as_secs_f32() * HUE_PER_SECOND));
        if commands.is_none() {
            match ctx.create_command_buffer() {
                Ok(buffer) => {
                    buffer.commit(ctx.surface_command_format(), Vec::new());
                    commands = Some(buffer);
                }
                Err(e) => log::error!("Could not create command buffer: {e}"),
            }
        }
        if let Some(buffer) = &commands {
            ctx.enqueue(ctx.get_surface_target(), Arc::clone(buffer));
        }
        frame_counter.fetch_add(1, Ordering::Relaxed);
    })?;
    log::info!("Surface open, press q to quit");

    let mut fullscreen = false;
    let mut halved = false;
    let mut last_report = Instant::now();
    let mut last_frames = 0;

    while !surface.is_closed() {
        let mut quit = false;
        let mut toggle_fullscreen = false;
        let mut toggle_size = false;
        surface.input().consume_keyboard(|event| match event {
            KeyboardEvent::Char('q') => quit = true,
            KeyboardEvent::Char('f') => toggle_fullscreen = true,
            KeyboardEvent::Char('r') => toggle_size = true,
            _ => {}
        });

        if quit {
            surface.close();
            break;
        }
        if toggle_fullscreen {
            fullscreen = !fullscreen;
            surface.set_fullscreen(fullscreen)?;
        }
        if toggle_size {
            halved = !halved;
            let divisor = if halved { 2 } else { 1 };
            surface.set_width(width / divisor)?;
            surface.set_height(height / divisor)?;
        }
        if surface.take_resized() {
            log::info!("Framebuffer now {}x{}", surface.width(), surface.height());
        }

        let elapsed = last_report.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let total = frames.load(Ordering::Relaxed);
            let fps = (total - last_frames) as f64 / elapsed.as_secs_f64();
            surface.set_title(format!("vk_platform demo - {fps:.0} fps"))?;
            last_frames = total;
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    surface.wait_closed()?;
    log::info!("Rendered {} frames", frames.load(Ordering::Relaxed));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hue_wraps() {
        assert_eq!(hue_to_rgb(0.0), hue_to_rgb(1.0));
        assert_eq!(hue_to_rgb(0.0), [0.6, 0.0, 0.0, 1.0]);
        let green = hue_to_rgb(1.0 / 3.0);
        assert!(green[1] > green[0] && green[1] > green[2]);
    }
}
