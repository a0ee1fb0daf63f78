//! GLFW window owned by the surface thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use glfw::{ClientApiHint, WindowEvent, WindowHint, WindowMode};

use super::input::SurfaceInputContext;
use super::{SurfaceCommand, SurfaceError, SurfaceResult, SurfaceState};
use crate::core::config::SurfaceConfig;
use crate::foundation::sync::lock;
use crate::render::backends::vulkan::{VulkanDevice, VulkanPlatform};
use crate::render::{FrameCycle, FrameOutcome, RenderContext};

/// Longest wait for events while the window is minimised
const IDLE_WAIT_SECS: f64 = 0.1;

/// Everything the surface thread needs, moved into it at spawn
pub(super) struct SurfaceThread<F> {
    pub platform: Arc<VulkanPlatform>,
    pub hints: SurfaceConfig,
    pub state: Arc<Mutex<SurfaceState>>,
    pub input: Arc<SurfaceInputContext>,
    pub commands: Receiver<SurfaceCommand>,
    pub close: Arc<AtomicBool>,
    pub ready: SyncSender<SurfaceResult<()>>,
    pub update: F,
}

struct SurfaceWindow {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, WindowEvent)>,
    windowed_size: (u32, u32),
}

impl SurfaceWindow {
    fn open(hints: &SurfaceConfig) -> SurfaceResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| SurfaceError::GlfwInit(format!("{e:?}")))?;
        glfw.window_hint(WindowHint::ClientApi(ClientApiHint::NoApi));
        glfw.window_hint(WindowHint::Resizable(hints.resizable));

        let created = if hints.fullscreen {
            glfw.with_primary_monitor(|glfw, monitor| {
                let mode = monitor.map_or(WindowMode::Windowed, |m| WindowMode::FullScreen(m));
                glfw.create_window(hints.width, hints.height, &hints.title, mode)
            })
        } else {
            glfw.create_window(hints.width, hints.height, &hints.title, WindowMode::Windowed)
        };
        let (mut window, events) = created.ok_or(SurfaceError::WindowCreation)?;

        window.set_key_polling(true);
        window.set_char_polling(true);
        window.set_mouse_button_polling(true);
        window.set_cursor_pos_polling(true);
        window.set_scroll_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_size_polling(true);
        window.set_close_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
            windowed_size: (hints.width, hints.height),
        })
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (
            u32::try_from(width).unwrap_or(0),
            u32::try_from(height).unwrap_or(0),
        )
    }

    /// Move pending window events into the input queues and surface state
    fn drain_events(&self, state: &Mutex<SurfaceState>, input: &SurfaceInputContext) {
        for (_, event) in glfw::flush_messages(&self.events) {
            if input.push_window_event(&event) {
                continue;
            }
            match event {
                WindowEvent::FramebufferSize(width, height) => {
                    lock(state).framebuffer_resized(
                        u32::try_from(width).unwrap_or(0),
                        u32::try_from(height).unwrap_or(0),
                    );
                }
                WindowEvent::Size(width, height) => {
                    lock(state).window_resized(
                        u32::try_from(width).unwrap_or(0),
                        u32::try_from(height).unwrap_or(0),
                    );
                }
                WindowEvent::Close => lock(state).close_requested = true,
                _ => {}
            }
        }
    }

    fn apply(&mut self, command: SurfaceCommand) {
        match command {
            SurfaceCommand::Resize { width, height } => {
                self.windowed_size = (width, height);
                self.window.set_size(clamp_i32(width), clamp_i32(height));
            }
            SurfaceCommand::SetTitle(title) => self.window.set_title(&title),
            SurfaceCommand::SetVisible(true) => self.window.show(),
            SurfaceCommand::SetVisible(false) => self.window.hide(),
            SurfaceCommand::SetResizable(resizable) => self.window.set_resizable(resizable),
            SurfaceCommand::SetFullscreen(fullscreen) => self.set_fullscreen(fullscreen),
        }
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        let (width, height) = self.windowed_size;
        let window = &mut self.window;
        if fullscreen {
            self.glfw.with_primary_monitor(|_, monitor| match monitor {
                Some(m) => window.set_monitor(WindowMode::FullScreen(m), 0, 0, width, height, None),
                None => log::warn!("No primary monitor, staying windowed"),
            });
        } else {
            window.set_monitor(WindowMode::Windowed, 100, 100, width, height, None);
        }
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl<F> SurfaceThread<F>
where
    F: FnMut(&mut RenderContext<VulkanDevice>),
{
    /// Thread body; setup failures are reported through `ready` instead
    pub(super) fn run(mut self) -> SurfaceResult<()> {
        let mut window = match SurfaceWindow::open(&self.hints) {
            Ok(window) => window,
            Err(e) => {
                let _ = self.ready.send(Err(e));
                return Ok(());
            }
        };
        let surface = match self.platform.instance().create_surface(&window.window) {
            Ok(surface) => surface,
            Err(e) => {
                let _ = self.ready.send(Err(SurfaceError::VulkanSurface(e)));
                return Ok(());
            }
        };

        let result = self.drive(&mut window, surface);
        self.platform.instance().destroy_surface(surface);
        window.window.set_should_close(true);
        lock(&self.state).closed = true;
        log::info!("Render surface '{}' closed", self.hints.title);
        result
    }

    fn drive(&mut self, window: &mut SurfaceWindow, surface: ash::vk::SurfaceKHR) -> SurfaceResult<()> {
        let (width, height) = window.framebuffer_size();
        let extent = {
            let mut state = lock(&self.state);
            state.set_framebuffer_size(width, height);
            state.frame_extent()
        };
        let setup = self
            .platform
            .device_for_surface(surface, self.hints.fallback_on_incompatible_parent)
            .and_then(|device| FrameCycle::new(device, surface, extent, self.platform.config()));
        let mut cycle = match setup {
            Ok(cycle) => cycle,
            Err(e) => {
                let _ = self.ready.send(Err(e.into()));
                return Ok(());
            }
        };
        let _ = self.ready.send(Ok(()));
        log::info!("Render surface '{}' open ({width}x{height})", self.hints.title);

        let mut skipped = false;
        loop {
            if self.close.load(Ordering::Acquire) || window.window.should_close() {
                break;
            }
            if skipped || lock(&self.state).frame_extent().is_zero() {
                window.glfw.wait_events_timeout(IDLE_WAIT_SECS);
            } else {
                window.glfw.poll_events();
            }
            window.drain_events(&self.state, &self.input);
            if lock(&self.state).close_requested {
                break;
            }
            for command in self.commands.try_iter() {
                window.apply(command);
            }

            let extent = lock(&self.state).frame_extent();
            let outcome = cycle.run_frame(extent, &mut self.update).map_err(|e| {
                log::error!("Frame failed on '{}': {e}", self.hints.title);
                SurfaceError::Render(e)
            })?;
            skipped = outcome == FrameOutcome::Skipped;
            if !skipped {
                lock(&self.state).just_resized = false;
            }
        }
        Ok(())
    }
}
