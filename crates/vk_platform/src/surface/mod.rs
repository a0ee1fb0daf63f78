//! # Render surfaces
//!
//! A render surface is a GLFW window with its own thread. The thread owns the
//! window, the Vulkan surface and the [`FrameCycle`](crate::render::FrameCycle);
//! the host talks to it through shared [`SurfaceState`], a command channel and
//! the [`SurfaceInputContext`] queues.
//!
//! ```text
//! host thread                      surface thread
//! ───────────                      ──────────────
//! RenderSurface::open ──spawn────► GLFW init, window, VkSurface, device, frame cycle
//!        ◄─────────────ready─────┘
//! set_title / set_width ──cmd────► poll events → apply commands → run_frame(update)
//! consume_keyboard ◄──input queues─┘
//! close / wait_closed ──flag─────► drop frame cycle, destroy surface and window
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use ash::vk;
use thiserror::Error;

use crate::core::config::SurfaceConfig;
use crate::foundation::sync::lock;
use crate::render::backends::vulkan::{VulkanDevice, VulkanPlatform};
use crate::render::{RenderContext, RenderError, SurfaceExtent};

pub mod controller;
pub mod input;
mod window;

pub use controller::{
    Controller, GlfwJoysticks, GlobalInputContext, HatState, JoystickReading, JoystickSource,
    MAX_CONTROLLERS,
};
pub use input::{
    CursorEvent, InputAction, KeyboardEvent, MouseButtonEvent, ScrollEvent, SurfaceInputContext,
};

use window::SurfaceThread;

/// Window layer errors
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// GLFW could not be initialised on the surface thread
    #[error("GLFW initialization failed: {0}")]
    GlfwInit(String),

    /// GLFW refused to create the window
    #[error("Window creation failed")]
    WindowCreation,

    /// GLFW could not create a Vulkan surface for the window
    #[error("Vulkan surface creation failed: {0:?}")]
    VulkanSurface(vk::Result),

    /// Creation hints were rejected
    #[error("Invalid surface hints: {0}")]
    InvalidHints(String),

    /// The OS refused to start the surface thread
    #[error("Failed to spawn surface thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// The surface thread panicked
    #[error("Surface thread panicked")]
    ThreadPanicked,

    /// The surface has already closed
    #[error("Render surface is closed")]
    Closed,

    /// Rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result type for surface operations
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Window state shared between the host and the surface thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceState {
    /// Framebuffer width in pixels
    pub width: u32,
    /// Framebuffer height in pixels
    pub height: u32,
    /// Window width in screen coordinates, as last requested or reported
    pub window_width: u32,
    /// Window height in screen coordinates, as last requested or reported
    pub window_height: u32,
    /// Window title
    pub title: String,
    /// On the primary monitor in fullscreen
    pub fullscreen: bool,
    /// Shown on screen
    pub visible: bool,
    /// User may resize the window
    pub resizable: bool,
    /// Size changed since the host last asked
    pub resized: bool,
    /// Size changed since the last frame's update
    pub just_resized: bool,
    /// The user asked the window to close
    pub close_requested: bool,
    /// The surface thread has finished
    pub closed: bool,
}

impl SurfaceState {
    /// State of a surface about to be opened with `hints`
    pub fn new(hints: &SurfaceConfig) -> Self {
        Self {
            width: hints.width,
            height: hints.height,
            window_width: hints.width,
            window_height: hints.height,
            title: hints.title.clone(),
            fullscreen: hints.fullscreen,
            visible: true,
            resizable: hints.resizable,
            resized: false,
            just_resized: false,
            close_requested: false,
            closed: false,
        }
    }

    /// Record the framebuffer size without flagging a resize
    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Record a framebuffer size change reported by the window
    pub fn framebuffer_resized(&mut self, width: u32, height: u32) {
        self.set_framebuffer_size(width, height);
        self.resized = true;
        self.just_resized = true;
    }

    /// Record the window size reported by the window system
    pub fn window_resized(&mut self, width: u32, height: u32) {
        self.window_width = width;
        self.window_height = height;
    }

    /// Extent the next frame renders at
    pub const fn frame_extent(&self) -> SurfaceExtent {
        SurfaceExtent {
            width: self.width,
            height: self.height,
            just_resized: self.just_resized,
        }
    }
}

/// Window change requested by the host, applied on the surface thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCommand {
    /// Resize the window
    Resize {
        /// New width
        width: u32,
        /// New height
        height: u32,
    },
    /// Change the title
    SetTitle(String),
    /// Enter or leave fullscreen
    SetFullscreen(bool),
    /// Show or hide the window
    SetVisible(bool),
    /// Allow or forbid user resizing
    SetResizable(bool),
}

/// Host-side handle to a window with its own render thread
pub struct RenderSurface {
    state: Arc<Mutex<SurfaceState>>,
    input: Arc<SurfaceInputContext>,
    commands: Sender<SurfaceCommand>,
    close: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<SurfaceResult<()>>>>,
}

impl RenderSurface {
    /// Open a window and start rendering to it
    ///
    /// `update` runs once per frame on the surface thread, between image
    /// acquisition and submission. Returns once the first frame can be rendered,
    /// or with the error that prevented it.
    pub fn open<F>(
        platform: Arc<VulkanPlatform>,
        hints: SurfaceConfig,
        update: F,
    ) -> SurfaceResult<Self>
    where
        F: FnMut(&mut RenderContext<VulkanDevice>) + Send + 'static,
    {
        hints.validate().map_err(SurfaceError::InvalidHints)?;
        let state = Arc::new(Mutex::new(SurfaceState::new(&hints)));
        let input = Arc::new(SurfaceInputContext::new());
        let close = Arc::new(AtomicBool::new(false));
        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let name = format!("surface: {}", hints.title);
        let body = SurfaceThread {
            platform,
            hints,
            state: Arc::clone(&state),
            input: Arc::clone(&input),
            commands: command_rx,
            close: Arc::clone(&close),
            ready: ready_tx,
            update,
        };
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || body.run())?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                state,
                input,
                commands,
                close,
                thread: Mutex::new(Some(handle)),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => match handle.join() {
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(SurfaceError::Closed),
                Err(_) => Err(SurfaceError::ThreadPanicked),
            },
        }
    }

    /// Snapshot of the shared state
    pub fn state(&self) -> SurfaceState {
        lock(&self.state).clone()
    }

    /// Framebuffer width
    pub fn width(&self) -> u32 {
        lock(&self.state).width
    }

    /// Framebuffer height
    pub fn height(&self) -> u32 {
        lock(&self.state).height
    }

    /// Window size in screen coordinates; differs from the framebuffer on HiDPI
    pub fn window_size(&self) -> (u32, u32) {
        let state = lock(&self.state);
        (state.window_width, state.window_height)
    }

    /// Window title
    pub fn title(&self) -> String {
        lock(&self.state).title.clone()
    }

    /// Fullscreen flag
    pub fn is_fullscreen(&self) -> bool {
        lock(&self.state).fullscreen
    }

    /// Visibility flag
    pub fn is_visible(&self) -> bool {
        lock(&self.state).visible
    }

    /// Whether the surface thread has finished
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Whether the size changed since the last call; clears the flag
    pub fn take_resized(&self) -> bool {
        std::mem::take(&mut lock(&self.state).resized)
    }

    /// Input queues
    pub const fn input(&self) -> &Arc<SurfaceInputContext> {
        &self.input
    }

    fn send(&self, command: SurfaceCommand) -> SurfaceResult<()> {
        self.commands.send(command).map_err(|_| SurfaceError::Closed)
    }

    /// Resize the window, keeping its height
    ///
    /// The framebuffer size follows once the window system applies it.
    pub fn set_width(&self, width: u32) -> SurfaceResult<()> {
        let height = {
            let mut state = lock(&self.state);
            state.window_width = width;
            state.window_height
        };
        self.send(SurfaceCommand::Resize { width, height })
    }

    /// Resize the window, keeping its width
    pub fn set_height(&self, height: u32) -> SurfaceResult<()> {
        let width = {
            let mut state = lock(&self.state);
            state.window_height = height;
            state.window_width
        };
        self.send(SurfaceCommand::Resize { width, height })
    }

    /// Change the window title
    pub fn set_title(&self, title: impl Into<String>) -> SurfaceResult<()> {
        let title = title.into();
        lock(&self.state).title.clone_from(&title);
        self.send(SurfaceCommand::SetTitle(title))
    }

    /// Enter or leave fullscreen
    pub fn set_fullscreen(&self, fullscreen: bool) -> SurfaceResult<()> {
        lock(&self.state).fullscreen = fullscreen;
        self.send(SurfaceCommand::SetFullscreen(fullscreen))
    }

    /// Show or hide the window
    pub fn set_visible(&self, visible: bool) -> SurfaceResult<()> {
        lock(&self.state).visible = visible;
        self.send(SurfaceCommand::SetVisible(visible))
    }

    /// Allow or forbid user resizing
    pub fn set_resizable(&self, resizable: bool) -> SurfaceResult<()> {
        lock(&self.state).resizable = resizable;
        self.send(SurfaceCommand::SetResizable(resizable))
    }

    /// Ask the surface thread to finish its current frame and exit
    pub fn close(&self) {
        self.close.store(true, Ordering::Release);
    }

    /// Block until the surface thread exits, returning the error that ended it
    ///
    /// Later calls return `Ok(())`.
    pub fn wait_closed(&self) -> SurfaceResult<()> {
        let Some(handle) = lock(&self.thread).take() else {
            return Ok(());
        };
        handle.join().map_err(|_| SurfaceError::ThreadPanicked)?
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        self.close();
        if let Err(e) = self.wait_closed() {
            log::error!("Render surface ended with an error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(thread: JoinHandle<SurfaceResult<()>>) -> (RenderSurface, mpsc::Receiver<SurfaceCommand>) {
        let (commands, command_rx) = mpsc::channel();
        let surface = RenderSurface {
            state: Arc::new(Mutex::new(SurfaceState::new(&SurfaceConfig::new(
                800, 600, "test",
            )))),
            input: Arc::new(SurfaceInputContext::new()),
            commands,
            close: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(Some(thread)),
        };
        (surface, command_rx)
    }

    #[test]
    fn test_state_from_hints() {
        let hints = SurfaceConfig::new(1024, 768, "hints").with_fullscreen(true);
        let state = SurfaceState::new(&hints);
        assert_eq!((state.width, state.height), (1024, 768));
        assert!(state.fullscreen);
        assert!(state.visible);
        assert!(!state.resized);
        assert_eq!(state.frame_extent(), SurfaceExtent::new(1024, 768));
    }

    #[test]
    fn test_resize_flags() {
        let mut state = SurfaceState::new(&SurfaceConfig::default());
        state.set_framebuffer_size(640, 480);
        assert!(!state.just_resized);

        state.framebuffer_resized(0, 480);
        assert!(state.resized);
        assert!(state.frame_extent().just_resized);
        assert!(state.frame_extent().is_zero());
    }

    #[test]
    fn test_setters_update_state_and_queue_commands() {
        let (surface, commands) = detached(std::thread::spawn(|| Ok(())));

        surface.set_title("renamed").unwrap();
        surface.set_width(1280).unwrap();
        surface.set_height(720).unwrap();
        surface.set_fullscreen(true).unwrap();
        surface.set_visible(false).unwrap();

        assert_eq!(surface.title(), "renamed");
        assert_eq!(surface.window_size(), (1280, 720));
        assert!(surface.is_fullscreen());
        assert!(!surface.is_visible());
        assert_eq!(
            commands.try_iter().collect::<Vec<_>>(),
            vec![
                SurfaceCommand::SetTitle("renamed".to_string()),
                SurfaceCommand::Resize {
                    width: 1280,
                    height: 600
                },
                SurfaceCommand::Resize {
                    width: 1280,
                    height: 720
                },
                SurfaceCommand::SetFullscreen(true),
                SurfaceCommand::SetVisible(false),
            ]
        );
    }

    #[test]
    fn test_requested_size_leaves_framebuffer_extent() {
        let (surface, _commands) = detached(std::thread::spawn(|| Ok(())));
        lock(&surface.state).set_framebuffer_size(1600, 1200);

        surface.set_width(400).unwrap();

        assert_eq!(surface.window_size(), (400, 600));
        assert_eq!((surface.width(), surface.height()), (1600, 1200));
        assert!(!surface.take_resized());
        assert_eq!(
            surface.state().frame_extent(),
            SurfaceExtent::new(1600, 1200)
        );

        lock(&surface.state).framebuffer_resized(800, 1200);
        assert_eq!(surface.width(), 800);
        assert!(surface.take_resized());
    }

    #[test]
    fn test_resized_is_sticky_until_read() {
        let (surface, _commands) = detached(std::thread::spawn(|| Ok(())));
        lock(&surface.state).framebuffer_resized(300, 200);
        lock(&surface.state).just_resized = false;

        assert!(surface.take_resized());
        assert!(!surface.take_resized());
    }

    #[test]
    fn test_setter_after_thread_exit_reports_closed() {
        let (surface, commands) = detached(std::thread::spawn(|| Ok(())));
        drop(commands);
        assert!(matches!(surface.set_visible(true), Err(SurfaceError::Closed)));
    }

    #[test]
    fn test_wait_closed_reports_thread_error() {
        let (surface, _commands) = detached(std::thread::spawn(|| {
            Err(SurfaceError::Render(RenderError::DeviceLost))
        }));
        surface.close();
        assert!(surface.close.load(Ordering::Acquire));
        assert!(matches!(
            surface.wait_closed(),
            Err(SurfaceError::Render(RenderError::DeviceLost))
        ));
        assert!(surface.wait_closed().is_ok());
    }
}
