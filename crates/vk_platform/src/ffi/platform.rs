//! Platform, render surface and input entry points

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};
use std::path::Path;
use std::sync::Arc;

use super::context::vkp_context;
use super::handle::{self, vkp_handle, NULL_HANDLE};
use super::{copy_str, guard, string, FfiError, FfiResult};
use crate::config::Config;
use crate::core::config::{PlatformConfig, SurfaceConfig};
use crate::foundation::logging;
use crate::render::backends::vulkan::VulkanPlatform;
use crate::surface::input::{CursorEvent, KeyboardEvent, MouseButtonEvent, ScrollEvent};
use crate::surface::RenderSurface;

/// Per-frame update callback; receives the user data and the render context
pub type vkp_update_fn = Option<unsafe extern "C" fn(user_data: *mut c_void, ctx: *mut vkp_context)>;

/// Keyboard event kind: key transition
pub const VKP_KEYBOARD_KEY: u8 = 0;
/// Keyboard event kind: text input
pub const VKP_KEYBOARD_CHAR: u8 = 1;

/// Creation hints for a render surface
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_surface_hints {
    /// Initial framebuffer width
    pub width: u32,
    /// Initial framebuffer height
    pub height: u32,
    /// Window title, null for the configured default
    pub title: *const c_char,
    /// Start fullscreen on the primary monitor
    pub fullscreen: bool,
    /// Allow user resizing
    pub resizable: bool,
    /// Create a separate device when the shared one cannot present here
    pub fallback_on_incompatible_parent: bool,
}

/// Keyboard event
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct vkp_keyboard_event {
    /// [`VKP_KEYBOARD_KEY`] or [`VKP_KEYBOARD_CHAR`]
    pub kind: u8,
    /// Platform scancode for key events
    pub scancode: i32,
    /// `InputAction` for key events
    pub action: u8,
    /// Unicode scalar for char events
    pub codepoint: u32,
}

/// Mouse button event
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct vkp_mouse_button_event {
    /// Zero-based button index
    pub button: i32,
    /// `InputAction`
    pub action: u8,
}

/// Cursor position or scroll offset
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct vkp_pointer_event {
    /// Horizontal component
    pub x: f64,
    /// Vertical component
    pub y: f64,
}

/// Callback receiving keyboard events in order
pub type vkp_keyboard_fn = Option<unsafe extern "C" fn(user_data: *mut c_void, event: vkp_keyboard_event)>;
/// Callback receiving mouse button events in order
pub type vkp_mouse_button_fn =
    Option<unsafe extern "C" fn(user_data: *mut c_void, event: vkp_mouse_button_event)>;
/// Callback receiving cursor or scroll events in order
pub type vkp_pointer_fn = Option<unsafe extern "C" fn(user_data: *mut c_void, event: vkp_pointer_event)>;

impl From<KeyboardEvent> for vkp_keyboard_event {
    fn from(event: KeyboardEvent) -> Self {
        match event {
            KeyboardEvent::Key { scancode, action } => Self {
                kind: VKP_KEYBOARD_KEY,
                scancode,
                action: action as u8,
                codepoint: 0,
            },
            KeyboardEvent::Char(c) => Self {
                kind: VKP_KEYBOARD_CHAR,
                scancode: 0,
                action: 0,
                codepoint: c.into(),
            },
        }
    }
}

impl From<MouseButtonEvent> for vkp_mouse_button_event {
    fn from(event: MouseButtonEvent) -> Self {
        Self {
            button: event.button,
            action: event.action as u8,
        }
    }
}

impl From<CursorEvent> for vkp_pointer_event {
    fn from(event: CursorEvent) -> Self {
        Self { x: event.x, y: event.y }
    }
}

impl From<ScrollEvent> for vkp_pointer_event {
    fn from(event: ScrollEvent) -> Self {
        Self { x: event.x, y: event.y }
    }
}

/// Host pointer carried to the surface thread
struct UserData(*mut c_void);

// The host owns the pointee and promises it may be used from the surface thread
unsafe impl Send for UserData {}

impl UserData {
    const fn get(&self) -> *mut c_void {
        self.0
    }
}

/// Platform as registered for the host
pub(crate) struct HostPlatform {
    platform: Arc<VulkanPlatform>,
    surface_defaults: SurfaceConfig,
}

fn load_config(path: *const c_char) -> FfiResult<PlatformConfig> {
    let config = if path.is_null() {
        PlatformConfig::default()
    } else {
        let path = unsafe { string(path, "config path") }?;
        PlatformConfig::load_from_file(Path::new(path))?
    };
    config.validate()?;
    Ok(config)
}

/// Surface config from host hints, filling gaps from `defaults`
unsafe fn surface_config(hints: *const vkp_surface_hints, defaults: &SurfaceConfig) -> FfiResult<SurfaceConfig> {
    let Some(hints) = hints.as_ref() else {
        return Ok(defaults.clone());
    };
    let title = if hints.title.is_null() {
        defaults.title.clone()
    } else {
        string(hints.title, "title")?.to_string()
    };
    Ok(SurfaceConfig {
        width: hints.width,
        height: hints.height,
        title,
        fullscreen: hints.fullscreen,
        resizable: hints.resizable,
        fallback_on_incompatible_parent: hints.fallback_on_incompatible_parent,
    })
}

fn surface(handle: vkp_handle) -> FfiResult<Arc<RenderSurface>> {
    handle::get(handle).ok_or(FfiError::InvalidHandle("render surface"))
}

/// Create the platform from a TOML or RON file, or defaults when `config_path` is null
///
/// Initialises logging with the configured filter.
#[no_mangle]
pub unsafe extern "C" fn vkp_platform_create(config_path: *const c_char) -> vkp_handle {
    guard("vkp_platform_create", NULL_HANDLE, || {
        let config = load_config(config_path)?;
        logging::init_with_level(&config.logging.default_filter);
        let platform = VulkanPlatform::new(config.renderer)?;
        log::info!("Platform created");
        Ok::<_, FfiError>(handle::insert(Arc::new(HostPlatform {
            platform: Arc::new(platform),
            surface_defaults: config.surface,
        })))
    })
}

/// Release the host's platform handle
///
/// Surfaces already opened keep the platform alive until they close.
#[no_mangle]
pub extern "C" fn vkp_platform_destroy(platform: vkp_handle) -> bool {
    guard("vkp_platform_destroy", false, || {
        if handle::is::<HostPlatform>(platform) && handle::remove(platform) {
            Ok(true)
        } else {
            Err(FfiError::InvalidHandle("platform"))
        }
    })
}

/// Release any handle
#[no_mangle]
pub extern "C" fn vkp_handle_destroy(handle: vkp_handle) -> bool {
    handle::remove(handle)
}

/// Open a window rendering on its own thread
///
/// `update_fn` is called once per frame on that thread with `user_data` and the
/// render context; the context pointer is only valid during the call. Null
/// `hints` use the configured surface defaults.
#[no_mangle]
pub unsafe extern "C" fn vkp_platform_request_render_surface(
    platform: vkp_handle,
    update_fn: vkp_update_fn,
    user_data: *mut c_void,
    hints: *const vkp_surface_hints,
) -> vkp_handle {
    guard("vkp_platform_request_render_surface", NULL_HANDLE, || {
        let host = handle::get::<HostPlatform>(platform).ok_or(FfiError::InvalidHandle("platform"))?;
        let hints = surface_config(hints, &host.surface_defaults)?;
        let user_data = UserData(user_data);
        let surface = RenderSurface::open(host.platform.clone(), hints, move |ctx| {
            if let Some(update) = update_fn {
                let ctx: *mut vkp_context = ctx;
                update(user_data.get(), ctx);
            }
        })?;
        Ok::<_, FfiError>(handle::insert(Arc::new(surface)))
    })
}

/// Framebuffer width, 0 for invalid handles
#[no_mangle]
pub extern "C" fn vkp_surface_get_width(handle: vkp_handle) -> u32 {
    guard("vkp_surface_get_width", 0, || surface(handle).map(|s| s.width()))
}

/// Framebuffer height, 0 for invalid handles
#[no_mangle]
pub extern "C" fn vkp_surface_get_height(handle: vkp_handle) -> u32 {
    guard("vkp_surface_get_height", 0, || surface(handle).map(|s| s.height()))
}

/// Copy the NUL-terminated title into `buffer`, truncating to `capacity`
///
/// Returns the full title length in bytes without the terminator.
#[no_mangle]
pub unsafe extern "C" fn vkp_surface_get_title(handle: vkp_handle, buffer: *mut c_char, capacity: usize) -> usize {
    guard("vkp_surface_get_title", 0, || {
        let title = surface(handle)?.title();
        Ok::<_, FfiError>(copy_str(&title, buffer, capacity))
    })
}

/// Whether the surface is fullscreen
#[no_mangle]
pub extern "C" fn vkp_surface_is_fullscreen(handle: vkp_handle) -> bool {
    guard("vkp_surface_is_fullscreen", false, || surface(handle).map(|s| s.is_fullscreen()))
}

/// Whether the surface is shown
#[no_mangle]
pub extern "C" fn vkp_surface_is_visible(handle: vkp_handle) -> bool {
    guard("vkp_surface_is_visible", false, || surface(handle).map(|s| s.is_visible()))
}

/// Whether the surface thread has exited; true for invalid handles
#[no_mangle]
pub extern "C" fn vkp_surface_is_closed(handle: vkp_handle) -> bool {
    guard("vkp_surface_is_closed", true, || surface(handle).map(|s| s.is_closed()))
}

/// Whether the framebuffer was resized since the last call
#[no_mangle]
pub extern "C" fn vkp_surface_take_resized(handle: vkp_handle) -> bool {
    guard("vkp_surface_take_resized", false, || surface(handle).map(|s| s.take_resized()))
}

/// Request a new framebuffer width
#[no_mangle]
pub extern "C" fn vkp_surface_set_width(handle: vkp_handle, width: u32) -> bool {
    guard("vkp_surface_set_width", false, || {
        surface(handle)?.set_width(width)?;
        Ok::<_, FfiError>(true)
    })
}

/// Request a new framebuffer height
#[no_mangle]
pub extern "C" fn vkp_surface_set_height(handle: vkp_handle, height: u32) -> bool {
    guard("vkp_surface_set_height", false, || {
        surface(handle)?.set_height(height)?;
        Ok::<_, FfiError>(true)
    })
}

/// Change the window title
#[no_mangle]
pub unsafe extern "C" fn vkp_surface_set_title(handle: vkp_handle, title: *const c_char) -> bool {
    guard("vkp_surface_set_title", false, || {
        let title = string(title, "title")?;
        surface(handle)?.set_title(title)?;
        Ok::<_, FfiError>(true)
    })
}

/// Enter or leave fullscreen
#[no_mangle]
pub extern "C" fn vkp_surface_set_fullscreen(handle: vkp_handle, fullscreen: bool) -> bool {
    guard("vkp_surface_set_fullscreen", false, || {
        surface(handle)?.set_fullscreen(fullscreen)?;
        Ok::<_, FfiError>(true)
    })
}

/// Show or hide the window
#[no_mangle]
pub extern "C" fn vkp_surface_set_visible(handle: vkp_handle, visible: bool) -> bool {
    guard("vkp_surface_set_visible", false, || {
        surface(handle)?.set_visible(visible)?;
        Ok::<_, FfiError>(true)
    })
}

/// Allow or forbid user resizing
#[no_mangle]
pub extern "C" fn vkp_surface_set_resizable(handle: vkp_handle, resizable: bool) -> bool {
    guard("vkp_surface_set_resizable", false, || {
        surface(handle)?.set_resizable(resizable)?;
        Ok::<_, FfiError>(true)
    })
}

/// Ask the surface thread to exit after its current frame
#[no_mangle]
pub extern "C" fn vkp_surface_close(handle: vkp_handle) -> bool {
    guard("vkp_surface_close", false, || {
        surface(handle)?.close();
        Ok::<_, FfiError>(true)
    })
}

/// Block until the surface thread exits; false when it ended with an error
#[no_mangle]
pub extern "C" fn vkp_surface_wait_closed(handle: vkp_handle) -> bool {
    guard("vkp_surface_wait_closed", false, || {
        surface(handle)?.wait_closed()?;
        Ok::<_, FfiError>(true)
    })
}

/// Drain keyboard events into `callback`; returns how many were delivered
#[no_mangle]
pub unsafe extern "C" fn vkp_surface_consume_keyboard(
    handle: vkp_handle,
    callback: vkp_keyboard_fn,
    user_data: *mut c_void,
) -> usize {
    guard("vkp_surface_consume_keyboard", 0, || {
        let callback = callback.ok_or(FfiError::NullPointer("keyboard callback"))?;
        let delivered = surface(handle)?
            .input()
            .consume_keyboard(|event| callback(user_data, event.into()));
        Ok::<_, FfiError>(delivered)
    })
}

/// Drain mouse button events into `callback`; returns how many were delivered
#[no_mangle]
pub unsafe extern "C" fn vkp_surface_consume_mouse_buttons(
    handle: vkp_handle,
    callback: vkp_mouse_button_fn,
    user_data: *mut c_void,
) -> usize {
    guard("vkp_surface_consume_mouse_buttons", 0, || {
        let callback = callback.ok_or(FfiError::NullPointer("mouse button callback"))?;
        let delivered = surface(handle)?
            .input()
            .consume_mouse_buttons(|event| callback(user_data, event.into()));
        Ok::<_, FfiError>(delivered)
    })
}

/// Drain cursor movements into `callback`; returns how many were delivered
#[no_mangle]
pub unsafe extern "C" fn vkp_surface_consume_cursor(
    handle: vkp_handle,
    callback: vkp_pointer_fn,
    user_data: *mut c_void,
) -> usize {
    guard("vkp_surface_consume_cursor", 0, || {
        let callback = callback.ok_or(FfiError::NullPointer("cursor callback"))?;
        let delivered = surface(handle)?
            .input()
            .consume_cursor(|event| callback(user_data, event.into()));
        Ok::<_, FfiError>(delivered)
    })
}

/// Drain scroll offsets into `callback`; returns how many were delivered
#[no_mangle]
pub unsafe extern "C" fn vkp_surface_consume_scroll(
    handle: vkp_handle,
    callback: vkp_pointer_fn,
    user_data: *mut c_void,
) -> usize {
    guard("vkp_surface_consume_scroll", 0, || {
        let callback = callback.ok_or(FfiError::NullPointer("scroll callback"))?;
        let delivered = surface(handle)?
            .input()
            .consume_scroll(|event| callback(user_data, event.into()));
        Ok::<_, FfiError>(delivered)
    })
}
