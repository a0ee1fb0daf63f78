//! Vulkan instance with optional validation

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Entry, Instance};

use crate::core::config::RendererConfig;
use crate::render::{RenderError, RenderResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"vk_platform";

fn init_failed(what: &str, e: impl std::fmt::Debug) -> RenderError {
    RenderError::InitializationFailed(format!("{what}: {e:?}"))
}

/// Entry, instance and surface loader, with a debug messenger when validating
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    surface_loader: Surface,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance with the extensions GLFW needs for presentation
    pub fn new(glfw: &glfw::Glfw, config: &RendererConfig) -> RenderResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| init_failed("Failed to load Vulkan", e))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| init_failed("Invalid application name", e))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required = glfw.get_required_instance_extensions().ok_or_else(|| {
            RenderError::InitializationFailed("GLFW reports no Vulkan support".to_string())
        })?;
        let extension_names = required
            .into_iter()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| init_failed("Invalid extension name", e))?;
        let mut extensions: Vec<*const c_char> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let validate = config.validation_enabled() && Self::validation_available(&entry, config)?;
        let mut layers = Vec::new();
        if validate {
            layers.push(VALIDATION_LAYER.as_ptr());
            extensions.push(DebugUtils::name().as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None) }?;

        let debug = if validate {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };
        let surface_loader = Surface::new(&entry, &instance);

        log::info!(
            "Vulkan instance created (validation {})",
            if validate { "on" } else { "off" }
        );
        Ok(Self {
            entry,
            instance,
            surface_loader,
            debug,
        })
    }

    /// Whether the validation layer can be enabled
    ///
    /// A missing layer is fatal only when validation was requested explicitly.
    fn validation_available(entry: &Entry, config: &RendererConfig) -> RenderResult<bool> {
        let layers = entry.enumerate_instance_layer_properties()?;
        let found = layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER
        });
        match (found, config.enable_validation) {
            (true, _) => Ok(true),
            (false, Some(true)) => Err(RenderError::InitializationFailed(
                "Validation requested but VK_LAYER_KHRONOS_validation is not installed".to_string(),
            )),
            (false, _) => {
                log::warn!("Validation layer not installed, continuing without it");
                Ok(false)
            }
        }
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> RenderResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));
        Ok(unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?)
    }

    /// Entry points
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Surface extension loader
    pub const fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Create a presentation surface for a GLFW window
    pub fn create_surface(&self, window: &glfw::Window) -> Result<vk::SurfaceKHR, vk::Result> {
        let mut surface = vk::SurfaceKHR::null();
        let result =
            window.create_window_surface(self.instance.handle(), std::ptr::null(), &mut surface);
        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(result)
        }
    }

    /// Destroy a surface created by [`Self::create_surface`]
    pub fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface_loader.destroy_surface(surface, None) };
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Validation messages, routed to the logger by severity
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {message_type:?} - {message}");
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {message_type:?} - {message}");
    } else {
        log::debug!("[Vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}
