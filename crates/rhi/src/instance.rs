//! Vulkan instance, validation layer and debug messenger.
//!
//! ```no_run
//! use vkcraft_rhi::instance::Instance;
//!
//! let instance = Instance::new(c"demo", &[], cfg!(debug_assertions))
//!     .expect("Failed to create Vulkan instance");
//! let _raw = instance.handle();
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance with an optional debug messenger.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates the instance.
    ///
    /// `surface_extensions` are the window-system extensions reported by the
    /// platform layer. When `enable_validation` is set, the Khronos validation
    /// layer must be installed; its absence is an error, not a warning.
    ///
    /// # Errors
    ///
    /// - [`RhiError::Loading`] when the Vulkan loader cannot be found
    /// - [`RhiError::ValidationLayerMissing`]
    /// - [`RhiError::MissingExtensions`] when a required extension is not offered
    pub fn new(
        application_name: &CStr,
        surface_extensions: &[*const c_char],
        enable_validation: bool,
    ) -> RhiResult<Self> {
        // SAFETY: loading the system Vulkan library has no preconditions
        // beyond it being a conforming loader.
        let entry = unsafe { Entry::load()? };

        if enable_validation && !Self::is_validation_layer_available(&entry)? {
            return Err(RhiError::ValidationLayerMissing(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vkcraft")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = surface_extensions.to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        Self::check_extensions(&entry, &extensions)?;

        let layers = if enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        // SAFETY: every pointer in create_info refers to locals or static
        // extension names that outlive this call.
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(validation = enable_validation, "Vulkan instance created");

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn check_extensions(entry: &Entry, required: &[*const c_char]) -> RhiResult<()> {
        // SAFETY: plain enumeration on a loaded entry.
        let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let available: Vec<CString> = available
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect();

        let required: Vec<&CStr> = required
            .iter()
            // SAFETY: callers pass nul-terminated names from ash or ash_window.
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect();

        let missing = missing_names(&required, &available);
        if !missing.is_empty() {
            return Err(RhiError::MissingExtensions(missing));
        }

        debug!(?required, "Instance extensions available");
        Ok(())
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        // SAFETY: plain enumeration on a loaded entry.
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers
            .iter()
            .any(|layer| {
                layer
                    .layer_name_as_c_str()
                    .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
            }))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        // SAFETY: the callback is a 'static extern fn; the messenger is
        // destroyed in Drop before the instance.
        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        debug!("Debug messenger created");
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: all child objects are owned by structures dropped before the
        // instance, and the messenger belongs to this instance.
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Names in `required` that do not appear in `available`.
fn missing_names(required: &[&CStr], available: &[CString]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.iter().any(|a| a.as_c_str() == **name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: the driver passes a valid callback data struct for the
    // duration of the call.
    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        // SAFETY: p_message is a nul-terminated string owned by the driver.
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "general",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!(target: "vulkan", kind, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!(target: "vulkan", kind, "{message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => info!(target: "vulkan", kind, "{message}"),
        _ => debug!(target: "vulkan", kind, "{message}"),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_names() {
        let available = vec![
            CString::from(c"VK_KHR_surface"),
            CString::from(c"VK_KHR_xcb_surface"),
        ];
        assert!(missing_names(&[c"VK_KHR_surface"], &available).is_empty());
        assert_eq!(
            missing_names(&[c"VK_KHR_surface", c"VK_EXT_debug_utils"], &available),
            vec!["VK_EXT_debug_utils".to_owned()]
        );
    }

    #[test]
    fn test_instance_creation_without_validation() {
        match Instance::new(c"vkcraft-test", &[], false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::Loading(_)) => eprintln!("Skipping test: Vulkan not available"),
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }

    #[test]
    fn test_validation_request_is_strict() {
        match Instance::new(c"vkcraft-test", &[], true) {
            Ok(instance) => assert!(instance.has_validation()),
            Err(RhiError::ValidationLayerMissing(name)) => {
                assert_eq!(name, "VK_LAYER_KHRONOS_validation");
            }
            Err(RhiError::Loading(_)) => eprintln!("Skipping test: Vulkan not available"),
            Err(RhiError::MissingExtensions(missing)) => {
                eprintln!("Skipping test: missing {missing:?}");
            }
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }
}
