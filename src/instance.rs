//! Instance creation utils.
use crate::BootstrapSmallVec;
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use cstr::cstr;
#[cfg(feature = "surface")]
use raw_window_handle::HasRawDisplayHandle;
use std::{
    borrow::Cow,
    ffi::{c_void, CStr, CString, NulError},
    fmt,
    os::raw::c_char,
};
use thiserror::Error;

/// Name of the Khronos validation layer.
pub const VALIDATION_LAYER: &CStr = cstr!("VK_LAYER_KHRONOS_validation");

/// Require, request or disable validation layers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValidationLayers {
    /// Instance creation will fail if there are no validation layers installed.
    Require,
    /// If there are validation layers installed, enable them.
    Request,
    /// Don't enable validation layers.
    Disable,
}

/// Enable or disable the debug messenger, optionally providing a custom callback.
#[derive(Copy, Clone)]
pub enum DebugMessenger {
    /// Enables the debug messenger with the [`default_debug_callback`]
    /// callback.
    Default,
    /// Enables the debug messenger with a custom, user-provided callback.
    Custom {
        /// The user provided callback function. Feel free to take a look at the
        /// [`default_debug_callback`] when implementing your own.
        callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
        /// A user data pointer passed to the debug callback.
        user_data_pointer: *mut c_void,
    },
    /// Disables the debug messenger.
    Disable,
}

/// The default debug callback used in [`DebugMessenger::Default`].
///
/// Forwards every message to [`tracing`] under the `vulkan` target, at a
/// level matching the message severity.
pub unsafe extern "system" fn default_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", ?message_type, "{}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", ?message_type, "{}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::info!(target: "vulkan", ?message_type, "{}", message);
    } else {
        tracing::trace!(target: "vulkan", ?message_type, "{}", message);
    }

    vk::FALSE
}

/// Metadata for after instance creation.
#[derive(Clone)]
pub struct InstanceMetadata {
    instance_handle: vk::Instance,
    api_version: u32,
    enabled_layers: BootstrapSmallVec<CString>,
    enabled_extensions: BootstrapSmallVec<CString>,
}

impl InstanceMetadata {
    /// The instance this metadata belongs to.
    #[inline]
    pub fn instance_handle(&self) -> vk::Instance {
        self.instance_handle
    }

    /// Retrieve the used instance API version.
    #[inline]
    pub fn api_version_raw(&self) -> u32 {
        self.api_version
    }

    /// Retrieve the used instance API major version.
    #[inline]
    pub fn api_version_major(&self) -> u32 {
        vk::api_version_major(self.api_version)
    }

    /// Retrieve the used instance API minor version.
    #[inline]
    pub fn api_version_minor(&self) -> u32 {
        vk::api_version_minor(self.api_version)
    }

    /// List of all enabled layers in the instance.
    #[inline]
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    /// Returns true if `layer` is enabled.
    #[inline]
    pub fn is_layer_enabled(&self, layer: &CStr) -> bool {
        self.enabled_layers.iter().any(|e| e.as_c_str() == layer)
    }

    /// Returns true if the Khronos validation layer is enabled.
    #[inline]
    pub fn is_validation_enabled(&self) -> bool {
        self.is_layer_enabled(VALIDATION_LAYER)
    }

    /// List of all enabled extensions in the instance.
    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Returns true if `extension` is enabled.
    #[inline]
    pub fn is_extension_enabled(&self, extension: &CStr) -> bool {
        self.enabled_extensions.iter().any(|i| i.as_c_str() == extension)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(layers: &[&CStr]) -> InstanceMetadata {
        InstanceMetadata {
            instance_handle: vk::Instance::null(),
            api_version: vk::API_VERSION_1_0,
            enabled_layers: layers.iter().map(|&layer| layer.to_owned()).collect(),
            enabled_extensions: BootstrapSmallVec::new(),
        }
    }
}

impl fmt::Debug for InstanceMetadata {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("InstanceMetadata")
            .field(
                "api_version",
                &format_args!("{}.{}", self.api_version_major(), self.api_version_minor()),
            )
            .field("enabled_layers", &self.enabled_layers)
            .field("enabled_extensions", &self.enabled_extensions)
            .finish()
    }
}

/// Errors that can occur during instance creation.
#[derive(Debug, Error)]
pub enum InstanceCreationError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// One or more layers are not present.
    #[error("layers ({0:?}) not present")]
    LayersNotPresent(BootstrapSmallVec<CString>),
    /// One or more extensions are not present.
    #[error("extensions ({0:?}) not present")]
    ExtensionsNotPresent(BootstrapSmallVec<CString>),
    /// A name contained an interior nul byte.
    #[error("invalid name: {0}")]
    Nul(#[from] NulError),
}

/// The debug messenger created alongside the instance, and the loader needed
/// to destroy it.
pub struct DebugUtilsMessenger {
    loader: DebugUtils,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugUtilsMessenger {
    /// The `VK_EXT_debug_utils` loader.
    #[inline]
    pub fn loader(&self) -> &DebugUtils {
        &self.loader
    }

    /// The messenger handle.
    #[inline]
    pub fn handle(&self) -> vk::DebugUtilsMessengerEXT {
        self.handle
    }

    /// Destroy the messenger. Must happen before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        self.loader.destroy_debug_utils_messenger(self.handle, None);
    }
}

impl fmt::Debug for DebugUtilsMessenger {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_tuple("DebugUtilsMessenger")
            .field(&self.handle)
            .finish()
    }
}

/// Allows to easily create an [`ash::Instance`] and a debug messenger.
pub struct InstanceBuilder {
    app_name: Option<CString>,
    app_version: Option<u32>,
    engine_name: Option<CString>,
    engine_version: Option<u32>,
    required_api_version: u32,
    requested_api_version: Option<u32>,
    layers: BootstrapSmallVec<(CString, bool)>,
    extensions: BootstrapSmallVec<(CString, bool)>,
    debug_messenger: DebugMessenger,
    debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    debug_message_type: vk::DebugUtilsMessageTypeFlagsEXT,
}

impl InstanceBuilder {
    /// Create a new instance builder with opinionated defaults.
    #[inline]
    pub fn new() -> Self {
        InstanceBuilder {
            app_name: None,
            app_version: None,
            engine_name: None,
            engine_version: None,
            required_api_version: vk::API_VERSION_1_0,
            requested_api_version: None,
            layers: BootstrapSmallVec::new(),
            extensions: BootstrapSmallVec::new(),
            debug_messenger: DebugMessenger::Disable,
            debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            debug_message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        }
    }

    /// Application name to advertise.
    #[inline]
    pub fn app_name(mut self, app_name: &str) -> Result<Self, NulError> {
        self.app_name = Some(CString::new(app_name)?);
        Ok(self)
    }

    /// Application version to advertise.
    #[inline]
    pub fn app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = Some(vk::make_api_version(0, major, minor, patch));
        self
    }

    /// Engine name to advertise.
    #[inline]
    pub fn engine_name(mut self, engine_name: &str) -> Result<Self, NulError> {
        self.engine_name = Some(CString::new(engine_name)?);
        Ok(self)
    }

    /// Engine version to advertise.
    #[inline]
    pub fn engine_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.engine_version = Some(vk::make_api_version(0, major, minor, patch));
        self
    }

    /// Instance API version to be used as minimum requirement.
    #[inline]
    pub fn require_api_version(mut self, major: u32, minor: u32) -> Self {
        self.required_api_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    /// Instance API version to request. If it is not supported, fall back to
    /// the highest supported version.
    #[inline]
    pub fn request_api_version(mut self, major: u32, minor: u32) -> Self {
        self.requested_api_version = Some(vk::make_api_version(0, major, minor, 0));
        self
    }

    /// Try to enable this layer, ignore if it's not supported
    #[inline]
    pub fn request_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), false));
        self
    }

    /// Enable this layer, fail if it's not supported.
    #[inline]
    pub fn require_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), true));
        self
    }

    /// Try to enable this extension, ignore if it is not supported.
    #[inline]
    pub fn request_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), false));
        self
    }

    /// Enable this extension, fail if it's not supported.
    #[inline]
    pub fn require_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), true));
        self
    }

    #[cfg(feature = "surface")]
    /// Adds an requirement on all Vulkan extensions necessary to create a
    /// surface on `display_handle`. Only available with feature `surface`.
    #[inline]
    pub fn require_surface_extensions(
        mut self,
        display_handle: &impl HasRawDisplayHandle,
    ) -> Result<Self, InstanceCreationError> {
        let required_extensions =
            ash_window::enumerate_required_extensions(display_handle.raw_display_handle())?;
        self.extensions.extend(
            required_extensions
                .iter()
                .map(|&name| (unsafe { CStr::from_ptr(name) }.to_owned(), true)),
        );
        Ok(self)
    }

    /// Add Khronos validation layers.
    #[inline]
    pub fn validation_layers(mut self, validation_layers: ValidationLayers) -> Self {
        match validation_layers {
            ValidationLayers::Require | ValidationLayers::Request => {
                self.layers.push((
                    VALIDATION_LAYER.to_owned(),
                    matches!(validation_layers, ValidationLayers::Require),
                ));
            }
            ValidationLayers::Disable => (),
        }

        self
    }

    /// Try to create a debug messenger with the config provided by
    /// `debug_messenger`.
    #[inline]
    pub fn request_debug_messenger(mut self, debug_messenger: DebugMessenger) -> Self {
        if !matches!(debug_messenger, DebugMessenger::Disable) {
            self.extensions.push((DebugUtils::name().to_owned(), false));
        }

        self.debug_messenger = debug_messenger;
        self
    }

    /// Filter for the severity of debug messages.
    #[inline]
    pub fn debug_message_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.debug_message_severity = severity;
        self
    }

    /// Filter for the type of debug messages.
    #[inline]
    pub fn debug_message_type(mut self, ty: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        self.debug_message_type = ty;
        self
    }

    /// Returns the [`ash::Instance`], a debug messenger if it was requested
    /// and successfully created, and [`InstanceMetadata`] about what is
    /// actually enabled in the instance.
    ///
    /// If the debug messenger can't be created the instance is destroyed
    /// before the error is returned.
    pub unsafe fn build(
        self,
        entry: &Entry,
    ) -> Result<(Instance, Option<DebugUtilsMessenger>, InstanceMetadata), InstanceCreationError>
    {
        let mut api_version = self.required_api_version;
        let instance_version = entry
            .try_enumerate_instance_version()?
            .unwrap_or(vk::API_VERSION_1_0);
        if let Some(requested_api_version) = self.requested_api_version {
            api_version = api_version.max(requested_api_version.min(vk::make_api_version(
                0,
                vk::api_version_major(instance_version),
                vk::api_version_minor(instance_version),
                0,
            )));
        }

        let mut app_info = vk::ApplicationInfo::builder().api_version(api_version);
        if let Some(app_name) = &self.app_name {
            app_info = app_info.application_name(app_name);
        }

        if let Some(app_version) = self.app_version {
            app_info = app_info.application_version(app_version);
        }

        if let Some(engine_name) = &self.engine_name {
            app_info = app_info.engine_name(engine_name);
        }

        if let Some(engine_version) = self.engine_version {
            app_info = app_info.engine_version(engine_version);
        }

        let layer_properties = entry.enumerate_instance_layer_properties()?;
        let mut enabled_layers: BootstrapSmallVec<CString> = BootstrapSmallVec::new();
        let mut layers_not_present = BootstrapSmallVec::new();
        for (layer_name, required) in self.layers {
            let present = layer_properties.iter().any(|supported_layer| {
                CStr::from_ptr(supported_layer.layer_name.as_ptr()) == layer_name.as_c_str()
            });

            match (required, present) {
                (_, true) if enabled_layers.contains(&layer_name) => (),
                (_, true) => enabled_layers.push(layer_name),
                (true, false) => layers_not_present.push(layer_name),
                (false, false) => (),
            }
        }

        if !layers_not_present.is_empty() {
            return Err(InstanceCreationError::LayersNotPresent(layers_not_present));
        }

        let mut extension_properties = entry.enumerate_instance_extension_properties(None)?;
        for layer_name in &enabled_layers {
            extension_properties
                .extend(entry.enumerate_instance_extension_properties(Some(layer_name.as_c_str()))?);
        }

        let mut enabled_extensions: BootstrapSmallVec<CString> = BootstrapSmallVec::new();
        let mut extensions_not_present = BootstrapSmallVec::new();
        for (extension_name, required) in self.extensions {
            let present = extension_properties.iter().any(|supported_extension| {
                CStr::from_ptr(supported_extension.extension_name.as_ptr())
                    == extension_name.as_c_str()
            });

            match (required, present) {
                (_, true) if enabled_extensions.contains(&extension_name) => (),
                (_, true) => enabled_extensions.push(extension_name),
                (true, false) => extensions_not_present.push(extension_name),
                (false, false) => (),
            }
        }

        if !extensions_not_present.is_empty() {
            return Err(InstanceCreationError::ExtensionsNotPresent(
                extensions_not_present,
            ));
        }

        let is_debug_utils_enabled = enabled_extensions
            .iter()
            .any(|e| e.as_c_str() == DebugUtils::name());

        let layer_names: BootstrapSmallVec<*const c_char> =
            enabled_layers.iter().map(|name| name.as_ptr()).collect();
        let extension_names: BootstrapSmallVec<*const c_char> =
            enabled_extensions.iter().map(|name| name.as_ptr()).collect();

        let mut instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        let should_create_debug_messenger = !matches!(
            (&self.debug_messenger, is_debug_utils_enabled),
            (DebugMessenger::Disable, _) | (_, false)
        );

        let messenger_info = should_create_debug_messenger.then(|| {
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(self.debug_message_severity)
                .message_type(self.debug_message_type);
            match self.debug_messenger {
                DebugMessenger::Custom {
                    callback,
                    user_data_pointer,
                } => messenger_info
                    .pfn_user_callback(callback)
                    .user_data(user_data_pointer)
                    .build(),
                _ => messenger_info
                    .pfn_user_callback(Some(default_debug_callback))
                    .build(),
            }
        });

        // Chained so instance creation and destruction are reported as well.
        let mut instance_messenger_info;
        if let Some(messenger_info) = messenger_info {
            instance_messenger_info = messenger_info;
            instance_info = instance_info.push_next(&mut instance_messenger_info);
        }

        let instance = entry.create_instance(&instance_info, None)?;

        let debug_utils_messenger = match messenger_info {
            Some(messenger_info) => {
                let loader = DebugUtils::new(entry, &instance);
                match loader.create_debug_utils_messenger(&messenger_info, None) {
                    Ok(handle) => Some(DebugUtilsMessenger { loader, handle }),
                    Err(err) => {
                        instance.destroy_instance(None);
                        return Err(err.into());
                    }
                }
            }
            None => None,
        };

        let instance_metadata = InstanceMetadata {
            instance_handle: instance.handle(),
            api_version,
            enabled_layers,
            enabled_extensions,
        };

        tracing::info!(metadata = ?instance_metadata, "created instance");

        Ok((instance, debug_utils_messenger, instance_metadata))
    }
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
