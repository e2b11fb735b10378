//! The full bootstrap sequence, from instance to logical device.
//!
//! Resources are acquired in the order instance, surface, physical device
//! selection, logical device, and released in exactly the reverse order. A
//! failure at any step releases everything acquired before it.
use crate::{
    AshBackend, DebugMessenger, DebugUtilsMessenger, DeviceCreationError, DeviceSelector,
    InstanceBuilder, InstanceCreationError, InstanceMetadata, LogicalDevice,
    LogicalDeviceBuilder, LogicalDeviceContext, RendererConfig,
};
use ash::extensions::khr::Surface;
use ash::{vk, Device, Entry, Instance, LoadingError};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use thiserror::Error;

/// Errors that can occur while bootstrapping a [`RendererSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The Vulkan library couldn't be loaded.
    #[error("failed to load the Vulkan library")]
    Loading(#[from] LoadingError),
    /// Instance creation failed.
    #[error("failed to create instance")]
    Instance(#[from] InstanceCreationError),
    /// The window surface couldn't be created.
    #[error("failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),
    /// Physical device selection or logical device creation failed.
    #[error("failed to set up device")]
    Device(#[from] DeviceCreationError),
}

/// A Vulkan object that must be explicitly destroyed.
trait Release {
    unsafe fn release(&mut self);
}

/// Releases the wrapped object when dropped.
struct Guard<T: Release>(T);

impl<T: Release> Drop for Guard<T> {
    fn drop(&mut self) {
        unsafe { self.0.release() };
    }
}

struct InstanceHandles {
    instance: Instance,
    debug_messenger: Option<DebugUtilsMessenger>,
    metadata: InstanceMetadata,
}

impl Release for InstanceHandles {
    unsafe fn release(&mut self) {
        if let Some(debug_messenger) = self.debug_messenger.take() {
            tracing::debug!("destroying debug messenger");
            debug_messenger.destroy();
        }

        tracing::debug!("destroying instance");
        self.instance.destroy_instance(None);
    }
}

struct SurfaceHandle {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl Release for SurfaceHandle {
    unsafe fn release(&mut self) {
        tracing::debug!(surface = ?self.surface, "destroying surface");
        self.loader.destroy_surface(self.surface, None);
    }
}

// Fields drop in declaration order.
struct Resources<D: LogicalDevice, S: Release, I: Release> {
    device: LogicalDeviceContext<D>,
    surface: Guard<S>,
    instance: Guard<I>,
}

/// Acquire instance, surface and device in that order. When a step fails,
/// whatever was acquired before it is released in reverse order.
fn acquire<D, S, I, E>(
    instance: impl FnOnce() -> Result<I, E>,
    surface: impl FnOnce(&I) -> Result<S, E>,
    device: impl FnOnce(&I, &S) -> Result<LogicalDeviceContext<D>, E>,
) -> Result<Resources<D, S, I>, E>
where
    D: LogicalDevice,
    S: Release,
    I: Release,
{
    let instance = Guard(instance()?);
    let surface = Guard(surface(&instance.0)?);
    let device = device(&instance.0, &surface.0)?;

    Ok(Resources {
        device,
        surface,
        instance,
    })
}

/// Owns every Vulkan object created while bootstrapping the renderer.
///
/// Dropping the session destroys the logical device, then the surface, then
/// the debug messenger and instance.
pub struct RendererSession {
    resources: Resources<Device, SurfaceHandle, InstanceHandles>,
    entry: Entry,
}

impl RendererSession {
    /// Run the bootstrap sequence for `window`.
    pub fn new<W>(config: &RendererConfig, window: &W) -> Result<Self, SessionError>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let entry = unsafe { Entry::load() }?;

        let resources = acquire(
            || create_instance(&entry, config, window),
            |instance: &InstanceHandles| -> Result<SurfaceHandle, SessionError> {
                let surface = unsafe {
                    ash_window::create_surface(
                        &entry,
                        &instance.instance,
                        window.raw_display_handle(),
                        window.raw_window_handle(),
                        None,
                    )
                }
                .map_err(SessionError::SurfaceCreation)?;

                Ok(SurfaceHandle {
                    loader: Surface::new(&entry, &instance.instance),
                    surface,
                })
            },
            |instance: &InstanceHandles, surface: &SurfaceHandle| {
                let mut backend = AshBackend::new(&instance.instance, &surface.loader);
                let selected =
                    DeviceSelector::graphics_present(surface.surface).select(&backend)?;
                let device = LogicalDeviceBuilder::new()
                    .mirror_instance_layers(&instance.metadata)
                    .build(&mut backend, &selected)?;
                Ok::<_, SessionError>(device)
            },
        )?;

        Ok(RendererSession { resources, entry })
    }

    /// The loaded Vulkan entry points.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The instance.
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.resources.instance.0.instance
    }

    /// What is enabled on the instance.
    #[inline]
    pub fn instance_metadata(&self) -> &InstanceMetadata {
        &self.resources.instance.0.metadata
    }

    /// The debug messenger, if one was created.
    #[inline]
    pub fn debug_messenger(&self) -> Option<&DebugUtilsMessenger> {
        self.resources.instance.0.debug_messenger.as_ref()
    }

    /// The window surface.
    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.resources.surface.0.surface
    }

    /// The `VK_KHR_surface` loader.
    #[inline]
    pub fn surface_loader(&self) -> &Surface {
        &self.resources.surface.0.loader
    }

    /// The logical device and its queues.
    #[inline]
    pub fn device(&self) -> &LogicalDeviceContext<Device> {
        &self.resources.device
    }
}

fn create_instance<W: HasRawDisplayHandle>(
    entry: &Entry,
    config: &RendererConfig,
    window: &W,
) -> Result<InstanceHandles, SessionError> {
    let (app_major, app_minor, app_patch) = config.app_version;
    let (engine_major, engine_minor, engine_patch) = config.engine_version;
    let (api_major, api_minor) = config.api_version;
    let mut instance_builder = InstanceBuilder::new()
        .app_name(&config.app_name)
        .map_err(InstanceCreationError::from)?
        .app_version(app_major, app_minor, app_patch)
        .engine_name(&config.engine_name)
        .map_err(InstanceCreationError::from)?
        .engine_version(engine_major, engine_minor, engine_patch)
        .request_api_version(api_major, api_minor)
        .validation_layers(config.validation)
        .require_surface_extensions(window)?;
    if config.wants_debug_messenger() {
        instance_builder = instance_builder
            .request_debug_messenger(DebugMessenger::Default)
            .debug_message_severity(config.debug_message_severity);
    }

    let (instance, debug_messenger, metadata) = unsafe { instance_builder.build(entry) }?;
    Ok(InstanceHandles {
        instance,
        debug_messenger,
        metadata,
    })
}
