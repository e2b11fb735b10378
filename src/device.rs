//! Logical device creation.
use crate::{
    BootstrapSmallVec, Capability, DeviceFactory, InstanceMetadata, LogicalDevice,
    QueueFamilyIndices, SelectedDevice,
};
use ash::vk;
use std::{
    ffi::{CStr, CString},
    fmt,
    os::raw::{c_char, c_float},
};
use thiserror::Error;

/// Errors that can occur during device selection and creation.
#[derive(Debug, Error)]
pub enum DeviceCreationError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// The backend reported no physical device at all.
    #[error("failed to find a GPU with Vulkan support")]
    NoDeviceFound,
    /// No physical device met the requirements.
    #[error("failed to find a suitable GPU")]
    NoSuitableDeviceFound,
    /// The backend rejected logical device creation.
    #[error("failed to create logical device: {0}")]
    DeviceCreationFailed(vk::Result),
}

/// Setup for the queues requested from one queue family.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSetup {
    /// Flags used to specify usage behavior of the queue.
    pub flags: vk::DeviceQueueCreateFlags,
    /// Index of the queue family in the queue family array.
    pub queue_family_index: u32,
    /// Specifies the amount of queues and the respective priority for each.
    pub queue_priorities: Vec<c_float>,
}

impl QueueSetup {
    /// Create a new queue setup with simplified arguments.
    /// Queue priorities will all be 1.0 and all flags will be empty.
    #[inline]
    pub fn simple(queue_family_index: u32, queue_count: usize) -> QueueSetup {
        QueueSetup {
            flags: vk::DeviceQueueCreateFlags::empty(),
            queue_family_index,
            queue_priorities: (0..queue_count).map(|_| 1.0).collect(),
        }
    }

    #[inline]
    fn as_vulkan(&self) -> vk::DeviceQueueCreateInfoBuilder<'_> {
        vk::DeviceQueueCreateInfo::builder()
            .flags(self.flags)
            .queue_family_index(self.queue_family_index)
            .queue_priorities(&self.queue_priorities)
    }
}

/// Creates the logical device for a [`SelectedDevice`] and retrieves one
/// queue per required capability.
///
/// One queue with priority 1.0 is requested per distinct queue family, so a
/// family serving several capabilities is only requested once.
#[derive(Debug, Clone, Default)]
pub struct LogicalDeviceBuilder {
    layers: BootstrapSmallVec<CString>,
    extensions: BootstrapSmallVec<CString>,
}

impl LogicalDeviceBuilder {
    /// Create a new logical device builder.
    #[inline]
    pub fn new() -> Self {
        LogicalDeviceBuilder::default()
    }

    /// Enable every layer the instance enabled on the device as well.
    ///
    /// Device layers are deprecated and ignored by current loaders, older
    /// implementations still expect them to match the instance layers.
    #[inline]
    pub fn mirror_instance_layers(mut self, instance_metadata: &InstanceMetadata) -> Self {
        for layer in instance_metadata.enabled_layers() {
            self = self.layer(layer);
        }
        self
    }

    /// Enable `layer` on the device.
    #[inline]
    pub fn layer(mut self, layer: &CStr) -> Self {
        if !self.layers.iter().any(|l| l.as_c_str() == layer) {
            self.layers.push(layer.to_owned());
        }
        self
    }

    /// Enable `extension` on the device, in addition to those recorded by
    /// the selector.
    #[inline]
    pub fn extension(mut self, extension: &CStr) -> Self {
        if !self.extensions.iter().any(|e| e.as_c_str() == extension) {
            self.extensions.push(extension.to_owned());
        }
        self
    }

    /// Create the logical device and retrieve its queues.
    pub fn build<F: DeviceFactory + ?Sized>(
        self,
        factory: &mut F,
        selected: &SelectedDevice,
    ) -> Result<LogicalDeviceContext<F::Device>, DeviceCreationError> {
        let queue_family_indices = selected.queue_family_indices();
        if !queue_family_indices.is_complete() {
            return Err(DeviceCreationError::NoSuitableDeviceFound);
        }

        let queue_setups: BootstrapSmallVec<QueueSetup> = queue_family_indices
            .distinct_families()
            .into_iter()
            .map(|queue_family_index| QueueSetup::simple(queue_family_index, 1))
            .collect();

        let mut enabled_extensions: BootstrapSmallVec<CString> =
            selected.enabled_extensions().iter().cloned().collect();
        for extension in self.extensions {
            if !enabled_extensions.contains(&extension) {
                enabled_extensions.push(extension);
            }
        }

        let queue_create_infos: BootstrapSmallVec<_> = queue_setups
            .iter()
            .map(QueueSetup::as_vulkan)
            .map(|x| x.build())
            .collect();
        let layer_names: BootstrapSmallVec<*const c_char> =
            self.layers.iter().map(|layer| layer.as_ptr()).collect();
        let extension_names: BootstrapSmallVec<*const c_char> = enabled_extensions
            .iter()
            .map(|extension| extension.as_ptr())
            .collect();

        #[allow(deprecated)]
        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        let device = unsafe { factory.create_device(selected.physical_device(), &device_info) }
            .map_err(DeviceCreationError::DeviceCreationFailed)?;

        let queues = queue_family_indices
            .iter()
            .filter_map(|(capability, index)| index.map(|index| (capability, index)))
            .map(|(capability, index)| (capability, device.queue(index, 0)))
            .collect();

        let families: BootstrapSmallVec<u32> = queue_setups
            .iter()
            .map(|setup| setup.queue_family_index)
            .collect();
        tracing::info!(
            physical_device = ?selected.physical_device(),
            ?families,
            layers = ?self.layers,
            extensions = ?enabled_extensions,
            "created logical device"
        );

        Ok(LogicalDeviceContext {
            device,
            physical_device: selected.physical_device(),
            queue_family_indices: queue_family_indices.clone(),
            queue_setups,
            queues,
            enabled_layers: self.layers,
            enabled_extensions,
        })
    }
}

/// A logical device together with the queues retrieved for each required
/// capability. The device is destroyed when the context is dropped.
pub struct LogicalDeviceContext<D: LogicalDevice> {
    device: D,
    physical_device: vk::PhysicalDevice,
    queue_family_indices: QueueFamilyIndices,
    queue_setups: BootstrapSmallVec<QueueSetup>,
    queues: BootstrapSmallVec<(Capability, vk::Queue)>,
    enabled_layers: BootstrapSmallVec<CString>,
    enabled_extensions: BootstrapSmallVec<CString>,
}

impl<D: LogicalDevice> LogicalDeviceContext<D> {
    /// The logical device.
    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The physical device this device belongs to.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The queue families resolved during selection.
    #[inline]
    pub fn queue_family_indices(&self) -> &QueueFamilyIndices {
        &self.queue_family_indices
    }

    /// The queue setups which are in use, one per distinct family.
    #[inline]
    pub fn queue_setups(&self) -> &[QueueSetup] {
        &self.queue_setups
    }

    /// The queue retrieved for `capability`.
    #[inline]
    pub fn queue(&self, capability: Capability) -> Option<vk::Queue> {
        self.queues
            .iter()
            .find(|(existing, _)| *existing == capability)
            .map(|(_, queue)| *queue)
    }

    /// The queue retrieved for [`Capability::Graphics`].
    #[inline]
    pub fn graphics_queue(&self) -> Option<vk::Queue> {
        self.queue(Capability::Graphics)
    }

    /// The queue retrieved for the first [`Capability::Presentation`]
    /// requirement. May be the same queue as [`graphics_queue`](Self::graphics_queue).
    #[inline]
    pub fn present_queue(&self) -> Option<vk::Queue> {
        self.queues
            .iter()
            .find(|(capability, _)| capability.is_presentation())
            .map(|(_, queue)| *queue)
    }

    /// Layers enabled on the device.
    #[inline]
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    /// Extensions enabled on the device.
    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }
}

impl<D: LogicalDevice> Drop for LogicalDeviceContext<D> {
    fn drop(&mut self) {
        tracing::debug!(physical_device = ?self.physical_device, "destroying logical device");
        unsafe { self.device.destroy() };
    }
}

impl<D: LogicalDevice> fmt::Debug for LogicalDeviceContext<D> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("LogicalDeviceContext")
            .field("physical_device", &self.physical_device)
            .field("queue_family_indices", &self.queue_family_indices)
            .field("queues", &self.queues)
            .field("enabled_layers", &self.enabled_layers)
            .field("enabled_extensions", &self.enabled_extensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{FakeBackend, FakeDevice, FakeFamily};
    use crate::DeviceSelector;
    use ash::vk::Handle;
    use cstr::cstr;

    fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5)
    }

    fn select(backend: &FakeBackend) -> SelectedDevice {
        DeviceSelector::graphics_present(surface())
            .select(backend)
            .unwrap()
    }

    #[test]
    fn shared_family_requests_one_queue() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![
                FakeFamily::new(vk::QueueFlags::TRANSFER, false),
                FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
            ],
        )]);
        let selected = select(&backend);
        assert_eq!(selected.queue_family_indices().graphics(), Some(1));
        assert_eq!(selected.queue_family_indices().presentation(), Some(1));

        let context = LogicalDeviceBuilder::new()
            .build(&mut backend, &selected)
            .unwrap();

        assert_eq!(backend.created.len(), 1);
        assert_eq!(
            backend.created[0].physical_device,
            vk::PhysicalDevice::from_raw(1)
        );
        assert_eq!(backend.created[0].queue_families, vec![(1, vec![1.0])]);
        assert_eq!(context.queue_setups().len(), 1);

        let graphics = context.graphics_queue().unwrap();
        let present = context.present_queue().unwrap();
        assert_eq!(graphics, present);
        assert_eq!(*context.device().retrieved.borrow(), vec![(1, 0), (1, 0)]);
    }

    #[test]
    fn separate_families_request_two_queues() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![
                FakeFamily::new(vk::QueueFlags::GRAPHICS, false),
                FakeFamily::new(vk::QueueFlags::empty(), true),
            ],
        )]);
        let selected = select(&backend);
        let context = LogicalDeviceBuilder::new()
            .build(&mut backend, &selected)
            .unwrap();

        assert_eq!(
            backend.created[0].queue_families,
            vec![(0, vec![1.0]), (1, vec![1.0])]
        );
        assert_ne!(context.graphics_queue(), context.present_queue());
        assert_eq!(context.queue(Capability::Presentation(surface())), context.present_queue());
    }

    #[test]
    fn mirrors_instance_layers() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![FakeFamily::new(vk::QueueFlags::GRAPHICS, true)],
        )]);
        let selected = select(&backend);
        let metadata = InstanceMetadata::for_tests(&[cstr!("VK_LAYER_KHRONOS_validation")]);

        let context = LogicalDeviceBuilder::new()
            .mirror_instance_layers(&metadata)
            .build(&mut backend, &selected)
            .unwrap();

        let validation = cstr!("VK_LAYER_KHRONOS_validation").to_owned();
        assert_eq!(backend.created[0].layers, vec![validation.clone()]);
        assert_eq!(context.enabled_layers(), &[validation]);
    }

    #[test]
    fn no_layers_without_validation() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![FakeFamily::new(vk::QueueFlags::GRAPHICS, true)],
        )]);
        let selected = select(&backend);
        let metadata = InstanceMetadata::for_tests(&[]);

        LogicalDeviceBuilder::new()
            .mirror_instance_layers(&metadata)
            .build(&mut backend, &selected)
            .unwrap();

        assert!(backend.created[0].layers.is_empty());
    }

    #[test]
    fn enables_selected_extensions() {
        let swapchain = cstr!("VK_KHR_swapchain");
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![FakeFamily::new(vk::QueueFlags::GRAPHICS, true)],
        )
        .with_extension(swapchain)]);
        let selected = DeviceSelector::graphics_present(surface())
            .require_extension(swapchain)
            .select(&backend)
            .unwrap();

        let context = LogicalDeviceBuilder::new()
            .extension(swapchain)
            .build(&mut backend, &selected)
            .unwrap();

        assert_eq!(backend.created[0].extensions, vec![swapchain.to_owned()]);
        assert_eq!(context.enabled_extensions(), &[swapchain.to_owned()]);
    }

    #[test]
    fn creation_failure() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![FakeFamily::new(vk::QueueFlags::GRAPHICS, true)],
        )]);
        backend.fail_creation = Some(vk::Result::ERROR_INITIALIZATION_FAILED);
        let selected = select(&backend);

        let err = LogicalDeviceBuilder::new()
            .build(&mut backend, &selected)
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceCreationError::DeviceCreationFailed(vk::Result::ERROR_INITIALIZATION_FAILED)
        ));
        assert_eq!(backend.destroyed.get(), 0);
    }

    #[test]
    fn device_destroyed_on_drop() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![FakeFamily::new(vk::QueueFlags::GRAPHICS, true)],
        )]);
        let selected = select(&backend);
        let context = LogicalDeviceBuilder::new()
            .build(&mut backend, &selected)
            .unwrap();
        assert_eq!(backend.destroyed.get(), 0);

        drop(context);
        assert_eq!(backend.destroyed.get(), 1);
    }

    #[test]
    fn error_messages_are_readable() {
        assert_eq!(
            DeviceCreationError::NoDeviceFound.to_string(),
            "failed to find a GPU with Vulkan support"
        );
        assert_eq!(
            DeviceCreationError::NoSuitableDeviceFound.to_string(),
            "failed to find a suitable GPU"
        );
    }
}
