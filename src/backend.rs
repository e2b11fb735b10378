//! The queries the selection core needs from the graphics backend.
//!
//! [`Backend`] answers questions about physical devices, [`DeviceFactory`]
//! creates logical devices from them and [`LogicalDevice`] hands out queues.
//! [`AshBackend`] implements all three on top of [`ash`].
use ash::extensions::khr::Surface;
use ash::prelude::VkResult;
use ash::{vk, Device, Instance};

/// Read-only queries about the physical devices exposed by the backend.
///
/// All queries are synchronous and have no side effects visible to the
/// caller.
pub trait Backend {
    /// All physical devices, in the order the backend reports them.
    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    /// The queue families of `physical_device`, indexed by family index.
    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;

    /// Whether queue family `queue_family_index` of `physical_device` can
    /// present to `surface`.
    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    /// The device extensions `physical_device` supports.
    fn device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>>;
}

/// A logical device created by a [`DeviceFactory`].
pub trait LogicalDevice {
    /// Retrieve queue `queue_index` of family `queue_family_index`.
    fn queue(&self, queue_family_index: u32, queue_index: u32) -> vk::Queue;

    /// Destroy the device. Called exactly once, by
    /// [`LogicalDeviceContext`](crate::LogicalDeviceContext) on drop, with
    /// the same allocator the device was created with.
    unsafe fn destroy(&mut self);
}

/// Creates logical devices.
pub trait DeviceFactory {
    /// The created device.
    type Device: LogicalDevice;

    /// Create a logical device for `physical_device`.
    ///
    /// # Safety
    ///
    /// Every pointer in `create_info` must be valid for the duration of the
    /// call.
    unsafe fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo,
    ) -> VkResult<Self::Device>;
}

/// [`Backend`] and [`DeviceFactory`] backed by an [`ash::Instance`] and the
/// `VK_KHR_surface` loader.
pub struct AshBackend<'a> {
    instance: &'a Instance,
    surface_loader: &'a Surface,
}

impl<'a> AshBackend<'a> {
    /// Wrap a live instance and surface loader created from it.
    #[inline]
    pub fn new(instance: &'a Instance, surface_loader: &'a Surface) -> Self {
        AshBackend {
            instance,
            surface_loader,
        }
    }

    /// The wrapped instance.
    #[inline]
    pub fn instance(&self) -> &Instance {
        self.instance
    }
}

impl<'a> Backend for AshBackend<'a> {
    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                surface,
            )
        }
    }

    fn device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe {
            self.instance
                .enumerate_device_extension_properties(physical_device)
        }
    }
}

impl<'a> DeviceFactory for AshBackend<'a> {
    type Device = Device;

    unsafe fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo,
    ) -> VkResult<Device> {
        // Must match the allocator `LogicalDevice::destroy` passes.
        self.instance.create_device(physical_device, create_info, None)
    }
}

impl LogicalDevice for Device {
    #[inline]
    fn queue(&self, queue_family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { self.get_device_queue(queue_family_index, queue_index) }
    }

    unsafe fn destroy(&mut self) {
        self.destroy_device(None);
    }
}
