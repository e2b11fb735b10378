//! Physical device enumeration and selection.
use crate::{
    queue_family::resolve_queue_families, Backend, BootstrapSmallVec, Capability,
    DeviceCreationError, QueueFamilyIndices,
};
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{CStr, CString};

/// List every physical device the backend exposes.
///
/// Fails with [`DeviceCreationError::NoDeviceFound`] if there are none.
pub fn enumerate_physical_devices<B: Backend + ?Sized>(
    backend: &B,
) -> Result<Vec<vk::PhysicalDevice>, DeviceCreationError> {
    let physical_devices = backend.enumerate_physical_devices()?;
    if physical_devices.is_empty() {
        return Err(DeviceCreationError::NoDeviceFound);
    }

    Ok(physical_devices)
}

/// A physical device whose queue families satisfy every required capability,
/// handed to additional suitability predicates.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    physical_device: vk::PhysicalDevice,
    queue_family_properties: Vec<vk::QueueFamilyProperties>,
    queue_family_indices: QueueFamilyIndices,
}

impl DeviceCandidate {
    /// The physical device under consideration.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Its queue families.
    #[inline]
    pub fn queue_family_properties(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_family_properties
    }

    /// The complete family mapping resolved for it.
    #[inline]
    pub fn queue_family_indices(&self) -> &QueueFamilyIndices {
        &self.queue_family_indices
    }
}

/// The physical device picked by [`DeviceSelector::select`].
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    physical_device: vk::PhysicalDevice,
    queue_family_properties: Vec<vk::QueueFamilyProperties>,
    queue_family_indices: QueueFamilyIndices,
    enabled_extensions: BootstrapSmallVec<CString>,
}

impl SelectedDevice {
    /// The selected physical device.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The queue family properties of the physical device.
    #[inline]
    pub fn queue_family_properties(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_family_properties
    }

    /// Queue families resolved for every required capability. Always
    /// complete.
    #[inline]
    pub fn queue_family_indices(&self) -> &QueueFamilyIndices {
        &self.queue_family_indices
    }

    /// Device extensions which will be enabled on the logical device.
    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }
}

/// Function used to specify a custom additional suitability check,
/// evaluated after queue family resolution succeeded.
pub type SuitabilityFn<'a, B> = dyn FnMut(&B, &DeviceCandidate) -> VkResult<bool> + 'a;

/// Picks the first physical device, in enumeration order, that satisfies
/// every requirement.
///
/// A device is suitable when its queue families satisfy every required
/// [`Capability`], it supports every required extension and every additional
/// suitability function accepts it. Device type and memory size are not
/// considered unless an additional suitability function looks at them.
pub struct DeviceSelector<'a, B> {
    requirements: BootstrapSmallVec<Capability>,
    extensions: BootstrapSmallVec<CString>,
    additional_suitability: Vec<Box<SuitabilityFn<'a, B>>>,
}

impl<'a, B: Backend> DeviceSelector<'a, B> {
    /// Create a selector without any requirement.
    #[inline]
    pub fn new() -> Self {
        DeviceSelector {
            requirements: BootstrapSmallVec::new(),
            extensions: BootstrapSmallVec::new(),
            additional_suitability: Vec::new(),
        }
    }

    /// Require a graphics family and a family presenting to `surface`.
    #[inline]
    pub fn graphics_present(surface: vk::SurfaceKHR) -> Self {
        DeviceSelector::new()
            .require(Capability::Graphics)
            .require(Capability::Presentation(surface))
    }

    /// Require a queue family supporting `capability`.
    #[inline]
    pub fn require(mut self, capability: Capability) -> Self {
        if !self.requirements.contains(&capability) {
            self.requirements.push(capability);
        }
        self
    }

    /// Require a device which supports `extension`.
    /// The extension will be enabled.
    #[inline]
    pub fn require_extension(mut self, extension: &CStr) -> Self {
        if !self.extensions.iter().any(|e| e.as_c_str() == extension) {
            self.extensions.push(extension.to_owned());
        }
        self
    }

    /// Allows to specify custom criteria for a physical device.
    /// This can for example be used to check for limits or device types.
    /// Functions are evaluated in the order they were added.
    #[inline]
    pub fn additional_suitability(mut self, suitability: Box<SuitabilityFn<'a, B>>) -> Self {
        self.additional_suitability.push(suitability);
        self
    }

    /// The required capabilities.
    #[inline]
    pub fn requirements(&self) -> &[Capability] {
        &self.requirements
    }

    /// Enumerate the physical devices of `backend` and return the first
    /// suitable one.
    pub fn select(&mut self, backend: &B) -> Result<SelectedDevice, DeviceCreationError> {
        let physical_devices = enumerate_physical_devices(backend)?;

        'devices: for physical_device in physical_devices {
            let queue_family_properties = backend.queue_family_properties(physical_device);
            let queue_family_indices = resolve_queue_families(
                backend,
                physical_device,
                &queue_family_properties,
                self.requirements.iter().copied(),
            )?;

            if !queue_family_indices.is_complete() {
                let missing: Vec<_> = queue_family_indices.missing().collect();
                tracing::debug!(
                    ?physical_device,
                    ?missing,
                    "skipping device: queue families incomplete"
                );
                continue;
            }

            if !self.extensions.is_empty() {
                let supported = backend.device_extension_properties(physical_device)?;
                let missing: Vec<_> = self
                    .extensions
                    .iter()
                    .filter(|required| {
                        !supported.iter().any(|properties| unsafe {
                            CStr::from_ptr(properties.extension_name.as_ptr()) == required.as_c_str()
                        })
                    })
                    .collect();

                if !missing.is_empty() {
                    tracing::debug!(?physical_device, ?missing, "skipping device: extensions missing");
                    continue;
                }
            }

            let candidate = DeviceCandidate {
                physical_device,
                queue_family_properties,
                queue_family_indices,
            };

            for suitability in self.additional_suitability.iter_mut() {
                if !suitability(backend, &candidate)? {
                    tracing::debug!(?physical_device, "skipping device: rejected by suitability check");
                    continue 'devices;
                }
            }

            tracing::info!(
                ?physical_device,
                indices = ?candidate.queue_family_indices,
                "selected physical device"
            );

            return Ok(SelectedDevice {
                physical_device: candidate.physical_device,
                queue_family_properties: candidate.queue_family_properties,
                queue_family_indices: candidate.queue_family_indices,
                enabled_extensions: self.extensions.clone(),
            });
        }

        Err(DeviceCreationError::NoSuitableDeviceFound)
    }
}

impl<'a, B: Backend> Default for DeviceSelector<'a, B> {
    fn default() -> Self {
        Self::new()
    }
}
