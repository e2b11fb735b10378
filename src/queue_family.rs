//! Queue family resolution.
use crate::{Backend, Capability, QueueFamilyIndices};
use ash::prelude::VkResult;
use ash::vk;

/// Resolve a queue family for each of `requirements` on `physical_device`.
///
/// Families are visited in order, starting at index 0. Every capability takes
/// the first family that satisfies it, so several capabilities can land on
/// the same family. The walk stops after the first family at which the
/// mapping becomes complete; all requirements are checked against that family
/// before stopping.
///
/// Returns an incomplete mapping when some capability can't be satisfied.
/// Returns `Err(_)` when a presentation query failed.
pub fn resolve_queue_families<B: Backend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
    queue_family_properties: &[vk::QueueFamilyProperties],
    requirements: impl IntoIterator<Item = Capability>,
) -> VkResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::new(requirements);
    if indices.is_complete() {
        return Ok(indices);
    }

    for (i, properties) in queue_family_properties.iter().enumerate() {
        let i = i as u32;

        let pending: crate::BootstrapSmallVec<Capability> = indices.missing().collect();
        for capability in pending {
            if supports(backend, physical_device, i, properties, capability)? {
                indices.record(capability, i);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

fn supports<B: Backend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    properties: &vk::QueueFamilyProperties,
    capability: Capability,
) -> VkResult<bool> {
    match capability {
        Capability::Presentation(surface) => {
            backend.surface_support(physical_device, queue_family_index, surface)
        }
        other => Ok(other
            .queue_flag()
            .map_or(false, |flag| properties.queue_flags.contains(flag))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{FakeBackend, FakeDevice, FakeFamily};
    use ash::vk::Handle;

    fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5)
    }

    fn resolve(families: Vec<FakeFamily>) -> (FakeBackend, QueueFamilyIndices) {
        let backend = FakeBackend::new(vec![FakeDevice::new(1, families)]);
        let physical_device = backend.devices[0].handle;
        let properties = backend.queue_family_properties(physical_device);
        let indices = resolve_queue_families(
            &backend,
            physical_device,
            &properties,
            [Capability::Graphics, Capability::Presentation(surface())],
        )
        .unwrap();
        (backend, indices)
    }

    #[test]
    fn shared_graphics_present_family() {
        let (_, indices) = resolve(vec![
            FakeFamily::new(vk::QueueFlags::TRANSFER, false),
            FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
        ]);
        assert_eq!(indices.graphics(), Some(1));
        assert_eq!(indices.presentation(), Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn separate_graphics_and_present_families() {
        let (_, indices) = resolve(vec![
            FakeFamily::new(vk::QueueFlags::GRAPHICS, false),
            FakeFamily::new(vk::QueueFlags::empty(), true),
        ]);
        assert_eq!(indices.graphics(), Some(0));
        assert_eq!(indices.presentation(), Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn graphics_takes_lowest_index() {
        let (_, indices) = resolve(vec![
            FakeFamily::new(vk::QueueFlags::COMPUTE, true),
            FakeFamily::new(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
        ]);
        assert_eq!(indices.graphics(), Some(1));
        assert_eq!(indices.presentation(), Some(0));
    }

    #[test]
    fn no_present_family_is_incomplete() {
        let (_, indices) = resolve(vec![
            FakeFamily::new(vk::QueueFlags::GRAPHICS, false),
            FakeFamily::new(vk::QueueFlags::TRANSFER, false),
        ]);
        assert_eq!(indices.graphics(), Some(0));
        assert_eq!(indices.presentation(), None);
        assert!(!indices.is_complete());
    }

    #[test]
    fn no_graphics_family_is_incomplete() {
        let (_, indices) = resolve(vec![FakeFamily::new(vk::QueueFlags::COMPUTE, true)]);
        assert_eq!(indices.graphics(), None);
        assert_eq!(indices.presentation(), Some(0));
        assert!(!indices.is_complete());
    }

    #[test]
    fn no_families_is_incomplete() {
        let (_, indices) = resolve(vec![]);
        assert!(!indices.is_complete());
    }

    #[test]
    fn stops_once_complete() {
        let (backend, indices) = resolve(vec![
            FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
            FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
            FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
        ]);
        assert_eq!(indices.graphics(), Some(0));
        assert_eq!(indices.presentation(), Some(0));
        assert_eq!(backend.surface_queries.get(), 1);
    }

    #[test]
    fn presentation_is_queried_on_the_completing_family() {
        let (backend, indices) = resolve(vec![
            FakeFamily::new(vk::QueueFlags::TRANSFER, false),
            FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
            FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
        ]);
        assert_eq!(indices.presentation(), Some(1));
        assert_eq!(backend.surface_queries.get(), 2);
    }

    #[test]
    fn extra_capabilities_resolve_in_the_same_walk() {
        let backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![
                FakeFamily::new(
                    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                    true,
                ),
                FakeFamily::new(vk::QueueFlags::TRANSFER, false),
            ],
        )]);
        let physical_device = backend.devices[0].handle;
        let properties = backend.queue_family_properties(physical_device);
        let indices = resolve_queue_families(
            &backend,
            physical_device,
            &properties,
            [
                Capability::Graphics,
                Capability::Presentation(surface()),
                Capability::Compute,
                Capability::Transfer,
            ],
        )
        .unwrap();

        assert!(indices.is_complete());
        assert_eq!(indices.get(Capability::Compute), Some(0));
        assert_eq!(indices.get(Capability::Transfer), Some(0));
        assert_eq!(indices.distinct_families().as_slice(), &[0]);
    }

    #[test]
    fn surface_query_error_propagates() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new(
            1,
            vec![
                FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
                FakeFamily::new(vk::QueueFlags::GRAPHICS, true),
            ],
        )]);
        backend.fail_surface_query = Some(vk::Result::ERROR_SURFACE_LOST_KHR);
        let physical_device = backend.devices[0].handle;
        let properties = backend.queue_family_properties(physical_device);

        let result = resolve_queue_families(
            &backend,
            physical_device,
            &properties,
            [Capability::Graphics, Capability::Presentation(surface())],
        );
        assert_eq!(result.unwrap_err(), vk::Result::ERROR_SURFACE_LOST_KHR);
        assert_eq!(backend.surface_queries.get(), 1);
    }
}
