//! Required queue capabilities and the queue family indices resolved for them.
use crate::BootstrapSmallVec;
use ash::vk;

/// A capability the application needs from a queue family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The family supports graphics operations.
    Graphics,
    /// The family supports compute operations.
    Compute,
    /// The family supports transfer operations. This is checked against the
    /// reported flags only, graphics and compute families are not assumed to
    /// imply it.
    Transfer,
    /// The family can present to the given surface.
    Presentation(vk::SurfaceKHR),
}

impl Capability {
    /// The queue flag backing this capability, `None` for presentation which
    /// has to be queried against a surface.
    #[inline]
    pub fn queue_flag(&self) -> Option<vk::QueueFlags> {
        match self {
            Capability::Graphics => Some(vk::QueueFlags::GRAPHICS),
            Capability::Compute => Some(vk::QueueFlags::COMPUTE),
            Capability::Transfer => Some(vk::QueueFlags::TRANSFER),
            Capability::Presentation(_) => None,
        }
    }

    /// Returns true for [`Capability::Presentation`], regardless of surface.
    #[inline]
    pub fn is_presentation(&self) -> bool {
        matches!(self, Capability::Presentation(_))
    }
}

/// Queue family index resolved for each required [`Capability`] of one
/// physical device.
///
/// An unresolved capability is `None`. Index `0` is a valid family and is
/// never used to mean "absent". Several capabilities may resolve to the same
/// family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    entries: BootstrapSmallVec<(Capability, Option<u32>)>,
}

impl QueueFamilyIndices {
    /// Create an empty mapping for `requirements`. Duplicate requirements are
    /// collapsed, the order of first occurrence is kept.
    pub fn new(requirements: impl IntoIterator<Item = Capability>) -> QueueFamilyIndices {
        let mut entries: BootstrapSmallVec<(Capability, Option<u32>)> = BootstrapSmallVec::new();
        for capability in requirements {
            if !entries.iter().any(|(existing, _)| *existing == capability) {
                entries.push((capability, None));
            }
        }

        QueueFamilyIndices { entries }
    }

    /// The family resolved for `capability`. `None` when it is either not
    /// required or not resolved.
    #[inline]
    pub fn get(&self, capability: Capability) -> Option<u32> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == capability)
            .and_then(|(_, index)| *index)
    }

    /// Record `index` for `capability` unless a family was already recorded.
    /// Returns true if the index was recorded.
    pub(crate) fn record(&mut self, capability: Capability, index: u32) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|(existing, slot)| *existing == capability && slot.is_none())
        {
            Some((_, slot)) => {
                *slot = Some(index);
                true
            }
            None => false,
        }
    }

    /// The family resolved for [`Capability::Graphics`].
    #[inline]
    pub fn graphics(&self) -> Option<u32> {
        self.get(Capability::Graphics)
    }

    /// The family resolved for the first [`Capability::Presentation`]
    /// requirement, whatever its surface.
    #[inline]
    pub fn presentation(&self) -> Option<u32> {
        self.entries
            .iter()
            .find(|(capability, _)| capability.is_presentation())
            .and_then(|(_, index)| *index)
    }

    /// True when every required capability has a family.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|(_, index)| index.is_some())
    }

    /// Required capabilities without a family yet.
    pub fn missing(&self) -> impl Iterator<Item = Capability> + '_ {
        self.entries
            .iter()
            .filter(|(_, index)| index.is_none())
            .map(|(capability, _)| *capability)
    }

    /// The required capabilities, in the order they were given.
    pub fn requirements(&self) -> impl Iterator<Item = Capability> + '_ {
        self.entries.iter().map(|(capability, _)| *capability)
    }

    /// Every requirement with its resolved family.
    pub fn iter(&self) -> impl Iterator<Item = (Capability, Option<u32>)> + '_ {
        self.entries.iter().copied()
    }

    /// Resolved family indices without duplicates, in the order their
    /// capabilities were required.
    pub fn distinct_families(&self) -> BootstrapSmallVec<u32> {
        let mut families = BootstrapSmallVec::new();
        for index in self.entries.iter().filter_map(|(_, index)| *index) {
            if !families.contains(&index) {
                families.push(index);
            }
        }

        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5)
    }

    #[test]
    fn empty_requirements_are_complete() {
        let indices = QueueFamilyIndices::new([]);
        assert!(indices.is_complete());
        assert!(indices.distinct_families().is_empty());
    }

    #[test]
    fn index_zero_is_not_absence() {
        let mut indices = QueueFamilyIndices::new([Capability::Graphics]);
        assert_eq!(indices.graphics(), None);
        assert!(!indices.is_complete());

        assert!(indices.record(Capability::Graphics, 0));
        assert_eq!(indices.graphics(), Some(0));
        assert!(indices.is_complete());
    }

    #[test]
    fn first_record_wins() {
        let mut indices = QueueFamilyIndices::new([Capability::Graphics]);
        assert!(indices.record(Capability::Graphics, 2));
        assert!(!indices.record(Capability::Graphics, 1));
        assert_eq!(indices.graphics(), Some(2));
    }

    #[test]
    fn unrequired_capability_is_not_recorded() {
        let mut indices = QueueFamilyIndices::new([Capability::Graphics]);
        assert!(!indices.record(Capability::Compute, 0));
        assert_eq!(indices.get(Capability::Compute), None);
    }

    #[test]
    fn duplicate_requirements_collapse() {
        let indices = QueueFamilyIndices::new([
            Capability::Graphics,
            Capability::Presentation(surface()),
            Capability::Graphics,
        ]);
        assert_eq!(indices.requirements().count(), 2);
    }

    #[test]
    fn shared_family_is_listed_once() {
        let mut indices = QueueFamilyIndices::new([
            Capability::Graphics,
            Capability::Presentation(surface()),
            Capability::Transfer,
        ]);
        indices.record(Capability::Graphics, 1);
        indices.record(Capability::Presentation(surface()), 1);
        indices.record(Capability::Transfer, 0);

        assert_eq!(indices.presentation(), Some(1));
        assert_eq!(indices.distinct_families().as_slice(), &[1, 0]);
    }

    #[test]
    fn missing_lists_unresolved() {
        let mut indices =
            QueueFamilyIndices::new([Capability::Graphics, Capability::Presentation(surface())]);
        indices.record(Capability::Graphics, 0);

        let missing: Vec<_> = indices.missing().collect();
        assert_eq!(missing, vec![Capability::Presentation(surface())]);
    }
}
