//! Queue family and memory type selection.

use ash::vk;

/// Queue classes a scenario can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueType {
    #[default]
    Graphics,
    Compute,
    Transfer,
}

impl QueueType {
    /// Parse the `--queue` flag value, falling back to `default` when the
    /// flag is absent or empty. Exits with failure status on an unknown
    /// value, printing the offender.
    pub fn from_flag(value: Option<&str>, default: QueueType) -> QueueType {
        match value {
            None | Some("") => default,
            Some("graphics") | Some("Graphics") => QueueType::Graphics,
            Some("compute") | Some("Compute") => QueueType::Compute,
            Some("transfer") | Some("Transfer") => QueueType::Transfer,
            Some(other) => {
                eprintln!("Unknown queue type: {other}");
                std::process::exit(1);
            }
        }
    }
}

/// Pick a queue family for the requested class.
///
/// `Compute` wants a family advertising compute but *not* graphics;
/// `Transfer` wants transfer but neither graphics nor compute; `Graphics`
/// takes the first family advertising graphics. Returns `None` when no
/// family matches; callers must treat that as a fatal configuration error.
pub fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    queue_type: QueueType,
) -> Option<u32> {
    families
        .iter()
        .position(|family| {
            let flags = family.queue_flags;
            match queue_type {
                QueueType::Compute => {
                    flags.contains(vk::QueueFlags::COMPUTE)
                        && !flags.contains(vk::QueueFlags::GRAPHICS)
                }
                QueueType::Transfer => {
                    flags.contains(vk::QueueFlags::TRANSFER)
                        && !flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                }
                QueueType::Graphics => flags.contains(vk::QueueFlags::GRAPHICS),
            }
        })
        .map(|idx| idx as u32)
}

/// Return the lowest memory type index whose bit is set in `type_bits` and
/// whose property flags are a superset of `required`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&idx| {
        (type_bits & (1 << idx)) != 0
            && memory_properties.memory_types[idx as usize]
                .property_flags
                .contains(required)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    // Typical discrete GPU layout: one do-everything family, one
    // compute-only family, one transfer-only family.
    fn typical_families() -> Vec<vk::QueueFamilyProperties> {
        vec![
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ]
    }

    #[test]
    fn graphics_takes_first_graphics_family() {
        let families = typical_families();
        assert_eq!(select_queue_family(&families, QueueType::Graphics), Some(0));
    }

    #[test]
    fn compute_excludes_graphics_families() {
        let families = typical_families();
        assert_eq!(select_queue_family(&families, QueueType::Compute), Some(1));
    }

    #[test]
    fn transfer_excludes_graphics_and_compute() {
        let families = typical_families();
        assert_eq!(select_queue_family(&families, QueueType::Transfer), Some(2));
    }

    #[test]
    fn no_matching_family_is_none() {
        let families = vec![family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        assert_eq!(select_queue_family(&families, QueueType::Compute), None);
        assert_eq!(select_queue_family(&families, QueueType::Transfer), None);
        assert_eq!(select_queue_family(&[], QueueType::Graphics), None);
    }

    fn memory_properties(
        types: &[vk::MemoryPropertyFlags],
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn memory_type_needs_superset_of_flags() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, !0, wanted), Some(2));
    }

    #[test]
    fn memory_type_respects_type_bitmask() {
        let visible = vk::MemoryPropertyFlags::HOST_VISIBLE;
        let props = memory_properties(&[visible, visible, visible]);
        // Only types 1 and 2 allowed; the lowest allowed index wins.
        assert_eq!(find_memory_type(&props, 0b110, visible), Some(1));
    }

    #[test]
    fn memory_type_not_found_is_none() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&props, !0, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
        assert_eq!(
            find_memory_type(&props, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }
}
