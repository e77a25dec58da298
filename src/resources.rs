//! I/O buffer provisioning, descriptor sets, and SPIR-V kernel loading.

use std::path::Path;

use ash::vk;

use crate::device::{Device, IoBuffers, BUFFER_SIZE, NUM_BUFFER_ENTRIES};
use crate::error::{HcfError, Result};
use crate::select::find_memory_type;

/// Host-side initialization pattern for the "in" buffer. The "out" half is
/// zeroed for every mode except `None`, which skips mapping entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferInit {
    /// Leave the allocation untouched.
    None,
    /// Ascending floats `2.0 + 2.0 * i`.
    Default,
    /// Every entry `-1.0f32`.
    MinusOne,
    /// Every entry `65535u32`.
    SixtyFourK,
    /// Adds transfer usage on both buffers so markers and copies can
    /// target them; the "in" half is left unset.
    Transfer,
}

impl Device {
    /// Create the paired "in"/"out" storage buffers backed by one
    /// host-visible allocation of `2 * BUFFER_SIZE` bytes, bound at offsets
    /// 0 and `BUFFER_SIZE`, and fill them per `mode`.
    pub fn allocate_io_buffers(&mut self, mode: BufferInit) -> Result<()> {
        let mut input_usage = vk::BufferUsageFlags::STORAGE_BUFFER;
        let mut output_usage = vk::BufferUsageFlags::STORAGE_BUFFER;
        if mode == BufferInit::Transfer {
            input_usage |= vk::BufferUsageFlags::TRANSFER_SRC;
            output_usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }

        let input_info = vk::BufferCreateInfo::builder()
            .size(BUFFER_SIZE)
            .usage(input_usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let output_info = vk::BufferCreateInfo::builder()
            .size(BUFFER_SIZE)
            .usage(output_usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let input = unsafe { self.device.create_buffer(&input_info, None)? };
        let output = unsafe { self.device.create_buffer(&output_info, None)? };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(input) };
        let memory_type = find_memory_type(
            &self.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .ok_or(HcfError::NoMatchingMemoryType)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(2 * BUFFER_SIZE)
            .memory_type_index(memory_type);
        let memory = unsafe { self.device.allocate_memory(&alloc_info, None)? };
        unsafe {
            self.device.bind_buffer_memory(input, memory, 0)?;
            self.device.bind_buffer_memory(output, memory, BUFFER_SIZE)?;
        }

        self.caps
            .set_object_name(input, vk::ObjectType::BUFFER, "Input Buffer");
        self.caps
            .set_object_name(output, vk::ObjectType::BUFFER, "Output Buffer");
        self.caps
            .set_object_name(memory, vk::ObjectType::DEVICE_MEMORY, "DeviceMemory for I/O");

        if mode != BufferInit::None {
            let ptr = unsafe {
                self.device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
            };
            unsafe {
                match mode {
                    BufferInit::Default => {
                        let data =
                            std::slice::from_raw_parts_mut(ptr as *mut f32, NUM_BUFFER_ENTRIES);
                        for (i, value) in data.iter_mut().enumerate() {
                            *value = 2.0 + 2.0 * i as f32;
                        }
                    }
                    BufferInit::MinusOne => {
                        std::slice::from_raw_parts_mut(ptr as *mut f32, NUM_BUFFER_ENTRIES)
                            .fill(-1.0);
                    }
                    BufferInit::SixtyFourK => {
                        std::slice::from_raw_parts_mut(ptr as *mut u32, NUM_BUFFER_ENTRIES)
                            .fill(65535);
                    }
                    // Transfer only changes buffer usage; the "in" half
                    // keeps whatever the allocation contained.
                    BufferInit::None | BufferInit::Transfer => {}
                }
                std::slice::from_raw_parts_mut(
                    (ptr as *mut u8).add(BUFFER_SIZE as usize),
                    BUFFER_SIZE as usize,
                )
                .fill(0);
                self.device.unmap_memory(memory);
            }
        }

        self.io = Some(IoBuffers {
            input,
            output,
            memory,
            buffer_size: BUFFER_SIZE,
        });
        Ok(())
    }

    /// Allocate the single descriptor set and point bindings 0/1 at the
    /// in/out buffers, whole range. Requires
    /// [`allocate_io_buffers`](Self::allocate_io_buffers) and a kernel-built
    /// pipeline.
    pub fn create_descriptor_sets(&mut self) -> Result<()> {
        let layouts = [self.descriptor_set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? };
        let set = sets.first().copied().unwrap_or_else(vk::DescriptorSet::null);

        let io = self.io();
        let input_info = [vk::DescriptorBufferInfo::builder()
            .buffer(io.input())
            .offset(0)
            .range(vk::WHOLE_SIZE)
            .build()];
        let output_info = [vk::DescriptorBufferInfo::builder()
            .buffer(io.output())
            .offset(0)
            .range(vk::WHOLE_SIZE)
            .build()];
        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&input_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&output_info)
                .build(),
        ];
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };

        self.caps
            .set_object_name(set, vk::ObjectType::DESCRIPTOR_SET, "Default DescriptorSet");
        self.descriptor_set = set;
        Ok(())
    }
}

/// Read a SPIR-V kernel file into words. The byte length must be a whole,
/// nonzero number of 32-bit words.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| {
        log::error!("Unable to read kernel '{}': {source}", path.display());
        HcfError::KernelIo {
            path: path.to_path_buf(),
            source,
        }
    })?;
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        log::error!(
            "Kernel '{}' is not a whole number of SPIR-V words",
            path.display()
        );
        return Err(HcfError::KernelLength(path.to_path_buf()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|word| u32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

/// Load a SPIR-V kernel from disk into a shader module.
pub fn load_shader(device: &ash::Device, path: &Path) -> Result<vk::ShaderModule> {
    let words = read_spirv(path)?;
    let info = vk::ShaderModuleCreateInfo::builder().code(&words);
    Ok(unsafe { device.create_shader_module(&info, None)? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_spirv_missing_file() {
        let err = read_spirv(Path::new("/nonexistent/kernel.spv")).unwrap_err();
        assert!(matches!(err, HcfError::KernelIo { .. }));
    }

    #[test]
    fn read_spirv_rejects_partial_words() {
        let path = std::env::temp_dir().join("hcf_truncated_kernel.spv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0x03, 0x02, 0x23, 0x07, 0xAA]).unwrap();
        drop(file);

        let err = read_spirv(&path).unwrap_err();
        assert!(matches!(err, HcfError::KernelLength(_)));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn read_spirv_decodes_words() {
        let path = std::env::temp_dir().join("hcf_word_kernel.spv");
        std::fs::write(&path, 0x0723_0203u32.to_ne_bytes()).unwrap();

        let words = read_spirv(&path).unwrap();
        assert_eq!(words, vec![0x0723_0203]);
        std::fs::remove_file(&path).unwrap();
    }
}
