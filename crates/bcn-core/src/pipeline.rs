use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::{debug, error};

use crate::backend::DeviceBackend;
use crate::error::{LayerError, LayerResult};
use crate::format::FormatFamily;
use crate::kernels::{KernelSource, KernelVariant};

/// Per-dispatch parameters, laid out as the kernels declare them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PushConstants {
    /// Raw `VkFormat` of the compressed source.
    pub format: i32,
    pub width: i32,
    pub height: i32,
    /// Byte offset of the region in the source buffer.
    pub offset: i32,
    /// Source row length in texels, 0 for tightly packed.
    pub buffer_row_length: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub reserved: i32,
}

pub const PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<PushConstants>() as u32;

/// Workgroups cover 8x8 texels.
pub const WORKGROUP_SIZE: u32 = 8;

/// Layouts and one compute pipeline per format family, built once per device.
#[derive(Debug)]
pub struct DecodePipelines {
    pub set_layout: vk::DescriptorSetLayout,
    pub layout: vk::PipelineLayout,
    /// Binding 0 type shared by every pipeline.
    pub destination_type: vk::DescriptorType,
    pipelines: [vk::Pipeline; 4],
}

impl DecodePipelines {
    pub fn build(
        backend: &dyn DeviceBackend,
        kernels: &dyn KernelSource,
        variant: KernelVariant,
    ) -> LayerResult<Self> {
        let destination_type = match variant {
            KernelVariant::Image => vk::DescriptorType::STORAGE_IMAGE,
            KernelVariant::Buffer => vk::DescriptorType::STORAGE_BUFFER,
        };

        // Load every blob first so a missing file costs no device objects.
        let mut code = Vec::with_capacity(FormatFamily::ALL.len());
        for family in FormatFamily::ALL {
            code.push(kernels.load(family, variant)?);
        }

        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(destination_type)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE),
        ];
        let set_layout = backend
            .create_descriptor_set_layout(&bindings)
            .map_err(LayerError::backend("vkCreateDescriptorSetLayout"))?;

        let push = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: PUSH_CONSTANT_SIZE,
        };
        let layout = match backend.create_pipeline_layout(set_layout, push) {
            Ok(layout) => layout,
            Err(e) => {
                backend.destroy_descriptor_set_layout(set_layout);
                return Err(LayerError::backend("vkCreatePipelineLayout")(e));
            }
        };

        let mut built = Self {
            set_layout,
            layout,
            destination_type,
            pipelines: [vk::Pipeline::null(); 4],
        };
        for (family, words) in FormatFamily::ALL.into_iter().zip(code) {
            match build_pipeline(backend, layout, &words) {
                Ok(pipeline) => built.pipelines[family_index(family)] = pipeline,
                Err(e) => {
                    error!("{:?} decode pipeline: {}", family, e);
                    built.destroy(backend);
                    return Err(e);
                }
            }
        }
        debug!("decode pipelines built ({:?} variant)", variant);
        Ok(built)
    }

    pub fn pipeline(&self, family: FormatFamily) -> vk::Pipeline {
        self.pipelines[family_index(family)]
    }

    pub fn destroy(&self, backend: &dyn DeviceBackend) {
        for pipeline in self.pipelines {
            if pipeline != vk::Pipeline::null() {
                backend.destroy_pipeline(pipeline);
            }
        }
        backend.destroy_pipeline_layout(self.layout);
        backend.destroy_descriptor_set_layout(self.set_layout);
    }
}

fn build_pipeline(backend: &dyn DeviceBackend, layout: vk::PipelineLayout, code: &[u32]) -> LayerResult<vk::Pipeline> {
    let module = backend
        .create_shader_module(code)
        .map_err(LayerError::backend("vkCreateShaderModule"))?;
    let pipeline = backend.create_compute_pipeline(layout, module);
    backend.destroy_shader_module(module);
    pipeline.map_err(LayerError::backend("vkCreateComputePipelines"))
}

fn family_index(family: FormatFamily) -> usize {
    match family {
        FormatFamily::S3tc => 0,
        FormatFamily::Rgtc => 1,
        FormatFamily::Bc6 => 2,
        FormatFamily::Bc7 => 3,
    }
}
