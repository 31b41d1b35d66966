//! std140 packing for manifest-declared uniform blocks.
use crate::error::ContextError;
use crate::shader::{UniformDecl, UniformKind, UniformValue};

/// Array elements are padded to a vec4 slot under std140.
const ARRAY_STRIDE: u64 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Std140Field {
    pub name: &'static str,
    pub kind: UniformKind,
    pub offset: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Std140Layout {
    pub fields: Vec<Std140Field>,
    pub size: u64,
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl Std140Layout {
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut offset = 0;
        let mut fields = Vec::with_capacity(decls.len());
        for decl in decls {
            let (alignment, size) = match decl.kind {
                UniformKind::Float => (4, 4),
                UniformKind::Vec2 => (8, 8),
                UniformKind::FloatArray(len) => (ARRAY_STRIDE, ARRAY_STRIDE * len as u64),
            };
            offset = align_to(offset, alignment);
            fields.push(Std140Field {
                name: decl.name,
                kind: decl.kind,
                offset,
            });
            offset += size;
        }
        Self {
            fields,
            size: align_to(offset.max(16), 16),
        }
    }
}

/// CPU shadow copy of one uniform buffer.
pub(crate) struct UniformBlock {
    pub layout: Std140Layout,
    pub data: Vec<u8>,
    pub buffer: wgpu::Buffer,
}

impl UniformBlock {
    pub fn new(device: &wgpu::Device, label: &str, decls: &[UniformDecl]) -> Self {
        let layout = Std140Layout::new(decls);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: layout.size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            data: vec![0; layout.size as usize],
            layout,
            buffer,
        }
    }

    pub fn write(&mut self, field: usize, value: UniformValue<'_>) -> Result<(), ContextError> {
        write_field(&self.layout, &mut self.data, field, value)
    }

    pub fn flush(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, &self.data);
    }
}

pub(crate) fn write_field(
    layout: &Std140Layout,
    data: &mut [u8],
    field: usize,
    value: UniformValue<'_>,
) -> Result<(), ContextError> {
    let Some(field) = layout.fields.get(field) else {
        return Err(ContextError::Device(format!("invalid uniform field {field}")));
    };
    if !value.matches(field.kind) {
        return Err(ContextError::Device(format!(
            "uniform '{}' is {:?}, got {value:?}",
            field.name, field.kind
        )));
    }

    let offset = field.offset as usize;
    match value {
        UniformValue::Float(value) => {
            data[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&value));
        }
        UniformValue::Vec2(values) => {
            data[offset..offset + 8].copy_from_slice(bytemuck::cast_slice(&values));
        }
        UniformValue::FloatArray(values) => {
            for (index, value) in values.iter().enumerate() {
                let start = offset + index * ARRAY_STRIDE as usize;
                data[start..start + 4].copy_from_slice(bytemuck::bytes_of(value));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn convolution_block_matches_std140() {
        let layout = Std140Layout::new(&[UniformDecl::vec2("px"), UniformDecl::array("m", 9)]);
        let offsets: Vec<_> = layout.fields.iter().map(|f| (f.name, f.offset)).collect();
        assert_eq!(offsets, vec![("px", 0), ("m", 16)]);
        assert_eq!(layout.size, 16 + 9 * 16);
    }

    #[test]
    fn scalar_block_is_padded_to_sixteen_bytes() {
        let layout = Std140Layout::new(&[UniformDecl::float("flipY")]);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn array_elements_land_on_vec4_boundaries() {
        let layout = Std140Layout::new(&[UniformDecl::array("m", 3)]);
        let mut data = vec![0u8; layout.size as usize];
        write_field(&layout, &mut data, 0, UniformValue::FloatArray(&[1.0, 2.0, 3.0])).unwrap();
        let floats: Vec<f32> = data
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[4], 2.0);
        assert_eq!(floats[8], 3.0);
        assert_eq!(floats[1], 0.0);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let layout = Std140Layout::new(&[UniformDecl::vec2("size")]);
        let mut data = vec![0u8; layout.size as usize];
        assert!(write_field(&layout, &mut data, 0, UniformValue::Float(1.0)).is_err());
    }
}
