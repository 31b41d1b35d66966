use image::imageops::flip_vertical_in_place;
use image::RgbaImage;

use crate::error::ContextError;

const BYTES_PER_PIXEL: u32 = 4;

pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(alignment) * alignment
}

/// Copies `texture` to host memory. Rows come back in storage order, so the
/// result is flipped to put the top row first.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<RgbaImage, ContextError> {
    let width = texture.width();
    let height = texture.height();
    let padded = padded_bytes_per_row(width);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("surface readback"),
        size: u64::from(padded) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("surface readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| ContextError::Device(format!("device poll failed: {err}")))?;
    receiver
        .recv()
        .map_err(|_| ContextError::Device("readback buffer was never mapped".into()))?
        .map_err(|err| ContextError::Device(format!("failed to map readback buffer: {err}")))?;

    let unpadded = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(unpadded * height as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded]);
        }
    }
    buffer.unmap();

    let mut image = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| ContextError::Device("readback produced a short buffer".into()))?;
    flip_vertical_in_place(&mut image);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }
}
