use tracing::debug;

use crate::context::{FramebufferId, RenderContext, TextureFilter, TextureId};
use crate::error::Result;

/// Two triangles covering clip space, interleaved as `x, y, u, v`.
pub const QUAD_VERTICES: [f32; 24] = [
    -1.0, -1.0, 0.0, 1.0, //
    1.0, -1.0, 1.0, 1.0, //
    -1.0, 1.0, 0.0, 0.0, //
    -1.0, 1.0, 0.0, 0.0, //
    1.0, -1.0, 1.0, 1.0, //
    1.0, 1.0, 1.0, 0.0, //
];

pub const QUAD_VERTEX_COUNT: u32 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub framebuffer: FramebufferId,
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
}

/// The two ping-pong targets plus the shared quad buffer.
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    width: u32,
    height: u32,
    slots: [Option<RenderTarget>; 2],
    quad_ready: bool,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_allocated(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(Option::is_some)
    }

    /// Returns `true` when the size changed and the surface was reconfigured.
    pub fn ensure_size<C: RenderContext>(
        &mut self,
        context: &mut C,
        width: u32,
        height: u32,
    ) -> Result<bool> {
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }

        debug!(
            from = ?(self.width, self.height),
            to = ?(width, height),
            "resizing render targets"
        );
        self.invalidate_all(context);
        context.configure_surface(width, height)?;
        self.width = width;
        self.height = height;

        if !self.quad_ready {
            context.create_quad_buffer(&QUAD_VERTICES)?;
            self.quad_ready = true;
        }
        Ok(true)
    }

    pub fn invalidate_all<C: RenderContext>(&mut self, context: &mut C) {
        for target in self.slots.iter_mut().filter_map(Option::take) {
            context.release_framebuffer(target.framebuffer);
            context.release_texture(target.texture);
        }
    }

    /// The target for `slot`, allocated on first request at the current size.
    pub fn get<C: RenderContext>(&mut self, context: &mut C, slot: usize) -> Result<RenderTarget> {
        let slot = slot % self.slots.len();
        if let Some(target) = self.slots[slot] {
            return Ok(target);
        }

        let texture = context.create_texture(self.width, self.height, TextureFilter::Linear)?;
        let framebuffer = context.create_framebuffer(texture)?;
        let target = RenderTarget {
            framebuffer,
            texture,
            width: self.width,
            height: self.height,
        };
        debug!(slot, width = self.width, height = self.height, "allocated render target");
        self.slots[slot] = Some(target);
        Ok(target)
    }
}
