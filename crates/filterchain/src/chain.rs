use image::RgbaImage;
use tracing::{debug, trace};

use crate::context::{ContextStats, RenderContext, TextureFilter, TextureId};
use crate::effects::{Effect, EffectCatalog};
use crate::error::{FilterError, Result};
use crate::pass::{DrawMode, PassContext, PipelineState};
use crate::program::ProgramCache;
use crate::shader::IDENTITY_SHADER;
use crate::targets::RenderTargetPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SourceTexture {
    id: TextureId,
    width: u32,
    height: u32,
}

/// One queued invocation; the effect carries its own arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainEntry {
    pub effect: Effect,
}

/// An ordered list of effects bound to one rendering context.
pub struct FilterChain<C: RenderContext> {
    context: C,
    catalog: EffectCatalog,
    programs: ProgramCache,
    targets: RenderTargetPool,
    source: Option<SourceTexture>,
    entries: Vec<ChainEntry>,
}

impl<C: RenderContext> FilterChain<C> {
    pub fn new(context: C) -> Result<Self> {
        Ok(Self::with_catalog(context, EffectCatalog::builtin()?))
    }

    pub fn with_catalog(context: C, catalog: EffectCatalog) -> Self {
        Self {
            context,
            catalog,
            programs: ProgramCache::new(),
            targets: RenderTargetPool::new(),
            source: None,
            entries: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &EffectCatalog {
        &self.catalog
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn stats(&self) -> ContextStats {
        self.context.stats()
    }

    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn targets(&self) -> &RenderTargetPool {
        &self.targets
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_effect(&mut self, effect: Effect) -> &mut Self {
        self.entries.push(ChainEntry { effect });
        self
    }

    /// Looks `name` up in the catalog. Fails before touching the context.
    pub fn add_named(&mut self, name: &str, args: &[f32]) -> Result<&mut Self> {
        let effect = self.catalog.parse(name, args)?;
        Ok(self.add_effect(effect))
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Runs every entry over `image` and returns the visible surface.
    pub fn apply(&mut self, image: &RgbaImage) -> Result<RenderedSurface<'_, C>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FilterError::EmptyImage { width, height });
        }

        trace!(width, height, "resizing");
        self.targets.ensure_size(&mut self.context, width, height)?;

        trace!("uploading");
        let source = self.upload(image)?;

        debug!(entries = self.entries.len(), width, height, "applying filter chain");
        let mut state = PipelineState::new();
        let mut pass = PassContext::new(
            &mut self.context,
            &mut self.programs,
            &mut self.targets,
            &mut state,
            source,
        );

        if self.entries.is_empty() {
            pass.state_mut().last_in_chain = true;
            pass.select(&IDENTITY_SHADER)?;
            pass.draw_pass(DrawMode::Default)?;
        } else {
            let last = self.entries.len() - 1;
            for (index, entry) in self.entries.iter().enumerate() {
                pass.state_mut().last_in_chain = index == last;
                let passes = entry.effect.run(&mut pass, width, height)?;
                trace!(effect = entry.effect.name(), passes, "effect finished");
            }
        }
        let draws = pass.state().draw_count;
        debug!(draws, "filter chain done");

        Ok(RenderedSurface {
            context: &mut self.context,
            width,
            height,
            draws,
        })
    }

    fn upload(&mut self, image: &RgbaImage) -> Result<TextureId> {
        let (width, height) = image.dimensions();
        match self.source {
            Some(source) if (source.width, source.height) == (width, height) => {
                self.context.update_texture(source.id, image)?;
                Ok(source.id)
            }
            Some(mut source) => {
                debug!(width, height, "source size changed; re-uploading");
                self.context.upload_texture(source.id, image)?;
                source.width = width;
                source.height = height;
                self.source = Some(source);
                Ok(source.id)
            }
            None => {
                let id = self
                    .context
                    .create_texture(width, height, TextureFilter::Nearest)?;
                self.context.upload_texture(id, image)?;
                self.source = Some(SourceTexture { id, width, height });
                Ok(id)
            }
        }
    }
}

/// The visible surface after an `apply`.
pub struct RenderedSurface<'a, C: RenderContext> {
    context: &'a mut C,
    width: u32,
    height: u32,
    draws: u32,
}

impl<C: RenderContext> RenderedSurface<'_, C> {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Draw calls issued by the `apply` that produced this surface.
    pub fn draws(&self) -> u32 {
        self.draws
    }

    /// Copies the surface into an image, top row first.
    pub fn read_pixels(&mut self) -> Result<RgbaImage> {
        Ok(self.context.read_surface()?)
    }
}
