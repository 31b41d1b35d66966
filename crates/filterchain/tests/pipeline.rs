use filterchain::shader::{ShaderSource, ShaderStage, IDENTITY_SHADER};
use filterchain::{
    DrawMode, Effect, FilterChain, FilterError, PassContext, PassTarget, PipelineState,
    ProgramCache, RenderContext, RenderTargetPool, SoftwareContext, TextureFilter,
};
use image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Top rows red, bottom rows blue, with one white marker in the top-left.
fn asymmetric(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| match (x, y) {
        (0, 0) => Rgba([255, 255, 255, 255]),
        (_, y) if y < height / 2 => RED,
        _ => BLUE,
    })
}

fn software_chain() -> FilterChain<SoftwareContext> {
    FilterChain::new(SoftwareContext::new()).unwrap()
}

/// Effects that leave 0/255 channel values unchanged.
fn lossless(passes: u32) -> Vec<Effect> {
    let mut effects = Vec::new();
    let mut remaining = passes;
    while remaining >= 2 {
        effects.push(Effect::Blur { radius: 0.0 });
        remaining -= 2;
    }
    if remaining == 1 {
        effects.push(Effect::Brightness { amount: 0.0 });
    }
    effects
}

#[test]
fn empty_chain_draws_identity() {
    let image = asymmetric(5, 4);
    let mut chain = software_chain();
    let mut surface = chain.apply(&image).unwrap();
    assert_eq!(surface.draws(), 1);
    assert_eq!(surface.size(), (5, 4));
    assert_eq!(surface.read_pixels().unwrap(), image);

    let draws = chain.context().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].program, IDENTITY_SHADER.label);
    assert_eq!(draws[0].target, None);
}

#[test]
fn output_is_upright_for_every_pass_count() {
    let image = asymmetric(6, 4);
    for passes in 1..=5 {
        let mut chain = software_chain();
        for effect in lossless(passes) {
            chain.add_effect(effect);
        }
        let mut surface = chain.apply(&image).unwrap();
        assert_eq!(surface.draws(), passes, "pass count");
        assert_eq!(surface.read_pixels().unwrap(), image, "{passes} passes");

        let last = chain.context().draws().last().copied().unwrap();
        let expected_flip = if passes % 2 == 0 { -1.0 } else { 1.0 };
        assert_eq!(last.target, None);
        assert_eq!(last.flip_y, expected_flip, "{passes} passes");
    }
}

#[test]
fn repeated_apply_is_idempotent() {
    let image = asymmetric(8, 6);
    let mut chain = software_chain();
    chain
        .add_effect(Effect::Blur { radius: 3.0 })
        .add_effect(Effect::Sepia)
        .add_effect(Effect::Sharpen { amount: 0.5 });

    let first = chain.apply(&image).unwrap().read_pixels().unwrap();
    let second = chain.apply(&image).unwrap().read_pixels().unwrap();
    assert_eq!(first, second);

    let stats = chain.stats();
    assert_eq!(stats.full_uploads, 1);
    assert_eq!(stats.partial_uploads, 1);
}

#[test]
fn each_fragment_source_compiles_once() {
    let image = asymmetric(4, 4);
    let mut chain = software_chain();
    chain
        .add_effect(Effect::Brightness { amount: 0.1 })
        .add_effect(Effect::Contrast { amount: 0.2 })
        .add_effect(Effect::SobelX)
        .add_effect(Effect::Sepia)
        .add_effect(Effect::Emboss { size: 1.0 });

    chain.apply(&image).unwrap();
    chain.apply(&image).unwrap();

    let stats = chain.stats();
    assert_eq!(stats.programs_linked, 2);
    assert_eq!(stats.shaders_compiled, 3);
    assert_eq!(chain.programs().len(), 2);
    assert_eq!(stats.program_binds, 10);

    chain.reset();
    chain
        .add_effect(Effect::Negative)
        .add_effect(Effect::Sepia)
        .add_effect(Effect::SobelY);
    chain.apply(&image).unwrap();

    let stats = chain.stats();
    assert_eq!(stats.programs_linked, 2, "a new chain reuses cached programs");
    assert_eq!(stats.shaders_compiled, 3);
    assert_eq!(chain.programs().len(), 2);
}

#[test]
fn alpha_reading_matrix_gets_its_own_program() {
    let mut matrix = [0.0; 20];
    for index in [0, 6, 12, 18] {
        matrix[index] = 1.0;
    }
    let mut alpha_from_red = matrix;
    alpha_from_red[15] = 1.0;
    alpha_from_red[18] = 0.0;

    let mut chain = software_chain();
    chain
        .add_effect(Effect::ColorMatrix(Box::new(matrix)))
        .add_effect(Effect::ColorMatrix(Box::new(alpha_from_red)));
    let image = RgbaImage::from_pixel(2, 2, Rgba([51, 0, 0, 255]));
    let output = chain.apply(&image).unwrap().read_pixels().unwrap();

    assert_eq!(chain.programs().len(), 2);
    assert_eq!(output.get_pixel(0, 0).0, [51, 0, 0, 51]);
}

#[test]
fn targets_are_allocated_once_per_size() {
    let mut chain = software_chain();
    chain
        .add_effect(Effect::Blur { radius: 2.0 })
        .add_effect(Effect::Negative);

    chain.apply(&asymmetric(6, 6)).unwrap();
    let after_first = chain.stats();
    assert_eq!(after_first.textures_created, 3, "source plus two targets");
    assert_eq!(after_first.framebuffers_created, 2);
    assert_eq!(after_first.live_textures(), 3);

    chain.apply(&asymmetric(6, 6)).unwrap();
    assert_eq!(chain.stats().textures_created, after_first.textures_created);
    assert_eq!(chain.stats().surface_configurations, 1);

    chain.apply(&asymmetric(9, 5)).unwrap();
    let resized = chain.stats();
    assert_eq!(resized.textures_released, 2);
    assert_eq!(resized.framebuffers_released, 2);
    assert_eq!(resized.textures_created, 5);
    assert_eq!(resized.full_uploads, 2);
    assert_eq!(resized.surface_configurations, 2);
    assert_eq!(chain.targets().size(), (9, 5));
    assert_eq!(resized.live_textures(), 3, "released targets are not leaked");
}

#[test]
fn oversized_images_fail_every_time() {
    let mut chain = FilterChain::new(SoftwareContext::with_max_texture_dimension(8)).unwrap();
    chain.add_effect(Effect::Blur { radius: 1.0 });

    for _ in 0..2 {
        let err = chain.apply(&asymmetric(9, 4)).err().unwrap();
        assert!(matches!(err, FilterError::Device(_)), "{err}");
        assert!(err.to_string().contains("max_texture_dimension_2d"), "{err}");
        assert_eq!(chain.stats().draws, 0);
    }

    let image = asymmetric(8, 4);
    let output = chain.apply(&image).unwrap().read_pixels().unwrap();
    assert_eq!(output.dimensions(), (8, 4));
    assert_eq!(chain.targets().size(), (8, 4));
}

#[test]
fn single_pass_chain_never_allocates_the_second_target() {
    let mut chain = software_chain();
    chain.add_effect(Effect::Sepia);
    chain.apply(&asymmetric(4, 4)).unwrap();
    assert!(!chain.targets().is_allocated(0));
    assert!(!chain.targets().is_allocated(1));

    let mut chain = software_chain();
    chain.add_effect(Effect::Blur { radius: 1.0 });
    chain.apply(&asymmetric(4, 4)).unwrap();
    assert!(chain.targets().is_allocated(0));
    assert!(!chain.targets().is_allocated(1));
}

#[test]
fn passes_alternate_between_targets() {
    let mut chain = software_chain();
    chain
        .add_effect(Effect::Blur { radius: 1.0 })
        .add_effect(Effect::Blur { radius: 1.0 });
    chain.apply(&asymmetric(4, 4)).unwrap();
    assert_eq!(chain.context().draws().len(), 4);
    chain.context_mut().clear_draws();
    chain.apply(&asymmetric(4, 4)).unwrap();

    let context = chain.context();
    let draws = context.draws();
    assert_eq!(draws.len(), 4, "draws since the last clear");
    let targets: Vec<_> = draws
        .iter()
        .map(|draw| draw.target.and_then(|fb| context.framebuffer_texture(fb)))
        .collect();
    assert_eq!(targets[0], Some(draws[1].source));
    assert_eq!(targets[1], Some(draws[2].source));
    assert_ne!(targets[0], targets[1]);
    assert_eq!(targets[3], None);
    for draw in draws {
        assert_ne!(Some(draw.source), draw.target.and_then(|fb| context.framebuffer_texture(fb)));
    }
}

#[test]
fn reset_clears_entries() {
    let image = asymmetric(4, 2);
    let mut chain = software_chain();
    chain.add_named("brightness", &[0.5]).unwrap();
    assert_eq!(chain.len(), 1);

    chain.reset();
    assert!(chain.is_empty());
    assert_eq!(chain.apply(&image).unwrap().read_pixels().unwrap(), image);
}

#[test]
fn empty_image_is_rejected() {
    let mut chain = software_chain();
    let err = chain.apply(&RgbaImage::new(0, 3)).err().unwrap();
    assert!(matches!(err, FilterError::EmptyImage { width: 0, height: 3 }));
    assert_eq!(chain.stats().draws, 0);
}

#[test]
fn drawing_after_the_final_pass_fails() {
    let mut context = SoftwareContext::new();
    let mut programs = ProgramCache::new();
    let mut targets = RenderTargetPool::new();
    targets.ensure_size(&mut context, 2, 2).unwrap();
    let source = context.create_texture(2, 2, TextureFilter::Nearest).unwrap();
    context.upload_texture(source, &asymmetric(2, 2)).unwrap();

    let mut state = PipelineState::new();
    state.last_in_chain = true;
    let mut pass = PassContext::new(&mut context, &mut programs, &mut targets, &mut state, source);
    pass.select(&IDENTITY_SHADER).unwrap();

    assert_eq!(pass.draw_pass(DrawMode::Intermediate).unwrap(), PassTarget::Pool(0));
    assert_eq!(
        pass.draw_pass(DrawMode::Default).unwrap(),
        PassTarget::Surface { flip_y: -1.0 }
    );
    let err = pass.draw_pass(DrawMode::Default).unwrap_err();
    assert!(matches!(err, FilterError::PassAfterFinal));
    assert!(pass.state().finished());
}

#[test]
fn unknown_uniform_is_reported() {
    let mut context = SoftwareContext::new();
    let mut programs = ProgramCache::new();
    let mut targets = RenderTargetPool::new();
    let mut state = PipelineState::new();
    let source = context.create_texture(1, 1, TextureFilter::Nearest).unwrap();
    let mut pass = PassContext::new(&mut context, &mut programs, &mut targets, &mut state, source);

    assert!(matches!(pass.set_float("px", 1.0), Err(FilterError::NoProgram)));
    pass.select(&IDENTITY_SHADER).unwrap();
    let err = pass.set_float("px", 1.0).unwrap_err();
    assert!(
        matches!(err, FilterError::UnknownUniform { ref name, .. } if name == "px"),
        "{err}"
    );
}

#[test]
fn failed_programs_are_not_cached() {
    static BROKEN: ShaderSource = ShaderSource {
        label: "broken",
        reference: None,
        ..IDENTITY_SHADER
    };

    let mut context = SoftwareContext::new();
    let mut programs = ProgramCache::new();
    for _ in 0..2 {
        let err = programs.select(&mut context, &BROKEN).unwrap_err();
        match err {
            FilterError::Compile { label, stage, .. } => {
                assert_eq!(label, "broken");
                assert_eq!(stage.to_string(), "fragment");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(programs.current().is_none());
        assert!(programs.is_empty());
    }
    assert_eq!(context.stats().programs_linked, 0);
    assert_eq!(context.stats().shaders_compiled, 1, "vertex shader is reused");

    let handle = programs.select(&mut context, &IDENTITY_SHADER).unwrap();
    assert!(handle.uniform("flipY").is_some());
    assert!(handle.attribute("pos").is_some());
    let again = programs.select(&mut context, &IDENTITY_SHADER).unwrap();
    assert!(handle.ptr_eq(&again));
}

#[test]
fn link_failures_leave_no_current_program() {
    static MISSTAGED: ShaderSource = ShaderSource {
        label: "misstaged",
        stage: ShaderStage::Vertex,
        ..IDENTITY_SHADER
    };

    let mut context = SoftwareContext::new();
    let mut programs = ProgramCache::new();
    for _ in 0..2 {
        let err = programs.select(&mut context, &MISSTAGED).unwrap_err();
        match err {
            FilterError::Link { label, log } => {
                assert_eq!(label, "misstaged");
                assert!(log.contains("fragment"), "{log}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(programs.current().is_none());
        assert!(programs.is_empty());
    }
    assert_eq!(context.stats().programs_linked, 0);

    programs.select(&mut context, &IDENTITY_SHADER).unwrap();
    assert_eq!(programs.len(), 1);
    assert_eq!(context.stats().programs_linked, 1);
}
