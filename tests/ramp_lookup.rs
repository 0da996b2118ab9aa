//! Ramp lookup tables observed end to end: the texels a program receives at
//! bind time match the palette, and the key range pushed each frame is
//! guarded against degenerate input.

use style_forge::expr::codegen::compile;
use style_forge::expr::{bind::bind, update::update};
use style_forge::ramp::{RAMP_WIDTH, interpolate};
use style_forge::{Color, ExprTree, FrameContext, RecordingProgram};

fn red() -> Color {
    Color::new(1.0, 0.0, 0.0, 1.0)
}

fn green() -> Color {
    Color::new(0.0, 1.0, 0.0, 1.0)
}

#[test]
fn uploaded_texels_start_and_end_on_the_palette() {
    let mut tree = ExprTree::new();
    let v = tree.float(1.0).unwrap();
    let ramp = tree.ramp_color(v, 0.0, 10.0, &[red(), green()]).unwrap();
    compile(&mut tree, ramp).unwrap();

    let mut program = RecordingProgram::new();
    bind(&mut tree, ramp, &mut program).unwrap();

    let texels = &program.uploaded_textures[0];
    assert_eq!(texels.len(), RAMP_WIDTH * 4);
    assert_eq!(&texels[0..4], &red().to_rgba8());
    assert_eq!(&texels[(RAMP_WIDTH - 1) * 4..], &green().to_rgba8());
}

#[test]
fn continuous_midpoint_of_two_stop_palette_is_the_half_mix() {
    let mid = interpolate(&[red(), green()], 0.5);
    assert_eq!(mid, Color::new(0.5, 0.5, 0.5, 1.0));
}

#[test]
fn palette_variants_feed_ramps_directly() {
    let palette = style_forge::palette::lookup("sunset_5").unwrap();
    assert_eq!(palette.stops.len(), 5);

    let mut tree = ExprTree::new();
    let v = tree.float(0.5).unwrap();
    let ramp = tree.ramp_color(v, 0.0, 1.0, &palette.stops).unwrap();
    compile(&mut tree, ramp).unwrap();

    let mut program = RecordingProgram::new();
    bind(&mut tree, ramp, &mut program).unwrap();
    let texels = &program.uploaded_textures[0];
    assert_eq!(&texels[0..4], &palette.stops[0].to_rgba8());
    assert_eq!(
        &texels[(RAMP_WIDTH - 1) * 4..],
        &palette.stops[4].to_rgba8()
    );
}

#[test]
fn key_range_pushes_are_guarded_against_zero_width() {
    let mut tree = ExprTree::new();
    let v = tree.float(1.0).unwrap();
    let ramp = tree.ramp_color(v, 42.0, 42.0, &[red(), green()]).unwrap();
    compile(&mut tree, ramp).unwrap();

    let mut program = RecordingProgram::new();
    bind(&mut tree, ramp, &mut program).unwrap();
    update(&mut tree, ramp, &mut FrameContext::new(), &mut program).unwrap();

    assert_eq!(program.last_f32("ramp_key_min_1"), Some(42.0));
    let width = program.last_f32("ramp_key_width_1").unwrap();
    assert!(width > 0.0, "degenerate range must not reach the shader as zero");
}

#[test]
fn normal_key_range_pushes_min_and_width() {
    let mut tree = ExprTree::new();
    let v = tree.float(1.0).unwrap();
    let ramp = tree.ramp_color(v, 10.0, 110.0, &[red(), green()]).unwrap();
    compile(&mut tree, ramp).unwrap();

    let mut program = RecordingProgram::new();
    bind(&mut tree, ramp, &mut program).unwrap();
    update(&mut tree, ramp, &mut FrameContext::new(), &mut program).unwrap();

    assert_eq!(program.last_f32("ramp_key_min_1"), Some(10.0));
    assert_eq!(program.last_f32("ramp_key_width_1"), Some(100.0));
}
