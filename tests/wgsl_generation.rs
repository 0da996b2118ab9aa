//! Generated WGSL must survive naga parsing and validation for every node
//! kind the engine can emit.

use style_forge::expr::codegen::compile;
use style_forge::validation::validate_wgsl_with_context;
use style_forge::wgsl::build_fragment_module;
use style_forge::{ColumnType, ExprTree, Schema, Style, UnaryOp};

fn schema() -> Schema {
    Schema::new()
        .with_column("population", ColumnType::Scalar)
        .with_column("land_use", ColumnType::Category)
}

fn assert_valid(tree: &mut ExprTree, root: style_forge::NodeId, what: &str) {
    let compiled = compile(tree, root).unwrap();
    let module = build_fragment_module(&compiled);
    validate_wgsl_with_context(&module, what).unwrap();
}

#[test]
fn default_style_slots_generate_valid_modules() {
    let mut style = Style::new(schema(), || {}).unwrap();
    let color = style.compile_color().unwrap();
    let width = style.compile_width().unwrap();
    validate_wgsl_with_context(&build_fragment_module(&color), "default color").unwrap();
    validate_wgsl_with_context(&build_fragment_module(&width), "default width").unwrap();
}

#[test]
fn ramp_over_property_generates_valid_module() {
    let mut tree = ExprTree::new();
    let p = tree.property("population", &schema()).unwrap();
    let stops = style_forge::palette::lookup("sunset").unwrap().stops;
    let ramp = tree.ramp_color(p, 0.0, 1_000_000.0, &stops).unwrap();
    assert_valid(&mut tree, ramp, "property ramp");
}

#[test]
fn arithmetic_and_unary_chain_generates_valid_module() {
    let mut tree = ExprTree::new();
    let p = tree.property("population", &schema()).unwrap();
    let scaled = tree.mul(p, 0.001).unwrap();
    let curved = tree.unary(UnaryOp::Log, scaled).unwrap();
    let shifted = tree.add(curved, 1.0).unwrap();
    let powed = tree.pow(shifted, 2.0f32).unwrap();
    assert_valid(&mut tree, powed, "arithmetic chain");
}

#[test]
fn hsv_blend_with_near_factor_generates_valid_module() {
    let mut tree = ExprTree::new();
    let s = schema();
    let p = tree.property("population", &s).unwrap();
    let weight = tree.near(p, 500.0, 50.0, 100.0).unwrap();
    let warm = tree.hsv(0.05f32, 0.9f32, 1.0f32).unwrap();
    let cold = tree.hsv(0.6f32, 0.7f32, 0.8f32).unwrap();
    let blended = tree.blend(warm, cold, weight).unwrap();
    assert_valid(&mut tree, blended, "hsv blend");
}

#[test]
fn kitchen_sink_expression_generates_valid_module() {
    let mut tree = ExprTree::new();
    let s = schema();

    let p = tree.property("population", &s).unwrap();
    let category = tree.property("land_use", &s).unwrap();
    let curved = tree.unary(UnaryOp::Sqrt, p).unwrap();
    let stops = style_forge::palette::lookup("burg").unwrap().stops;
    let ramp = tree.ramp_color(curved, 0.0, 1_000.0, &stops).unwrap();

    let hue = tree.mul(category, 0.1).unwrap();
    let tinted = tree.hsv(hue, 1.0f32, 1.0f32).unwrap();

    let anim = tree.animation(std::time::Duration::from_millis(300)).unwrap();
    let blended = tree.blend(ramp, tinted, anim).unwrap();
    let faded = tree.set_opacity(blended, 0.75).unwrap();
    assert_valid(&mut tree, faded, "kitchen sink");
}

#[test]
fn two_hsv_nodes_share_one_helper_definition() {
    let mut tree = ExprTree::new();
    let a = tree.hsv(0.1f32, 1.0f32, 1.0f32).unwrap();
    let b = tree.hsv(0.9f32, 1.0f32, 1.0f32).unwrap();
    let m = tree.float(0.5).unwrap();
    let blended = tree.blend(a, b, m).unwrap();

    let compiled = compile(&mut tree, blended).unwrap();
    assert_eq!(compiled.preface.matches("fn hsv2rgb").count(), 1);
    let module = build_fragment_module(&compiled);
    validate_wgsl_with_context(&module, "shared hsv helper").unwrap();
}

#[test]
fn recompilation_without_structural_change_is_identical() {
    let mut tree = ExprTree::new();
    let s = schema();
    let p = tree.property("population", &s).unwrap();
    let scaled = tree.mul(p, 2.0).unwrap();
    let stops = style_forge::palette::lookup("tealgrn").unwrap().stops;
    let ramp = tree.ramp_color(scaled, 0.0, 100.0, &stops).unwrap();
    let faded = tree.set_opacity(ramp, 0.5).unwrap();

    let first = compile(&mut tree, faded).unwrap();
    let second = compile(&mut tree, faded).unwrap();
    assert_eq!(first.preface, second.preface);
    assert_eq!(first.inline, second.inline);
    let ids_first: Vec<(String, u32)> = first
        .property_table
        .iter()
        .map(|(n, i)| (n.to_string(), i))
        .collect();
    let ids_second: Vec<(String, u32)> = second
        .property_table
        .iter()
        .map(|(n, i)| (n.to_string(), i))
        .collect();
    assert_eq!(ids_first, ids_second);
}

#[test]
fn uniform_declarations_report_their_bind_points() {
    let mut tree = ExprTree::new();
    let v = tree.float(3.0).unwrap();
    let stops = style_forge::palette::lookup("burg_3").unwrap().stops;
    let ramp = tree.ramp_color(v, 0.0, 10.0, &stops).unwrap();
    let compiled = compile(&mut tree, ramp).unwrap();

    // One value uniform for the float, a texture + sampler pair, and two
    // key-range uniforms.
    assert_eq!(compiled.uniforms.len(), 5);
    let tex = compiled
        .uniforms
        .iter()
        .find(|u| u.kind == style_forge::UniformKind::Texture)
        .unwrap();
    let samp = compiled
        .uniforms
        .iter()
        .find(|u| u.kind == style_forge::UniformKind::Sampler)
        .unwrap();
    assert_eq!(tex.group, style_forge::expr::codegen::TEXTURE_GROUP);
    assert_eq!(samp.binding, tex.binding + 1);
}
