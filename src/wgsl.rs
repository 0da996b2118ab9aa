//! Assembly of compiled expression fragments into complete WGSL modules.
//!
//! The engine's codegen pass produces a preface and an inline expression;
//! hosts that want a ready-to-link fragment shader (and the test suite,
//! which validates generated code with naga) get the full module from here.

use crate::expr::ValueType;
use crate::expr::codegen::CompiledSource;

/// Declarations for the per-feature attribute inputs, one `@location` per
/// property-table slot. Empty when the expression reads no properties.
fn feature_props_struct(compiled: &CompiledSource) -> String {
    if compiled.property_table.is_empty() {
        return String::new();
    }
    let mut out = String::from("struct FeatureProps {\n");
    for (_, id) in compiled.property_table.iter() {
        out.push_str(&format!("    @location({id}) p{id}: f32,\n"));
    }
    out.push_str("};\n\n");
    out
}

/// Wrap a compiled style expression into a standalone fragment module.
///
/// Scalar expressions render as grayscale so width/size styles can be
/// eyeballed with the same entry point color styles use.
pub fn build_fragment_module(compiled: &CompiledSource) -> String {
    let props = feature_props_struct(compiled);
    let signature = if compiled.property_table.is_empty() {
        "fn fs_main() -> @location(0) vec4f"
    } else {
        "fn fs_main(props: FeatureProps) -> @location(0) vec4f"
    };
    let body = match compiled.output_type {
        ValueType::Color => format!("    return {};", compiled.inline),
        ValueType::Scalar => format!(
            "    let v = {};\n    return vec4f(v, v, v, 1.0);",
            compiled.inline
        ),
        ValueType::FeatureList => {
            unreachable!("codegen rejects feature-list expressions before assembly")
        }
    };

    format!(
        "{props}{preface}\n@fragment\n{signature} {{\n{body}\n}}\n",
        preface = compiled.preface,
    )
}
