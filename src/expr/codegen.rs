//! Shader codegen pass: expression tree -> WGSL fragments + symbol tables.
//!
//! Each node emits a `preface` (global declarations: uniforms, samplers,
//! shared helpers) and an `inline` expression; parents substitute child
//! inlines into their own template and concatenate child prefaces ahead of
//! theirs. Two allocators are threaded through one pass: a monotone
//! uniform-ID counter that keeps symbol names of independent subtrees
//! disjoint, and a memoized property-ID table that maps each feature
//! attribute name to a stable small integer. Both are owned by the pass, so
//! compiling the same tree twice yields byte-identical output.

use std::collections::HashMap;

use anyhow::{Result, bail};
use tracing::debug;

use super::{BinaryOp, ExprKind, ExprTree, NodeId, UnaryOp, ValueType};

/// Bind group for engine-owned value uniforms.
pub const VALUE_GROUP: u32 = 0;
/// Bind group for ramp textures and their samplers.
pub const TEXTURE_GROUP: u32 = 1;

/// Shared RGB conversion helper, emitted at most once per compile.
const HSV2RGB_WGSL: &str = "\
fn hsv2rgb(c: vec3f) -> vec3f {
    let k = vec4f(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    let p = abs(fract(c.xxx + k.xyz) * 6.0 - k.www);
    return c.z * mix(k.xxx, clamp(p - k.xxx, vec3f(0.0), vec3f(1.0)), vec3f(c.y));
}
";

/// Feature attribute name -> small-integer slot, in first-use order.
#[derive(Debug, Default, Clone)]
pub struct PropertyTable {
    names: Vec<String>,
    index: HashMap<String, u32>,
}

impl PropertyTable {
    /// Memoized allocation: the same name always maps to the same integer
    /// within one compile pass.
    fn id_for(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    F32,
    Vec4,
    Texture,
    Sampler,
}

/// One declaration emitted into the preface, with its bind point. Hosts use
/// this to build bind group layouts without re-parsing the source.
#[derive(Debug, Clone)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
    pub group: u32,
    pub binding: u32,
}

/// Output of one codegen pass over one tree.
#[derive(Debug, Clone)]
pub struct CompiledSource {
    /// Global declarations, helpers included, in emission order.
    pub preface: String,
    /// The root expression, substitutable into a shader template.
    pub inline: String,
    pub output_type: ValueType,
    pub property_table: PropertyTable,
    pub uniforms: Vec<UniformDecl>,
}

#[derive(Default)]
struct CompileContext {
    next_uniform_id: u32,
    next_value_binding: u32,
    next_texture_slot: u32,
    properties: PropertyTable,
    uniforms: Vec<UniformDecl>,
    hsv_helper_emitted: bool,
}

impl CompileContext {
    fn alloc_uniform_id(&mut self) -> u32 {
        let id = self.next_uniform_id;
        self.next_uniform_id += 1;
        id
    }

    /// Declare a value uniform in the next free binding of `VALUE_GROUP`.
    fn declare_value(&mut self, name: &str, kind: UniformKind) -> String {
        let binding = self.next_value_binding;
        self.next_value_binding += 1;
        let wgsl_ty = match kind {
            UniformKind::F32 => "f32",
            UniformKind::Vec4 => "vec4f",
            UniformKind::Texture | UniformKind::Sampler => unreachable!("not a value uniform"),
        };
        self.uniforms.push(UniformDecl {
            name: name.to_string(),
            kind,
            group: VALUE_GROUP,
            binding,
        });
        format!("@group({VALUE_GROUP}) @binding({binding}) var<uniform> {name}: {wgsl_ty};\n")
    }

    /// Declare a texture and its sampler in the paired bindings of
    /// `TEXTURE_GROUP` (texture at `2k`, sampler at `2k + 1`).
    fn declare_texture(&mut self, tex_name: &str, samp_name: &str) -> String {
        let tex_binding = self.next_texture_slot * 2;
        let samp_binding = tex_binding + 1;
        self.next_texture_slot += 1;
        self.uniforms.push(UniformDecl {
            name: tex_name.to_string(),
            kind: UniformKind::Texture,
            group: TEXTURE_GROUP,
            binding: tex_binding,
        });
        self.uniforms.push(UniformDecl {
            name: samp_name.to_string(),
            kind: UniformKind::Sampler,
            group: TEXTURE_GROUP,
            binding: samp_binding,
        });
        format!(
            "@group({TEXTURE_GROUP}) @binding({tex_binding}) var {tex_name}: texture_2d<f32>;\n\
             @group({TEXTURE_GROUP}) @binding({samp_binding}) var {samp_name}: sampler;\n"
        )
    }
}

struct Fragment {
    preface: String,
    inline: String,
}

// Symbol naming shared with the binding pass. A node's symbols are fully
// determined by its kind and the uniform ID codegen assigned to it.

pub(crate) fn float_symbol(uid: u32) -> String {
    format!("float_{uid}")
}

pub(crate) fn color_symbol(uid: u32) -> String {
    format!("color_{uid}")
}

pub(crate) fn anim_symbol(uid: u32) -> String {
    format!("anim_{uid}")
}

pub(crate) fn ramp_tex_symbol(uid: u32) -> String {
    format!("ramp_tex_{uid}")
}

pub(crate) fn ramp_samp_symbol(uid: u32) -> String {
    format!("ramp_samp_{uid}")
}

pub(crate) fn ramp_key_min_symbol(uid: u32) -> String {
    format!("ramp_key_min_{uid}")
}

pub(crate) fn ramp_key_width_symbol(uid: u32) -> String {
    format!("ramp_key_width_{uid}")
}

pub(crate) fn property_inline(pid: u32) -> String {
    format!("props.p{pid}")
}

/// Format an f32 as a WGSL literal, keeping an explicit decimal point.
pub(crate) fn fmt_f32(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v:.9}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.contains('.') {
        s.to_string()
    } else {
        format!("{s}.0")
    }
}

/// Run one codegen pass over the tree rooted at `root`.
///
/// Records each resource-owning node's uniform ID in its bind state; the
/// binding pass resolves the matching symbol names against the linked
/// program afterwards.
pub fn compile(tree: &mut ExprTree, root: NodeId) -> Result<CompiledSource> {
    let mut ctx = CompileContext::default();
    let fragment = emit(tree, root, &mut ctx)?;
    debug!(
        uniforms = ctx.uniforms.len(),
        properties = ctx.properties.len(),
        "compiled style expression"
    );
    Ok(CompiledSource {
        preface: fragment.preface,
        inline: fragment.inline,
        output_type: tree.ty(root),
        property_table: ctx.properties,
        uniforms: ctx.uniforms,
    })
}

fn emit(tree: &mut ExprTree, id: NodeId, ctx: &mut CompileContext) -> Result<Fragment> {
    // Children first, in their fixed enumeration order; child prefaces land
    // ahead of this node's own declarations.
    let child_ids: Vec<NodeId> = tree.children(id).map(|(_, c)| c).collect();
    let mut preface = String::new();
    let mut inlines = Vec::with_capacity(child_ids.len());
    for child in child_ids {
        let fragment = emit(tree, child, ctx)?;
        preface.push_str(&fragment.preface);
        inlines.push(fragment.inline);
    }

    let (own_preface, inline) = match tree.kind(id) {
        ExprKind::Float { value, folded: true } => (String::new(), fmt_f32(*value)),
        ExprKind::Float { folded: false, .. } => {
            let uid = ctx.alloc_uniform_id();
            tree.slot_mut(id).bind.uniform_id = Some(uid);
            let name = float_symbol(uid);
            (ctx.declare_value(&name, UniformKind::F32), name)
        }
        ExprKind::ColorLiteral { .. } => {
            let uid = ctx.alloc_uniform_id();
            tree.slot_mut(id).bind.uniform_id = Some(uid);
            let name = color_symbol(uid);
            (ctx.declare_value(&name, UniformKind::Vec4), name)
        }
        ExprKind::Property { name, .. } => {
            let pid = ctx.properties.id_for(name);
            (String::new(), property_inline(pid))
        }
        ExprKind::Binary { op } => {
            let text = match op {
                BinaryOp::Mul => format!("({} * {})", inlines[0], inlines[1]),
                BinaryOp::Div => format!("({} / {})", inlines[0], inlines[1]),
                BinaryOp::Add => format!("({} + {})", inlines[0], inlines[1]),
                BinaryOp::Sub => format!("({} - {})", inlines[0], inlines[1]),
                BinaryOp::Pow => format!("pow({}, {})", inlines[0], inlines[1]),
            };
            (String::new(), text)
        }
        ExprKind::Unary { op } => {
            let function = match op {
                UnaryOp::Log => "log",
                UnaryOp::Sqrt => "sqrt",
                UnaryOp::Sin => "sin",
                UnaryOp::Cos => "cos",
                UnaryOp::Tan => "tan",
                UnaryOp::Sign => "sign",
            };
            (String::new(), format!("{function}({})", inlines[0]))
        }
        ExprKind::Ramp { .. } => {
            let uid = ctx.alloc_uniform_id();
            tree.slot_mut(id).bind.uniform_id = Some(uid);
            let tex = ramp_tex_symbol(uid);
            let samp = ramp_samp_symbol(uid);
            let key_min = ramp_key_min_symbol(uid);
            let key_width = ramp_key_width_symbol(uid);

            let mut decls = ctx.declare_texture(&tex, &samp);
            decls.push_str(&ctx.declare_value(&key_min, UniformKind::F32));
            decls.push_str(&ctx.declare_value(&key_width, UniformKind::F32));

            let inline = format!(
                "textureSample({tex}, {samp}, vec2f(({} - {key_min}) / {key_width}, 0.5))",
                inlines[0]
            );
            (decls, inline)
        }
        ExprKind::Blend => {
            let text = match tree.ty(id) {
                ValueType::Scalar => {
                    format!("mix({}, {}, {})", inlines[0], inlines[1], inlines[2])
                }
                // Splat the factor so both mix operands agree in width.
                ValueType::Color => format!(
                    "mix({}, {}, vec4f({}))",
                    inlines[0], inlines[1], inlines[2]
                ),
                ValueType::FeatureList => unreachable!("blend is scalar or color by construction"),
            };
            (String::new(), text)
        }
        ExprKind::Animation { .. } => {
            let uid = ctx.alloc_uniform_id();
            tree.slot_mut(id).bind.uniform_id = Some(uid);
            let name = anim_symbol(uid);
            (ctx.declare_value(&name, UniformKind::F32), name)
        }
        // The clock child carries the uniform; Now itself emits nothing.
        ExprKind::Now { .. } => (String::new(), inlines[0].clone()),
        ExprKind::SetOpacity => (
            String::new(),
            format!("vec4f(({}).rgb, {})", inlines[0], inlines[1]),
        ),
        ExprKind::Hsv => {
            let helper = if ctx.hsv_helper_emitted {
                String::new()
            } else {
                ctx.hsv_helper_emitted = true;
                HSV2RGB_WGSL.to_string()
            };
            let inline = format!(
                "vec4f(hsv2rgb(vec3f({}, clamp({}, 0.0, 1.0), clamp({}, 0.0, 1.0))), 1.0)",
                inlines[0], inlines[1], inlines[2]
            );
            (helper, inline)
        }
        ExprKind::Near => (
            String::new(),
            format!(
                "(1.0 - clamp((abs({} - {}) - {}) / {}, 0.0, 1.0))",
                inlines[0], inlines[1], inlines[2], inlines[3]
            ),
        ),
        ExprKind::ViewportFeatures => {
            bail!("feature-list expressions cannot be compiled into shader code")
        }
    };

    preface.push_str(&own_preface);
    Ok(Fragment { preface, inline })
}
