//! The style expression arena: typed nodes, construction-time checking, and
//! the tree-rewrite protocol.
//!
//! Expressions live in a single arena owned by their style; nodes address
//! each other through [`NodeId`] handles. Parent links are back-references
//! only, used by the rewrite protocol and change notification. Each node's
//! output type is fixed at construction and every constructor validates its
//! operands, so the three passes (codegen, bind, update) never type-check.
//!
//! Three invariants the rest of the crate leans on:
//! - a node's named-child set never changes after construction; only the
//!   node held in a slot can be swapped, through [`ExprTree::replace_child`];
//! - at most one notify callback is registered per subtree root, and
//!   replacement moves it rather than cloning it;
//! - arithmetic over two raw literals folds at construction, so no live
//!   node (and later, no uniform) exists for a provably-constant result.

pub mod bind;
pub mod codegen;
pub mod update;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::color::Color;
use crate::error::ExprError;
use crate::program::{ShaderProgram, TextureHandle, UniformLocation};
use crate::ramp::RampTable;
use crate::schema::{ColumnType, Schema};

/// Handle to a node in an [`ExprTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Declared output type of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Scalar,
    Color,
    /// Host-side feature aggregation; never compiles to shader code.
    FeatureList,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Scalar => "scalar",
            ValueType::Color => "color",
            ValueType::FeatureList => "feature-list",
        }
    }

    /// The WGSL type carrying this value, where one exists.
    pub fn wgsl(self) -> Option<&'static str> {
        match self {
            ValueType::Scalar => Some("f32"),
            ValueType::Color => Some("vec4f"),
            ValueType::FeatureList => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Add,
    Sub,
    Pow,
}

impl BinaryOp {
    pub(crate) fn ctor_name(self) -> &'static str {
        match self {
            BinaryOp::Mul => "FloatMul",
            BinaryOp::Div => "FloatDiv",
            BinaryOp::Add => "FloatAdd",
            BinaryOp::Sub => "FloatSub",
            BinaryOp::Pow => "FloatPow",
        }
    }

    pub(crate) fn eval(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Log,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Sign,
}

impl UnaryOp {
    pub(crate) fn ctor_name(self) -> &'static str {
        match self {
            UnaryOp::Log => "Log",
            UnaryOp::Sqrt => "Sqrt",
            UnaryOp::Sin => "Sin",
            UnaryOp::Cos => "Cos",
            UnaryOp::Tan => "Tan",
            UnaryOp::Sign => "Sign",
        }
    }

    pub(crate) fn eval(self, a: f32) -> f32 {
        match self {
            UnaryOp::Log => a.ln(),
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Sin => a.sin(),
            UnaryOp::Cos => a.cos(),
            UnaryOp::Tan => a.tan(),
            // GLSL/WGSL sign semantics: sign(0) == 0.
            UnaryOp::Sign => {
                if a == 0.0 {
                    0.0
                } else {
                    a.signum()
                }
            }
        }
    }
}

/// The closed set of node kinds consumed by the three passes.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Scalar constant. `folded` marks a constant produced by folding: it
    /// compiles to an inline literal and never owns a uniform.
    Float { value: f32, folded: bool },
    /// Color constant, uniform-bound.
    ColorLiteral { value: Color },
    /// Feature attribute resolved against the schema at construction.
    Property { name: String, column: ColumnType },
    Binary { op: BinaryOp },
    Unary { op: UnaryOp },
    /// Scalar key range mapped through a palette lookup texture.
    Ramp { min_key: f32, max_key: f32, table: RampTable },
    Blend,
    /// Wall-clock progress ratio over a fixed duration.
    Animation {
        start: Instant,
        duration: Duration,
        /// Raw (unclamped) ratio from the latest update; `None` before the
        /// first update pass.
        progress: Option<f32>,
    },
    /// Seconds since construction, scaled; pushed through the `now` child.
    Now { epoch: Instant, speed: f32 },
    SetOpacity,
    Hsv,
    Near,
    /// Property list surfaced to host code; rejected by codegen.
    ViewportFeatures,
}

/// Per-node resource state filled in by the codegen and bind passes.
#[derive(Debug, Clone, Default)]
pub(crate) struct BindState {
    /// Uniform ID assigned by the most recent codegen pass.
    pub uniform_id: Option<u32>,
    /// Location of the node's value uniform (float/color/anim).
    pub value_loc: Option<UniformLocation>,
    /// Ramp lookup texture, uploaded at first bind and reused afterwards.
    pub texture: Option<TextureHandle>,
    pub tex_loc: Option<UniformLocation>,
    pub key_min_loc: Option<UniformLocation>,
    pub key_width_loc: Option<UniformLocation>,
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub kind: ExprKind,
    pub ty: ValueType,
    /// Named children in insertion order. The name set is fixed for the
    /// node's lifetime; codegen walks this order, which keeps symbol
    /// numbering stable across compiles.
    pub children: Vec<(String, NodeId)>,
    pub parent: Option<NodeId>,
    pub bind: BindState,
}

/// Constructor argument: either an existing node or a raw number that will
/// be implicitly promoted to a scalar constant.
#[derive(Debug, Clone, Copy)]
pub enum ExprArg {
    Num(f32),
    Node(NodeId),
}

impl From<f32> for ExprArg {
    fn from(v: f32) -> Self {
        ExprArg::Num(v)
    }
}

impl From<f64> for ExprArg {
    fn from(v: f64) -> Self {
        ExprArg::Num(v as f32)
    }
}

impl From<NodeId> for ExprArg {
    fn from(id: NodeId) -> Self {
        ExprArg::Node(id)
    }
}

type NotifyFn = Box<dyn FnMut()>;

/// Arena of style expression nodes.
#[derive(Default)]
pub struct ExprTree {
    slots: Vec<Slot>,
    /// Structural-change listeners keyed by subtree root. Moved, never
    /// cloned, when a replacement swaps the root out.
    notify: HashMap<NodeId, NotifyFn>,
}

impl ExprTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(
        &mut self,
        kind: ExprKind,
        ty: ValueType,
        children: Vec<(String, NodeId)>,
    ) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        for (_, child) in &children {
            self.slots[child.index()].parent = Some(id);
        }
        self.slots.push(Slot {
            kind,
            ty,
            children,
            parent: None,
            bind: BindState::default(),
        });
        id
    }

    pub(crate) fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.index()]
    }

    pub(crate) fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id.index()]
    }

    pub fn ty(&self, id: NodeId) -> ValueType {
        self.slot(id).ty
    }

    pub fn kind(&self, id: NodeId) -> &ExprKind {
        &self.slot(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    /// Named children in their fixed enumeration order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (&str, NodeId)> {
        self.slot(id)
            .children
            .iter()
            .map(|(name, child)| (name.as_str(), *child))
    }

    fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.slot(id).children.iter().map(|&(_, c)| c).collect()
    }

    // ---- constructors -----------------------------------------------------

    /// Scalar constant, uniform-bound so its value can change without a
    /// recompile.
    pub fn float(&mut self, value: f32) -> Result<NodeId, ExprError> {
        if !value.is_finite() {
            return Err(ExprError::invalid("Float", format!("non-finite value {value}")));
        }
        Ok(self.alloc(
            ExprKind::Float { value, folded: false },
            ValueType::Scalar,
            Vec::new(),
        ))
    }

    fn folded_float(&mut self, ctor: &'static str, value: f32) -> Result<NodeId, ExprError> {
        if !value.is_finite() {
            return Err(ExprError::invalid(
                ctor,
                format!("constant folding produced non-finite value {value}"),
            ));
        }
        Ok(self.alloc(
            ExprKind::Float { value, folded: true },
            ValueType::Scalar,
            Vec::new(),
        ))
    }

    /// Color constant, uniform-bound.
    pub fn color(&mut self, value: impl Into<Color>) -> Result<NodeId, ExprError> {
        let value = value.into();
        if !value.is_finite() {
            return Err(ExprError::invalid("Color", format!("non-finite channel in {value:?}")));
        }
        Ok(self.alloc(
            ExprKind::ColorLiteral { value },
            ValueType::Color,
            Vec::new(),
        ))
    }

    /// Feature attribute reference, resolved against `schema` now: an
    /// unknown name fails here, never later.
    pub fn property(&mut self, name: &str, schema: &Schema) -> Result<NodeId, ExprError> {
        if name.is_empty() {
            return Err(ExprError::invalid("Property", "empty property name"));
        }
        let column = schema
            .column(name)
            .ok_or_else(|| ExprError::UnknownProperty { name: name.to_string() })?;
        Ok(self.alloc(
            ExprKind::Property { name: name.to_string(), column },
            ValueType::Scalar,
            Vec::new(),
        ))
    }

    /// Numeric binary operator. Two raw literals fold to a constant here;
    /// no operator node is allocated for them.
    pub fn binary(
        &mut self,
        op: BinaryOp,
        a: impl Into<ExprArg>,
        b: impl Into<ExprArg>,
    ) -> Result<NodeId, ExprError> {
        let (a, b) = (a.into(), b.into());
        if let (ExprArg::Num(x), ExprArg::Num(y)) = (a, b) {
            return self.folded_float(op.ctor_name(), op.eval(x, y));
        }
        let a = self.promote(op.ctor_name(), a)?;
        let b = self.promote(op.ctor_name(), b)?;
        self.expect_scalar(op.ctor_name(), "a", a)?;
        self.expect_scalar(op.ctor_name(), "b", b)?;
        Ok(self.alloc(
            ExprKind::Binary { op },
            ValueType::Scalar,
            vec![("a".into(), a), ("b".into(), b)],
        ))
    }

    pub fn mul(&mut self, a: impl Into<ExprArg>, b: impl Into<ExprArg>) -> Result<NodeId, ExprError> {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: impl Into<ExprArg>, b: impl Into<ExprArg>) -> Result<NodeId, ExprError> {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn add(&mut self, a: impl Into<ExprArg>, b: impl Into<ExprArg>) -> Result<NodeId, ExprError> {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: impl Into<ExprArg>, b: impl Into<ExprArg>) -> Result<NodeId, ExprError> {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn pow(&mut self, a: impl Into<ExprArg>, b: impl Into<ExprArg>) -> Result<NodeId, ExprError> {
        self.binary(BinaryOp::Pow, a, b)
    }

    /// Numeric unary operator. A raw literal folds to a constant.
    pub fn unary(&mut self, op: UnaryOp, a: impl Into<ExprArg>) -> Result<NodeId, ExprError> {
        let a = a.into();
        if let ExprArg::Num(x) = a {
            return self.folded_float(op.ctor_name(), op.eval(x));
        }
        let a = self.promote(op.ctor_name(), a)?;
        self.expect_scalar(op.ctor_name(), "a", a)?;
        Ok(self.alloc(
            ExprKind::Unary { op },
            ValueType::Scalar,
            vec![("a".into(), a)],
        ))
    }

    /// Map a scalar input through a palette lookup texture over
    /// `[min_key, max_key]`. The lookup table is built here, once.
    pub fn ramp_color(
        &mut self,
        input: impl Into<ExprArg>,
        min_key: f32,
        max_key: f32,
        stops: &[Color],
    ) -> Result<NodeId, ExprError> {
        if !min_key.is_finite() || !max_key.is_finite() {
            return Err(ExprError::invalid("RampColor", "non-finite key range"));
        }
        let table = RampTable::from_palette(stops)?;
        let input = self.promote("RampColor", input.into())?;
        self.expect_scalar("RampColor", "input", input)?;
        Ok(self.alloc(
            ExprKind::Ramp { min_key, max_key, table },
            ValueType::Color,
            vec![("input".into(), input)],
        ))
    }

    /// Mix two same-typed expressions by a scalar factor.
    pub fn blend(
        &mut self,
        a: impl Into<ExprArg>,
        b: impl Into<ExprArg>,
        mix: impl Into<ExprArg>,
    ) -> Result<NodeId, ExprError> {
        let a = self.promote("Blend", a.into())?;
        let b = self.promote("Blend", b.into())?;
        let mix = self.promote("Blend", mix.into())?;
        self.expect_scalar("Blend", "mix", mix)?;
        let ty = match (self.ty(a), self.ty(b)) {
            (ValueType::Scalar, ValueType::Scalar) => ValueType::Scalar,
            (ValueType::Color, ValueType::Color) => ValueType::Color,
            (ta, tb) => {
                return Err(ExprError::TypeMismatch {
                    ctor: "Blend",
                    operand: "b",
                    expected: ta.name(),
                    actual: tb.name(),
                });
            }
        };
        Ok(self.alloc(
            ExprKind::Blend,
            ty,
            vec![("a".into(), a), ("b".into(), b), ("mix".into(), mix)],
        ))
    }

    /// Progress ratio over `duration`, starting now. Zero durations are
    /// treated as already complete.
    pub fn animation(&mut self, duration: Duration) -> Result<NodeId, ExprError> {
        Ok(self.alloc(
            ExprKind::Animation {
                start: Instant::now(),
                duration,
                progress: None,
            },
            ValueType::Scalar,
            Vec::new(),
        ))
    }

    /// Seconds since construction multiplied by `speed`.
    pub fn now(&mut self, speed: f32) -> Result<NodeId, ExprError> {
        if !speed.is_finite() {
            return Err(ExprError::invalid("Now", format!("non-finite speed {speed}")));
        }
        let clock = self.float(0.0)?;
        Ok(self.alloc(
            ExprKind::Now { epoch: Instant::now(), speed },
            ValueType::Scalar,
            vec![("now".into(), clock)],
        ))
    }

    /// Replace a color's alpha with a scalar expression.
    pub fn set_opacity(
        &mut self,
        color: NodeId,
        alpha: impl Into<ExprArg>,
    ) -> Result<NodeId, ExprError> {
        self.expect_type("SetOpacity", "a", color, ValueType::Color)?;
        let alpha = self.promote("SetOpacity", alpha.into())?;
        self.expect_scalar("SetOpacity", "b", alpha)?;
        Ok(self.alloc(
            ExprKind::SetOpacity,
            ValueType::Color,
            vec![("a".into(), color), ("b".into(), alpha)],
        ))
    }

    /// Build an opaque color from hue/saturation/value scalars.
    pub fn hsv(
        &mut self,
        h: impl Into<ExprArg>,
        s: impl Into<ExprArg>,
        v: impl Into<ExprArg>,
    ) -> Result<NodeId, ExprError> {
        let h = self.promote("HSV", h.into())?;
        let s = self.promote("HSV", s.into())?;
        let v = self.promote("HSV", v.into())?;
        for (name, id) in [("h", h), ("s", s), ("v", v)] {
            self.expect_scalar("HSV", name, id)?;
        }
        Ok(self.alloc(
            ExprKind::Hsv,
            ValueType::Color,
            vec![("h".into(), h), ("s".into(), s), ("v".into(), v)],
        ))
    }

    /// Proximity weight: 1 inside `threshold` of `center`, falling linearly
    /// to 0 over `falloff`.
    pub fn near(
        &mut self,
        input: impl Into<ExprArg>,
        center: impl Into<ExprArg>,
        threshold: impl Into<ExprArg>,
        falloff: impl Into<ExprArg>,
    ) -> Result<NodeId, ExprError> {
        let input = self.promote("Near", input.into())?;
        let center = self.promote("Near", center.into())?;
        let threshold = self.promote("Near", threshold.into())?;
        let falloff = self.promote("Near", falloff.into())?;
        for (name, id) in [
            ("input", input),
            ("center", center),
            ("threshold", threshold),
            ("falloff", falloff),
        ] {
            self.expect_scalar("Near", name, id)?;
        }
        Ok(self.alloc(
            ExprKind::Near,
            ValueType::Scalar,
            vec![
                ("input".into(), input),
                ("center".into(), center),
                ("threshold".into(), threshold),
                ("falloff".into(), falloff),
            ],
        ))
    }

    /// Feature-list expression over property nodes, for host-side viewport
    /// aggregation. Not renderable: the codegen pass rejects it.
    pub fn viewport_features(&mut self, properties: &[NodeId]) -> Result<NodeId, ExprError> {
        for &id in properties {
            if !matches!(self.kind(id), ExprKind::Property { .. }) {
                return Err(ExprError::TypeMismatch {
                    ctor: "ViewportFeatures",
                    operand: "properties",
                    expected: "property",
                    actual: self.ty(id).name(),
                });
            }
        }
        let children = properties
            .iter()
            .enumerate()
            .map(|(i, &id)| (format!("p{i}"), id))
            .collect();
        Ok(self.alloc(ExprKind::ViewportFeatures, ValueType::FeatureList, children))
    }

    fn promote(&mut self, ctor: &'static str, arg: ExprArg) -> Result<NodeId, ExprError> {
        match arg {
            ExprArg::Num(v) => {
                if !v.is_finite() {
                    return Err(ExprError::invalid(ctor, format!("non-finite literal {v}")));
                }
                self.float(v)
            }
            ExprArg::Node(id) => Ok(id),
        }
    }

    fn expect_scalar(
        &self,
        ctor: &'static str,
        operand: &'static str,
        id: NodeId,
    ) -> Result<(), ExprError> {
        self.expect_type(ctor, operand, id, ValueType::Scalar)
    }

    fn expect_type(
        &self,
        ctor: &'static str,
        operand: &'static str,
        id: NodeId,
        expected: ValueType,
    ) -> Result<(), ExprError> {
        let actual = self.ty(id);
        if actual != expected {
            return Err(ExprError::TypeMismatch {
                ctor,
                operand,
                expected: expected.name(),
                actual: actual.name(),
            });
        }
        Ok(())
    }

    // ---- animation capability --------------------------------------------

    /// Whether this subtree's output can still change with the timestamp.
    /// The renderer's scheduler uses this to decide between continuous
    /// redraws and event-driven ones.
    pub fn is_animated(&self, id: NodeId) -> bool {
        match &self.slot(id).kind {
            ExprKind::Animation { progress, .. } => progress.is_none_or(|p| p < 1.0),
            ExprKind::Now { .. } => true,
            _ => self
                .slot(id)
                .children
                .iter()
                .any(|&(_, child)| self.is_animated(child)),
        }
    }

    // ---- rewrite protocol -------------------------------------------------

    /// Install the structural-change listener for the subtree rooted at
    /// `id`, displacing any previous one.
    pub fn set_notify(&mut self, id: NodeId, callback: impl FnMut() + 'static) {
        self.notify.insert(id, Box::new(callback));
    }

    /// Invoke the listener registered on `id`, if any.
    pub fn fire_notify(&mut self, id: NodeId) {
        if let Some(callback) = self.notify.get_mut(&id) {
            trace!(node = id.0, "firing change notification");
            callback();
        }
    }

    pub(crate) fn transplant_notify(&mut self, from: NodeId, to: NodeId) {
        if let Some(callback) = self.notify.remove(&from) {
            self.notify.insert(to, callback);
        }
    }

    /// Drop the listener registered on `id`, if any. Used when an owner
    /// abandons a subtree without routing through `replace_child`.
    pub(crate) fn remove_notify(&mut self, id: NodeId) {
        self.notify.remove(&id);
    }

    /// Swap `old` for `new` in whichever named slot of `parent` holds it.
    ///
    /// The notify listener travels from `old` to `new`; firing it is the
    /// caller's responsibility, after the swap is complete. This is the only
    /// sanctioned mutation of the tree after construction.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<(), ExprError> {
        let slot = self
            .slots[parent.index()]
            .children
            .iter()
            .position(|&(_, child)| child == old)
            .ok_or(ExprError::NoSuchChild)?;
        self.slots[parent.index()].children[slot].1 = new;
        self.slots[new.index()].parent = Some(parent);
        self.transplant_notify(old, new);
        debug!(
            parent = parent.0,
            old = old.0,
            new = new.0,
            "replaced child node"
        );
        Ok(())
    }

    /// Remove `child` from `parent`'s child list without replacement. Used
    /// when a detached subtree is about to be released but one child
    /// survived the rewrite.
    pub(crate) fn unlink_child(&mut self, parent: NodeId, child: NodeId) {
        self.slots[parent.index()]
            .children
            .retain(|&(_, c)| c != child);
    }

    /// Make `id` a subtree root (no parent back-reference).
    pub(crate) fn clear_parent(&mut self, id: NodeId) {
        self.slots[id.index()].parent = None;
    }

    /// Wrap `current` in a blend toward `target` driven by a fresh
    /// animation, splice the blend into `current`'s place, and fire the
    /// transplanted notify. Returns the blend node, which is the new
    /// subtree root when `current` had no parent.
    pub fn blend_to(
        &mut self,
        current: NodeId,
        target: NodeId,
        duration: Duration,
    ) -> Result<NodeId, ExprError> {
        let parent = self.parent(current);
        let mix = self.animation(duration)?;
        let blender = self.blend(current, target, mix)?;
        match parent {
            Some(parent) => {
                self.replace_child(parent, current, blender)?;
            }
            None => {
                self.clear_parent(blender);
                self.transplant_notify(current, blender);
            }
        }
        self.fire_notify(blender);
        Ok(blender)
    }

    /// Release every GPU resource owned by the subtree rooted at `id` and
    /// drop its listeners. Arena slots themselves are not reclaimed; the
    /// subtree must simply never be referenced again.
    pub fn release_subtree(&mut self, id: NodeId, program: &mut dyn ShaderProgram) {
        for child in self.child_ids(id) {
            self.release_subtree(child, program);
        }
        self.notify.remove(&id);
        let bind = &mut self.slots[id.index()].bind;
        if let Some(texture) = bind.texture.take() {
            debug!(node = id.0, "releasing ramp texture");
            program.free_texture(texture);
        }
        *bind = BindState::default();
    }

    // ---- internal value accessors ----------------------------------------

    pub(crate) fn set_float_value(&mut self, id: NodeId, value: f32) {
        if let ExprKind::Float { value: stored, .. } = &mut self.slots[id.index()].kind {
            *stored = value;
        }
    }
}
