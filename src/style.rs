//! The style root: owner of the expression tree and its two styled slots.
//!
//! A style holds one expression per styled aspect (fill color, stroke
//! width), wires the notify hooks that turn structural changes into
//! recompile requests, and drives the three passes against host programs.
//!
//! Recompilation is event-driven: a slot is marked dirty only when its
//! subtree structurally changes (notify fired), and the host is poked
//! through the redraw callback it supplied. The host then polls the dirty
//! flags, recompiles the affected slot, relinks, and rebinds.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::ExprError;
use crate::expr::codegen::{self, CompiledSource};
use crate::expr::update::FrameContext;
use crate::expr::{ExprTree, NodeId, ValueType, bind, update};
use crate::program::ShaderProgram;
use crate::schema::Schema;

const DEFAULT_WIDTH: f32 = 5.0;

type RedrawFn = Rc<RefCell<Box<dyn FnMut()>>>;

pub struct Style {
    tree: ExprTree,
    schema: Schema,
    color: NodeId,
    width: NodeId,
    color_dirty: Rc<Cell<bool>>,
    width_dirty: Rc<Cell<bool>>,
    redraw: RedrawFn,
}

impl Style {
    /// A style rendering opaque black features of width 5, ready to be
    /// restyled. `redraw` is invoked whenever a structural change requires
    /// the host to schedule a frame.
    pub fn new(schema: Schema, redraw: impl FnMut() + 'static) -> Result<Self, ExprError> {
        let mut tree = ExprTree::new();
        let width = tree.float(DEFAULT_WIDTH)?;
        let color = tree.color([0.0, 0.0, 0.0, 1.0])?;

        let mut style = Self {
            tree,
            schema,
            color,
            width,
            color_dirty: Rc::new(Cell::new(false)),
            width_dirty: Rc::new(Cell::new(false)),
            redraw: Rc::new(RefCell::new(Box::new(redraw))),
        };
        let color_dirty = Rc::clone(&style.color_dirty);
        let width_dirty = Rc::clone(&style.width_dirty);
        style.install_slot_notify(color, &color_dirty);
        style.install_slot_notify(width, &width_dirty);
        Ok(style)
    }

    /// The arena all of this style's expressions must be built in.
    pub fn tree_mut(&mut self) -> &mut ExprTree {
        &mut self.tree
    }

    pub fn tree(&self) -> &ExprTree {
        &self.tree
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn color(&self) -> NodeId {
        self.color
    }

    pub fn width(&self) -> NodeId {
        self.width
    }

    fn install_slot_notify(&mut self, root: NodeId, dirty: &Rc<Cell<bool>>) {
        let dirty = Rc::clone(dirty);
        let redraw = Rc::clone(&self.redraw);
        self.tree.set_notify(root, move || {
            dirty.set(true);
            (*redraw.borrow_mut())();
        });
    }

    fn set_slot(
        &mut self,
        slot: Slot,
        expr: NodeId,
        expected: ValueType,
    ) -> Result<NodeId, ExprError> {
        let actual = self.tree.ty(expr);
        if actual != expected {
            return Err(ExprError::TypeMismatch {
                ctor: slot.ctor_name(),
                operand: "expression",
                expected: expected.name(),
                actual: actual.name(),
            });
        }

        let previous = match slot {
            Slot::Color => std::mem::replace(&mut self.color, expr),
            Slot::Width => std::mem::replace(&mut self.width, expr),
        };
        let dirty = match slot {
            Slot::Color => Rc::clone(&self.color_dirty),
            Slot::Width => Rc::clone(&self.width_dirty),
        };
        self.tree.remove_notify(previous);
        self.tree.clear_parent(expr);
        self.install_slot_notify(expr, &dirty);
        self.tree.fire_notify(expr);
        Ok(previous)
    }

    /// Restyle the color slot. Returns the displaced expression root so the
    /// host can release its GPU resources once the old program retires.
    pub fn set_color(&mut self, expr: NodeId) -> Result<NodeId, ExprError> {
        self.set_slot(Slot::Color, expr, ValueType::Color)
    }

    /// Restyle the width slot with a scalar expression.
    pub fn set_width(&mut self, expr: NodeId) -> Result<NodeId, ExprError> {
        self.set_slot(Slot::Width, expr, ValueType::Scalar)
    }

    /// Animate the color slot toward `target` over `duration`. The current
    /// expression is wrapped in a blend that collapses once the transition
    /// completes.
    pub fn transition_color(&mut self, target: NodeId, duration: Duration) -> Result<NodeId, ExprError> {
        self.color = self.tree.blend_to(self.color, target, duration)?;
        Ok(self.color)
    }

    /// Animate the width slot toward `target` over `duration`.
    pub fn transition_width(&mut self, target: NodeId, duration: Duration) -> Result<NodeId, ExprError> {
        self.width = self.tree.blend_to(self.width, target, duration)?;
        Ok(self.width)
    }

    /// Release every GPU resource owned by a detached expression subtree.
    pub fn release(&mut self, root: NodeId, program: &mut dyn ShaderProgram) {
        self.tree.release_subtree(root, program);
    }

    // ---- passes ----------------------------------------------------------

    /// Compile the color slot; clears its dirty flag.
    pub fn compile_color(&mut self) -> Result<CompiledSource> {
        self.color_dirty.set(false);
        codegen::compile(&mut self.tree, self.color).context("compiling color style")
    }

    /// Compile the width slot; clears its dirty flag.
    pub fn compile_width(&mut self) -> Result<CompiledSource> {
        self.width_dirty.set(false);
        codegen::compile(&mut self.tree, self.width).context("compiling width style")
    }

    /// Resolve the color slot's symbols against its linked program.
    pub fn bind_color(&mut self, program: &mut dyn ShaderProgram) -> Result<()> {
        bind::bind(&mut self.tree, self.color, program).context("binding color style")
    }

    /// Resolve the width slot's symbols against its linked program.
    pub fn bind_width(&mut self, program: &mut dyn ShaderProgram) -> Result<()> {
        bind::bind(&mut self.tree, self.width, program).context("binding width style")
    }

    /// Push both slots' current values for this frame. Completed
    /// transitions collapse here, firing notify and marking their slot
    /// dirty for the host's next recompile poll.
    pub fn update(
        &mut self,
        ctx: &mut FrameContext,
        color_program: &mut dyn ShaderProgram,
        width_program: &mut dyn ShaderProgram,
    ) -> Result<()> {
        self.color = update::update(&mut self.tree, self.color, ctx, color_program)?;
        self.width = update::update(&mut self.tree, self.width, ctx, width_program)?;
        Ok(())
    }

    /// True while any styled expression still varies with time; the host's
    /// scheduler keeps requesting frames as long as this holds.
    pub fn is_animated(&self) -> bool {
        self.tree.is_animated(self.color) || self.tree.is_animated(self.width)
    }

    /// Whether the color slot changed structurally since its last compile.
    pub fn color_needs_recompile(&self) -> bool {
        self.color_dirty.get()
    }

    /// Whether the width slot changed structurally since its last compile.
    pub fn width_needs_recompile(&self) -> bool {
        self.width_dirty.get()
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Color,
    Width,
}

impl Slot {
    fn ctor_name(self) -> &'static str {
        match self {
            Slot::Color => "Style::set_color",
            Slot::Width => "Style::set_width",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::program::RecordingProgram;
    use crate::schema::ColumnType;

    fn schema() -> Schema {
        Schema::new().with_column("population", ColumnType::Scalar)
    }

    #[test]
    fn defaults_compile_and_push() {
        let mut style = Style::new(schema(), || {}).unwrap();
        let color_src = style.compile_color().unwrap();
        let width_src = style.compile_width().unwrap();
        assert_eq!(color_src.output_type, ValueType::Color);
        assert_eq!(width_src.output_type, ValueType::Scalar);

        let mut color_program = RecordingProgram::new();
        let mut width_program = RecordingProgram::new();
        style.bind_color(&mut color_program).unwrap();
        style.bind_width(&mut width_program).unwrap();
        style
            .update(&mut FrameContext::new(), &mut color_program, &mut width_program)
            .unwrap();
        assert_eq!(color_program.last_vec4("color_0"), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(width_program.last_f32("float_0"), Some(5.0));
    }

    #[test]
    fn set_color_fires_notify_and_requests_redraw() {
        let redraws = Rc::new(Cell::new(0u32));
        let observer = Rc::clone(&redraws);
        let mut style = Style::new(schema(), move || observer.set(observer.get() + 1)).unwrap();
        assert!(!style.color_needs_recompile());

        let red = style.tree_mut().color([1.0, 0.0, 0.0, 1.0]).unwrap();
        style.set_color(red).unwrap();
        assert!(style.color_needs_recompile());
        assert_eq!(redraws.get(), 1);

        style.compile_color().unwrap();
        assert!(!style.color_needs_recompile());
    }

    #[test]
    fn set_color_rejects_scalar_expressions() {
        let mut style = Style::new(schema(), || {}).unwrap();
        let f = style.tree_mut().float(1.0).unwrap();
        assert!(matches!(
            style.set_color(f),
            Err(ExprError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn transition_wraps_and_later_collapses() {
        let redraws = Rc::new(Cell::new(0u32));
        let observer = Rc::clone(&redraws);
        let mut style = Style::new(schema(), move || observer.set(observer.get() + 1)).unwrap();

        let green = style.tree_mut().color([0.0, 1.0, 0.0, 1.0]).unwrap();
        let blend = style.transition_color(green, Duration::from_millis(100)).unwrap();
        assert_eq!(style.color(), blend);
        assert!(style.color_needs_recompile(), "wrapping is a structural change");
        assert!(style.is_animated());
        assert_eq!(redraws.get(), 1);

        style.compile_color().unwrap();
        style.compile_width().unwrap();
        let mut color_program = RecordingProgram::new();
        let mut width_program = RecordingProgram::new();
        style.bind_color(&mut color_program).unwrap();
        style.bind_width(&mut width_program).unwrap();

        let later = Instant::now() + Duration::from_millis(200);
        style
            .update(&mut FrameContext::at(later), &mut color_program, &mut width_program)
            .unwrap();
        assert_eq!(style.color(), green, "blend collapsed to the target");
        assert!(style.color_needs_recompile(), "collapse is a structural change");
        assert!(!style.is_animated());
        assert_eq!(redraws.get(), 2);
    }

    #[test]
    fn displaced_slot_roots_are_returned_for_release() {
        let mut style = Style::new(schema(), || {}).unwrap();
        let old_color = style.color();
        let red = style.tree_mut().color([1.0, 0.0, 0.0, 1.0]).unwrap();
        let displaced = style.set_color(red).unwrap();
        assert_eq!(displaced, old_color);
    }
}
