//! Per-frame update pass: push current values into bound handles.
//!
//! Runs top-down once per rendered frame, after the binding pass. Most
//! nodes are data-independent across children; the traversal order matters
//! only for shared frame state such as the texture-unit counter.
//!
//! A blend whose animation has completed replaces itself with its final
//! child. The swap is never performed mid-walk: completions are queued and
//! drained after the traversal returns, so no update observes a half-rewired
//! node, and each drain step installs the new child, transplants notify,
//! releases the detached wrapper's resources and fires the notification
//! before the pass returns.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use super::{ExprKind, ExprTree, NodeId};
use crate::program::ShaderProgram;

/// Narrowest denominator allowed when normalizing a ramp key range.
const MIN_KEY_WIDTH: f32 = f32::EPSILON;

/// Shared state for one update pass.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Frame timestamp; animations compare it against their start.
    pub now: Instant,
    /// Next free texture unit; incremented by each node that binds one.
    pub free_tex_unit: u32,
}

impl FrameContext {
    pub fn new() -> Self {
        Self::at(Instant::now())
    }

    pub fn at(now: Instant) -> Self {
        Self {
            now,
            free_tex_unit: 0,
        }
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new()
    }
}

struct PendingReplace {
    parent: Option<NodeId>,
    old: NodeId,
    new: NodeId,
}

/// Run one update pass over the subtree at `root`.
///
/// Returns the subtree's root after any queued self-replacements have been
/// drained; callers holding the root id must adopt the returned value.
pub fn update(
    tree: &mut ExprTree,
    root: NodeId,
    ctx: &mut FrameContext,
    program: &mut dyn ShaderProgram,
) -> Result<NodeId> {
    let mut pending = Vec::new();
    update_node(tree, root, ctx, program, &mut pending)?;
    drain(tree, root, pending, program)
}

fn value_loc(tree: &ExprTree, id: NodeId, what: &str) -> Result<crate::program::UniformLocation> {
    tree.slot(id)
        .bind
        .value_loc
        .with_context(|| format!("{what} node has no bound handle; update must run after bind"))
}

fn update_node(
    tree: &mut ExprTree,
    id: NodeId,
    ctx: &mut FrameContext,
    program: &mut dyn ShaderProgram,
    pending: &mut Vec<PendingReplace>,
) -> Result<()> {
    let child_ids: Vec<NodeId> = tree.children(id).map(|(_, c)| c).collect();

    match tree.kind(id) {
        // Folded constants were never bound; nothing to push.
        ExprKind::Float { folded: true, .. } => {}
        ExprKind::Float { folded: false, value } => {
            let value = *value;
            let loc = value_loc(tree, id, "Float")?;
            program.set_uniform_f32(loc, value);
        }
        ExprKind::ColorLiteral { value } => {
            let value = value.as_array();
            let loc = value_loc(tree, id, "Color")?;
            program.set_uniform_vec4(loc, value);
        }
        ExprKind::Animation { start, duration, .. } => {
            let (start, duration) = (*start, *duration);
            // Raw ratio is kept unclamped so completion detection can see
            // it pass 1; the pushed uniform is clamped to [0, 1].
            let raw = if duration.is_zero() {
                1.0
            } else {
                ctx.now.saturating_duration_since(start).as_secs_f32()
                    / duration.as_secs_f32()
            };
            if let ExprKind::Animation { progress, .. } = &mut tree.slot_mut(id).kind {
                *progress = Some(raw);
            }
            let loc = value_loc(tree, id, "Animation")?;
            program.set_uniform_f32(loc, raw.clamp(0.0, 1.0));
        }
        ExprKind::Now { epoch, speed } => {
            let elapsed = ctx.now.saturating_duration_since(*epoch).as_secs_f32() * *speed;
            tree.set_float_value(child_ids[0], elapsed);
        }
        ExprKind::Ramp { min_key, max_key, .. } => {
            let (min_key, max_key) = (*min_key, *max_key);
            let bind = &tree.slot(id).bind;
            let texture = bind
                .texture
                .context("RampColor has no uploaded texture; update must run after bind")?;
            let tex_loc = bind.tex_loc.context("RampColor texture sampler unbound")?;
            let key_min_loc = bind.key_min_loc.context("RampColor key range unbound")?;
            let key_width_loc = bind.key_width_loc.context("RampColor key range unbound")?;

            program.set_uniform_texture(tex_loc, ctx.free_tex_unit, texture);
            ctx.free_tex_unit += 1;
            program.set_uniform_f32(key_min_loc, min_key);
            // A zero-width key range would divide by zero in the shader.
            let mut width = max_key - min_key;
            if width.abs() < MIN_KEY_WIDTH {
                width = MIN_KEY_WIDTH;
            }
            program.set_uniform_f32(key_width_loc, width);
        }
        ExprKind::Property { .. }
        | ExprKind::Binary { .. }
        | ExprKind::Unary { .. }
        | ExprKind::Blend
        | ExprKind::SetOpacity
        | ExprKind::Hsv
        | ExprKind::Near
        | ExprKind::ViewportFeatures => {}
    }

    for child in &child_ids {
        update_node(tree, *child, ctx, program, pending)?;
    }

    // A blend whose animation has run to completion collapses to its final
    // child. Queued, not applied: the walk above may still be borrowing
    // ancestors of this node on the caller's stack.
    if matches!(tree.kind(id), ExprKind::Blend) {
        let mix = child_ids[2];
        if let ExprKind::Animation { progress: Some(p), .. } = tree.kind(mix) {
            if *p >= 1.0 {
                pending.push(PendingReplace {
                    parent: tree.parent(id),
                    old: id,
                    new: child_ids[1],
                });
            }
        }
    }
    Ok(())
}

fn drain(
    tree: &mut ExprTree,
    root: NodeId,
    pending: Vec<PendingReplace>,
    program: &mut dyn ShaderProgram,
) -> Result<NodeId> {
    let mut root = root;
    for rep in pending {
        match rep.parent {
            Some(parent) => {
                tree.replace_child(parent, rep.old, rep.new)?;
            }
            None => {
                // The completed blend was a subtree root; the caller adopts
                // its final child as the new root.
                tree.clear_parent(rep.new);
                tree.transplant_notify(rep.old, rep.new);
                if rep.old == root {
                    root = rep.new;
                }
            }
        }
        // The final child survived the rewrite; everything else under the
        // old wrapper is unreachable now and gives up its resources.
        tree.unlink_child(rep.old, rep.new);
        tree.release_subtree(rep.old, program);
        tree.fire_notify(rep.new);
        debug!(old = ?rep.old, new = ?rep.new, "collapsed completed transition");
    }
    Ok(root)
}
