//! Resource binding pass: resolve codegen symbols to live program handles.
//!
//! Runs once after the host has compiled and linked the generated source,
//! and before any update pass touches the program. Binding a tree that was
//! never compiled (or whose latest compile failed) is an ordering violation
//! and fails loudly rather than pushing values at stale handles.
//!
//! Ramp lookup textures are uploaded here on first bind: construction has
//! no program to upload through, and the table bytes are already sitting in
//! the node. The handle is reused across recompiles of the same tree and
//! released with the owning subtree.

use anyhow::{Context, Result, bail};
use tracing::debug;

use super::codegen::{
    anim_symbol, color_symbol, float_symbol, ramp_key_min_symbol, ramp_key_width_symbol,
    ramp_samp_symbol, ramp_tex_symbol,
};
use super::{ExprKind, ExprTree, NodeId};
use crate::program::ShaderProgram;

/// Resolve every symbol emitted for the subtree at `root` against the
/// linked `program`.
pub fn bind(tree: &mut ExprTree, root: NodeId, program: &mut dyn ShaderProgram) -> Result<()> {
    bind_node(tree, root, program)?;
    debug!(root = ?root, "bound style expression to program");
    Ok(())
}

fn uniform_id(tree: &ExprTree, id: NodeId, what: &str) -> Result<u32> {
    tree.slot(id).bind.uniform_id.with_context(|| {
        format!("{what} node has no uniform ID; bind must run after a successful compile")
    })
}

fn bind_node(tree: &mut ExprTree, id: NodeId, program: &mut dyn ShaderProgram) -> Result<()> {
    let children: Vec<NodeId> = tree.children(id).map(|(_, c)| c).collect();
    for child in children {
        bind_node(tree, child, program)?;
    }

    match tree.kind(id) {
        ExprKind::Float { folded: true, .. } => {}
        ExprKind::Float { folded: false, .. } => {
            let uid = uniform_id(tree, id, "Float")?;
            let loc = program.uniform_location(&float_symbol(uid))?;
            tree.slot_mut(id).bind.value_loc = Some(loc);
        }
        ExprKind::ColorLiteral { .. } => {
            let uid = uniform_id(tree, id, "Color")?;
            let loc = program.uniform_location(&color_symbol(uid))?;
            tree.slot_mut(id).bind.value_loc = Some(loc);
        }
        ExprKind::Animation { .. } => {
            let uid = uniform_id(tree, id, "Animation")?;
            let loc = program.uniform_location(&anim_symbol(uid))?;
            tree.slot_mut(id).bind.value_loc = Some(loc);
        }
        ExprKind::Ramp { .. } => {
            let uid = uniform_id(tree, id, "RampColor")?;
            let tex_loc = program.uniform_location(&ramp_tex_symbol(uid))?;
            // The sampler is a fixed edge-clamp/linear pair the host
            // derives from the texture; resolving it validates the linked
            // program exposes the slot.
            program.uniform_location(&ramp_samp_symbol(uid))?;
            let key_min_loc = program.uniform_location(&ramp_key_min_symbol(uid))?;
            let key_width_loc = program.uniform_location(&ramp_key_width_symbol(uid))?;

            if tree.slot(id).bind.texture.is_none() {
                let bytes = match tree.kind(id) {
                    ExprKind::Ramp { table, .. } => table.as_bytes().to_vec(),
                    _ => unreachable!(),
                };
                let texture = program
                    .create_ramp_texture(&bytes)
                    .context("uploading ramp lookup texture")?;
                tree.slot_mut(id).bind.texture = Some(texture);
            }

            let bind = &mut tree.slot_mut(id).bind;
            bind.tex_loc = Some(tex_loc);
            bind.key_min_loc = Some(key_min_loc);
            bind.key_width_loc = Some(key_width_loc);
        }
        // No resources of their own; children were handled above.
        ExprKind::Property { .. }
        | ExprKind::Binary { .. }
        | ExprKind::Unary { .. }
        | ExprKind::Blend
        | ExprKind::Now { .. }
        | ExprKind::SetOpacity
        | ExprKind::Hsv
        | ExprKind::Near => {}
        ExprKind::ViewportFeatures => {
            bail!("feature-list expressions cannot be bound to a program")
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::codegen::compile;
    use crate::program::RecordingProgram;

    #[test]
    fn bind_before_compile_fails() {
        let mut tree = ExprTree::new();
        let f = tree.float(1.0).unwrap();
        let mut program = RecordingProgram::new();
        assert!(bind(&mut tree, f, &mut program).is_err());
    }

    #[test]
    fn bind_resolves_every_emitted_symbol() {
        let mut tree = ExprTree::new();
        let a = tree.float(1.0).unwrap();
        let b = tree.color([0.0, 0.0, 0.0, 1.0]).unwrap();
        let tinted = tree.set_opacity(b, a).unwrap();
        compile(&mut tree, tinted).unwrap();

        let mut program = RecordingProgram::new();
        bind(&mut tree, tinted, &mut program).unwrap();
        // Child order: the color operand compiles (and binds) before the
        // alpha operand, so it owns the first uniform ID.
        assert_eq!(program.resolved_symbols(), &["color_0", "float_1"]);
    }

    #[test]
    fn bind_fails_when_program_lacks_a_symbol() {
        let mut tree = ExprTree::new();
        let f = tree.float(1.0).unwrap();
        compile(&mut tree, f).unwrap();

        let mut program = RecordingProgram::new();
        program.remove_symbol("float_0");
        assert!(bind(&mut tree, f, &mut program).is_err());
    }

    #[test]
    fn ramp_texture_uploads_once_and_survives_rebinds() {
        let mut tree = ExprTree::new();
        let v = tree.float(10.0).unwrap();
        let stops = crate::palette::lookup("burg_3").unwrap().stops;
        let ramp = tree.ramp_color(v, 0.0, 100.0, &stops).unwrap();
        compile(&mut tree, ramp).unwrap();

        let mut program = RecordingProgram::new();
        bind(&mut tree, ramp, &mut program).unwrap();
        bind(&mut tree, ramp, &mut program).unwrap();
        assert_eq!(program.uploaded_textures.len(), 1);
        assert_eq!(program.uploaded_textures[0].len(), crate::ramp::RAMP_WIDTH * 4);
    }
}
