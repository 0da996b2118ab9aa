//! Host-facing GPU program abstraction.
//!
//! The engine never talks to a graphics API directly. After the host has
//! compiled and linked the generated shader source, it hands the engine a
//! [`ShaderProgram`]: the binding pass resolves every emitted symbol name to
//! an opaque handle through it, and the update pass pushes current values
//! into those handles each frame.
//!
//! Handles are opaque small integers minted by the host; the engine only
//! stores and returns them.

use std::collections::HashMap;

use anyhow::{Result, bail};

/// Resolved location of a uniform (or sampler uniform) in a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// A GPU texture owned by the expression node that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// The contract a linked host program must satisfy.
///
/// Setter calls are infallible by design: binding has already proven the
/// location valid, and a frame-time failure would have nowhere useful to
/// surface mid-draw.
pub trait ShaderProgram {
    /// Resolve a symbol emitted by the codegen pass. Fails when the linked
    /// program does not expose the name.
    fn uniform_location(&mut self, name: &str) -> Result<UniformLocation>;

    /// Upload a `RAMP_WIDTH x 1` RGBA8 texture with edge-clamp wrapping and
    /// linear filtering. The returned handle is owned by the caller.
    fn create_ramp_texture(&mut self, texels: &[u8]) -> Result<TextureHandle>;

    /// Release a texture previously created through this program's host.
    fn free_texture(&mut self, texture: TextureHandle);

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32);

    fn set_uniform_vec4(&mut self, location: UniformLocation, value: [f32; 4]);

    /// Bind `texture` to the given texture unit and point the sampler
    /// uniform at that unit.
    fn set_uniform_texture(&mut self, location: UniformLocation, unit: u32, texture: TextureHandle);
}

/// One value push observed by [`RecordingProgram`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramOp {
    SetF32 { name: String, value: f32 },
    SetVec4 { name: String, value: [f32; 4] },
    BindTexture { name: String, unit: u32, texture: TextureHandle },
}

/// An in-memory [`ShaderProgram`] that records every call.
///
/// Used by the test suite and by headless hosts that want to inspect what a
/// style would push without a GPU. Locations are minted on demand, so any
/// symbol resolves unless it was explicitly poisoned with
/// [`RecordingProgram::remove_symbol`].
#[derive(Default)]
pub struct RecordingProgram {
    names: Vec<String>,
    locations: HashMap<String, UniformLocation>,
    removed: Vec<String>,
    next_texture: u32,
    pub ops: Vec<ProgramOp>,
    pub uploaded_textures: Vec<Vec<u8>>,
    pub freed_textures: Vec<TextureHandle>,
}

impl RecordingProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` unresolvable, as if the linker stripped it.
    pub fn remove_symbol(&mut self, name: &str) {
        self.removed.push(name.to_string());
    }

    fn name_of(&self, location: UniformLocation) -> String {
        self.names
            .get(location.0 as usize)
            .cloned()
            .unwrap_or_else(|| format!("<unresolved:{}>", location.0))
    }

    /// The most recent f32 pushed to `name`, if any.
    pub fn last_f32(&self, name: &str) -> Option<f32> {
        self.ops.iter().rev().find_map(|op| match op {
            ProgramOp::SetF32 { name: n, value } if n == name => Some(*value),
            _ => None,
        })
    }

    /// The most recent vec4 pushed to `name`, if any.
    pub fn last_vec4(&self, name: &str) -> Option<[f32; 4]> {
        self.ops.iter().rev().find_map(|op| match op {
            ProgramOp::SetVec4 { name: n, value } if n == name => Some(*value),
            _ => None,
        })
    }

    /// All texture-unit bindings pushed to `name`, in order.
    pub fn texture_binds(&self, name: &str) -> Vec<(u32, TextureHandle)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                ProgramOp::BindTexture { name: n, unit, texture } if n == name => {
                    Some((*unit, *texture))
                }
                _ => None,
            })
            .collect()
    }

    /// Names of every symbol the binding pass resolved.
    pub fn resolved_symbols(&self) -> &[String] {
        &self.names
    }
}

impl ShaderProgram for RecordingProgram {
    fn uniform_location(&mut self, name: &str) -> Result<UniformLocation> {
        if self.removed.iter().any(|r| r == name) {
            bail!("program has no uniform named '{name}'");
        }
        if let Some(&loc) = self.locations.get(name) {
            return Ok(loc);
        }
        let loc = UniformLocation(self.names.len() as u32);
        self.names.push(name.to_string());
        self.locations.insert(name.to_string(), loc);
        Ok(loc)
    }

    fn create_ramp_texture(&mut self, texels: &[u8]) -> Result<TextureHandle> {
        self.uploaded_textures.push(texels.to_vec());
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        Ok(handle)
    }

    fn free_texture(&mut self, texture: TextureHandle) {
        self.freed_textures.push(texture);
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        self.ops.push(ProgramOp::SetF32 {
            name: self.name_of(location),
            value,
        });
    }

    fn set_uniform_vec4(&mut self, location: UniformLocation, value: [f32; 4]) {
        self.ops.push(ProgramOp::SetVec4 {
            name: self.name_of(location),
            value,
        });
    }

    fn set_uniform_texture(&mut self, location: UniformLocation, unit: u32, texture: TextureHandle) {
        self.ops.push(ProgramOp::BindTexture {
            name: self.name_of(location),
            unit,
            texture,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_are_stable_per_name() {
        let mut program = RecordingProgram::new();
        let a = program.uniform_location("float_0").unwrap();
        let b = program.uniform_location("float_0").unwrap();
        assert_eq!(a, b);
        assert_ne!(program.uniform_location("float_1").unwrap(), a);
    }

    #[test]
    fn removed_symbols_fail_resolution() {
        let mut program = RecordingProgram::new();
        program.remove_symbol("color_2");
        assert!(program.uniform_location("color_2").is_err());
    }

    #[test]
    fn pushes_are_recorded_by_name() {
        let mut program = RecordingProgram::new();
        let loc = program.uniform_location("float_0").unwrap();
        program.set_uniform_f32(loc, 1.5);
        program.set_uniform_f32(loc, 2.5);
        assert_eq!(program.last_f32("float_0"), Some(2.5));
    }
}
