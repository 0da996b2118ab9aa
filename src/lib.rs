//! style-forge: a GPU styling engine for geospatial rendering.
//!
//! A declarative styling language is parsed (by a front-end collaborator)
//! into a tree of typed expression nodes owned by a [`style::Style`]. The
//! engine then does three things with that tree:
//!
//! 1. **compile** — a bottom-up codegen pass emits WGSL source fragments
//!    plus symbol tables ([`expr::codegen`]);
//! 2. **bind** — once the host has linked a program from that source, the
//!    emitted symbols are resolved to live handles ([`expr::bind`]);
//! 3. **update** — every frame, current values (constants, animation
//!    progress, ramp key ranges) are pushed into the bound handles, and
//!    completed transitions rewrite themselves out of the tree
//!    ([`expr::update`]).
//!
//! The host renderer stays on the other side of [`program::ShaderProgram`]:
//! geometry decoding, projection and frame scheduling are its business; the
//! engine only asks for a redraw through the callback installed on the
//! style and reports [`expr::ExprTree::is_animated`] so the scheduler knows
//! when continuous frames are still needed.

pub mod color;
pub mod error;
pub mod expr;
pub mod palette;
pub mod program;
pub mod ramp;
pub mod schema;
pub mod style;
pub mod validation;
pub mod wgsl;

pub use color::Color;
pub use error::ExprError;
pub use expr::codegen::{CompiledSource, PropertyTable, UniformDecl, UniformKind};
pub use expr::update::FrameContext;
pub use expr::{BinaryOp, ExprArg, ExprKind, ExprTree, NodeId, UnaryOp, ValueType};
pub use program::{ProgramOp, RecordingProgram, ShaderProgram, TextureHandle, UniformLocation};
pub use ramp::{RAMP_WIDTH, RampTable};
pub use schema::{ColumnType, Schema};
pub use style::Style;
