//! Shader compilation and reflection
//!
//! WGSL source text goes through naga's parser and validator; reflection then
//! walks the validated module to derive everything the binding layer needs:
//! the vertex input layout (vertex stages) and the constant-buffer table
//! (both stages). Compilation failures carry naga's rendered diagnostics so
//! the caller sees the same error text the compiler printed.

pub mod reflect;

pub use reflect::{CbufferInfo, ShaderInfo, VertexInput, VertexLayout};

use std::path::Path;

use crate::backend::types::ShaderStage;
use crate::backend::{GpuError, GpuResult};

/// Entry point name every stage module must declare.
pub const ENTRY_POINT: &str = "main";

/// Parse and validate WGSL source, then reflect the stage's interface.
///
/// The module must declare an entry point named [`ENTRY_POINT`] for the
/// requested stage. Parse and validation failures become
/// [`GpuError::Compilation`]; a missing entry point or an interface the
/// binding layer cannot express becomes [`GpuError::Reflection`].
pub fn compile(source: &str, stage: ShaderStage) -> GpuResult<ShaderInfo> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| GpuError::Compilation {
        diagnostics: err.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|err| GpuError::Compilation {
            diagnostics: err.emit_to_string(source),
        })?;

    reflect::reflect(&module, &info, stage)
}

/// Read a whole shader source file as UTF-8 text.
pub fn read_source(path: impl AsRef<Path>) -> GpuResult<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path)
        .map_err(|err| GpuError::SourceRead(format!("{}: {}", path.display(), err)))
}
