//! Reflection over validated naga modules
//!
//! Derives the two pieces of metadata the binding layer runs on:
//!
//! - **Vertex input layout**: every location-bound entry-point argument
//!   (struct arguments are flattened into their members, builtins skipped)
//!   becomes one element with a format from the fixed scalar-kind ×
//!   component-count table, append-packed into a single per-vertex buffer
//!   slot. Element order follows the shader location index.
//! - **Constant-buffer table**: every uniform-address-space global the entry
//!   point uses becomes one slot, ordered by binding index and dense from 0,
//!   with its byte size taken from the validated type layout. Vertex-stage
//!   uniforms must live in bind group 0, fragment-stage uniforms in group 1.

use naga::valid::ModuleInfo;
use naga::{AddressSpace, Binding, Module, ScalarKind, TypeInner, VectorSize};

use crate::backend::types::{
    ShaderStage, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
};
use crate::backend::{GpuError, GpuResult};

/// One reflected vertex input element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    /// Argument or struct-member name, verbatim from the source.
    pub name: String,
    /// Shader location index.
    pub location: u32,
    pub format: VertexFormat,
    /// Append-packed byte offset within the vertex record.
    pub offset: u32,
}

/// Reflected vertex input layout: elements ordered by location, tightly
/// packed in vertex buffer slot 0 with per-vertex stepping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub inputs: Vec<VertexInput>,
    /// Total packed record size in bytes.
    pub stride: u32,
}

impl VertexLayout {
    /// Lower to the backend's vertex buffer layout.
    pub fn buffer_layout(&self) -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: self.stride as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: self
                .inputs
                .iter()
                .map(|input| VertexAttribute {
                    location: input.location,
                    format: input.format,
                    offset: input.offset as u64,
                })
                .collect(),
        }
    }
}

/// One reflected constant buffer: binding slot and byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CbufferInfo {
    pub slot: u32,
    pub byte_size: u32,
}

/// Everything reflection derives from one compiled stage.
#[derive(Debug, Clone)]
pub struct ShaderInfo {
    pub stage: ShaderStage,
    /// Present for vertex stages only.
    pub vertex_layout: Option<VertexLayout>,
    /// Ordered by ascending slot, dense from 0.
    pub cbuffers: Vec<CbufferInfo>,
}

pub(super) fn reflect(
    module: &Module,
    info: &ModuleInfo,
    stage: ShaderStage,
) -> GpuResult<ShaderInfo> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let (ep_index, entry) = module
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, ep)| ep.stage == naga_stage && ep.name == super::ENTRY_POINT)
        .ok_or_else(|| {
            GpuError::Reflection(format!(
                "no `{}` entry point declared for the {:?} stage",
                super::ENTRY_POINT,
                stage
            ))
        })?;

    let vertex_layout = match stage {
        ShaderStage::Vertex => Some(reflect_vertex_inputs(module, entry)?),
        ShaderStage::Fragment => None,
    };

    let cbuffers = reflect_cbuffers(module, info, ep_index, stage)?;

    Ok(ShaderInfo {
        stage,
        vertex_layout,
        cbuffers,
    })
}

fn reflect_vertex_inputs(module: &Module, entry: &naga::EntryPoint) -> GpuResult<VertexLayout> {
    let mut elements: Vec<(String, u32, VertexFormat)> = Vec::new();

    for arg in &entry.function.arguments {
        let arg_name = arg.name.as_deref().unwrap_or("<unnamed>");
        match &arg.binding {
            Some(Binding::BuiltIn(_)) => {}
            Some(Binding::Location { location, .. }) => {
                let format = attribute_format(arg_name, &module.types[arg.ty].inner)?;
                elements.push((arg_name.to_string(), *location, format));
            }
            None => {
                // Unbound arguments are structs whose members carry the
                // bindings; flatten them.
                let TypeInner::Struct { members, .. } = &module.types[arg.ty].inner else {
                    return Err(GpuError::Reflection(format!(
                        "vertex input `{arg_name}` has neither a location nor a builtin binding"
                    )));
                };
                for member in members {
                    let member_name = member.name.as_deref().unwrap_or("<unnamed>");
                    match &member.binding {
                        Some(Binding::BuiltIn(_)) => {}
                        Some(Binding::Location { location, .. }) => {
                            let format =
                                attribute_format(member_name, &module.types[member.ty].inner)?;
                            elements.push((member_name.to_string(), *location, format));
                        }
                        None => {
                            return Err(GpuError::Reflection(format!(
                                "vertex input `{member_name}` has neither a location nor a builtin binding"
                            )));
                        }
                    }
                }
            }
        }
    }

    elements.sort_by_key(|(_, location, _)| *location);

    let mut offset = 0u32;
    let inputs = elements
        .into_iter()
        .map(|(name, location, format)| {
            let input = VertexInput {
                name,
                location,
                format,
                offset,
            };
            offset += format.size() as u32;
            input
        })
        .collect();

    Ok(VertexLayout {
        inputs,
        stride: offset,
    })
}

fn attribute_format(name: &str, inner: &TypeInner) -> GpuResult<VertexFormat> {
    let (scalar, components) = match *inner {
        TypeInner::Scalar(scalar) => (scalar, 1),
        TypeInner::Vector { size, scalar } => (scalar, vector_len(size)),
        _ => {
            return Err(GpuError::Reflection(format!(
                "vertex input `{name}` must be a scalar or vector, not {inner:?}"
            )))
        }
    };
    vertex_format(scalar.kind, scalar.width, components).ok_or_else(|| {
        GpuError::Reflection(format!(
            "vertex input `{name}` has unsupported component type {:?} (width {})",
            scalar.kind, scalar.width
        ))
    })
}

fn vector_len(size: VectorSize) -> u32 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

/// The fixed format table: 32-bit {float, sint, uint} at one to four
/// components. Anything outside the table is unsupported and must be
/// rejected by the caller, never approximated.
pub fn vertex_format(kind: ScalarKind, width: u8, components: u32) -> Option<VertexFormat> {
    if width != 4 {
        return None;
    }
    Some(match (kind, components) {
        (ScalarKind::Float, 1) => VertexFormat::Float32,
        (ScalarKind::Float, 2) => VertexFormat::Float32x2,
        (ScalarKind::Float, 3) => VertexFormat::Float32x3,
        (ScalarKind::Float, 4) => VertexFormat::Float32x4,
        (ScalarKind::Sint, 1) => VertexFormat::Sint32,
        (ScalarKind::Sint, 2) => VertexFormat::Sint32x2,
        (ScalarKind::Sint, 3) => VertexFormat::Sint32x3,
        (ScalarKind::Sint, 4) => VertexFormat::Sint32x4,
        (ScalarKind::Uint, 1) => VertexFormat::Uint32,
        (ScalarKind::Uint, 2) => VertexFormat::Uint32x2,
        (ScalarKind::Uint, 3) => VertexFormat::Uint32x3,
        (ScalarKind::Uint, 4) => VertexFormat::Uint32x4,
        _ => return None,
    })
}

fn reflect_cbuffers(
    module: &Module,
    info: &ModuleInfo,
    ep_index: usize,
    stage: ShaderStage,
) -> GpuResult<Vec<CbufferInfo>> {
    let expected_group = stage.bind_group_index();
    let fn_info = info.get_entry_point(ep_index);

    let mut slots = Vec::new();
    for (handle, var) in module.global_variables.iter() {
        if var.space != AddressSpace::Uniform {
            continue;
        }
        // Globals the entry point never touches don't make it into the
        // stage's table, same as a compiler stripping dead declarations.
        if fn_info[handle].is_empty() {
            continue;
        }
        let var_name = var.name.as_deref().unwrap_or("<unnamed>");
        let binding = var.binding.as_ref().ok_or_else(|| {
            GpuError::Reflection(format!("uniform `{var_name}` has no group/binding"))
        })?;
        if binding.group != expected_group {
            return Err(GpuError::Reflection(format!(
                "uniform `{var_name}` is bound at group {}; {:?}-stage uniforms belong in group {expected_group}",
                binding.group, stage
            )));
        }
        let byte_size = module.types[var.ty].inner.size(module.to_ctx());
        slots.push(CbufferInfo {
            slot: binding.binding,
            byte_size,
        });
    }

    slots.sort_by_key(|slot| slot.slot);
    for (index, slot) in slots.iter().enumerate() {
        if slot.slot != index as u32 {
            return Err(GpuError::Reflection(format!(
                "constant-buffer bindings must be dense from 0; missing binding {index}"
            )));
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::compile;

    fn reflect_vertex(source: &str) -> ShaderInfo {
        compile(source, ShaderStage::Vertex).unwrap()
    }

    // -----------------------------------------------------------------------
    // Format table
    // -----------------------------------------------------------------------

    #[test]
    fn format_table_covers_all_supported_pairs() {
        let expected = [
            (ScalarKind::Float, 1, VertexFormat::Float32),
            (ScalarKind::Float, 2, VertexFormat::Float32x2),
            (ScalarKind::Float, 3, VertexFormat::Float32x3),
            (ScalarKind::Float, 4, VertexFormat::Float32x4),
            (ScalarKind::Sint, 1, VertexFormat::Sint32),
            (ScalarKind::Sint, 2, VertexFormat::Sint32x2),
            (ScalarKind::Sint, 3, VertexFormat::Sint32x3),
            (ScalarKind::Sint, 4, VertexFormat::Sint32x4),
            (ScalarKind::Uint, 1, VertexFormat::Uint32),
            (ScalarKind::Uint, 2, VertexFormat::Uint32x2),
            (ScalarKind::Uint, 3, VertexFormat::Uint32x3),
            (ScalarKind::Uint, 4, VertexFormat::Uint32x4),
        ];
        for (kind, components, format) in expected {
            assert_eq!(vertex_format(kind, 4, components), Some(format));
        }
    }

    #[test]
    fn format_table_rejects_unsupported_kinds() {
        assert_eq!(vertex_format(ScalarKind::Bool, 1, 3), None);
        // 16-bit floats are outside the table regardless of component count.
        assert_eq!(vertex_format(ScalarKind::Float, 2, 3), None);
        assert_eq!(vertex_format(ScalarKind::Float, 8, 4), None);
    }

    #[test]
    fn non_vector_attribute_is_rejected() {
        let matrix = TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar: naga::Scalar {
                kind: ScalarKind::Float,
                width: 4,
            },
        };
        let err = attribute_format("model", &matrix).unwrap_err();
        assert!(matches!(err, GpuError::Reflection(_)));
    }

    #[test]
    fn bool_attribute_is_rejected() {
        let flag = TypeInner::Scalar(naga::Scalar {
            kind: ScalarKind::Bool,
            width: 1,
        });
        let err = attribute_format("flag", &flag).unwrap_err();
        assert!(matches!(err, GpuError::Reflection(_)));
    }

    // -----------------------------------------------------------------------
    // Vertex input reflection
    // -----------------------------------------------------------------------

    #[test]
    fn single_float3_input_reflects_one_element() {
        let src = r#"
            @vertex
            fn main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position, 1.0);
            }
        "#;
        let info = reflect_vertex(src);
        let layout = info.vertex_layout.unwrap();
        assert_eq!(layout.inputs.len(), 1);
        assert_eq!(layout.inputs[0].name, "position");
        assert_eq!(layout.inputs[0].format, VertexFormat::Float32x3);
        assert_eq!(layout.inputs[0].offset, 0);
        assert_eq!(layout.stride, 12);
    }

    #[test]
    fn struct_argument_is_flattened_and_append_packed() {
        let src = r#"
            struct VsIn {
                @location(0) position: vec3<f32>,
                @location(1) normal: vec3<f32>,
                @location(2) uv: vec2<f32>,
            }

            @vertex
            fn main(in: VsIn) -> @builtin(position) vec4<f32> {
                return vec4<f32>(in.position + in.normal, in.uv.x);
            }
        "#;
        let layout = reflect_vertex(src).vertex_layout.unwrap();
        assert_eq!(layout.inputs.len(), 3);
        assert_eq!(layout.inputs[0].offset, 0);
        assert_eq!(layout.inputs[1].offset, 12);
        assert_eq!(layout.inputs[2].offset, 24);
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.inputs[2].name, "uv");
    }

    #[test]
    fn builtin_inputs_are_skipped() {
        let src = r#"
            @vertex
            fn main(
                @builtin(vertex_index) index: u32,
                @location(0) position: vec3<f32>,
            ) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position * f32(index), 1.0);
            }
        "#;
        let layout = reflect_vertex(src).vertex_layout.unwrap();
        assert_eq!(layout.inputs.len(), 1);
        assert_eq!(layout.inputs[0].name, "position");
    }

    #[test]
    fn elements_follow_location_order_not_declaration_order() {
        let src = r#"
            @vertex
            fn main(
                @location(1) uv: vec2<f32>,
                @location(0) position: vec3<f32>,
            ) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position, uv.x);
            }
        "#;
        let layout = reflect_vertex(src).vertex_layout.unwrap();
        assert_eq!(layout.inputs[0].name, "position");
        assert_eq!(layout.inputs[0].offset, 0);
        assert_eq!(layout.inputs[1].name, "uv");
        assert_eq!(layout.inputs[1].offset, 12);
        assert_eq!(layout.stride, 20);
    }

    #[test]
    fn integer_inputs_use_integer_formats() {
        let src = r#"
            @vertex
            fn main(
                @location(0) position: vec3<f32>,
                @location(1) bone: vec4<i32>,
                @location(2) mask: u32,
            ) -> @builtin(position) vec4<f32> {
                return vec4<f32>(position * f32(mask) + vec3<f32>(bone.xyz), 1.0);
            }
        "#;
        let layout = reflect_vertex(src).vertex_layout.unwrap();
        assert_eq!(layout.inputs[1].format, VertexFormat::Sint32x4);
        assert_eq!(layout.inputs[2].format, VertexFormat::Uint32);
    }

    // -----------------------------------------------------------------------
    // Constant-buffer reflection
    // -----------------------------------------------------------------------

    #[test]
    fn no_uniforms_yields_empty_table() {
        let src = r#"
            @vertex
            fn main() -> @builtin(position) vec4<f32> {
                return vec4<f32>(0.0);
            }
        "#;
        let info = reflect_vertex(src);
        assert!(info.cbuffers.is_empty());
    }

    #[test]
    fn table_is_sorted_by_binding_with_reflected_sizes() {
        let src = r#"
            @group(0) @binding(2) var<uniform> c: vec4<f32>;
            @group(0) @binding(0) var<uniform> a: mat4x4<f32>;
            @group(0) @binding(1) var<uniform> b: array<vec4<f32>, 3>;

            @vertex
            fn main() -> @builtin(position) vec4<f32> {
                return a * (b[0] + c);
            }
        "#;
        let info = reflect_vertex(src);
        assert_eq!(
            info.cbuffers,
            vec![
                CbufferInfo { slot: 0, byte_size: 64 },
                CbufferInfo { slot: 1, byte_size: 48 },
                CbufferInfo { slot: 2, byte_size: 16 },
            ]
        );
    }

    #[test]
    fn unused_uniforms_are_not_reported() {
        let src = r#"
            @group(0) @binding(0) var<uniform> used: vec4<f32>;
            @group(0) @binding(1) var<uniform> dead: mat4x4<f32>;

            @vertex
            fn main() -> @builtin(position) vec4<f32> {
                return used;
            }
        "#;
        let info = reflect_vertex(src);
        assert_eq!(info.cbuffers.len(), 1);
        assert_eq!(info.cbuffers[0].slot, 0);
    }

    #[test]
    fn sparse_bindings_are_rejected() {
        let src = r#"
            @group(0) @binding(0) var<uniform> a: vec4<f32>;
            @group(0) @binding(2) var<uniform> b: vec4<f32>;

            @vertex
            fn main() -> @builtin(position) vec4<f32> {
                return a + b;
            }
        "#;
        let err = compile(src, ShaderStage::Vertex).unwrap_err();
        assert!(matches!(err, GpuError::Reflection(_)));
    }

    #[test]
    fn vertex_uniform_in_fragment_group_is_rejected() {
        let src = r#"
            @group(1) @binding(0) var<uniform> misplaced: vec4<f32>;

            @vertex
            fn main() -> @builtin(position) vec4<f32> {
                return misplaced;
            }
        "#;
        let err = compile(src, ShaderStage::Vertex).unwrap_err();
        assert!(matches!(err, GpuError::Reflection(_)));
    }

    #[test]
    fn fragment_uniforms_live_in_group_one() {
        let src = r#"
            struct Light {
                direction: vec4<f32>,
                color: vec4<f32>,
            }
            @group(1) @binding(0) var<uniform> light: Light;

            @fragment
            fn main() -> @location(0) vec4<f32> {
                return light.color;
            }
        "#;
        let info = compile(src, ShaderStage::Fragment).unwrap();
        assert!(info.vertex_layout.is_none());
        assert_eq!(
            info.cbuffers,
            vec![CbufferInfo { slot: 0, byte_size: 32 }]
        );
    }
}
