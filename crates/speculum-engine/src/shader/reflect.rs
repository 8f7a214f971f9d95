//! WGSL compilation and interface reflection.
//!
//! Each stage is parsed and validated with `naga`. Reflection keeps only what the
//! entry point actually uses; declarations the entry point never touches do not
//! appear in the interface (they are "optimized out").

use std::collections::BTreeMap;
use std::fmt;

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, ImageDimension, Scalar, ShaderStage, TypeInner, VectorSize};

use crate::device::TextureKind;
use crate::error::ShaderError;

use super::UniformType;

/// Programmable pipeline stage.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn naga(self) -> ShaderStage {
        match self {
            Stage::Vertex => ShaderStage::Vertex,
            Stage::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A `@location` input or output of an entry point.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InterfaceVar {
    pub name: String,
    pub location: u32,
    /// Scalar component count (1..=4), 0 for non-vector types.
    pub components: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResourceKind {
    Uniform(UniformType),
    Texture(TextureKind),
    Sampler,
}

/// A bound global used by at least one stage.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Resource {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
    pub vertex: bool,
    pub fragment: bool,
}

/// Reflected interface of one compiled stage.
#[derive(Debug, Clone)]
pub struct StageInterface {
    pub stage: Stage,
    pub source: String,
    pub entry_point: String,
    pub inputs: Vec<InterfaceVar>,
    pub outputs: Vec<InterfaceVar>,
    pub resources: Vec<Resource>,
}

/// Vertex + fragment stages that passed the link checks.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex: StageInterface,
    pub fragment: StageInterface,
    /// Union of both stages' resources, ordered by binding.
    pub resources: Vec<Resource>,
}

impl LinkedProgram {
    /// Compiles and links a vertex/fragment pair.
    pub fn build(vertex_source: &str, fragment_source: &str) -> Result<Self, ShaderError> {
        let vertex = compile_stage(Stage::Vertex, vertex_source)?;
        let fragment = compile_stage(Stage::Fragment, fragment_source)?;
        link(vertex, fragment)
    }

    /// Vertex input named `name`, if the vertex stage uses it.
    pub fn attribute(&self, name: &str) -> Option<&InterfaceVar> {
        self.vertex.inputs.iter().find(|v| v.name == name)
    }

    /// Resource named `name`, if either stage uses it.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Vertex inputs ordered by location.
    pub fn vertex_inputs(&self) -> Vec<&InterfaceVar> {
        let mut inputs: Vec<_> = self.vertex.inputs.iter().collect();
        inputs.sort_by_key(|v| v.location);
        inputs
    }
}

/// Parses, validates and reflects one stage.
pub fn compile_stage(stage: Stage, source: &str) -> Result<StageInterface, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Parse {
        stage,
        log: e.emit_to_string(source),
    })?;

    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| ShaderError::Validation {
            stage,
            log: e.as_inner().to_string(),
        })?;

    let (ep_index, ep) = module
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, ep)| ep.stage == stage.naga())
        .ok_or(ShaderError::MissingEntryPoint { stage })?;

    let mut inputs = Vec::new();
    for arg in &ep.function.arguments {
        collect_locations(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }

    let mut outputs = Vec::new();
    if let Some(result) = &ep.function.result {
        collect_locations(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let usage = info.get_entry_point(ep_index);
    let mut resources = Vec::new();

    for (handle, var) in module.global_variables.iter() {
        if usage[handle].is_empty() {
            continue;
        }
        let Some(rb) = var.binding.as_ref() else { continue };

        let name = var.name.clone().unwrap_or_default();
        let inner = &module.types[var.ty].inner;

        let kind = match var.space {
            AddressSpace::Uniform => match uniform_type(inner) {
                Some(ty) => ResourceKind::Uniform(ty),
                None => return Err(ShaderError::UnsupportedUniform { name }),
            },
            AddressSpace::Handle => match inner {
                TypeInner::Image { dim: ImageDimension::D2, arrayed: false, .. } => {
                    ResourceKind::Texture(TextureKind::D2)
                }
                TypeInner::Image { dim: ImageDimension::Cube, arrayed: false, .. } => {
                    ResourceKind::Texture(TextureKind::Cube)
                }
                TypeInner::Sampler { comparison: false } => ResourceKind::Sampler,
                _ => {
                    return Err(ShaderError::Interface {
                        name,
                        detail: "only 2D/cube textures and filtering samplers are supported"
                            .to_string(),
                    });
                }
            },
            _ => continue,
        };

        resources.push(Resource {
            name,
            group: rb.group,
            binding: rb.binding,
            kind,
            vertex: stage == Stage::Vertex,
            fragment: stage == Stage::Fragment,
        });
    }

    Ok(StageInterface {
        stage,
        source: source.to_string(),
        entry_point: ep.name.clone(),
        inputs,
        outputs,
        resources,
    })
}

/// Checks that the two stages agree and merges their resources.
pub fn link(vertex: StageInterface, fragment: StageInterface) -> Result<LinkedProgram, ShaderError> {
    for input in &fragment.inputs {
        if !vertex.outputs.iter().any(|o| o.location == input.location) {
            return Err(ShaderError::Link(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            )));
        }
    }

    let mut merged: BTreeMap<u32, Resource> = BTreeMap::new();
    for r in vertex.resources.iter().chain(fragment.resources.iter()) {
        if r.group != 0 {
            return Err(ShaderError::Link(format!(
                "`{}` uses bind group {}; only group 0 is supported",
                r.name, r.group
            )));
        }

        match merged.get_mut(&r.binding) {
            Some(existing) if existing.name != r.name || existing.kind != r.kind => {
                return Err(ShaderError::Link(format!(
                    "binding {} is claimed by both `{}` and `{}`",
                    r.binding, existing.name, r.name
                )));
            }
            Some(existing) => {
                existing.vertex |= r.vertex;
                existing.fragment |= r.fragment;
            }
            None => {
                merged.insert(r.binding, r.clone());
            }
        }
    }

    Ok(LinkedProgram {
        vertex,
        fragment,
        resources: merged.into_values().collect(),
    })
}

fn collect_locations(
    module: &naga::Module,
    name: Option<&str>,
    ty: Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<InterfaceVar>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::Location { location, .. }) => out.push(InterfaceVar {
            name: name.unwrap_or_default().to_string(),
            location: *location,
            components: components(inner),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for m in members {
                    collect_locations(module, m.name.as_deref(), m.ty, m.binding.as_ref(), out);
                }
            }
        }
    }
}

fn vector_len(size: VectorSize) -> u32 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

fn components(inner: &TypeInner) -> u32 {
    match inner {
        TypeInner::Scalar(_) => 1,
        TypeInner::Vector { size, .. } => vector_len(*size),
        _ => 0,
    }
}

fn uniform_type(inner: &TypeInner) -> Option<UniformType> {
    match inner {
        TypeInner::Scalar(s) if *s == Scalar::U32 => Some(UniformType::Bool),
        TypeInner::Scalar(s) if *s == Scalar::I32 => Some(UniformType::Int),
        TypeInner::Scalar(s) if *s == Scalar::F32 => Some(UniformType::Float),
        TypeInner::Vector { size, scalar } if *scalar == Scalar::F32 => match vector_len(*size) {
            2 => Some(UniformType::Vec2),
            3 => Some(UniformType::Vec3),
            _ => Some(UniformType::Vec4),
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if *scalar == Scalar::F32 => Some(UniformType::Mat4),
        _ => None,
    }
}
