use std::collections::BTreeMap;

use crate::device::{Backend, BufferId, BufferUsage, ProgramId, TextureId};
use crate::error::{ContractError, ShaderError};

use super::{LinkedProgram, ResourceKind, UniformType, UniformValue};

/// Per-vertex input. `location` is resolved once, at compile.
#[derive(Debug, Clone)]
struct AttributeSlot {
    binding_name: String,
    dimension: u32,
    data: Vec<f32>,
    indices: Option<Vec<u16>>,
    buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    location: Option<u32>,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct UniformSlot {
    binding_name: String,
    value: UniformValue,
    binding: Option<u32>,
}

#[derive(Debug, Clone)]
struct TextureSlot {
    binding_name: String,
    texture: Option<TextureId>,
    binding: Option<u32>,
}

/// A vertex/fragment program plus its named binding table.
///
/// Slots are declared up front by name, each naming the shader variable it feeds.
/// [`compile`](Self::compile) resolves them against what the program actually uses;
/// names the compiler dropped stay unresolved and are skipped on send.
///
/// Upload rules:
/// - attributes go to the GPU on the first render, when marked dirty, or when
///   their buffer does not exist yet
/// - uniforms and textures are sent on every call
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    vertex_source: String,
    fragment_source: String,
    attributes: BTreeMap<String, AttributeSlot>,
    uniforms: BTreeMap<String, UniformSlot>,
    textures: BTreeMap<String, TextureSlot>,
    program: Option<ProgramId>,
}

/// Declares the binding table of a [`ShaderProgram`].
///
/// Declaration errors are deferred to [`build`](Self::build).
#[derive(Debug)]
pub struct ShaderProgramBuilder {
    program: ShaderProgram,
    error: Option<ContractError>,
}

impl ShaderProgramBuilder {
    /// Declares a non-indexed attribute fed by the vertex input `binding_name`.
    pub fn attribute(self, name: &str, binding_name: &str, dimension: u32, data: &[f32]) -> Self {
        self.declare_attribute(name, binding_name, dimension, data, None)
    }

    /// Declares an attribute drawn through `indices`.
    pub fn indexed_attribute(
        self,
        name: &str,
        binding_name: &str,
        dimension: u32,
        data: &[f32],
        indices: &[u16],
    ) -> Self {
        self.declare_attribute(name, binding_name, dimension, data, Some(indices))
    }

    /// Declares a uniform of type `ty`. `data = None` starts at zero.
    pub fn uniform(mut self, name: &str, binding_name: &str, ty: UniformType, data: Option<&[f32]>) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.program.uniforms.contains_key(name) {
            self.error = Some(ContractError::DuplicateName {
                kind: "uniform",
                name: name.to_string(),
            });
            return self;
        }

        let value = match data {
            Some(data) => match UniformValue::from_slice(name, ty, data) {
                Ok(v) => v,
                Err(e) => {
                    self.error = Some(e);
                    return self;
                }
            },
            None => UniformValue::zero(ty),
        };

        self.program.uniforms.insert(
            name.to_string(),
            UniformSlot {
                binding_name: binding_name.to_string(),
                value,
                binding: None,
            },
        );
        self
    }

    /// Declares a sampled texture fed to the shader variable `binding_name`.
    pub fn texture(mut self, name: &str, binding_name: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.program.textures.contains_key(name) {
            self.error = Some(ContractError::DuplicateName {
                kind: "texture",
                name: name.to_string(),
            });
            return self;
        }

        self.program.textures.insert(
            name.to_string(),
            TextureSlot {
                binding_name: binding_name.to_string(),
                texture: None,
                binding: None,
            },
        );
        self
    }

    pub fn build(self) -> Result<ShaderProgram, ContractError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.program),
        }
    }

    fn declare_attribute(
        mut self,
        name: &str,
        binding_name: &str,
        dimension: u32,
        data: &[f32],
        indices: Option<&[u16]>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.program.attributes.contains_key(name) {
            self.error = Some(ContractError::DuplicateName {
                kind: "attribute",
                name: name.to_string(),
            });
            return self;
        }
        if let Err(e) = check_attribute_data(name, dimension, data) {
            self.error = Some(e);
            return self;
        }

        self.program.attributes.insert(
            name.to_string(),
            AttributeSlot {
                binding_name: binding_name.to_string(),
                dimension,
                data: data.to_vec(),
                indices: indices.map(<[u16]>::to_vec),
                buffer: None,
                index_buffer: None,
                location: None,
                dirty: false,
            },
        );
        self
    }
}

fn check_attribute_data(name: &str, dimension: u32, data: &[f32]) -> Result<(), ContractError> {
    if !(1..=4).contains(&dimension) {
        return Err(ContractError::InvalidDimension {
            name: name.to_string(),
            dimension,
        });
    }
    if data.len() % dimension as usize != 0 {
        return Err(ContractError::Arity {
            name: name.to_string(),
            expected: dimension as usize,
            got: data.len(),
        });
    }
    Ok(())
}

/// Resolved slot positions, committed only once the whole program is accepted.
struct Resolution {
    attributes: Vec<(String, Option<u32>)>,
    uniforms: Vec<(String, Option<u32>)>,
    textures: Vec<(String, Option<u32>)>,
}

impl ShaderProgram {
    pub fn builder(vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> ShaderProgramBuilder {
        ShaderProgramBuilder {
            program: ShaderProgram {
                vertex_source: vertex_source.into(),
                fragment_source: fragment_source.into(),
                attributes: BTreeMap::new(),
                uniforms: BTreeMap::new(),
                textures: BTreeMap::new(),
                program: None,
            },
            error: None,
        }
    }

    /// Compiles, links and uploads the program, then resolves every slot.
    ///
    /// Calling again after success is a no-op. On failure nothing is created and
    /// no slot is resolved.
    pub fn compile<B: Backend + ?Sized>(&mut self, backend: &mut B) -> Result<(), ShaderError> {
        if self.program.is_some() {
            return Ok(());
        }

        let linked = LinkedProgram::build(&self.vertex_source, &self.fragment_source)?;
        let resolution = self.resolve(&linked)?;
        let id = backend.create_program(&linked)?;

        for (name, location) in resolution.attributes {
            if let Some(slot) = self.attributes.get_mut(&name) {
                slot.location = location;
            }
        }
        for (name, binding) in resolution.uniforms {
            if let Some(slot) = self.uniforms.get_mut(&name) {
                slot.binding = binding;
            }
        }
        for (name, binding) in resolution.textures {
            if let Some(slot) = self.textures.get_mut(&name) {
                slot.binding = binding;
            }
        }

        self.program = Some(id);
        log::debug!("shader program {id:?} compiled");
        Ok(())
    }

    fn resolve(&self, linked: &LinkedProgram) -> Result<Resolution, ShaderError> {
        let mut attributes = Vec::with_capacity(self.attributes.len());
        for (name, slot) in &self.attributes {
            let location = match linked.attribute(&slot.binding_name) {
                Some(var) if var.components != slot.dimension => {
                    return Err(ShaderError::Interface {
                        name: name.clone(),
                        detail: format!(
                            "declared with dimension {}, shader input `{}` has {} components",
                            slot.dimension, slot.binding_name, var.components
                        ),
                    });
                }
                Some(var) => Some(var.location),
                None => {
                    log::debug!("attribute `{name}` (`{}`) is not used by the program", slot.binding_name);
                    None
                }
            };
            attributes.push((name.clone(), location));
        }

        let mut uniforms = Vec::with_capacity(self.uniforms.len());
        for (name, slot) in &self.uniforms {
            let binding = match linked.resource(&slot.binding_name) {
                Some(r) if r.kind == ResourceKind::Uniform(slot.value.ty()) => Some(r.binding),
                Some(r) => {
                    return Err(ShaderError::Interface {
                        name: name.clone(),
                        detail: format!(
                            "declared as {:?}, shader variable `{}` is {:?}",
                            slot.value.ty(),
                            slot.binding_name,
                            r.kind
                        ),
                    });
                }
                None => {
                    log::debug!("uniform `{name}` (`{}`) is not used by the program", slot.binding_name);
                    None
                }
            };
            uniforms.push((name.clone(), binding));
        }

        let mut textures = Vec::with_capacity(self.textures.len());
        for (name, slot) in &self.textures {
            let binding = match linked.resource(&slot.binding_name) {
                Some(r) if matches!(r.kind, ResourceKind::Texture(_)) => Some(r.binding),
                Some(r) => {
                    return Err(ShaderError::Interface {
                        name: name.clone(),
                        detail: format!(
                            "declared as a texture, shader variable `{}` is {:?}",
                            slot.binding_name, r.kind
                        ),
                    });
                }
                None => {
                    log::debug!("texture `{name}` (`{}`) is not used by the program", slot.binding_name);
                    None
                }
            };
            textures.push((name.clone(), binding));
        }

        Ok(Resolution {
            attributes,
            uniforms,
            textures,
        })
    }

    /// Backend program, once compiled.
    #[inline]
    pub fn program_id(&self) -> Option<ProgramId> {
        self.program
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.program.is_some()
    }

    /// Replaces an attribute's data. Does not upload or mark the slot dirty.
    pub fn set_attribute_data(&mut self, name: &str, data: &[f32], indices: Option<&[u16]>) -> Result<(), ContractError> {
        let slot = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| unknown("attribute", name))?;
        check_attribute_data(name, slot.dimension, data)?;

        slot.data.clear();
        slot.data.extend_from_slice(data);
        if let Some(indices) = indices {
            slot.indices = Some(indices.to_vec());
        }
        Ok(())
    }

    /// Forces the attribute to be re-uploaded on the next send.
    pub fn mark_dirty(&mut self, name: &str) -> Result<(), ContractError> {
        let slot = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| unknown("attribute", name))?;
        slot.dirty = true;
        Ok(())
    }

    /// Assigns flat data to a uniform; the length must match its declared type.
    pub fn set_uniform_data(&mut self, name: &str, data: &[f32]) -> Result<(), ContractError> {
        let slot = self.uniforms.get_mut(name).ok_or_else(|| unknown("uniform", name))?;
        slot.value = UniformValue::from_slice(name, slot.value.ty(), data)?;
        Ok(())
    }

    /// Assigns a typed value to a uniform; the tag must match its declared type.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> Result<(), ContractError> {
        let slot = self.uniforms.get_mut(name).ok_or_else(|| unknown("uniform", name))?;
        let value = value.into();
        if value.ty() != slot.value.ty() {
            return Err(ContractError::TypeMismatch {
                name: name.to_string(),
                expected: slot.value.ty(),
                got: value.ty(),
            });
        }
        slot.value = value;
        Ok(())
    }

    pub fn set_texture(&mut self, name: &str, texture: TextureId) -> Result<(), ContractError> {
        let slot = self.textures.get_mut(name).ok_or_else(|| unknown("texture", name))?;
        slot.texture = Some(texture);
        Ok(())
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name).map(|s| &s.value)
    }

    /// Resolved vertex input location, `None` when unresolved or not compiled.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).and_then(|s| s.location)
    }

    /// Resolved uniform binding, `None` when unresolved or not compiled.
    pub fn uniform_binding(&self, name: &str) -> Option<u32> {
        self.uniforms.get(name).and_then(|s| s.binding)
    }

    pub fn texture_binding(&self, name: &str) -> Option<u32> {
        self.textures.get(name).and_then(|s| s.binding)
    }

    /// Whether a resolved attribute carries index data for indexed draws.
    pub fn has_index_data(&self) -> bool {
        self.attributes
            .values()
            .any(|s| s.location.is_some() && s.indices.is_some())
    }

    /// Vertex buffer backing an attribute, once created.
    pub fn attribute_buffer(&self, name: &str) -> Option<BufferId> {
        self.attributes.get(name).and_then(|s| s.buffer)
    }

    /// Binds every resolved attribute, uploading its data when required.
    ///
    /// Data is uploaded when `first_render` is set, when the slot was marked dirty,
    /// or when its buffer does not exist yet. Otherwise the existing buffer is
    /// re-bound as is.
    pub fn send_attributes<B: Backend + ?Sized>(&mut self, backend: &mut B, first_render: bool) {
        for slot in self.attributes.values_mut() {
            let Some(location) = slot.location else { continue };

            let upload = first_render || slot.dirty || slot.buffer.is_none();
            let buffer = *slot
                .buffer
                .get_or_insert_with(|| backend.create_buffer(BufferUsage::Vertex));
            if upload {
                backend.buffer_data(buffer, bytemuck::cast_slice(&slot.data));
            }
            backend.bind_attribute(location, buffer, slot.dimension);

            if let Some(indices) = &slot.indices {
                let upload = upload || slot.index_buffer.is_none();
                let index_buffer = *slot
                    .index_buffer
                    .get_or_insert_with(|| backend.create_buffer(BufferUsage::Index));
                if upload {
                    backend.buffer_data(index_buffer, bytemuck::cast_slice(indices));
                }
                backend.bind_index_buffer(index_buffer);
            }

            slot.dirty = false;
        }
    }

    /// Sends every resolved uniform and binds every resolved texture that has one set.
    pub fn send_uniforms<B: Backend + ?Sized>(&self, backend: &mut B) {
        for slot in self.uniforms.values() {
            if let Some(binding) = slot.binding {
                backend.set_uniform(binding, &slot.value);
            }
        }
        for slot in self.textures.values() {
            if let (Some(binding), Some(texture)) = (slot.binding, slot.texture) {
                backend.bind_texture(binding, texture);
            }
        }
    }
}

fn unknown(kind: &'static str, name: &str) -> ContractError {
    ContractError::UnknownName {
        kind,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Command, HeadlessBackend};

    const VS: &str = r#"
@group(0) @binding(0) var<uniform> u_projection: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_eye: vec3<f32>;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) dir: vec3<f32>,
};

@vertex
fn vs_main(@location(0) a_position: vec3<f32>) -> VsOut {
    var out: VsOut;
    out.clip = u_projection * vec4<f32>(a_position - u_eye, 1.0);
    out.dir = a_position;
    return out;
}
"#;

    const FS: &str = r#"
@group(0) @binding(2) var t_env: texture_cube<f32>;
@group(0) @binding(3) var s_env: sampler;

@fragment
fn fs_main(@location(0) dir: vec3<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_env, s_env, dir);
}
"#;

    const TRIANGLE: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    fn program() -> ShaderProgram {
        ShaderProgram::builder(VS, FS)
            .indexed_attribute("position", "a_position", 3, &TRIANGLE, &[0, 1, 2])
            .attribute("uv", "a_uv", 2, &[0.0; 6])
            .uniform("projection", "u_projection", UniformType::Mat4, None)
            .uniform("eye", "u_eye", UniformType::Vec3, Some(&[0.0, 0.0, 6.0]))
            .uniform("time", "u_time", UniformType::Float, None)
            .texture("environment", "t_env")
            .build()
            .unwrap()
    }

    fn uploads(backend: &HeadlessBackend) -> usize {
        backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BufferData { .. }))
            .count()
    }

    // ── declaration ───────────────────────────────────────────────────────

    #[test]
    fn uniform_declaration_checks_arity() {
        let err = ShaderProgram::builder(VS, FS)
            .uniform("eye", "u_eye", UniformType::Vec3, Some(&[1.0, 2.0, 3.0, 4.0]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::Arity { expected: 3, got: 4, .. }));
    }

    #[test]
    fn attribute_dimension_must_be_one_to_four() {
        let err = ShaderProgram::builder(VS, FS)
            .attribute("position", "a_position", 5, &[0.0; 5])
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidDimension { dimension: 5, .. }));
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let err = ShaderProgram::builder(VS, FS)
            .texture("environment", "t_env")
            .texture("environment", "t_env")
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::DuplicateName { kind: "texture", .. }));
    }

    // ── compile ───────────────────────────────────────────────────────────

    #[test]
    fn compile_resolves_used_names_and_tolerates_unused_ones() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = program();
        p.compile(&mut backend).unwrap();

        assert!(p.is_compiled());
        assert_eq!(p.attribute_location("position"), Some(0));
        assert_eq!(p.attribute_location("uv"), None);
        assert_eq!(p.uniform_binding("projection"), Some(0));
        assert_eq!(p.uniform_binding("eye"), Some(1));
        assert_eq!(p.uniform_binding("time"), None);
        assert_eq!(p.texture_binding("environment"), Some(2));
    }

    #[test]
    fn compile_is_idempotent() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = program();
        p.compile(&mut backend).unwrap();
        let id = p.program_id();
        p.compile(&mut backend).unwrap();
        assert_eq!(p.program_id(), id);
    }

    #[test]
    fn compile_error_leaves_program_unresolved() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = ShaderProgram::builder("@vertex fn vs_main( {", FS)
            .uniform("eye", "u_eye", UniformType::Vec3, None)
            .build()
            .unwrap();
        let err = p.compile(&mut backend).unwrap_err();
        assert!(matches!(err, ShaderError::Parse { .. }));
        assert!(!p.is_compiled());
        assert_eq!(p.uniform_binding("eye"), None);
    }

    #[test]
    fn declared_type_must_match_shader_type() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = ShaderProgram::builder(VS, FS)
            .uniform("eye", "u_eye", UniformType::Vec4, None)
            .build()
            .unwrap();
        let err = p.compile(&mut backend).unwrap_err();
        assert!(matches!(err, ShaderError::Interface { .. }));
        assert!(!p.is_compiled());
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    #[test]
    fn vec3_uniform_rejects_four_elements() {
        let mut p = program();
        let err = p.set_uniform_data("eye", &[1.0, 2.0, 3.0, 4.0]).unwrap_err();
        assert_eq!(
            err,
            ContractError::Arity {
                name: "eye".into(),
                expected: 3,
                got: 4,
            }
        );
        assert_eq!(p.uniform("eye"), Some(&UniformValue::Vec3([0.0, 0.0, 6.0])));
    }

    #[test]
    fn typed_setter_checks_tag() {
        let mut p = program();
        let err = p.set_uniform("eye", 1.0_f32).unwrap_err();
        assert!(matches!(
            err,
            ContractError::TypeMismatch {
                expected: UniformType::Vec3,
                got: UniformType::Float,
                ..
            }
        ));
        p.set_uniform("eye", glam::Vec3::ONE).unwrap();
    }

    #[test]
    fn unknown_name_is_a_contract_error() {
        let mut p = program();
        assert!(matches!(
            p.set_uniform_data("missing", &[0.0]),
            Err(ContractError::UnknownName { kind: "uniform", .. })
        ));
        assert!(matches!(
            p.mark_dirty("missing"),
            Err(ContractError::UnknownName { kind: "attribute", .. })
        ));
    }

    #[test]
    fn uniforms_are_sent_every_call() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = program();
        p.compile(&mut backend).unwrap();
        backend.use_program(p.program_id());

        p.set_uniform("eye", glam::Vec3::new(1.0, 2.0, 3.0)).unwrap();
        p.send_uniforms(&mut backend);
        let env = backend.create_texture(&crate::device::TextureDesc {
            kind: crate::device::TextureKind::Cube,
            width: 1,
            height: 1,
            mipmapped: false,
        });
        p.set_texture("environment", env).unwrap();
        p.send_attributes(&mut backend, true);
        p.send_uniforms(&mut backend);
        backend
            .draw(crate::device::DrawCall {
                topology: crate::device::Topology::Triangles,
                count: 3,
                indexed: true,
            })
            .unwrap();

        let draw = &backend.draws()[0];
        assert_eq!(draw.uniforms.get(&1), Some(&UniformValue::Vec3([1.0, 2.0, 3.0])));
        assert_eq!(draw.uniforms.get(&0), Some(&UniformValue::zero(UniformType::Mat4)));
        assert_eq!(draw.textures.get(&2), Some(&env));
    }

    // ── attributes ────────────────────────────────────────────────────────

    #[test]
    fn attributes_upload_once_across_frames() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = program();
        p.compile(&mut backend).unwrap();

        p.send_attributes(&mut backend, true);
        for _ in 0..100 {
            p.send_attributes(&mut backend, false);
        }

        let buffer = p.attribute_buffer("position").unwrap();
        assert_eq!(backend.upload_count(buffer), 1);
        // Vertex data plus index data.
        assert_eq!(uploads(&backend), 2);
    }

    #[test]
    fn repeated_first_upload_leaves_contents_unchanged() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = program();
        p.compile(&mut backend).unwrap();

        p.send_attributes(&mut backend, true);
        let buffer = p.attribute_buffer("position").unwrap();
        let once = backend.buffer_contents(buffer).unwrap().to_vec();
        p.send_attributes(&mut backend, true);

        assert_eq!(p.attribute_buffer("position"), Some(buffer));
        assert_eq!(backend.buffer_contents(buffer).unwrap(), once.as_slice());
        assert_eq!(once.len(), TRIANGLE.len() * 4);
    }

    #[test]
    fn dirty_attribute_is_uploaded_again() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = program();
        p.compile(&mut backend).unwrap();
        p.send_attributes(&mut backend, true);

        let moved: Vec<f32> = TRIANGLE.iter().map(|v| v + 1.0).collect();
        p.set_attribute_data("position", &moved, None).unwrap();
        p.send_attributes(&mut backend, false);
        let buffer = p.attribute_buffer("position").unwrap();
        assert_eq!(backend.upload_count(buffer), 1);

        p.mark_dirty("position").unwrap();
        p.send_attributes(&mut backend, false);
        assert_eq!(backend.upload_count(buffer), 2);
        assert_eq!(backend.buffer_contents(buffer).unwrap(), bytemuck::cast_slice::<f32, u8>(&moved));

        p.send_attributes(&mut backend, false);
        assert_eq!(backend.upload_count(buffer), 2);
    }

    #[test]
    fn attribute_data_must_be_whole_elements() {
        let mut p = program();
        assert!(matches!(
            p.set_attribute_data("position", &[0.0; 4], None),
            Err(ContractError::Arity { expected: 3, got: 4, .. })
        ));
    }

    #[test]
    fn unresolved_attribute_is_skipped_on_send() {
        let mut backend = HeadlessBackend::new(4, 4);
        let mut p = program();
        p.compile(&mut backend).unwrap();
        p.send_attributes(&mut backend, true);
        assert_eq!(p.attribute_buffer("uv"), None);
    }
}
