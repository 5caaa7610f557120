//! WGSL stage compiler and program linker
//!
//! Stages are parsed and validated with naga. Linking checks what a driver
//! would check when joining two stages: the vertex inputs against the bound
//! attribute slots, the vertex outputs against the fragment inputs, and the
//! uniform block declared by either stage. The resulting [`ProgramLayout`]
//! maps uniform names to offsets inside the block.

use std::collections::HashMap;

use naga::{
    valid::{Capabilities, ValidationFlags, Validator},
    AddressSpace, Binding, Handle, Module, ScalarKind, Type, TypeInner, VectorSize,
};

use crate::gfx::context::{AttributeBinding, StageKind, UniformKind, UniformLocation};

/// A validated single-entry-point stage.
#[derive(Debug)]
pub struct StageModule {
    pub kind: StageKind,
    pub entry_point: String,
    module: Module,
}

/// Compiles `source` as a stage of the given kind. `Err` is the compiler log.
pub fn compile(kind: StageKind, source: &str) -> Result<StageModule, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let stage = naga_stage(kind);
    let entry_point = {
        let mut entries = module.entry_points.iter().filter(|ep| ep.stage == stage);
        let entry = entries
            .next()
            .ok_or_else(|| format!("error: no @{kind} entry point in module"))?;
        if entries.next().is_some() {
            return Err(format!(
                "error: more than one @{kind} entry point in module"
            ));
        }
        entry.name.clone()
    };

    Ok(StageModule {
        kind,
        entry_point,
        module,
    })
}

fn naga_stage(kind: StageKind) -> naga::ShaderStage {
    match kind {
        StageKind::Vertex => naga::ShaderStage::Vertex,
        StageKind::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Location of the single uniform block shared by both stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBlockLayout {
    pub group: u32,
    pub binding: u32,
    pub size: u32,
}

/// Result of a successful link.
#[derive(Debug, Clone)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub block: Option<UniformBlockLayout>,
    pub uniforms: HashMap<String, UniformLocation>,
    /// Vertex buffer slots in ascending order; each slot feeds the shader
    /// location of the same number.
    pub slots: Vec<u32>,
}

impl ProgramLayout {
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    pub fn block_size(&self) -> usize {
        self.block.map_or(0, |b| b.size as usize)
    }
}

#[derive(Debug, Clone)]
struct InterfaceVar {
    name: String,
    location: u32,
    shape: Option<(u8, ScalarKind)>,
}

#[derive(Debug, Clone)]
struct UniformBlock {
    layout: UniformBlockLayout,
    members: Vec<(String, UniformLocation)>,
}

/// Links two stages. `Ok` carries the layout and a warning log (possibly
/// empty), `Err` the link log.
pub fn link(
    vertex: &StageModule,
    fragment: &StageModule,
    attributes: &[AttributeBinding<'_>],
) -> Result<(ProgramLayout, String), String> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if vertex.kind != StageKind::Vertex {
        errors.push(format!("error: {} stage attached as vertex stage", vertex.kind));
    }
    if fragment.kind != StageKind::Fragment {
        errors.push(format!(
            "error: {} stage attached as fragment stage",
            fragment.kind
        ));
    }
    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    let inputs = vertex.inputs();
    for attribute in attributes {
        match inputs.iter().find(|input| input.name == attribute.name) {
            Some(input) if input.location != attribute.slot => errors.push(format!(
                "error: attribute '{}' is declared at location {} but bound to slot {}",
                attribute.name, input.location, attribute.slot
            )),
            Some(_) => {}
            None => warnings.push(format!(
                "warning: attribute '{}' is not used by the vertex stage",
                attribute.name
            )),
        }
    }
    for input in &inputs {
        if !attributes.iter().any(|a| a.slot == input.location) {
            errors.push(format!(
                "error: vertex input '{}' at location {} has no attribute binding",
                input.name, input.location
            ));
        }
    }

    let outputs = vertex.outputs();
    for input in fragment.inputs() {
        match outputs.iter().find(|output| output.location == input.location) {
            None => errors.push(format!(
                "error: fragment input '{}' at location {} is not written by the vertex stage",
                input.name, input.location
            )),
            Some(output) if output.shape != input.shape => errors.push(format!(
                "error: fragment input '{}' at location {} does not match vertex output '{}'",
                input.name, input.location, output.name
            )),
            Some(_) => {}
        }
    }

    let block = match merge_blocks(vertex.uniform_blocks(), fragment.uniform_blocks()) {
        Ok(block) => block,
        Err(mut block_errors) => {
            errors.append(&mut block_errors);
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    let mut slots: Vec<u32> = attributes.iter().map(|a| a.slot).collect();
    slots.sort_unstable();
    slots.dedup();

    let (block, uniforms) = match block {
        Some(block) => (Some(block.layout), block.members.into_iter().collect()),
        None => (None, HashMap::new()),
    };

    let layout = ProgramLayout {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        block,
        uniforms,
        slots,
    };
    Ok((layout, warnings.join("\n")))
}

fn merge_blocks(
    vertex: Vec<UniformBlock>,
    fragment: Vec<UniformBlock>,
) -> Result<Option<UniformBlock>, Vec<String>> {
    let mut errors = Vec::new();
    let mut merged: Option<UniformBlock> = None;

    for block in vertex.into_iter().chain(fragment) {
        if block.layout.group != 0 || block.layout.binding != 0 {
            errors.push(format!(
                "error: uniform block at @group({}) @binding({}); only @group(0) @binding(0) is supported",
                block.layout.group, block.layout.binding
            ));
            continue;
        }
        let Some(existing) = merged.as_mut() else {
            merged = Some(block);
            continue;
        };
        if existing.layout.size != block.layout.size {
            errors.push(format!(
                "error: uniform block size differs between stages ({} vs {} bytes)",
                existing.layout.size, block.layout.size
            ));
        }
        for (name, location) in block.members {
            match existing.members.iter().find(|(n, _)| *n == name) {
                Some((_, other)) if *other != location => errors.push(format!(
                    "error: uniform '{name}' has a different layout in each stage"
                )),
                Some(_) => {}
                None => existing.members.push((name, location)),
            }
        }
    }

    if errors.is_empty() {
        Ok(merged)
    } else {
        Err(errors)
    }
}

impl StageModule {
    fn entry(&self) -> &naga::EntryPoint {
        // `compile` guarantees exactly one matching entry point
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.name == self.entry_point)
            .unwrap_or(&self.module.entry_points[0])
    }

    fn inputs(&self) -> Vec<InterfaceVar> {
        let mut vars = Vec::new();
        for argument in &self.entry().function.arguments {
            collect_io(
                &self.module,
                argument.name.as_deref(),
                argument.ty,
                argument.binding.as_ref(),
                &mut vars,
            );
        }
        vars
    }

    fn outputs(&self) -> Vec<InterfaceVar> {
        let mut vars = Vec::new();
        if let Some(result) = &self.entry().function.result {
            collect_io(&self.module, None, result.ty, result.binding.as_ref(), &mut vars);
        }
        vars
    }

    fn uniform_blocks(&self) -> Vec<UniformBlock> {
        let mut blocks = Vec::new();
        for (_, var) in self.module.global_variables.iter() {
            if var.space != AddressSpace::Uniform {
                continue;
            }
            let Some(binding) = &var.binding else {
                continue;
            };

            let inner = &self.module.types[var.ty].inner;
            let (size, members) = match inner {
                TypeInner::Struct { members, span } => {
                    let members: Vec<(String, UniformLocation)> = members
                        .iter()
                        .filter_map(|member| {
                            let name = member.name.clone()?;
                            let kind = uniform_kind(&self.module.types[member.ty].inner)?;
                            Some((
                                name,
                                UniformLocation {
                                    offset: member.offset,
                                    kind,
                                },
                            ))
                        })
                        .collect();
                    (*span, members)
                }
                other => match (uniform_kind(other), var.name.clone()) {
                    (Some(kind), Some(name)) => (
                        kind.size().next_multiple_of(16) as u32,
                        vec![(name, UniformLocation { offset: 0, kind })],
                    ),
                    _ => continue,
                },
            };

            blocks.push(UniformBlock {
                layout: UniformBlockLayout {
                    group: binding.group,
                    binding: binding.binding,
                    size,
                },
                members,
            });
        }
        blocks
    }
}

fn collect_io(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<InterfaceVar>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::Location { location, .. }) => out.push(InterfaceVar {
            name: name.unwrap_or("<unnamed>").to_string(),
            location: *location,
            shape: io_shape(inner),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for member in members {
                    collect_io(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn io_shape(inner: &TypeInner) -> Option<(u8, ScalarKind)> {
    match *inner {
        TypeInner::Scalar(scalar) => Some((1, scalar.kind)),
        TypeInner::Vector { size, scalar } => Some((size as u8, scalar.kind)),
        _ => None,
    }
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match *inner {
        TypeInner::Scalar(scalar) if scalar.kind == ScalarKind::Float => Some(UniformKind::Float),
        TypeInner::Vector {
            size: VectorSize::Tri,
            ..
        } => Some(UniformKind::Vec3),
        TypeInner::Vector {
            size: VectorSize::Quad,
            ..
        } => Some(UniformKind::Vec4),
        TypeInner::Matrix {
            columns: VectorSize::Tri,
            rows: VectorSize::Tri,
            ..
        } => Some(UniformKind::Mat3),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            ..
        } => Some(UniformKind::Mat4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::context::GEAR_ATTRIBUTES;
    use crate::gfx::shader::sources;

    fn stage(kind: StageKind, source: &str) -> StageModule {
        compile(kind, source).unwrap()
    }

    #[test]
    fn test_builtin_programs_link() {
        for program in [sources::FLAT, sources::SMOOTH] {
            let vs = stage(StageKind::Vertex, program.vertex);
            let fs = stage(StageKind::Fragment, program.fragment);
            let (layout, log) = link(&vs, &fs, &GEAR_ATTRIBUTES).unwrap();

            assert!(log.is_empty(), "{}: {log}", program.name);
            assert_eq!(layout.slots, vec![0, 1]);
            assert_eq!(layout.block_size(), 224);
            assert_eq!(
                layout.uniform("u_tf"),
                Some(UniformLocation {
                    offset: 0,
                    kind: UniformKind::Mat4
                })
            );
            assert_eq!(
                layout.uniform("u_nm"),
                Some(UniformLocation {
                    offset: 128,
                    kind: UniformKind::Mat3
                })
            );
            assert_eq!(layout.uniform("u_diffuse").map(|u| u.offset), Some(208));
            assert!(layout.uniform("u_missing").is_none());
        }
    }

    #[test]
    fn test_syntax_error_reports_log() {
        let log = compile(StageKind::Vertex, "fn vs_main( {").unwrap_err();
        assert!(!log.is_empty());
    }

    #[test]
    fn test_wrong_stage_kind_is_rejected() {
        let log = compile(StageKind::Vertex, sources::FLAT.fragment).unwrap_err();
        assert!(log.contains("no @vertex entry point"));
    }

    #[test]
    fn test_misbound_attribute_fails_link() {
        let vs = stage(StageKind::Vertex, sources::FLAT.vertex);
        let fs = stage(StageKind::Fragment, sources::FLAT.fragment);
        let swapped = [
            AttributeBinding {
                slot: 1,
                name: "a_pos",
            },
            AttributeBinding {
                slot: 0,
                name: "a_normal",
            },
        ];
        let log = link(&vs, &fs, &swapped).unwrap_err();
        assert!(log.contains("'a_pos' is declared at location 0 but bound to slot 1"));
    }

    #[test]
    fn test_interface_mismatch_fails_link() {
        // smooth fragment reads two varyings, flat vertex writes one
        let vs = stage(StageKind::Vertex, sources::FLAT.vertex);
        let fs = stage(StageKind::Fragment, sources::SMOOTH.fragment);
        let log = link(&vs, &fs, &GEAR_ATTRIBUTES).unwrap_err();
        assert!(log.contains("location 1 is not written"));
    }

    #[test]
    fn test_unused_attribute_is_a_warning() {
        let vs = stage(StageKind::Vertex, sources::FLAT.vertex);
        let fs = stage(StageKind::Fragment, sources::FLAT.fragment);
        let mut attributes = GEAR_ATTRIBUTES.to_vec();
        attributes.push(AttributeBinding {
            slot: 2,
            name: "a_texcoord",
        });
        let (_, log) = link(&vs, &fs, &attributes).unwrap();
        assert!(log.contains("'a_texcoord' is not used"));
    }
}
