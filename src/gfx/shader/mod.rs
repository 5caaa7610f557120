//! # Shader Programs
//!
//! A [`ShaderProgram`] is two compiled stages linked against the shared
//! attribute slot convention, plus a cache of resolved uniform handles.
//!
//! Failures are reported through the [`Printer`] first and then returned, and
//! nothing created along the way outlives the failure: a fragment compile error
//! destroys the vertex stage, a link error destroys the program and both stages.
//!
//! ```no_run
//! use gears::diagnostics::Printer;
//! use gears::gfx::headless::HeadlessContext;
//! use gears::gfx::shader::{sources, ShaderProgram};
//!
//! let mut ctx = HeadlessContext::new();
//! let mut printer = Printer::new();
//! let program = ShaderProgram::build(&mut ctx, &sources::FLAT, false, &mut printer)?;
//! assert!(program.uniform("u_tf").is_some());
//! program.release(&mut ctx);
//! # Ok::<(), gears::GearsError>(())
//! ```

pub mod wgsl;

use std::collections::HashMap;

use crate::{
    diagnostics::Printer,
    error::{GearsError, Result},
    gfx::context::{
        AttributeBinding, ProgramId, RenderContext, StageId, StageKind, UniformLocation,
        UniformValue,
    },
};

/// Shader sources shipped with the crate.
pub mod sources {
    use super::ProgramDesc;
    use crate::gfx::context::GEAR_ATTRIBUTES;

    /// Uniforms both gear programs declare.
    pub const GEAR_UNIFORMS: [&str; 6] = [
        "u_tf",
        "u_model",
        "u_nm",
        "u_light_pos",
        "u_ambient",
        "u_diffuse",
    ];

    pub const FLAT: ProgramDesc<'static> = ProgramDesc {
        name: "flat",
        vertex: include_str!("shaders/flat_vertex.wgsl"),
        fragment: include_str!("shaders/flat_fragment.wgsl"),
        attributes: &GEAR_ATTRIBUTES,
        uniforms: &GEAR_UNIFORMS,
    };

    pub const SMOOTH: ProgramDesc<'static> = ProgramDesc {
        name: "smooth",
        vertex: include_str!("shaders/smooth_vertex.wgsl"),
        fragment: include_str!("shaders/smooth_fragment.wgsl"),
        attributes: &GEAR_ATTRIBUTES,
        uniforms: &GEAR_UNIFORMS,
    };
}

/// Everything needed to build a program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub name: &'a str,
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub attributes: &'a [AttributeBinding<'a>],
    pub uniforms: &'a [&'a str],
}

/// Compiles one stage, reporting the outcome through `printer`.
pub fn compile_stage<C: RenderContext>(
    ctx: &mut C,
    source: &str,
    kind: StageKind,
    name: &str,
    verbose: bool,
    printer: &mut Printer,
) -> Result<StageId> {
    match ctx.compile_stage(kind, source, name) {
        Ok(compiled) => {
            if verbose && !compiled.log.is_empty() {
                let head = format!("Log occurred compiling shader '{name}': ");
                printer.print(&head, Some(&compiled.log), None);
            }
            log::debug!("compiled {kind} shader '{name}'");
            Ok(compiled.handle)
        }
        Err(log) => {
            let head = format!("Error compiling {kind} shader '{name}'.");
            let err = GearsError::ShaderCompile {
                kind,
                name: name.to_string(),
                log,
            };
            printer.print(&head, err.info_log(), Some(&err));
            Err(err)
        }
    }
}

/// A linked program with its stages and resolved uniforms.
///
/// Released by value, so a program cannot be released twice or used after
/// release.
#[derive(Debug)]
pub struct ShaderProgram {
    name: String,
    program: ProgramId,
    vertex: StageId,
    fragment: StageId,
    uniforms: HashMap<String, Option<UniformLocation>>,
}

impl ShaderProgram {
    /// Compiles both stages of `desc` and links them.
    pub fn build<C: RenderContext>(
        ctx: &mut C,
        desc: &ProgramDesc<'_>,
        verbose: bool,
        printer: &mut Printer,
    ) -> Result<Self> {
        let vertex = compile_stage(
            ctx,
            desc.vertex,
            StageKind::Vertex,
            desc.name,
            verbose,
            printer,
        )?;
        let fragment = match compile_stage(
            ctx,
            desc.fragment,
            StageKind::Fragment,
            desc.name,
            verbose,
            printer,
        ) {
            Ok(fragment) => fragment,
            Err(err) => {
                ctx.destroy_stage(vertex);
                return Err(err);
            }
        };

        Self::link(
            ctx,
            desc.name,
            vertex,
            fragment,
            desc.attributes,
            desc.uniforms,
            verbose,
            printer,
        )
    }

    /// Links two compiled stages. Takes ownership of the stages: on failure
    /// they are destroyed along with the program object.
    #[allow(clippy::too_many_arguments)]
    pub fn link<C: RenderContext>(
        ctx: &mut C,
        name: &str,
        vertex: StageId,
        fragment: StageId,
        attributes: &[AttributeBinding<'_>],
        uniform_names: &[&str],
        verbose: bool,
        printer: &mut Printer,
    ) -> Result<Self> {
        let program = ctx.create_program(name);

        match ctx.link_program(program, vertex, fragment, attributes) {
            Ok(log) => {
                if verbose && !log.is_empty() {
                    let head = format!("Log occurred linking shader '{name}':");
                    printer.print(&head, Some(&log), None);
                }
            }
            Err(log) => {
                let head = format!("Error linking shader '{name}':");
                let err = GearsError::ProgramLink {
                    name: name.to_string(),
                    log,
                };
                printer.print(&head, err.info_log(), Some(&err));

                ctx.destroy_program(program);
                ctx.destroy_stage(vertex);
                ctx.destroy_stage(fragment);
                return Err(err);
            }
        }

        let uniforms = uniform_names
            .iter()
            .map(|&uniform| (uniform.to_string(), ctx.uniform_location(program, uniform)))
            .collect();

        log::debug!("linked program '{name}'");
        Ok(Self {
            name: name.to_string(),
            program,
            vertex,
            fragment,
            uniforms,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ProgramId {
        self.program
    }

    /// Cached handle for `name`. `None` for names the program does not use or
    /// that were not requested at link time.
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied().flatten()
    }

    /// Makes this program current.
    pub fn bind<C: RenderContext>(&self, ctx: &mut C) {
        ctx.use_program(Some(self.program));
    }

    /// Writes a uniform of the current program. Inert handles are ignored.
    pub fn set_uniform<C: RenderContext>(
        &self,
        ctx: &mut C,
        location: Option<UniformLocation>,
        value: impl Into<UniformValue>,
    ) {
        if let Some(location) = location {
            ctx.set_uniform(location, value.into());
        }
    }

    /// Destroys the program and both stages.
    pub fn release<C: RenderContext>(self, ctx: &mut C) {
        ctx.destroy_program(self.program);
        ctx.destroy_stage(self.vertex);
        ctx.destroy_stage(self.fragment);
        log::debug!("released program '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::gfx::{context::GEAR_ATTRIBUTES, headless::HeadlessContext};

    fn recording_printer() -> (Printer, Rc<RefCell<Vec<String>>>) {
        let heads = Rc::new(RefCell::new(Vec::new()));
        let sink = heads.clone();
        let mut printer = Printer::new();
        printer.set_callback(Some(Box::new(move |head, _, _| {
            sink.borrow_mut().push(head.to_string());
        })));
        (printer, heads)
    }

    #[test]
    fn test_build_resolves_all_gear_uniforms() {
        let mut ctx = HeadlessContext::new();
        let mut printer = Printer::silent();

        let program = ShaderProgram::build(&mut ctx, &sources::SMOOTH, true, &mut printer).unwrap();
        for name in sources::GEAR_UNIFORMS {
            assert!(program.uniform(name).is_some(), "{name} unresolved");
        }
        assert!(program.uniform("u_not_declared").is_none());

        program.release(&mut ctx);
        assert_eq!(ctx.ledger().live_total(), 0);
    }

    #[test]
    fn test_compile_failure_releases_vertex_stage() {
        let mut ctx = HeadlessContext::new();
        let (mut printer, heads) = recording_printer();
        let desc = ProgramDesc {
            name: "broken",
            fragment: "@fragment fn fs_main( -> {}",
            ..sources::FLAT
        };

        let err = ShaderProgram::build(&mut ctx, &desc, false, &mut printer).unwrap_err();
        assert!(matches!(
            err,
            GearsError::ShaderCompile {
                kind: StageKind::Fragment,
                ..
            }
        ));
        assert_eq!(
            heads.borrow().as_slice(),
            ["Error compiling fragment shader 'broken'."]
        );
        assert_eq!(ctx.ledger().live_total(), 0);
        assert_eq!(ctx.ledger().double_releases(), 0);
    }

    #[test]
    fn test_link_failure_releases_program_and_stages() {
        let mut ctx = HeadlessContext::new();
        let (mut printer, heads) = recording_printer();
        let desc = ProgramDesc {
            name: "mismatched",
            vertex: sources::FLAT.vertex,
            fragment: sources::SMOOTH.fragment,
            ..sources::FLAT
        };

        let err = ShaderProgram::build(&mut ctx, &desc, false, &mut printer).unwrap_err();
        match &err {
            GearsError::ProgramLink { name, log } => {
                assert_eq!(name, "mismatched");
                assert!(log.contains("not written by the vertex stage"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            heads.borrow().as_slice(),
            ["Error linking shader 'mismatched':"]
        );
        assert_eq!(ctx.ledger().live_total(), 0);
        assert_eq!(ctx.ledger().programs_created(), 1);
    }

    #[test]
    fn test_verbose_compile_log_is_reported() {
        let mut ctx = HeadlessContext::new();
        ctx.set_compile_log("warning: unused binding");
        let (mut printer, heads) = recording_printer();

        let program = ShaderProgram::build(&mut ctx, &sources::FLAT, true, &mut printer).unwrap();
        assert_eq!(
            heads.borrow().as_slice(),
            [
                "Log occurred compiling shader 'flat': ",
                "Log occurred compiling shader 'flat': ",
            ]
        );
        program.release(&mut ctx);

        heads.borrow_mut().clear();
        let program = ShaderProgram::build(&mut ctx, &sources::FLAT, false, &mut printer).unwrap();
        assert!(heads.borrow().is_empty());
        program.release(&mut ctx);
    }

    #[test]
    fn test_verbose_link_log_is_reported() {
        let mut ctx = HeadlessContext::new();
        let (mut printer, heads) = recording_printer();
        let attributes = [
            GEAR_ATTRIBUTES[0],
            GEAR_ATTRIBUTES[1],
            AttributeBinding {
                slot: 2,
                name: "a_color",
            },
        ];
        let desc = ProgramDesc {
            attributes: &attributes,
            ..sources::FLAT
        };

        let program = ShaderProgram::build(&mut ctx, &desc, true, &mut printer).unwrap();
        assert_eq!(
            heads.borrow().as_slice(),
            ["Log occurred linking shader 'flat':"]
        );
        program.release(&mut ctx);

        // same build without verbose stays quiet
        heads.borrow_mut().clear();
        let program = ShaderProgram::build(&mut ctx, &desc, false, &mut printer).unwrap();
        assert!(heads.borrow().is_empty());
        program.release(&mut ctx);
    }
}
