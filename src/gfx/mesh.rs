//! Device-side gear meshes.

use crate::{
    error::Result,
    gfx::{
        context::{BufferId, BufferKind, RenderContext, NORMAL_SLOT, POSITION_SLOT},
        geometry::{generate_gear, GearSpec, SurfaceGroup},
    },
};

/// Vertex, normal and index buffers of one surface group.
#[derive(Debug)]
pub struct SurfaceBuffers {
    vertex: BufferId,
    normal: BufferId,
    index: BufferId,
    index_count: u32,
}

impl SurfaceBuffers {
    fn upload<C: RenderContext>(ctx: &mut C, group: &SurfaceGroup, label: &str) -> Result<Self> {
        let mut created = Vec::with_capacity(3);
        match Self::upload_tracked(ctx, group, label, &mut created) {
            Ok(buffers) => Ok(buffers),
            Err(err) => {
                for buffer in created {
                    ctx.destroy_buffer(buffer);
                }
                Err(err)
            }
        }
    }

    fn upload_tracked<C: RenderContext>(
        ctx: &mut C,
        group: &SurfaceGroup,
        label: &str,
        created: &mut Vec<BufferId>,
    ) -> Result<Self> {
        let vertex = ctx.create_buffer(BufferKind::Vertex, &format!("{label} positions"))?;
        created.push(vertex);
        ctx.upload_buffer(vertex, bytemuck::cast_slice(&group.vertices))?;

        let normal = ctx.create_buffer(BufferKind::Vertex, &format!("{label} normals"))?;
        created.push(normal);
        ctx.upload_buffer(normal, bytemuck::cast_slice(&group.normals))?;

        let index = ctx.create_buffer(BufferKind::Index, &format!("{label} indices"))?;
        created.push(index);
        ctx.upload_buffer(index, bytemuck::cast_slice(&group.indices))?;

        Ok(Self {
            vertex,
            normal,
            index,
            index_count: group.indices.len() as u32,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Binds the buffers to the attribute slots and issues one indexed draw.
    pub fn draw<C: RenderContext>(&self, ctx: &mut C) {
        ctx.bind_vertex_buffer(POSITION_SLOT, self.vertex);
        ctx.bind_vertex_buffer(NORMAL_SLOT, self.normal);
        ctx.bind_index_buffer(self.index);
        ctx.draw_indexed(self.index_count);
    }

    fn release<C: RenderContext>(self, ctx: &mut C) {
        ctx.destroy_buffer(self.vertex);
        ctx.destroy_buffer(self.normal);
        ctx.destroy_buffer(self.index);
    }
}

/// A generated gear uploaded to the device.
#[derive(Debug)]
pub struct GearMesh {
    pub flat: SurfaceBuffers,
    pub smooth: SurfaceBuffers,
}

impl GearMesh {
    /// Generates the geometry for `spec` and uploads both groups. Buffers
    /// created before a failure are destroyed again.
    pub fn build<C: RenderContext>(ctx: &mut C, spec: &GearSpec, label: &str) -> Result<Self> {
        let geometry = generate_gear(spec);

        let flat = SurfaceBuffers::upload(ctx, &geometry.flat, &format!("{label} flat"))?;
        let smooth = match SurfaceBuffers::upload(ctx, &geometry.smooth, &format!("{label} smooth"))
        {
            Ok(smooth) => smooth,
            Err(err) => {
                flat.release(ctx);
                return Err(err);
            }
        };

        log::debug!(
            "uploaded gear '{label}': {} flat and {} smooth triangles",
            geometry.flat.triangle_count(),
            geometry.smooth.triangle_count()
        );
        Ok(Self { flat, smooth })
    }

    pub fn release<C: RenderContext>(self, ctx: &mut C) {
        self.flat.release(ctx);
        self.smooth.release(ctx);
    }
}
