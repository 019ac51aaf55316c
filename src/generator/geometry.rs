//! Geometry stage: point/line expansion, wireframe, stereo layering.

use serde::Serialize;

use super::{render, report_unrecognized};
use crate::errors::Result;
use crate::state::PrimitiveType;
use crate::uid::GeometryUidData;

#[derive(Serialize)]
struct Emit {
    vertex: u8,
    /// `vec4` clip-space offset added to the input vertex.
    offset: &'static str,
}

#[derive(Serialize)]
struct GeometryContext {
    stage: &'static str,
    primitive: &'static str,
    input_layout: &'static str,
    output_layout: &'static str,
    max_vertices: usize,
    num_texgens: u8,
    stereo: bool,
    emits: Vec<Emit>,
}

const fn emit(vertex: u8, offset: &'static str) -> Emit {
    Emit { vertex, offset }
}

fn triangle_emits(wireframe: bool) -> Vec<Emit> {
    let mut emits = vec![
        emit(0, "vec4(0.0)"),
        emit(1, "vec4(0.0)"),
        emit(2, "vec4(0.0)"),
    ];
    if wireframe {
        emits.push(emit(0, "vec4(0.0)"));
    }
    emits
}

fn line_emits(wireframe: bool) -> Vec<Emit> {
    if wireframe {
        vec![
            emit(0, "line_offset"),
            emit(0, "-line_offset"),
            emit(1, "-line_offset"),
            emit(1, "line_offset"),
            emit(0, "line_offset"),
        ]
    } else {
        vec![
            emit(0, "line_offset"),
            emit(0, "-line_offset"),
            emit(1, "line_offset"),
            emit(1, "-line_offset"),
        ]
    }
}

fn point_emits(wireframe: bool) -> Vec<Emit> {
    const BOTTOM_LEFT: &str = "vec4(-point_extent.x, -point_extent.y, 0.0, 0.0)";
    const BOTTOM_RIGHT: &str = "vec4(point_extent.x, -point_extent.y, 0.0, 0.0)";
    const TOP_LEFT: &str = "vec4(-point_extent.x, point_extent.y, 0.0, 0.0)";
    const TOP_RIGHT: &str = "vec4(point_extent.x, point_extent.y, 0.0, 0.0)";

    if wireframe {
        vec![
            emit(0, BOTTOM_LEFT),
            emit(0, BOTTOM_RIGHT),
            emit(0, TOP_RIGHT),
            emit(0, TOP_LEFT),
            emit(0, BOTTOM_LEFT),
        ]
    } else {
        vec![
            emit(0, BOTTOM_LEFT),
            emit(0, BOTTOM_RIGHT),
            emit(0, TOP_LEFT),
            emit(0, TOP_RIGHT),
        ]
    }
}

/// Generates the geometry-stage source.
///
/// Points and lines are expanded to screen-aligned quads, wireframe emits a
/// closed line strip, and stereo replays the primitive into two layers. An
/// unrecognized primitive selector is logged and treated as triangles.
pub fn generate_geometry_source(uid: &GeometryUidData) -> Result<String> {
    let primitive = PrimitiveType::from_raw(uid.primitive).unwrap_or_else(|| {
        report_unrecognized("primitive type", u32::from(uid.primitive));
        PrimitiveType::Triangles
    });

    let (name, input_layout, emits) = match primitive {
        PrimitiveType::Points => ("points", "points", point_emits(uid.wireframe)),
        PrimitiveType::Lines => ("lines", "lines", line_emits(uid.wireframe)),
        PrimitiveType::Triangles => ("triangles", "triangles", triangle_emits(uid.wireframe)),
    };

    let layers = if uid.stereo { 2 } else { 1 };

    let ctx = GeometryContext {
        stage: "geometry",
        primitive: name,
        input_layout,
        output_layout: if uid.wireframe {
            "line_strip"
        } else {
            "triangle_strip"
        },
        max_vertices: emits.len() * layers,
        num_texgens: uid.num_texgens,
        stereo: uid.stereo,
        emits,
    };

    render("geometry", &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(primitive: PrimitiveType) -> GeometryUidData {
        GeometryUidData {
            primitive: primitive.raw(),
            ..GeometryUidData::default()
        }
    }

    #[test]
    fn test_layouts() {
        let source = generate_geometry_source(&uid(PrimitiveType::Lines)).unwrap();
        assert!(source.contains("layout(lines) in;"));
        assert!(source.contains("layout(triangle_strip, max_vertices = 4) out;"));

        let stereo_wire = generate_geometry_source(&GeometryUidData {
            stereo: true,
            wireframe: true,
            ..uid(PrimitiveType::Triangles)
        })
        .unwrap();
        assert!(stereo_wire.contains("layout(line_strip, max_vertices = 8) out;"));
        assert!(stereo_wire.contains("gl_Layer = eye;"));
    }

    #[test]
    fn test_unrecognized_primitive_falls_back_to_triangles() {
        let unknown = generate_geometry_source(&GeometryUidData {
            primitive: 7,
            stereo: true,
            ..GeometryUidData::default()
        })
        .unwrap();
        let triangles = generate_geometry_source(&GeometryUidData {
            stereo: true,
            ..uid(PrimitiveType::Triangles)
        })
        .unwrap();
        assert_eq!(unknown, triangles);
    }

    #[test]
    fn test_texgens_are_passed_through() {
        let source = generate_geometry_source(&GeometryUidData {
            num_texgens: 2,
            ..uid(PrimitiveType::Points)
        })
        .unwrap();
        assert!(source.contains("vec3 tex[2];"));
        assert!(source.contains("gs_out.tex[t] = gs_in[i].tex[t];"));
    }
}
