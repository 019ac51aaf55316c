//! Vertex stage: attribute fetch, lighting, texture coordinate generation.

use serde::Serialize;

use super::{render, report_unrecognized};
use crate::errors::Result;
use crate::state::VertexComponents;
use crate::uid::VertexUidData;

#[derive(Serialize)]
struct Attribute {
    location: u32,
    ty: &'static str,
    name: String,
}

#[derive(Serialize)]
struct TexGen {
    index: u8,
    /// `vec3` expression the texture matrix is applied to.
    source: String,
}

#[derive(Serialize)]
struct VertexContext {
    stage: &'static str,
    inputs: Vec<Attribute>,
    color_source: &'static str,
    specular_source: Option<&'static str>,
    normal_source: &'static str,
    lighting: bool,
    num_texgens: u8,
    texgens: Vec<TexGen>,
}

/// Generates the vertex-stage source.
///
/// A position is always consumed. Missing colors default to opaque white,
/// a missing normal to `+Z`, and a texgen without a matching texcoord set
/// generates from the object-space position. A texgen count above 8 is
/// logged and clamped to 8.
pub fn generate_vertex_source(uid: &VertexUidData) -> Result<String> {
    let comps = uid.components;

    let mut inputs = vec![Attribute {
        location: 0,
        ty: "vec3",
        name: "a_position".into(),
    }];
    if comps.contains(VertexComponents::NORMAL) {
        inputs.push(Attribute {
            location: 1,
            ty: "vec3",
            name: "a_normal".into(),
        });
    }
    if comps.contains(VertexComponents::COLOR0) {
        inputs.push(Attribute {
            location: 2,
            ty: "vec4",
            name: "a_color0".into(),
        });
    }
    if comps.contains(VertexComponents::COLOR1) {
        inputs.push(Attribute {
            location: 3,
            ty: "vec4",
            name: "a_color1".into(),
        });
    }
    for index in 0..VertexComponents::MAX_TEXCOORDS {
        if comps.has_texcoord(index) {
            inputs.push(Attribute {
                location: 4 + u32::from(index),
                ty: "vec2",
                name: format!("a_texcoord{index}"),
            });
        }
    }

    let num_texgens = if uid.num_texgens > VertexComponents::MAX_TEXCOORDS {
        report_unrecognized("texgen count", u32::from(uid.num_texgens));
        VertexComponents::MAX_TEXCOORDS
    } else {
        uid.num_texgens
    };

    let texgens = (0..num_texgens)
        .map(|index| TexGen {
            index,
            source: if comps.has_texcoord(index) {
                format!("vec3(a_texcoord{index}, 1.0)")
            } else {
                "a_position".into()
            },
        })
        .collect();

    let ctx = VertexContext {
        stage: "vertex",
        inputs,
        color_source: if comps.contains(VertexComponents::COLOR0) {
            "a_color0"
        } else {
            "vec4(1.0)"
        },
        specular_source: comps
            .contains(VertexComponents::COLOR1)
            .then_some("a_color1"),
        normal_source: if comps.contains(VertexComponents::NORMAL) {
            "a_normal"
        } else {
            "vec3(0.0, 0.0, 1.0)"
        },
        lighting: uid.lighting,
        num_texgens,
        texgens,
    };

    render("vertex", &ctx)
}
