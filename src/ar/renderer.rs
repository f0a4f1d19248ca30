//! Draws the AR scene with the egui painter.
//!
//! Anchored models are drawn as their bounding boxes, flat shaded with the scene lights and
//! painted back to front over the camera feed.

use egui::{Color32, Pos2, Rect, Shape, Stroke, TextureHandle, TextureOptions, Ui};
use nalgebra::Point3;

use crate::ar::camera::{AmbientLight, DirectionalLight, PerspectiveCamera};
use crate::ar::model::Model;
use crate::ar::session::ArSession;

const BACKGROUND: Color32 = Color32::from_gray(128);
const MODEL_COLOR: [f32; 3] = [0.80, 0.78, 0.72];

/// Corner indices of the six box faces, see [`crate::ar::model::Aabb::corners`].
const FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

/// A face ready to paint.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedFace {
    /// Outline in screen coordinates.
    pub points: Vec<Pos2>,
    /// Shaded color.
    pub color: Color32,
    /// Distance from the camera, larger is further away.
    pub depth: f64,
}

/// Projects and shades the visible faces of `objects`, furthest first.
pub fn project_faces(
    camera: &PerspectiveCamera,
    ambient: &AmbientLight,
    sun: &DirectionalLight,
    objects: &[Model],
    rect: Rect,
) -> Vec<ProjectedFace> {
    let to_light = sun.to_light();
    let mut faces = Vec::new();

    for model in objects {
        let corners = model.world_corners();
        let center = corners.iter().fold(Point3::origin(), |acc, c| acc + c.coords / 8.0);

        for face in FACES {
            let face_center = face
                .iter()
                .fold(Point3::origin(), |acc, &i| acc + corners[i].coords / 4.0);
            let normal = face_center - center;
            if normal.norm_squared() == 0.0 {
                continue;
            }
            let normal = normal.normalize();

            // Faces turned away from the camera are hidden by the rest of the box.
            if normal.dot(&(camera.position - face_center)) <= 0.0 {
                continue;
            }

            let Some(points) = face
                .iter()
                .map(|&i| camera.project(&corners[i]).map(|ndc| ndc_to_screen(&ndc, rect)))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };

            let light = ambient.intensity + sun.intensity * normal.dot(&to_light).max(0.0) as f32;
            faces.push(ProjectedFace {
                points,
                color: shade(light),
                depth: (face_center - camera.position).norm(),
            });
        }
    }

    faces.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    faces
}

fn ndc_to_screen(ndc: &Point3<f64>, rect: Rect) -> Pos2 {
    Pos2::new(
        rect.center().x + ndc.x as f32 * rect.width() / 2.0,
        rect.center().y - ndc.y as f32 * rect.height() / 2.0,
    )
}

fn shade(light: f32) -> Color32 {
    let [r, g, b] = MODEL_COLOR.map(|c| ((c * light).min(1.0) * 255.0) as u8);
    Color32::from_rgb(r, g, b)
}

/// Paints sessions into a [`Ui`], keeping the camera feed texture between frames.
#[derive(Default)]
pub struct ArRenderer {
    background: Option<TextureHandle>,
}

impl ArRenderer {
    /// Paints `session` into `rect`.
    pub fn paint(&mut self, ui: &Ui, rect: Rect, session: &mut ArSession) {
        if let Some(frame) = session.camera_frame() {
            match &mut self.background {
                Some(texture) => texture.set(frame, TextureOptions::LINEAR),
                None => {
                    self.background = Some(ui.ctx().load_texture(
                        "ar_camera_feed",
                        frame,
                        TextureOptions::LINEAR,
                    ))
                }
            }
        }

        let painter = ui.painter_at(rect);
        match &self.background {
            Some(texture) => {
                painter.image(
                    texture.id(),
                    rect,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            None => {
                painter.rect_filled(rect, 0.0, BACKGROUND);
            }
        }

        let faces = project_faces(
            session.camera(),
            session.ambient(),
            session.sun(),
            session.objects(),
            rect,
        );
        for face in faces {
            painter.add(Shape::convex_polygon(
                face.points,
                face.color,
                Stroke::new(1.0, Color32::from_black_alpha(60)),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ar::model::parse_gltf;
    use crate::ar::model::tests::BOX_GLTF;

    fn scene() -> (PerspectiveCamera, AmbientLight, DirectionalLight) {
        let camera = PerspectiveCamera::new(80.0, 1.0, 0.001, 1000.0);
        let ambient = AmbientLight { intensity: 0.5 };
        let sun = DirectionalLight {
            position: Point3::new(0.0, 5.0, 10.0),
            target: Point3::origin(),
            intensity: 2.0,
        };
        (camera, ambient, sun)
    }

    fn rect() -> Rect {
        Rect::from_min_max(Pos2::ZERO, Pos2::new(800.0, 800.0))
    }

    #[test]
    fn models_ahead_are_painted_back_to_front() {
        let (camera, ambient, sun) = scene();
        let mut near = parse_gltf(BOX_GLTF.as_bytes(), "a.gltf").unwrap();
        near.position = Point3::new(0.0, -2.8, -60.0);
        let mut far = near.clone();
        far.position.z = -120.0;

        let faces = project_faces(&camera, &ambient, &sun, &[near, far], rect());

        // The camera is level with each box and in front of its south face, the only one turned
        // towards it.
        assert_eq!(faces.len(), 2);
        assert!(faces[0].depth > faces[1].depth);
        assert!(faces.iter().all(|f| f.points.len() == 4));
        assert!(
            faces
                .iter()
                .flat_map(|f| &f.points)
                .any(|p| rect().contains(*p))
        );
    }

    #[test]
    fn model_behind_is_not_drawn() {
        let (camera, ambient, sun) = scene();
        let mut model = parse_gltf(BOX_GLTF.as_bytes(), "a.gltf").unwrap();
        model.position = Point3::new(0.0, -2.8, 60.0);

        assert!(project_faces(&camera, &ambient, &sun, &[model], rect()).is_empty());
    }

    #[test]
    fn lit_faces_are_brighter() {
        assert!(shade(0.5).r() < shade(1.0).r());
        assert_eq!(shade(10.0), shade(1.0));
    }

    #[test]
    fn ndc_center_is_rect_center() {
        let p = ndc_to_screen(&Point3::new(0.0, 0.0, 0.5), rect());
        assert_eq!(p, Pos2::new(400.0, 400.0));
        let p = ndc_to_screen(&Point3::new(1.0, 1.0, 0.5), rect());
        assert_eq!(p, Pos2::new(800.0, 0.0));
    }
}
