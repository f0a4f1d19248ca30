use egui::{Align2, Color32, FontId, Sense, Vec2};

use crate::ar::{ArPhase, ArRenderer, ArSession};
use crate::views::ViewContext;

/// The AR view of one building.
pub struct ArView {
    session: ArSession,
    renderer: ArRenderer,
    size: Option<Vec2>,
}

impl ArView {
    /// Shows a started session.
    pub fn new(session: ArSession) -> Self {
        Self {
            session,
            renderer: ArRenderer::default(),
            size: None,
        }
    }

    /// The session shown.
    pub fn session(&self) -> &ArSession {
        &self.session
    }

    /// Mutable access to the session shown.
    pub fn session_mut(&mut self) -> &mut ArSession {
        &mut self.session
    }

    /// Draws the back button and the scene.
    pub fn ui(&mut self, ui: &mut egui::Ui, cx: &mut ViewContext<'_>) {
        ui.horizontal(|ui| {
            if ui.button("← Back to Map").clicked() {
                cx.router.navigate("#");
            }
            ui.label(self.session.record().display_name());
        });

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::drag());

        if self.size != Some(rect.size()) {
            self.size = Some(rect.size());
            self.session.resize(rect.width(), rect.height());
        }

        if response.dragged() {
            let delta = response.drag_delta();
            self.session.pointer_drag(delta.x, delta.y);
        }

        self.session.frame();
        self.renderer.paint(ui, rect, &mut self.session);

        let status = match self.session.phase() {
            ArPhase::AwaitingFirstFix => Some("Waiting for GPS location..."),
            ArPhase::ModelPlaced if self.session.is_loading() => Some("Loading model..."),
            ArPhase::ModelPlaced => None,
        };
        if let Some(status) = status {
            ui.painter_at(rect).text(
                rect.center_bottom() - egui::vec2(0.0, 24.0),
                Align2::CENTER_BOTTOM,
                status,
                FontId::proportional(16.0),
                Color32::WHITE,
            );
        }

        // Sensors and GPS are polled every frame.
        ui.ctx().request_repaint();
    }
}
