use egui::RichText;

use crate::views::ViewContext;

/// Shown for unknown routes and when the catalog could not be loaded.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotFoundView;

impl NotFoundView {
    /// Draws the page. The link goes back to the map.
    pub fn ui(&mut self, ui: &mut egui::Ui, cx: &mut ViewContext<'_>) {
        ui.vertical_centered(|ui| {
            ui.add_space(32.0);
            ui.heading(RichText::new("404 - Page Not Found").strong());
            ui.add_space(8.0);
            if ui.link("Back to Home").clicked() {
                cx.router.navigate("#");
            }
        });
    }
}
