//! Short-lived messages shown on top of every view.

use std::time::{Duration, Instant};

use egui::{Align2, Color32, Context};
use log::{info, warn};

/// How long a notice stays on screen.
const NOTICE_LIFETIME: Duration = Duration::from_secs(6);

/// Severity of a notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Something happened.
    Info,
    /// Something failed but the application carries on.
    Warning,
    /// Something the user asked for failed.
    Error,
}

/// A message for the user.
#[derive(Clone, Debug)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text.
    pub text: String,
    expires: Instant,
}

/// The queue of notices currently on screen.
#[derive(Debug, Default)]
pub struct Notices {
    notices: Vec<Notice>,
}

impl Notices {
    /// Shows `text` and logs it.
    pub fn push(&mut self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            NoticeLevel::Info => info!("{}", text),
            NoticeLevel::Warning | NoticeLevel::Error => warn!("{}", text),
        }
        self.notices.push(Notice {
            level,
            text,
            expires: Instant::now() + NOTICE_LIFETIME,
        });
    }

    /// Shows an informational notice.
    pub fn info(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Info, text);
    }

    /// Shows an error notice.
    pub fn error(&mut self, text: impl Into<String>) {
        self.push(NoticeLevel::Error, text);
    }

    /// The notices that have not expired yet.
    pub fn active(&self) -> impl Iterator<Item = &Notice> {
        let now = Instant::now();
        self.notices.iter().filter(move |n| n.expires > now)
    }

    /// Drops expired notices.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.notices.retain(|n| n.expires > now);
    }

    /// Draws the notices at the top of the screen.
    pub fn show(&mut self, ctx: &Context) {
        self.prune();
        if self.notices.is_empty() {
            return;
        }

        egui::Area::new(egui::Id::new("notices"))
            .anchor(Align2::CENTER_TOP, egui::vec2(0.0, 12.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                for notice in &self.notices {
                    let fill = match notice.level {
                        NoticeLevel::Info => Color32::from_rgb(33, 100, 170),
                        NoticeLevel::Warning => Color32::from_rgb(190, 120, 20),
                        NoticeLevel::Error => Color32::from_rgb(180, 40, 40),
                    };
                    egui::Frame::NONE
                        .fill(fill)
                        .corner_radius(4.0)
                        .inner_margin(egui::Margin::symmetric(10, 6))
                        .show(ui, |ui| {
                            ui.colored_label(Color32::WHITE, &notice.text);
                        });
                    ui.add_space(4.0);
                }
            });

        // Repaint when the next notice expires.
        if let Some(next) = self.notices.iter().map(|n| n.expires).min() {
            ctx.request_repaint_after(next.saturating_duration_since(Instant::now()));
        }
    }
}
