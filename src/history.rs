use chrono::{DateTime, Local};
use eframe::egui::{self, *};

use crate::protocol::ResponsePair;
use crate::sanitize::remove_non_bmp;

/// One collapsible entry of the command history.
#[derive(Clone, Debug)]
pub struct HistoryRow {
    pub pair:        ResponsePair,
    pub received_at: DateTime<Local>,
}
impl HistoryRow {
    pub fn new(pair: ResponsePair) -> Self {
        Self { pair, received_at: Local::now() }
    }

    pub fn title(&self) -> String {
        let r = &self.pair.response;
        if r.suggested_command.is_empty() {
            format!("{} (executed origin)", r.origin_command)
        } else {
            r.suggested_command.clone()
        }
    }
    pub fn original_line(&self) -> String { format!("Original: {}", self.pair.response.origin_command) }
    pub fn id_line(&self) -> String { format!("Id: {}", self.pair.command_id) }
    pub fn description_line(&self) -> String {
        format!("Description: {}", remove_non_bmp(self.pair.response.description.as_deref()))
    }
    pub fn confidence_line(&self) -> String {
        format!("Confidence:{} Force: {}", self.pair.response.confidence, self.pair.response.execute)
    }
    pub fn post_description_line(&self) -> String {
        format!("Description: {}", remove_non_bmp(self.pair.post.description.as_deref()))
    }
    pub fn post_confidence_line(&self) -> String { format!("Confidence:{}", self.pair.post.confidence) }

    pub fn show(&self, ui: &mut Ui) {
        egui::Frame::group(ui.style()).inner_margin(Margin::symmetric(6.0, 4.0)).show(ui, |ui| {
            ui.set_width(ui.available_width());
            let header = egui::CollapsingHeader::new(RichText::new(self.title()).monospace().strong())
                .id_source(("history_row", self.pair.command_id))
                .default_open(false)
                .show(ui, |ui| {
                    split_line(ui, self.original_line(), self.id_line());
                    split_line(ui, self.description_line(), self.confidence_line());
                    ui.label(RichText::new("Post execution:").italics());
                    split_line(ui, self.post_description_line(), self.post_confidence_line());
                });
            header.header_response.on_hover_text(self.received_at.format("%H:%M:%S").to_string());
        });
    }
}

fn split_line(ui: &mut Ui, left: String, right: String) {
    ui.horizontal(|ui| {
        ui.add_space(10.0);
        ui.label(left);
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            ui.add_space(10.0);
            ui.label(RichText::new(right).color(Color32::from_gray(170)));
        });
    });
}
