use std::time::Duration;

use egui::Context;
use eframe::egui::{self, *};

use crate::history::HistoryRow;
use crate::presenter::{self, PendingResponse, PendingState, Presenter, PresenterListener};
use crate::sanitize::{clear_skill_label, extract_skill_name};

/// The emulator window. Every piece of UI state lives here and is only
/// touched from the UI thread.
pub struct ClaiEmulator {
    presenter:        Box<dyn Presenter>,
    skills:           Vec<String>,
    skills_enabled:   bool,
    selected_skill:   String,
    server_running:   bool,
    rows:             Vec<HistoryRow>,
    input:            String,
    pending:          Option<PendingResponse>,
    status:           String,
    quit_prompt_open: bool,
    allow_close:      bool,
}

impl ClaiEmulator {
    pub fn new(cc: &eframe::CreationContext, presenter: Box<dyn Presenter>) -> Self {
        let mut style = (*cc.egui_ctx.style()).clone();
        style.visuals.window_rounding                  = Rounding::same(8.0);
        style.visuals.widgets.noninteractive.rounding = Rounding::same(4.0);
        style.visuals.widgets.inactive.rounding       = Rounding::same(4.0);
        style.visuals.widgets.hovered.rounding        = Rounding::same(4.0);
        style.visuals.widgets.active.rounding         = Rounding::same(4.0);
        cc.egui_ctx.set_style(style);
        Self::with_presenter(presenter)
    }

    pub fn with_presenter(presenter: Box<dyn Presenter>) -> Self {
        Self {
            server_running: presenter.server_running(),
            presenter,
            skills: Vec::new(),
            skills_enabled: false,
            selected_skill: String::new(),
            rows: Vec::new(),
            input: String::new(),
            pending: None,
            status: "Server stopped".into(),
            quit_prompt_open: false,
            allow_close: false,
        }
    }

    fn poll_presenter(&mut self) {
        while let Some(event) = self.presenter.try_next_event() {
            presenter::dispatch(self, event);
        }
    }

    fn poll_pending(&mut self) {
        let Some(pending) = &self.pending else { return };
        let PendingState::Resolved(result) = pending.poll() else { return };
        self.pending = None;
        match result {
            Ok(pair) => {
                self.status = format!("Command #{} done", pair.command_id);
                self.rows.push(HistoryRow::new(pair));
            }
            Err(e) => self.status = e,
        }
    }

    fn toggle_server(&mut self) {
        if self.presenter.server_running() || self.presenter.server_starting() {
            self.presenter.stop_server();
        } else {
            self.status = "Starting server...".into();
            self.presenter.run_server();
        }
    }

    fn on_skill_selected(&mut self, label: String) {
        log::info!("new skill {label}");
        let (name, installed) = extract_skill_name(&label);
        self.selected_skill = label;
        self.presenter.select_skill(&name, installed);
    }

    fn submit(&mut self) {
        if self.pending.is_some() { return; }
        if self.input.trim().is_empty() { return; }
        let command = self.input.clone();
        self.status = format!("Sending #{} `{command}`...", self.presenter.command_id());
        self.pending = Some(self.presenter.send_message(&command));
        self.input.clear();
    }

    fn cancel_pending(&mut self) {
        if let Some(p) = self.pending.take() {
            self.status = format!("Cancelled `{}`", p.command);
        }
    }

    fn confirm_quit(&mut self) {
        self.quit_prompt_open = false;
        self.allow_close = true;
        self.presenter.stop_server();
    }

    fn draw_run_button(&mut self, ui: &mut Ui) {
        let (rect, resp) = ui.allocate_exact_size(vec2(28.0, 28.0), Sense::click());
        let visuals = ui.style().interact(&resp);
        let painter = ui.painter_at(rect);
        painter.rect(rect.shrink(1.0), 4.0, visuals.bg_fill, visuals.bg_stroke);
        let c = rect.center();
        if self.server_running {
            painter.rect_filled(Rect::from_center_size(c, vec2(11.0, 11.0)), 1.5, Color32::from_rgb(220, 80, 80));
        } else {
            let pts = vec![c + vec2(-5.0, -7.0), c + vec2(7.0, 0.0), c + vec2(-5.0, 7.0)];
            painter.add(Shape::convex_polygon(pts, Color32::from_rgb(90, 190, 110), Stroke::NONE));
        }
        let resp = resp.on_hover_text(if self.server_running { "Stop server" } else { "Run server" });
        if resp.clicked() { self.toggle_server(); }
    }

    fn draw_toolbar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            self.draw_run_button(ui);
            ui.add_space(4.0);
            ui.label("Skills");

            let mut picked = None;
            let active = self.presenter.current_active_skill().unwrap_or_else(|| "none".into());
            ui.add_enabled_ui(self.skills_enabled, |ui| {
                egui::ComboBox::from_id_source("skills_selector")
                    .selected_text(self.selected_skill.as_str())
                    .width(260.0)
                    .show_ui(ui, |ui| {
                        for name in &self.skills {
                            if ui.selectable_label(*name == self.selected_skill, name.as_str()).clicked() {
                                picked = Some(name.clone());
                            }
                        }
                    })
                    .response
                    .on_hover_text(format!("Active skill: {active}"));
            });
            if let Some(label) = picked { self.on_skill_selected(label); }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                ui.label(RichText::new(&self.status).color(Color32::from_gray(160)).size(12.0));
            });
        });
    }

    fn draw_command_bar(&mut self, ui: &mut Ui) {
        let mut send = false;
        let mut cancel = false;
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            send = ui.add_enabled(self.pending.is_none(), egui::Button::new("Send")).clicked();
            if self.pending.is_some() {
                cancel = ui.small_button("Cancel").clicked();
                ui.spinner();
            }
            let edit = ui.add(
                TextEdit::singleline(&mut self.input)
                    .hint_text("Type a command or ask in plain English")
                    .desired_width(ui.available_width()),
            );
            if edit.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter)) {
                send = true;
                edit.request_focus();
            }
        });
        if cancel { self.cancel_pending(); }
        if send { self.submit(); }
    }

    fn draw_history(&self, ui: &mut Ui) {
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for row in &self.rows {
                    row.show(ui);
                    ui.add_space(2.0);
                }
            });
    }

    fn draw_quit_prompt(&mut self, ctx: &Context) {
        if !self.quit_prompt_open { return; }
        let mut ok = false;
        let mut cancel = false;
        egui::Window::new("Quit")
            .collapsible(false).resizable(false).anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                ui.label("Do you want to quit?");
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("OK").clicked() { ok = true; }
                    if ui.button("Cancel").clicked() { cancel = true; }
                });
            });
        if ok {
            self.confirm_quit();
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        } else if cancel {
            self.quit_prompt_open = false;
        }
    }
}

impl PresenterListener for ClaiEmulator {
    fn on_skills_ready(&mut self, skills: Vec<String>) {
        self.skills_enabled = true;
        self.skills.clear();
        // first and last rows are the listing's header and footer
        let entries = if skills.len() > 2 { &skills[1..skills.len() - 1] } else { &[][..] };
        for raw in entries {
            let (name, active) = clear_skill_label(raw);
            if active {
                self.presenter.set_current_active_skill(extract_skill_name(&name).0);
                self.selected_skill = name.clone();
            }
            self.skills.push(name);
        }
    }

    fn on_server_running(&mut self) {
        self.server_running = true;
        self.status = "Server running".into();
    }

    fn on_server_stopped(&mut self) {
        self.server_running = false;
        self.status = "Server stopped".into();
    }

    fn on_presenter_error(&mut self, message: String) {
        self.status = message;
    }
}

impl eframe::App for ClaiEmulator {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(Duration::from_millis(100));
        self.poll_presenter();
        self.poll_pending();

        if ctx.input(|i| i.viewport().close_requested()) && !self.allow_close {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.quit_prompt_open = true;
        }
        if ctx.input(|i| i.modifiers.command && i.key_pressed(Key::Q)) {
            self.quit_prompt_open = true;
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.add_space(2.0);
            self.draw_toolbar(ui);
            ui.add_space(2.0);
        });
        egui::TopBottomPanel::bottom("command_bar").show(ctx, |ui| {
            ui.add_space(3.0);
            self.draw_command_bar(ui);
            ui.add_space(3.0);
        });
        egui::CentralPanel::default().show(ctx, |ui| self.draw_history(ui));

        self.draw_quit_prompt(ctx);
    }
}
