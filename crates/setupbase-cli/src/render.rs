use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use setupbase_core::{ComponentStyle, InstalledComponent};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    if std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "step" => "[..]",
        "warn" => "[WARN]",
        "error" => "[ERR]",
        _ => "[--]",
    }
}

pub fn print_status(style: OutputStyle, status: &str, message: &str) {
    println!("{}", render_status_line(style, status, message));
}

pub fn print_error(style: OutputStyle, message: &str) {
    eprintln!("{}", render_status_line(style, "error", message));
}

pub fn render_component_line(
    style: OutputStyle,
    component: &InstalledComponent,
    virtual_style: ComponentStyle,
) -> String {
    let line = if component.is_virtual {
        format!("component: {} {} (virtual)", component.name, component.version)
    } else {
        format!("component: {} {}", component.name, component.version)
    };
    match style {
        OutputStyle::Rich if component.is_virtual && virtual_style == ComponentStyle::Italic => {
            colorize(virtual_component_style(), &line)
        }
        _ => line,
    }
}

fn virtual_component_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlack.into()))
        .effects(Effects::ITALIC)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// Step counter for the headless controller; only draws a bar in rich mode.
pub struct OperationProgress {
    progress_bar: Option<ProgressBar>,
}

impl OperationProgress {
    pub fn start(style: OutputStyle, label: &str, total: u64) -> Self {
        let progress_bar = if style == OutputStyle::Rich && total > 0 {
            let progress_bar = ProgressBar::new(total);
            if let Ok(bar_style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<10} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {elapsed_precise}",
            ) {
                progress_bar.set_style(bar_style.progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };
        Self { progress_bar }
    }

    pub fn advance(&self) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.inc(1);
        }
    }

    pub fn finish(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}
