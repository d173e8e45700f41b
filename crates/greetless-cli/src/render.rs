use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub struct Renderer {
    style: OutputStyle,
}

impl Renderer {
    pub fn new(force_plain: bool) -> Self {
        let style = if force_plain || !std::io::stdout().is_terminal() {
            OutputStyle::Plain
        } else {
            OutputStyle::Rich
        };
        Self { style }
    }

    pub fn section(self, title: &str) {
        println!();
        let line = format!("== {title} ==");
        match self.style {
            OutputStyle::Plain => println!("{line}"),
            OutputStyle::Rich => println!("{}", colorize(section_style(), &line)),
        }
    }

    pub fn status(self, message: &str) {
        match self.style {
            OutputStyle::Plain => println!("ok: {message}"),
            OutputStyle::Rich => {
                println!("{} {message}", colorize(ok_style(), "ok"))
            }
        }
    }

    pub fn warn(self, message: &str) {
        match self.style {
            OutputStyle::Plain => eprintln!("warning: {message}"),
            OutputStyle::Rich => {
                eprintln!("{} {message}", colorize(warn_style(), "warning"))
            }
        }
    }

    pub fn note(self, message: &str) {
        println!("  {message}");
    }

    /// Run `f` behind a spinner. The spinner exists for the bounded waits
    /// on the service manager; plain mode just runs the closure.
    pub fn with_spinner<T>(self, label: &str, f: impl FnOnce() -> T) -> T {
        if self.style == OutputStyle::Plain {
            return f();
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(label.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        let result = f();
        spinner.finish_and_clear();
        result
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn ok_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Green.into()))
        .effects(Effects::BOLD)
}

fn warn_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Yellow.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
