#![allow(clippy::module_name_repetitions)]
//! Color mode configuration and ANSI painting helpers.
//!
//! Logging helpers policy (stderr one-liners):
//! - Apply only to stderr single-line messages meant for the operator.
//! - Use log_info_stderr for info, log_warn_stderr for warnings/notes,
//!   and log_error_stderr for errors/refusals.
//! - Precompute once per scope and reuse:
//!     let use_err = fleet_coder::color_enabled_stderr();
//! - Diagnostics that belong in per-unit log files go through `tracing`, not here.
//! - stdout printing goes through `out_line` so fleet runs can mute it.

use std::sync::atomic::{AtomicBool, Ordering};

use clap::ValueEnum;
use once_cell::sync::OnceCell;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

static COLOR_MODE: OnceCell<ColorMode> = OnceCell::new();
static STDOUT_MUTED: AtomicBool = AtomicBool::new(false);

pub fn set_color_mode(mode: ColorMode) {
    let _ = COLOR_MODE.set(mode);
}

fn parse_color_mode(s: &str) -> Option<ColorMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ColorMode::Auto),
        "always" | "on" | "true" | "yes" => Some(ColorMode::Always),
        "never" | "off" | "false" | "no" => Some(ColorMode::Never),
        _ => None,
    }
}

fn env_color_mode_pref() -> Option<ColorMode> {
    std::env::var("FLEET_CODER_COLOR")
        .ok()
        .and_then(|v| parse_color_mode(&v))
}

fn no_color_env() -> bool {
    // Per https://no-color.org/
    std::env::var("NO_COLOR").is_ok()
}

fn color_enabled_for(is_tty: bool) -> bool {
    // 1) Respect NO_COLOR first: disables color unconditionally
    if no_color_env() {
        return false;
    }
    // 2) Programmatic override via set_color_mode (CLI flags)
    // 3) Environment preference when CLI didn't override
    let mode = COLOR_MODE.get().copied().or_else(env_color_mode_pref);
    match mode {
        Some(ColorMode::Always) => true,
        Some(ColorMode::Never) => false,
        Some(ColorMode::Auto) | None => is_tty,
    }
}

pub fn color_enabled_stderr() -> bool {
    color_enabled_for(atty::is(atty::Stream::Stderr))
}

/// Wrap string with ANSI color code when enabled; otherwise return unchanged.
pub fn paint(enabled: bool, code: &str, s: &str) -> String {
    if enabled {
        format!("{code}{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

pub fn log_info_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, "\x1b[36;1m", msg));
}

pub fn log_warn_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, "\x1b[33m", msg));
}

pub fn log_error_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, "\x1b[31;1m", msg));
}

/// Mute or unmute stdout lines printed through `out_line`. Returns the previous state.
pub fn set_stdout_muted(muted: bool) -> bool {
    STDOUT_MUTED.swap(muted, Ordering::SeqCst)
}

pub fn stdout_muted() -> bool {
    STDOUT_MUTED.load(Ordering::SeqCst)
}

/// Print a line to stdout unless a multi-repository fleet run muted it.
pub fn out_line(msg: &str) {
    if !stdout_muted() {
        println!("{msg}");
    }
}

/// Restores the previous stdout mute state on drop.
pub struct StdoutMute {
    previous: bool,
}

impl StdoutMute {
    pub fn engage(muted: bool) -> Self {
        Self {
            previous: set_stdout_muted(muted),
        }
    }
}

impl Drop for StdoutMute {
    fn drop(&mut self) {
        set_stdout_muted(self.previous);
    }
}
