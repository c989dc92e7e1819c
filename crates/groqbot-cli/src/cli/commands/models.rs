//! Models command handler.

use std::fmt::Write as _;

use groqbot_core::config::Config;
use groqbot_core::models::{DEFAULT_MODEL, MODELS};

pub fn list(config: &Config) {
    print!("{}", render(&config.model));
}

/// One line per catalog entry; `*` marks the configured model.
fn render(configured: &str) -> String {
    let mut out = String::new();
    for model in MODELS {
        let marker = if model.id == configured { '*' } else { ' ' };
        let default = if model.id == DEFAULT_MODEL {
            " (default)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{marker} {:<24} {:<14} {}{default}",
            model.id, model.label, model.description
        );
    }
    if MODELS.iter().all(|m| m.id != configured) {
        let _ = writeln!(out, "* {configured:<24} (not in catalog)");
    }
    out
}
