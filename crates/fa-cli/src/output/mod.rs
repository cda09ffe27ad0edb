//! Output formatting utilities for the CLI

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

use fa_core::SetupResult;

fn print_marked(out: &mut impl Write, color: Color, mark: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(mark),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message with a green checkmark
pub fn print_success(msg: &str) {
    print_marked(&mut std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message with a red X
pub fn print_error(msg: &str) {
    print_marked(&mut std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message with a yellow warning sign
pub fn print_warning(msg: &str) {
    print_marked(&mut std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an info message with a cyan info icon
pub fn print_info(msg: &str) {
    print_marked(&mut std::io::stdout(), Color::Cyan, "ℹ ", msg);
}

/// Human-readable summary of `forwagent init`
pub fn format_setup(result: &SetupResult) -> String {
    let mut lines = vec![format!("Configuration directory: {}", result.config_dir.display())];

    if result.generated_identity {
        lines.push(format!("  created {}", result.paths.key.display()));
        lines.push(format!("  created {}", result.paths.cert.display()));
    } else {
        lines.push(format!("  kept existing {}", result.paths.cert.display()));
    }
    if result.created_trust_bundle {
        lines.push(format!("  created {} (empty)", result.paths.trusted.display()));
    }
    lines.push(format!("Certificate fingerprint: {}", result.fingerprint));
    lines.join("\n")
}
