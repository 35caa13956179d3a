// (c) 2025 qfs contributors
//! CLI output styling

#[allow(clippy::enum_glob_use)]
use anstyle::AnsiColor::*;
use anstyle::Color::Ansi;
use clap::builder::styling::Styles;
use std::io::IsTerminal as _;

/// Error message styling
const _ERROR: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Red)));

/// Warning message styling
const _WARNING: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Yellow)));

/// Informational message styling
const _INFO: anstyle::Style = anstyle::Style::new().fg_color(Some(Ansi(Cyan)));

const _HEADER: anstyle::Style = anstyle::Style::new()
    .underline()
    .fg_color(Some(Ansi(Yellow)));

pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(_HEADER)
    .header(_HEADER)
    .literal(anstyle::Style::new().bold())
    .invalid(_WARNING)
    .error(_ERROR)
    .valid(_INFO.bold().underline())
    .placeholder(_INFO);

/// Should output to stderr be coloured?
///
/// Honours the `NO_COLOR` and `CLICOLOR_FORCE` conventions; see <https://bixense.com/clicolors/>.
pub(crate) fn use_colours() -> bool {
    let set = |v: &str| std::env::var(v).is_ok_and(|s| !s.is_empty());
    if set("NO_COLOR") {
        false
    } else if set("CLICOLOR_FORCE") {
        true
    } else {
        std::io::stderr().is_terminal()
    }
}

/// Error styling, if colours are in use
pub(crate) fn error() -> anstyle::Style {
    if use_colours() {
        _ERROR
    } else {
        anstyle::Style::new()
    }
}
