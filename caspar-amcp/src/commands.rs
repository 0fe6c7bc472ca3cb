//! AMCP command builders
//!
//! Every builder returns the command body only. Bodies must go through
//! [`format_command`] before they hit the socket.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Line terminator required by AMCP
pub const TERMINATOR: &str = "\r\n";

pub const DEFAULT_CHANNEL: u32 = 1;
pub const DEFAULT_LAYER: u32 = 1;
pub const DEFAULT_TEMPLATE: &str = "main/MAIN";

/// Text shown in front of the time on the lower third
pub const CLOCK_LABEL: &str = "BBC NEWS";

/// Channel/layer pair the overlay template is loaded into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Target {
    pub channel: u32,
    pub layer: u32,
    pub template: String,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL,
            layer: DEFAULT_LAYER,
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// High-level intents the session can put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddTemplate,
    UpdateClock { time: String },
    Overlay { visible: bool },
}

impl Command {
    /// Build the command body for `target`
    pub fn render(&self, target: &Target) -> String {
        match self {
            Command::AddTemplate => {
                add_template_command(target.channel, target.layer, &target.template)
            }
            Command::UpdateClock { time } => {
                update_clock_command(time, target.channel, target.layer)
            }
            Command::Overlay { visible } => {
                toggle_overlay_command(*visible, target.channel, target.layer)
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&Target::default()))
    }
}

pub fn format_command(body: &str) -> String {
    format!("{body}{TERMINATOR}")
}

pub fn add_template_command(channel: u32, layer: u32, template: &str) -> String {
    format!("CG {channel} ADD {layer} {template} 1")
}

pub fn update_clock_command(time: &str, channel: u32, layer: u32) -> String {
    format!("CG {channel} INVOKE {layer} \"leftTab('on', '{CLOCK_LABEL} {time}')\"")
}

/// Show/hide through `leftTab('on'|'off')`.
///
/// The template also exposes bare `show()`/`hide()` in some revisions; only the
/// `leftTab` form is emitted so one engine template works for every command.
pub fn toggle_overlay_command(visible: bool, channel: u32, layer: u32) -> String {
    let state = if visible { "on" } else { "off" };
    format!("CG {channel} INVOKE {layer} \"leftTab('{state}')\"")
}
