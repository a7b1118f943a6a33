use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_TRIGGER: char = '@';
pub const DEFAULT_LOOKBACK: usize = 50;
pub const DEFAULT_SEPARATOR: char = '\u{a0}';

/// Geometry constants for placing the suggestion menu. All values are CSS
/// pixels in the host's coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Viewports narrower than this get a full-width menu docked above the block.
    pub narrow_width: f64,
    /// Minimum room above the caret before the menu flips below it.
    pub margin: f64,
    pub narrow_offset: f64,
    /// `left` of the parked, off-screen menu.
    pub offscreen_left: f64,
    pub clamp_to_viewport: bool,
    /// Assumed menu width when clamping.
    pub menu_width: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            narrow_width: 479.0,
            margin: 24.0,
            narrow_offset: 10.0,
            offscreen_left: -1000.0,
            clamp_to_viewport: false,
            menu_width: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionConfig {
    pub trigger: char,
    pub allow_spaces: bool,
    pub lookback: usize,
    pub separator: char,
    pub query_class: String,
    pub current_element_class: String,
    pub layout: LayoutConfig,
}

impl Default for MentionConfig {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER,
            allow_spaces: true,
            lookback: DEFAULT_LOOKBACK,
            separator: DEFAULT_SEPARATOR,
            query_class: "mention-query".to_string(),
            current_element_class: "current-element".to_string(),
            layout: LayoutConfig::default(),
        }
    }
}

impl MentionConfig {
    /// Parses and validates a JSON config. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger.is_whitespace()
            || self.trigger == '\0'
            || self.trigger == plate_core::LEAF_SENTINEL
        {
            return Err(ConfigError::InvalidTrigger(self.trigger));
        }
        if self.separator == self.trigger {
            return Err(ConfigError::SeparatorIsTrigger);
        }
        if self.lookback == 0 {
            return Err(ConfigError::ZeroLookback);
        }
        if self.query_class.is_empty() {
            return Err(ConfigError::EmptyClass("query_class"));
        }
        if self.current_element_class.is_empty() {
            return Err(ConfigError::EmptyClass("current_element_class"));
        }
        if self.layout.narrow_width.is_nan() || self.layout.narrow_width <= 0.0 {
            return Err(ConfigError::InvalidNarrowWidth(self.layout.narrow_width));
        }
        Ok(())
    }
}
