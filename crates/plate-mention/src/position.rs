use plate_core::Path;
use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportMetrics {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaretCoords {
    pub left: f64,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockBounds {
    pub top: f64,
    pub bottom: f64,
}

/// Geometry the host measures. Every query may come back empty when the
/// document is not laid out (headless hosts, detached views).
pub trait LayoutProbe {
    fn viewport(&self) -> Option<ViewportMetrics>;
    fn coords_at(&self, block: &[usize], offset: usize) -> Option<CaretCoords>;
    fn block_bounds(&self, block: &[usize]) -> Option<BlockBounds>;
}

/// Caret the menu hangs off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuAnchor {
    pub block: Path,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MenuPosition {
    pub left: f64,
    pub top: Option<f64>,
    pub bottom: Option<f64>,
    pub is_above: bool,
    pub full_width: bool,
}

impl MenuPosition {
    pub fn offscreen(layout: &LayoutConfig) -> Self {
        Self {
            left: layout.offscreen_left,
            top: Some(0.0),
            bottom: None,
            is_above: false,
            full_width: false,
        }
    }

    pub fn is_offscreen(&self, layout: &LayoutConfig) -> bool {
        *self == Self::offscreen(layout)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionResolver {
    layout: LayoutConfig,
}

impl PositionResolver {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Never fails: anything unmeasurable parks the menu off-screen.
    pub fn resolve(
        &self,
        anchor: Option<&MenuAnchor>,
        menu_height: f64,
        probe: Option<&dyn LayoutProbe>,
    ) -> MenuPosition {
        let offscreen = MenuPosition::offscreen(&self.layout);
        let (Some(anchor), Some(probe)) = (anchor, probe) else {
            return offscreen;
        };
        let Some(viewport) = probe.viewport() else {
            return offscreen;
        };
        let Some(block) = probe.block_bounds(&anchor.block) else {
            return offscreen;
        };

        if viewport.width < self.layout.narrow_width {
            return MenuPosition {
                left: 0.0,
                top: None,
                bottom: Some(viewport.height - block.top + self.layout.narrow_offset),
                is_above: true,
                full_width: true,
            };
        }

        let Some(caret) = probe.coords_at(&anchor.block, anchor.offset) else {
            return offscreen;
        };
        let left = self.clamp_left(caret.left + viewport.scroll_x, &viewport);

        if caret.top - menu_height > self.layout.margin {
            MenuPosition {
                left,
                top: None,
                bottom: Some(viewport.height - block.top - viewport.scroll_y),
                is_above: false,
                full_width: false,
            }
        } else {
            MenuPosition {
                left,
                top: Some(block.bottom + viewport.scroll_y),
                bottom: None,
                is_above: true,
                full_width: false,
            }
        }
    }

    fn clamp_left(&self, left: f64, viewport: &ViewportMetrics) -> f64 {
        if !self.layout.clamp_to_viewport {
            return left;
        }
        let max = viewport.scroll_x + (viewport.width - self.layout.menu_width).max(0.0);
        left.clamp(viewport.scroll_x, max)
    }
}
