// ============================================================================
// INPUT ROUTER: pointer events to draw / erase / fill operations
// ============================================================================

use crate::canvas::{Point, RasterSurface};
use crate::components::colors::{BACKGROUND, HexColor};

pub const MIN_BRUSH_WIDTH: f32 = 1.0;
pub const MAX_BRUSH_WIDTH: f32 = 40.0;
pub const DEFAULT_BRUSH_WIDTH: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolMode {
    #[default]
    Draw,
    Erase,
    Fill,
}

impl ToolMode {
    pub fn name(self) -> &'static str {
        match self {
            ToolMode::Draw => "draw",
            ToolMode::Erase => "erase",
            ToolMode::Fill => "fill",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "draw" | "pencil" | "brush" => Some(ToolMode::Draw),
            "erase" | "eraser" => Some(ToolMode::Erase),
            "fill" | "bucket" => Some(ToolMode::Fill),
            _ => None,
        }
    }
}

/// Where the canvas is shown on screen. Pointer positions arrive in this
/// space and are scaled into buffer pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// A viewport showing the buffer 1:1 at the origin.
    pub fn identity(buffer_w: u32, buffer_h: u32) -> Self {
        Self::new(0.0, 0.0, buffer_w as f32, buffer_h as f32)
    }

    /// Convert a display position to integer buffer coordinates.
    /// Results may lie outside the buffer; drawing clips them.
    pub fn to_buffer(&self, x: f32, y: f32, buffer_w: u32, buffer_h: u32) -> (i64, i64) {
        let scale_x = if self.width > 0.0 { buffer_w as f32 / self.width } else { 1.0 };
        let scale_y = if self.height > 0.0 { buffer_h as f32 / self.height } else { 1.0 };
        (
            ((x - self.left) * scale_x).floor() as i64,
            ((y - self.top) * scale_y).floor() as i64,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    Leave,
}

/// What a pointer event did to the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterOutcome {
    /// Nothing happened.
    Ignored,
    /// A stroke path was opened; no pixels changed yet.
    StrokeStarted,
    /// A live segment was painted while the stroke continues.
    Painted,
    /// An edit finished: the caller records a snapshot and schedules synthesis.
    Committed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum StrokeState {
    Idle,
    Drawing { last: Point },
}

/// Tool selection plus the idle/drawing gesture state machine.
pub struct InputRouter {
    tool: ToolMode,
    active_color: HexColor,
    brush_width: f32,
    viewport: Viewport,
    state: StrokeState,
}

impl InputRouter {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            tool: ToolMode::Draw,
            active_color: HexColor::BLACK,
            brush_width: DEFAULT_BRUSH_WIDTH,
            viewport,
            state: StrokeState::Idle,
        }
    }

    pub fn tool(&self) -> ToolMode {
        self.tool
    }

    pub fn set_tool(&mut self, tool: ToolMode) {
        self.tool = tool;
    }

    pub fn active_color(&self) -> HexColor {
        self.active_color
    }

    pub fn set_active_color(&mut self, color: HexColor) {
        self.active_color = color;
    }

    pub fn brush_width(&self) -> f32 {
        self.brush_width
    }

    pub fn set_brush_width(&mut self, width: f32) {
        if width.is_finite() {
            self.brush_width = width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH);
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, StrokeState::Drawing { .. })
    }

    pub fn handle<S: RasterSurface>(&mut self, event: PointerEvent, surface: &mut S) -> RouterOutcome {
        match event {
            PointerEvent::Down { x, y } => self.pointer_down(x, y, surface),
            PointerEvent::Move { x, y } => self.pointer_move(x, y, surface),
            PointerEvent::Up | PointerEvent::Leave => self.pointer_up(),
        }
    }

    pub fn pointer_down<S: RasterSurface>(&mut self, x: f32, y: f32, surface: &mut S) -> RouterOutcome {
        let (bx, by) = self.viewport.to_buffer(x, y, surface.width(), surface.height());

        match self.tool {
            ToolMode::Fill => {
                if surface.flood_fill(bx, by, self.active_color.to_rgba()) > 0 {
                    RouterOutcome::Committed
                } else {
                    RouterOutcome::Ignored
                }
            }
            ToolMode::Draw | ToolMode::Erase => {
                self.state = StrokeState::Drawing {
                    last: Point::new(bx as f32, by as f32),
                };
                RouterOutcome::StrokeStarted
            }
        }
    }

    pub fn pointer_move<S: RasterSurface>(&mut self, x: f32, y: f32, surface: &mut S) -> RouterOutcome {
        let StrokeState::Drawing { last } = self.state else {
            return RouterOutcome::Ignored;
        };

        let (bx, by) = self.viewport.to_buffer(x, y, surface.width(), surface.height());
        let here = Point::new(bx as f32, by as f32);
        // Erase paints the background without touching the active color
        let color = match self.tool {
            ToolMode::Erase => BACKGROUND,
            _ => self.active_color.to_rgba(),
        };
        surface.draw_segment(last, here, color, self.brush_width);
        self.state = StrokeState::Drawing { last: here };
        RouterOutcome::Painted
    }

    /// Pointer released or left the surface.
    pub fn pointer_up(&mut self) -> RouterOutcome {
        match self.state {
            StrokeState::Drawing { .. } => {
                self.state = StrokeState::Idle;
                RouterOutcome::Committed
            }
            StrokeState::Idle => RouterOutcome::Ignored,
        }
    }
}
