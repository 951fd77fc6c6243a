//! Canvas event handling for mouse, touch and wheel input.
//!
//! Device positions are converted to drawing space before they reach the
//! board; view changes (pan, wheel zoom, pinch) stay local to [`CanvasInput`].

use crate::board::Board;
use crate::geometry::{PanGesture, PinchGesture, ViewTransform, ZoomDirection};
use crate::marks::{MarkId, SessionId, Tool};
use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hit-test radius for the select tool, in device pixels.
const SELECT_TOLERANCE_PX: f64 = 6.0;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Mouse event in device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { position: Point, button: MouseButton },
    Move { position: Point },
    Up { position: Point, button: MouseButton },
    Wheel { position: Point, delta: Vec2 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// One touch point change in device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub id: u64,
    pub phase: TouchPhase,
    pub position: Point,
}

/// Whether primary input draws or moves the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InteractionMode {
    #[default]
    Draw,
    Pan,
}

/// What an input event did.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    Ignored,
    /// An in-progress mark started or grew.
    Drawing,
    Committed(MarkId),
    Selected(Option<MarkId>),
    /// The text tool was used; the caller should prompt for text at this logical point.
    TextRequested(Point),
    ViewChanged,
}

/// Owns the view transform and in-flight gestures for one canvas.
#[derive(Debug, Clone, Default)]
pub struct CanvasInput {
    view: ViewTransform,
    viewport: Size,
    mode: InteractionMode,
    /// Mouse drag of the view and the button that started it.
    mouse_pan: Option<(PanGesture, MouseButton)>,
    touches: BTreeMap<u64, Point>,
    touch_pan: Option<PanGesture>,
    pinch: Option<PinchGesture>,
}

impl CanvasInput {
    pub fn new(viewport: Size) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Switch between drawing and panning. Abandons gestures in progress.
    pub fn set_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
        self.mouse_pan = None;
        self.touches.clear();
        self.touch_pan = None;
        self.pinch = None;
    }

    pub fn zoom_in(&mut self) {
        self.view = self.view.zoom_at(self.center(), ZoomDirection::In);
    }

    pub fn zoom_out(&mut self) {
        self.view = self.view.zoom_at(self.center(), ZoomDirection::Out);
    }

    pub fn reset_view(&mut self) {
        self.view = ViewTransform::reset();
    }

    fn center(&self) -> Point {
        Point::new(self.viewport.width / 2.0, self.viewport.height / 2.0)
    }

    /// Begin a primary action at a logical point for the given session.
    fn primary_down(&self, board: &mut Board, logical: Point, session: SessionId) -> InputOutcome {
        match board.tool() {
            Tool::Select => {
                let tolerance = SELECT_TOLERANCE_PX / self.view.scale;
                InputOutcome::Selected(board.select_at(logical, tolerance))
            }
            Tool::Text => InputOutcome::TextRequested(logical),
            _ => {
                board.start(logical, session);
                InputOutcome::Drawing
            }
        }
    }

    fn primary_move(board: &mut Board, logical: Point, session: SessionId) -> InputOutcome {
        if board.active().contains_key(&session) {
            board.add_point(logical, session);
            InputOutcome::Drawing
        } else {
            InputOutcome::Ignored
        }
    }

    fn primary_up(board: &mut Board, session: SessionId) -> InputOutcome {
        match board.end(session) {
            Some(id) => InputOutcome::Committed(id),
            None => InputOutcome::Ignored,
        }
    }

    /// Handle a mouse event.
    pub fn handle_pointer(&mut self, event: PointerEvent, board: &mut Board) -> InputOutcome {
        match event {
            PointerEvent::Down { position, button } => {
                if self.mouse_pan.is_some() {
                    return InputOutcome::Ignored;
                }
                if button == MouseButton::Middle || self.mode == InteractionMode::Pan {
                    self.mouse_pan = Some((PanGesture::begin(position, &self.view), button));
                    return InputOutcome::Ignored;
                }
                if button != MouseButton::Left {
                    return InputOutcome::Ignored;
                }
                let logical = self.view.to_logical(position);
                self.primary_down(board, logical, SessionId::Mouse)
            }
            PointerEvent::Move { position } => {
                if let Some((pan, _)) = &self.mouse_pan {
                    self.view = pan.update(position);
                    return InputOutcome::ViewChanged;
                }
                Self::primary_move(board, self.view.to_logical(position), SessionId::Mouse)
            }
            PointerEvent::Up { position, button } => {
                if let Some((pan, pan_button)) = &self.mouse_pan {
                    if *pan_button != button {
                        return InputOutcome::Ignored;
                    }
                    self.view = pan.update(position);
                    self.mouse_pan = None;
                    return InputOutcome::ViewChanged;
                }
                if button != MouseButton::Left {
                    return InputOutcome::Ignored;
                }
                Self::primary_up(board, SessionId::Mouse)
            }
            PointerEvent::Wheel { position, delta } => {
                self.view = self.view.zoom_at(position, ZoomDirection::from_wheel(delta.y));
                InputOutcome::ViewChanged
            }
        }
    }

    /// Handle a touch event.
    pub fn handle_touch(&mut self, event: TouchEvent, board: &mut Board) -> InputOutcome {
        match self.mode {
            InteractionMode::Draw => self.draw_touch(event, board),
            InteractionMode::Pan => self.pan_touch(event),
        }
    }

    fn draw_touch(&mut self, event: TouchEvent, board: &mut Board) -> InputOutcome {
        let session = SessionId::Touch(event.id);
        let logical = self.view.to_logical(event.position);
        match event.phase {
            TouchPhase::Start => self.primary_down(board, logical, session),
            TouchPhase::Move => Self::primary_move(board, logical, session),
            TouchPhase::End | TouchPhase::Cancel => Self::primary_up(board, session),
        }
    }

    fn pan_touch(&mut self, event: TouchEvent) -> InputOutcome {
        match event.phase {
            TouchPhase::Start => {
                self.touches.insert(event.id, event.position);
                self.regroup();
                InputOutcome::Ignored
            }
            TouchPhase::Move => {
                if !self.touches.contains_key(&event.id) {
                    return InputOutcome::Ignored;
                }
                self.touches.insert(event.id, event.position);
                if let (Some(pinch), Some((a, b))) = (&self.pinch, self.first_pair()) {
                    self.view = pinch.update(a, b);
                    return InputOutcome::ViewChanged;
                }
                if let Some(pan) = &self.touch_pan {
                    self.view = pan.update(event.position);
                    return InputOutcome::ViewChanged;
                }
                InputOutcome::Ignored
            }
            TouchPhase::End | TouchPhase::Cancel => {
                if self.touches.remove(&event.id).is_some() {
                    self.regroup();
                }
                InputOutcome::Ignored
            }
        }
    }

    /// Restart gestures from the current set of touches.
    fn regroup(&mut self) {
        self.pinch = None;
        self.touch_pan = None;
        match self.touches.len() {
            0 => {}
            1 => {
                if let Some(&position) = self.touches.values().next() {
                    self.touch_pan = Some(PanGesture::begin(position, &self.view));
                }
            }
            _ => {
                if let Some((a, b)) = self.first_pair() {
                    self.pinch = PinchGesture::begin(a, b, &self.view);
                }
            }
        }
    }

    fn first_pair(&self) -> Option<(Point, Point)> {
        let mut positions = self.touches.values().copied();
        Some((positions.next()?, positions.next()?))
    }
}
