//! Inkboard Core Library
//!
//! Platform-agnostic whiteboard state for Inkboard: marks, multi-session
//! stroke capture, undo/redo, pan/zoom transforms, import/export, board
//! storage and debounced persistence.

pub mod board;
pub mod capture;
pub mod config;
pub mod geometry;
pub mod history;
pub mod input;
pub mod marks;
pub mod session;
pub mod storage;
pub mod sync;
pub mod tools;
pub mod transfer;

pub use board::{Board, BoardChange, BoardEvent, SubscriptionId};
pub use capture::CaptureEngine;
pub use config::{ClientConfig, ConfigError};
pub use geometry::{PanGesture, PinchGesture, ViewTransform, ZoomDirection};
pub use history::History;
pub use input::{CanvasInput, InputOutcome, InteractionMode, MouseButton, PointerEvent, TouchEvent, TouchPhase};
pub use marks::{Mark, MarkId, SessionId, ShapeKind, Tool};
pub use session::{BoardSession, LoadState};
pub use storage::{BoardDocument, BoardStore, DraftStore, HttpBoardStore, MemoryBoardStore, StorageError, StorageResult};
pub use sync::{AutoSaver, SaveRequest, SaveStatus, SyncEvent, SyncWorker};
pub use tools::{ToolSettings, WidthPreset};
pub use transfer::{ImportReport, TransferError, export_json, import_json};
