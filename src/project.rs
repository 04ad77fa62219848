// ============================================================================
// SKETCH SESSION: one live canvas with its history, palette and pipelines
// ============================================================================

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::canvas::{CANVAS_SIZE, CanvasState, RasterSurface};
use crate::components::colors::HexColor;
use crate::components::history::HistoryStack;
use crate::components::palette::{Brush, BrushPalette, PaletteError};
use crate::components::tools::{InputRouter, PointerEvent, RouterOutcome, ToolMode, Viewport};
use crate::io::{ExportError, export_png};
use crate::ops::ai::{
    BrushSuggester, ImageSynthesizer, ServiceError, SynthesisRequest, compose_instruction,
    parse_suggestions,
};
use crate::ops::trigger::Debouncer;
use crate::settings::SketchSettings;

/// How many per-request synthesis outcomes are remembered.
const STATUS_MEMORY: usize = 16;

/// Terminal (or pending) state of one synthesis request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SynthesisStatus {
    InFlight,
    /// The response became the displayed result.
    Displayed,
    /// Finished after a later request had already completed; not shown.
    Stale,
    Failed(String),
}

enum ServiceReply {
    Synthesis {
        seq: u64,
        result: Result<Vec<u8>, ServiceError>,
    },
    Suggestions {
        seq: u64,
        result: Result<String, ServiceError>,
    },
}

/// Run a service call, turning a panic inside it into an error.
fn guarded<T>(call: impl FnOnce() -> Result<T, ServiceError>) -> Result<T, ServiceError> {
    catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|_| Err(ServiceError::Unavailable("service panicked".to_string())))
}

/// A single semantic sketch: the front end feeds it pointer events, prompt
/// edits and clock ticks; it talks to the two external services.
pub struct SketchSession {
    pub id: Uuid,
    settings: SketchSettings,
    canvas: CanvasState,
    history: HistoryStack,
    palette: BrushPalette,
    router: InputRouter,
    prompt: String,

    synthesis_timer: Debouncer,
    suggestion_timer: Debouncer,
    suggester: Arc<dyn BrushSuggester>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    reply_sender: mpsc::Sender<ServiceReply>,
    reply_receiver: mpsc::Receiver<ServiceReply>,

    synthesis_seq: u64,
    synthesis_in_flight: usize,
    completed_seq: u64,
    result: Option<Vec<u8>>,
    statuses: VecDeque<(u64, SynthesisStatus)>,
    last_error: Option<String>,

    suggestion_seq: u64,
    suggestions_in_flight: usize,
    applied_suggestion_seq: u64,
}

impl SketchSession {
    pub fn new(
        settings: SketchSettings,
        suggester: Arc<dyn BrushSuggester>,
        synthesizer: Arc<dyn ImageSynthesizer>,
    ) -> Self {
        let canvas = CanvasState::new(CANVAS_SIZE, CANVAS_SIZE);
        let history = HistoryStack::new(canvas.snapshot());
        let mut router = InputRouter::new(Viewport::identity(CANVAS_SIZE, CANVAS_SIZE));
        router.set_brush_width(settings.brush_width);
        let (reply_sender, reply_receiver) = mpsc::channel();

        let id = Uuid::new_v4();
        log::info!("Sketch session {} started ({}x{})", id, CANVAS_SIZE, CANVAS_SIZE);

        Self {
            id,
            prompt: settings.default_prompt.clone(),
            synthesis_timer: Debouncer::new(settings.synthesis_delay()),
            suggestion_timer: Debouncer::new(settings.suggestion_delay()),
            settings,
            canvas,
            history,
            palette: BrushPalette::new(),
            router,
            suggester,
            synthesizer,
            reply_sender,
            reply_receiver,
            synthesis_seq: 0,
            synthesis_in_flight: 0,
            completed_seq: 0,
            result: None,
            statuses: VecDeque::new(),
            last_error: None,
            suggestion_seq: 0,
            suggestions_in_flight: 0,
            applied_suggestion_seq: 0,
        }
    }

    // --- State accessors ----------------------------------------------------

    pub fn settings(&self) -> &SketchSettings {
        &self.settings
    }

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn palette(&self) -> &BrushPalette {
        &self.palette
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn tool(&self) -> ToolMode {
        self.router.tool()
    }

    pub fn active_color(&self) -> HexColor {
        self.router.active_color()
    }

    pub fn brush_width(&self) -> f32 {
        self.router.brush_width()
    }

    /// Encoded image of the most recent displayed synthesis result.
    pub fn result_image(&self) -> Option<&[u8]> {
        self.result.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.synthesis_in_flight > 0
    }

    /// True from the moment a brush request is scheduled until its reply lands.
    pub fn is_loading_brushes(&self) -> bool {
        self.suggestion_timer.is_pending() || self.suggestions_in_flight > 0
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn synthesis_requests_issued(&self) -> u64 {
        self.synthesis_seq
    }

    pub fn synthesis_status(&self, seq: u64) -> Option<&SynthesisStatus> {
        self.statuses.iter().find(|(s, _)| *s == seq).map(|(_, status)| status)
    }

    /// Earliest pending timer deadline, for callers that sleep between ticks.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.synthesis_timer.deadline(), self.suggestion_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // --- Tool & palette controls ------------------------------------------

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.router.set_viewport(viewport);
    }

    pub fn set_tool(&mut self, tool: ToolMode) {
        self.router.set_tool(tool);
    }

    pub fn set_brush_width(&mut self, width: f32) {
        self.router.set_brush_width(width);
    }

    /// Manual color picker. Picking a color while erasing returns to drawing.
    pub fn pick_color(&mut self, color: HexColor) {
        self.router.set_active_color(color);
        if self.router.tool() == ToolMode::Erase {
            self.router.set_tool(ToolMode::Draw);
        }
    }

    /// Paint with the brush at `index`; leaves erase mode, keeps fill mode.
    pub fn select_brush(&mut self, index: usize) -> Result<(), PaletteError> {
        let color = self
            .palette
            .get(index)
            .map(|b| b.color)
            .ok_or(PaletteError::NoSuchBrush(index))?;
        self.pick_color(color);
        Ok(())
    }

    /// Add a user-defined brush and start painting with it. Invalid input
    /// leaves the palette and the active color untouched.
    pub fn add_custom_brush(&mut self, label: &str, color: &str) -> Result<(), PaletteError> {
        let brush = Brush::new(label, color)?;
        let color = brush.color;
        log::info!("Custom brush '{}' ({})", brush.label, color);
        self.palette.append(brush);
        self.router.set_active_color(color);
        Ok(())
    }

    // --- Drawing --------------------------------------------------------------

    /// Feed one pointer event. Finished strokes and fills are recorded in
    /// history and schedule a synthesis.
    pub fn pointer(&mut self, event: PointerEvent, now: Instant) -> RouterOutcome {
        let outcome = self.router.handle(event, &mut self.canvas);
        if outcome == RouterOutcome::Committed {
            self.history.push(self.canvas.snapshot());
            self.schedule_synthesis(now);
        }
        outcome
    }

    /// Step back one history entry. Returns false when there is nothing to undo.
    pub fn undo(&mut self, now: Instant) -> bool {
        let Some(snapshot) = self.history.previous() else {
            return false;
        };
        // Cursor only moves once the canvas has taken the snapshot
        if let Err(e) = self.canvas.restore(snapshot) {
            log::error!("Undo failed: {}", e);
            return false;
        }
        self.history.undo();
        self.schedule_synthesis(now);
        true
    }

    /// Wipe the canvas to background and drop the displayed result.
    pub fn clear(&mut self) {
        self.canvas.clear();
        self.result = None;
        self.history.push(self.canvas.snapshot());
    }

    // --- Prompt & pipelines ---------------------------------------------------

    /// Update the scene description. Long enough descriptions (re)start the
    /// brush suggestion timer; short ones cancel it.
    pub fn set_prompt(&mut self, prompt: &str, now: Instant) {
        self.prompt = prompt.to_string();
        if self.prompt.chars().count() >= self.settings.min_prompt_chars {
            self.suggestion_timer.schedule(now);
        } else {
            self.suggestion_timer.cancel();
        }
    }

    /// Ask for a new synthesis of the current sketch after the quiet period.
    pub fn regenerate(&mut self, now: Instant) {
        self.schedule_synthesis(now);
    }

    fn schedule_synthesis(&mut self, now: Instant) {
        if self.prompt.trim().is_empty() {
            log::debug!("Synthesis not scheduled: scene description is empty");
            return;
        }
        self.synthesis_timer.schedule(now);
    }

    /// Request brushes for the current description right away.
    pub fn refresh_brushes(&mut self) {
        self.suggestion_timer.cancel();
        self.dispatch_suggestions();
    }

    /// Drive timers and collect finished service calls. Call from the UI
    /// loop; never blocks.
    pub fn tick(&mut self, now: Instant) {
        self.drain_replies();
        if self.synthesis_timer.poll(now) {
            self.dispatch_synthesis();
        }
        if self.suggestion_timer.poll(now) {
            self.dispatch_suggestions();
        }
    }

    /// Block until every in-flight call has replied or `timeout` passes.
    /// Returns true when nothing is left in flight.
    pub fn wait_for_responses(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.synthesis_in_flight + self.suggestions_in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.reply_receiver.recv_timeout(remaining) {
                Ok(reply) => self.handle_reply(reply),
                Err(_) => return false,
            }
        }
        true
    }

    fn drain_replies(&mut self) {
        while let Ok(reply) = self.reply_receiver.try_recv() {
            self.handle_reply(reply);
        }
    }

    fn dispatch_synthesis(&mut self) {
        let image_png = match self.canvas.serialize() {
            Ok(png) => png,
            Err(e) => {
                log::error!("Could not serialize sketch: {}", e);
                self.last_error = Some(e.to_string());
                return;
            }
        };

        self.synthesis_seq += 1;
        let request = SynthesisRequest {
            seq: self.synthesis_seq,
            image_png,
            instruction: compose_instruction(&self.prompt, &self.palette),
        };
        self.synthesis_in_flight += 1;
        self.remember_status(request.seq, SynthesisStatus::InFlight);
        log::info!(
            "Synthesis request #{} ({} bytes, {} brushes)",
            request.seq,
            request.image_png.len(),
            self.palette.len()
        );

        let synthesizer = Arc::clone(&self.synthesizer);
        let sender = self.reply_sender.clone();
        rayon::spawn(move || {
            let result = guarded(|| synthesizer.synthesize(&request));
            let _ = sender.send(ServiceReply::Synthesis {
                seq: request.seq,
                result,
            });
        });
    }

    fn dispatch_suggestions(&mut self) {
        self.suggestion_seq += 1;
        self.suggestions_in_flight += 1;
        let seq = self.suggestion_seq;
        let description = self.prompt.clone();
        log::info!("Brush suggestion request #{} for \"{}\"", seq, description);

        let suggester = Arc::clone(&self.suggester);
        let sender = self.reply_sender.clone();
        rayon::spawn(move || {
            let result = guarded(|| suggester.suggest(&description));
            let _ = sender.send(ServiceReply::Suggestions { seq, result });
        });
    }

    fn handle_reply(&mut self, reply: ServiceReply) {
        match reply {
            ServiceReply::Synthesis { seq, result } => {
                self.synthesis_in_flight = self.synthesis_in_flight.saturating_sub(1);
                if seq < self.completed_seq {
                    if let Err(e) = &result {
                        log::warn!("Synthesis #{} failed after #{} completed: {}", seq, self.completed_seq, e);
                    } else {
                        log::debug!("Synthesis #{} finished after #{}; ignored", seq, self.completed_seq);
                    }
                    self.remember_status(seq, SynthesisStatus::Stale);
                    return;
                }
                self.completed_seq = seq;
                let status = match result {
                    Ok(image) => {
                        log::info!("Synthesis #{} displayed ({} bytes)", seq, image.len());
                        self.result = Some(image);
                        self.last_error = None;
                        SynthesisStatus::Displayed
                    }
                    Err(e) => {
                        log::error!("Synthesis #{} failed: {}", seq, e);
                        self.last_error = Some(e.to_string());
                        SynthesisStatus::Failed(e.to_string())
                    }
                };
                self.remember_status(seq, status);
            }
            ServiceReply::Suggestions { seq, result } => {
                self.suggestions_in_flight = self.suggestions_in_flight.saturating_sub(1);
                if seq < self.applied_suggestion_seq {
                    log::debug!("Brush batch #{} arrived after #{}; ignored", seq, self.applied_suggestion_seq);
                    return;
                }
                let brushes = match result {
                    Ok(text) => parse_suggestions(&text, self.settings.max_suggestions),
                    Err(e) => {
                        log::warn!("Brush suggestion #{} failed: {}", seq, e);
                        Vec::new()
                    }
                };
                log::info!("Brush batch #{}: {} brushes", seq, brushes.len());
                self.applied_suggestion_seq = seq;
                if let Some(first) = self.palette.replace_all(brushes) {
                    self.router.set_active_color(first);
                }
            }
        }
    }

    fn remember_status(&mut self, seq: u64, status: SynthesisStatus) {
        if let Some(entry) = self.statuses.iter_mut().find(|(s, _)| *s == seq) {
            entry.1 = status;
            return;
        }
        if self.statuses.len() == STATUS_MEMORY {
            self.statuses.pop_front();
        }
        self.statuses.push_back((seq, status));
    }

    // --- Export -----------------------------------------------------------------

    /// Save the displayed synthesis result as a PNG.
    pub fn export_result(&self, path: &Path) -> Result<(), ExportError> {
        let image = self.result.as_deref().ok_or(ExportError::NothingToExport)?;
        export_png(image, path)
    }

    /// Save the sketch itself as a PNG.
    pub fn export_sketch(&self, path: &Path) -> Result<(), ExportError> {
        export_png(&self.canvas.serialize()?, path)
    }
}
