// ============================================================================
// AI SERVICES: brush suggestion and sketch-to-image synthesis
// ============================================================================
//
// Both services are external. The session only sees the two traits below;
// real network clients live outside this crate. The offline implementations
// at the bottom back the headless CLI.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;

use crate::components::palette::{Brush, BrushPalette};

/// Upper bound on brushes accepted from one suggestion batch.
pub const MAX_SUGGESTIONS: usize = 8;

/// Errors that can occur while talking to an external service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("service rejected the request: {0}")]
    Rejected(String),
    #[error("service returned no image")]
    NoImage,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One synthesis call: the encoded sketch plus the natural-language instruction.
#[derive(Clone, Debug)]
pub struct SynthesisRequest {
    /// Issue order within the session, starting at 1.
    pub seq: u64,
    /// PNG-encoded sketch.
    pub image_png: Vec<u8>,
    pub instruction: String,
}

/// Turns a scene description into raw suggestion text (expected: a JSON
/// array of `{label, color}`, possibly fenced as markdown).
pub trait BrushSuggester: Send + Sync {
    fn suggest(&self, description: &str) -> Result<String, ServiceError>;
}

/// Renders a sketch + instruction into an encoded image.
pub trait ImageSynthesizer: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ServiceError>;
}

/// Build the instruction sent alongside the sketch. The palette travels as
/// plain text because the service only accepts an image and a prompt.
pub fn compose_instruction(description: &str, palette: &BrushPalette) -> String {
    let mut legend = String::new();
    if !palette.is_empty() {
        legend.push_str(
            "\n\nThe input image is a color-coded semantic segmentation map. \
             Interpret the colors strictly as follows when placing objects:\n",
        );
        legend.push_str(&palette.legend());
        legend.push_str(
            "\nRender each of these areas as the named object, with realistic \
             texture, lighting and depth that match the scene.",
        );
    }
    format!(
        "Turn this rough sketch into a detailed, high-quality image of: {}.{} \
         Keep the composition and structure of the drawing exactly.",
        description.trim(),
        legend
    )
}

#[derive(Deserialize)]
struct RawBrush {
    label: String,
    color: String,
}

/// Remove markdown code fences (```json ... ```) around a model reply.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string ("json", "JSON", ...) up to the first newline
        body = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse a suggestion reply. Never fails: malformed text or a non-array
/// payload gives an empty list, and entries with an empty label or a bad
/// color are skipped. At most `max` brushes are kept.
pub fn parse_suggestions(text: &str, max: usize) -> Vec<Brush> {
    let body = strip_code_fences(text);
    let entries: Vec<serde_json::Value> = match serde_json::from_str(body) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Brush suggestions were not a JSON array: {}", e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|value| {
            let raw: RawBrush = serde_json::from_value(value).ok()?;
            match Brush::new(&raw.label, &raw.color) {
                Ok(brush) => Some(brush),
                Err(e) => {
                    log::debug!("Skipping suggested brush '{}': {}", raw.label, e);
                    None
                }
            }
        })
        .take(max)
        .collect()
}

// ============================================================================
// OFFLINE SERVICES
// ============================================================================

/// Replies with the same stored text for every description.
pub struct CannedSuggester {
    response: String,
}

impl CannedSuggester {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }

    /// No suggestions at all ("[]").
    pub fn empty() -> Self {
        Self::new("[]")
    }
}

impl BrushSuggester for CannedSuggester {
    fn suggest(&self, _description: &str) -> Result<String, ServiceError> {
        Ok(self.response.clone())
    }
}

/// Writes every request (sketch PNG + instruction) into a directory and
/// answers with the sketch itself. Lets the whole pipeline run without a
/// model behind it.
pub struct DryRunSynthesizer {
    out_dir: PathBuf,
    calls: AtomicUsize,
}

impl DryRunSynthesizer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageSynthesizer for DryRunSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(&self.out_dir)?;
        let stem = format!("request-{:03}", request.seq);
        std::fs::write(self.out_dir.join(format!("{stem}.png")), &request.image_png)?;
        std::fs::write(self.out_dir.join(format!("{stem}.txt")), &request.instruction)?;
        Ok(request.image_png.clone())
    }
}
