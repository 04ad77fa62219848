// ============================================================================
// semsketch CLI: headless replay of gesture scripts
// ============================================================================
//
// Usage examples:
//   semsketch --script park.json
//   semsketch -s scripts/*.json --brushes park-brushes.json --output-dir out/
//   semsketch -s lake.json --settings fast.cfg --timeout-ms 2000 --verbose
//
// A script is a JSON array of steps:
//   [
//     {"op": "prompt", "text": "a park"},
//     {"op": "wait", "ms": 1500},
//     {"op": "down", "x": 10, "y": 400}, {"op": "move", "x": 500, "y": 400},
//     {"op": "up"}
//   ]
//
// Time is virtual: it only moves on "wait" steps and when the replay settles
// at the end, so debounce behavior is reproducible. Synthesis runs through
// the dry-run service, which records every request next to the outputs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Deserialize;

use crate::components::colors::{HexColor, InvalidHexColor};
use crate::components::palette::PaletteError;
use crate::components::tools::{PointerEvent, ToolMode};
use crate::io::ExportError;
use crate::ops::ai::{CannedSuggester, DryRunSynthesizer, compose_instruction};
use crate::project::SketchSession;
use crate::settings::SketchSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// semsketch headless sketch replayer.
#[derive(Parser, Debug)]
#[command(
    name = "semsketch",
    about = "Replay semantic sketch gesture scripts without a front end",
    long_about = "Replay JSON gesture scripts through a sketch session, then export the\n\
                  sketch, the synthesized result and every synthesis request.\n\n\
                  Example:\n  \
                  semsketch --script park.json\n  \
                  semsketch -s scripts/*.json --brushes brushes.json --output-dir out/"
)]
pub struct CliArgs {
    /// Gesture script(s). Glob patterns accepted (e.g. "scripts/*.json").
    #[arg(short, long, required = true, num_args = 1..)]
    pub script: Vec<String>,

    /// File whose text is returned as every brush suggestion reply
    /// (normally a JSON array of {"label", "color"}). Default: no brushes.
    #[arg(short, long, value_name = "FILE")]
    pub brushes: Option<PathBuf>,

    /// Output directory. Each script gets a sub-folder named after it.
    #[arg(short, long, default_value = "semsketch-out", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Settings file. Defaults to the per-user settings location.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// How long to wait for service replies before giving up.
    #[arg(long, default_value_t = 10_000, value_name = "MS")]
    pub timeout_ms: u64,

    /// Debug-level logging and per-script details.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown tool '{0}' (expected draw, erase or fill)")]
    UnknownTool(String),
    #[error(transparent)]
    Color(#[from] InvalidHexColor),
    #[error(transparent)]
    Palette(#[from] PaletteError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("services did not answer within {0} ms")]
    Timeout(u64),
    #[error("step {step}: {source}")]
    AtStep {
        step: usize,
        #[source]
        source: Box<ScriptError>,
    },
}

/// One scripted user action.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Prompt { text: String },
    Tool { mode: String },
    Color { hex: String },
    Width { px: f32 },
    /// Add a custom brush.
    Brush { label: String, color: String },
    /// Select a palette brush by index.
    Select { index: usize },
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    Leave,
    Undo,
    Clear,
    Regenerate,
    /// Advance the virtual clock and collect replies.
    Wait { ms: u64 },
}

/// Everything needed to replay scripts, independent of clap.
#[derive(Clone, Debug)]
pub struct ReplayOptions {
    pub output_dir: PathBuf,
    pub settings: SketchSettings,
    pub brush_reply: String,
    pub timeout: Duration,
}

/// What one replay produced.
#[derive(Debug)]
pub struct ReplayReport {
    pub sketch_path: PathBuf,
    pub result_path: Option<PathBuf>,
    pub instruction: String,
    pub requests: u64,
    pub brushes: usize,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Replay every script and return an OS exit code.
/// `0` = all scripts succeeded, `1` = one or more failed.
pub fn run(args: CliArgs) -> ExitCode {
    let scripts = collect_scripts(&args.script);
    if scripts.is_empty() {
        eprintln!("error: no gesture scripts found for --script.");
        return ExitCode::FAILURE;
    }

    let settings = match &args.settings {
        Some(path) => match SketchSettings::load_from(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => SketchSettings::load(),
    };

    let brush_reply = match &args.brushes {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("error: could not read brushes '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => "[]".to_string(),
    };

    let options = ReplayOptions {
        output_dir: args.output_dir.clone(),
        settings,
        brush_reply,
        timeout: Duration::from_millis(args.timeout_ms),
    };

    let total = scripts.len();
    let mut any_failure = false;

    for (idx, script) in scripts.iter().enumerate() {
        if total > 1 || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, script.display());
        }
        let started = Instant::now();

        match replay_file(script, &options) {
            Ok(report) => {
                println!("  sketch → {}", report.sketch_path.display());
                match &report.result_path {
                    Some(path) => println!("  result → {}", path.display()),
                    None => println!("  result → (none)"),
                }
                if args.verbose {
                    println!(
                        "  {} synthesis request(s), {} brush(es), {:.0}ms",
                        report.requests,
                        report.brushes,
                        started.elapsed().as_secs_f64() * 1000.0
                    );
                }
                println!("  instruction: {}", report.instruction);
            }
            Err(e) => {
                log::error!("Replay of {} failed: {}", script.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Replay pipeline
// ============================================================================

/// Parse a script file's JSON array of steps.
pub fn load_script(path: &Path) -> Result<Vec<Step>, ScriptError> {
    let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ScriptError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn replay_file(path: &Path, options: &ReplayOptions) -> Result<ReplayReport, ScriptError> {
    let steps = load_script(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    replay(&steps, &options.output_dir.join(stem), options)
}

/// Run `steps` through a fresh session and write its outputs into `out_dir`.
pub fn replay(steps: &[Step], out_dir: &Path, options: &ReplayOptions) -> Result<ReplayReport, ScriptError> {
    let synthesizer = Arc::new(DryRunSynthesizer::new(out_dir.join("requests")));
    let suggester = Arc::new(CannedSuggester::new(options.brush_reply.clone()));
    let mut session = SketchSession::new(options.settings.clone(), suggester, synthesizer);
    // Brushes for the starting description, before any gesture
    session.refresh_brushes();
    log::info!("Replaying {} steps into {}", steps.len(), out_dir.display());

    let mut clock = Instant::now();
    for (i, step) in steps.iter().enumerate() {
        apply_step(&mut session, step, &mut clock, options.timeout)
            .map_err(|e| ScriptError::AtStep {
                step: i + 1,
                source: Box::new(e),
            })?;
        session.tick(clock);
    }
    settle(&mut session, &mut clock, options.timeout)?;

    let sketch_path = out_dir.join("sketch.png");
    session.export_sketch(&sketch_path)?;
    let result_path = match session.result_image() {
        Some(_) => {
            let path = out_dir.join(&session.settings().export_file_name);
            session.export_result(&path)?;
            Some(path)
        }
        None => None,
    };

    Ok(ReplayReport {
        sketch_path,
        result_path,
        instruction: compose_instruction(session.prompt(), session.palette()),
        requests: session.synthesis_requests_issued(),
        brushes: session.palette().len(),
    })
}

fn apply_step(
    session: &mut SketchSession,
    step: &Step,
    clock: &mut Instant,
    timeout: Duration,
) -> Result<(), ScriptError> {
    let now = *clock;
    match step {
        Step::Prompt { text } => session.set_prompt(text, now),
        Step::Tool { mode } => {
            let tool = ToolMode::from_name(mode).ok_or_else(|| ScriptError::UnknownTool(mode.clone()))?;
            session.set_tool(tool);
        }
        Step::Color { hex } => session.pick_color(HexColor::parse(hex)?),
        Step::Width { px } => session.set_brush_width(*px),
        Step::Brush { label, color } => session.add_custom_brush(label, color)?,
        Step::Select { index } => session.select_brush(*index)?,
        Step::Down { x, y } => {
            session.pointer(PointerEvent::Down { x: *x, y: *y }, now);
        }
        Step::Move { x, y } => {
            session.pointer(PointerEvent::Move { x: *x, y: *y }, now);
        }
        Step::Up => {
            session.pointer(PointerEvent::Up, now);
        }
        Step::Leave => {
            session.pointer(PointerEvent::Leave, now);
        }
        Step::Undo => {
            if !session.undo(now) {
                log::debug!("Nothing to undo");
            }
        }
        Step::Clear => session.clear(),
        Step::Regenerate => session.regenerate(now),
        Step::Wait { ms } => {
            *clock += Duration::from_millis(*ms);
            session.tick(*clock);
            if !session.wait_for_responses(timeout) {
                return Err(ScriptError::Timeout(timeout.as_millis() as u64));
            }
        }
    }
    Ok(())
}

/// Let every pending timer fire and every call finish.
fn settle(session: &mut SketchSession, clock: &mut Instant, timeout: Duration) -> Result<(), ScriptError> {
    loop {
        session.tick(*clock);
        if !session.wait_for_responses(timeout) {
            return Err(ScriptError::Timeout(timeout.as_millis() as u64));
        }
        match session.next_deadline() {
            Some(deadline) => *clock = (*clock).max(deadline),
            None => return Ok(()),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Turn `--script` arguments into script files, each listed once in the
/// order first named. An existing file is taken as given; anything else is
/// expanded as a glob, skipping directories.
fn collect_scripts(patterns: &[String]) -> Vec<PathBuf> {
    let mut scripts: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        let found: Vec<PathBuf> = if literal.is_file() {
            vec![literal]
        } else {
            match glob::glob(pattern) {
                Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_file()).collect(),
                Err(e) => {
                    eprintln!("warning: '{}' is not a usable script pattern: {}", pattern, e);
                    continue;
                }
            }
        };

        if found.is_empty() {
            eprintln!("warning: no gesture script matches '{}'.", pattern);
        }
        for path in found {
            if !scripts.contains(&path) {
                scripts.push(path);
            }
        }
    }

    scripts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::RasterSurface;
    use pretty_assertions::assert_eq;

    const PARK_BRUSHES: &str = r##"```json
[{"label": "Sky", "color": "#87CEEB"}, {"label": "Grass", "color": "#228B22"}]
```"##;

    fn options(dir: &Path, brush_reply: &str) -> ReplayOptions {
        ReplayOptions {
            output_dir: dir.to_path_buf(),
            settings: SketchSettings::default(),
            brush_reply: brush_reply.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    fn steps(json: &str) -> Vec<Step> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_tagged_steps() {
        let parsed = steps(
            r##"[
                {"op": "prompt", "text": "a park"},
                {"op": "down", "x": 1, "y": 2.5},
                {"op": "up"},
                {"op": "brush", "label": "Sky", "color": "#87ceeb"},
                {"op": "wait", "ms": 1500}
            ]"##,
        );
        assert_eq!(
            parsed,
            vec![
                Step::Prompt { text: "a park".to_string() },
                Step::Down { x: 1.0, y: 2.5 },
                Step::Up,
                Step::Brush {
                    label: "Sky".to_string(),
                    color: "#87ceeb".to_string()
                },
                Step::Wait { ms: 1500 },
            ]
        );
        assert!(serde_json::from_str::<Vec<Step>>(r#"[{"op": "teleport"}]"#).is_err());
    }

    #[test]
    fn replay_park_scene() {
        let dir = tempfile::tempdir().unwrap();
        let script = steps(
            r##"[
                {"op": "prompt", "text": "a park"},
                {"op": "wait", "ms": 1500},
                {"op": "width", "px": 20},
                {"op": "down", "x": 0, "y": 100},
                {"op": "move", "x": 511, "y": 100},
                {"op": "up"},
                {"op": "select", "index": 1},
                {"op": "down", "x": 0, "y": 450},
                {"op": "move", "x": 511, "y": 450},
                {"op": "leave"}
            ]"##,
        );
        let out = dir.path().join("park");
        let report = replay(&script, &out, &options(dir.path(), PARK_BRUSHES)).unwrap();

        assert_eq!(report.brushes, 2);
        // Both strokes landed inside one quiet period
        assert_eq!(report.requests, 1);
        assert!(report.instruction.contains("a park"));
        assert!(report.instruction.contains("- Color #87ceeb represents Sky"));
        assert!(report.instruction.contains("- Color #228b22 represents Grass"));

        let sketch = image::open(&report.sketch_path).unwrap().into_rgba8();
        assert_eq!(*sketch.get_pixel(256, 100), HexColor::rgb(0x87, 0xce, 0xeb).to_rgba());
        assert_eq!(*sketch.get_pixel(256, 450), HexColor::rgb(0x22, 0x8b, 0x22).to_rgba());
        assert_eq!(report.result_path, Some(out.join("sketch-gen.png")));
        assert!(out.join("requests").join("request-001.png").exists());
        let sent = std::fs::read_to_string(out.join("requests").join("request-001.txt")).unwrap();
        assert_eq!(sent, report.instruction);
    }

    #[test]
    fn waits_split_requests() {
        let dir = tempfile::tempdir().unwrap();
        let script = steps(
            r##"[
                {"op": "down", "x": 10, "y": 10}, {"op": "move", "x": 50, "y": 10}, {"op": "up"},
                {"op": "wait", "ms": 900},
                {"op": "tool", "mode": "fill"},
                {"op": "color", "hex": "#ff0"},
                {"op": "down", "x": 300, "y": 300},
                {"op": "undo"},
                {"op": "regenerate"}
            ]"##,
        );
        let report = replay(&script, &dir.path().join("split"), &options(dir.path(), "[]")).unwrap();
        assert_eq!(report.requests, 2);
        assert_eq!(report.brushes, 0);
        assert!(!report.instruction.contains("segmentation"));
    }

    #[test]
    fn brushes_arrive_without_a_prompt_step() {
        let dir = tempfile::tempdir().unwrap();
        let script = steps(r#"[{"op": "down", "x": 5, "y": 5}, {"op": "move", "x": 60, "y": 5}, {"op": "up"}]"#);
        let report = replay(&script, &dir.path().join("quiet"), &options(dir.path(), PARK_BRUSHES)).unwrap();

        assert_eq!(report.brushes, 2);
        assert_eq!(report.requests, 1);
        assert!(report.instruction.contains("- Color #87ceeb represents Sky"));
    }

    #[test]
    fn errors_name_the_failing_step() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), "[]");

        let err = replay(&steps(r#"[{"op": "up"}, {"op": "tool", "mode": "lasso"}]"#), dir.path(), &opts)
            .unwrap_err();
        assert_eq!(err.to_string(), "step 2: unknown tool 'lasso' (expected draw, erase or fill)");

        let err = replay(&steps(r#"[{"op": "select", "index": 3}]"#), dir.path(), &opts).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::AtStep { step: 1, ref source } if matches!(**source, ScriptError::Palette(PaletteError::NoSuchBrush(3)))
        ));

        let err = replay(&steps(r#"[{"op": "color", "hex": "teal"}]"#), dir.path(), &opts).unwrap_err();
        assert!(err.to_string().starts_with("step 1: "));
    }

    #[test]
    fn clear_leaves_no_result() {
        let dir = tempfile::tempdir().unwrap();
        let script = steps(
            r#"[
                {"op": "down", "x": 10, "y": 10}, {"op": "move", "x": 80, "y": 80}, {"op": "up"},
                {"op": "wait", "ms": 1000},
                {"op": "clear"}
            ]"#,
        );
        let report = replay(&script, &dir.path().join("cleared"), &options(dir.path(), "[]")).unwrap();
        assert_eq!(report.requests, 1);
        assert_eq!(report.result_path, None);

        let sketch = image::open(&report.sketch_path).unwrap().into_rgba8();
        let blank = crate::canvas::CanvasState::default();
        assert_eq!(sketch.get_pixel(40, 40), &blank.pixel(40, 40).unwrap());
    }

    #[test]
    fn script_files_and_globs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"[{"op": "regenerate"}]"#).unwrap();
        std::fs::write(dir.path().join("b.json"), "not json").unwrap();

        let pattern = dir.path().join("*.json").to_string_lossy().into_owned();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();
        let found = collect_scripts(&[pattern.clone(), pattern]);
        assert_eq!(found, vec![dir.path().join("a.json"), dir.path().join("b.json")]);

        assert_eq!(load_script(&found[0]).unwrap(), vec![Step::Regenerate]);
        assert!(matches!(load_script(&found[1]), Err(ScriptError::Parse { .. })));
        assert!(matches!(
            load_script(&dir.path().join("missing.json")),
            Err(ScriptError::Read { .. })
        ));

        let opts = options(&dir.path().join("out"), "[]");
        let report = replay_file(&found[0], &opts).unwrap();
        assert_eq!(report.sketch_path, dir.path().join("out").join("a").join("sketch.png"));
        assert_eq!(report.requests, 1);
    }

    #[test]
    fn cli_arguments() {
        let args = CliArgs::try_parse_from(["semsketch", "-s", "a.json", "b.json", "--timeout-ms", "250", "-v"])
            .unwrap();
        assert_eq!(args.script, vec!["a.json", "b.json"]);
        assert_eq!(args.timeout_ms, 250);
        assert_eq!(args.output_dir, PathBuf::from("semsketch-out"));
        assert!(args.verbose);
        assert!(args.brushes.is_none());

        assert!(CliArgs::try_parse_from(["semsketch"]).is_err());
    }
}
