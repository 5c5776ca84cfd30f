//! External program adapters
//!
//! Rendering, transcoding, merging and thumbnailing are delegated to
//! command-line programs found in PATH. Each is probed once at startup; a tool
//! that a requested feature needs but that cannot be found is fatal before any
//! pipeline work begins.
//!
//! Calls are synchronous, one at a time, and never retried. A non-zero exit is
//! reported as [`ToolOutcome::Failed`] but does not change where the pipeline
//! records the output as living.

use crate::workflow::PageSide;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};
use unmuddle_common::config::ToolOverrides;

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s+([0-9:]+)").expect("static regex"));

/// External tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// No candidate program for a required tool could be run
    #[error("No {tool} found. {hint}")]
    NotFound { tool: &'static str, hint: &'static str },

    /// Override command line is empty
    #[error("Empty command configured for {0}")]
    EmptyCommand(&'static str),
}

/// Result of one external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Succeeded,
    Failed(String),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Succeeded)
    }
}

/// The external tools the pipeline knows how to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Encoder,
    Thumbnailer,
    Merger,
    Renderer,
}

impl ToolKind {
    /// Human-readable tool name used in messages
    pub fn label(self) -> &'static str {
        match self {
            ToolKind::Encoder => "audio encoder",
            ToolKind::Thumbnailer => "thumbnail generator",
            ToolKind::Merger => "pdf merger",
            ToolKind::Renderer => "page renderer",
        }
    }

    /// Built-in candidates in preference order, each with its probe argument
    fn candidates(self) -> &'static [(&'static str, &'static str)] {
        match self {
            ToolKind::Encoder => &[("ffmpeg", "-h"), ("avconv", "-h")],
            ToolKind::Thumbnailer => &[("convert", "--version"), ("gm convert", "-help")],
            ToolKind::Merger => &[("pdftk", "--version")],
            ToolKind::Renderer => &[("stf2pdf", "--help")],
        }
    }

    fn hint(self) -> &'static str {
        match self {
            ToolKind::Encoder => {
                "Please install either avconv or ffmpeg or run this command with the --aac flag."
            }
            ToolKind::Thumbnailer => {
                "Please install either ImageMagick or GraphicsMagick or run this command without the --thumb flag."
            }
            ToolKind::Merger => {
                "Please install pdftk or run this command without the --notebook flag."
            }
            ToolKind::Renderer => {
                "Please install stf2pdf or set [tools] renderer in the config file."
            }
        }
    }

    /// Whether a probe exit status counts as "installed"
    ///
    /// The renderer is only required to start; its help exit code varies.
    fn accepts_any_exit(self) -> bool {
        matches!(self, ToolKind::Renderer)
    }
}

/// Command line prefix for an external program (e.g. `gm convert`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    /// Split a command line on whitespace; `None` when empty
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// A fresh `Command` with the prefix applied
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run the command with output suppressed; true when it could be started
    /// and (unless `any_exit`) exited with status 0
    fn probe(&self, probe_arg: &str, any_exit: bool) -> bool {
        let status = self
            .command()
            .arg(probe_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) => any_exit || status.success(),
            Err(e) => {
                debug!(command = %self, error = %e, "Probe failed to start");
                false
            }
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Probe argument for overrides that are not a built-in candidate
const UNKNOWN_TOOL_PROBE_ARG: &str = "--help";

/// Find a working program for `kind`
///
/// An override replaces the candidate list; it is still probed so a typo is
/// caught at startup rather than on the first page. An override naming a
/// built-in candidate is probed the way that candidate is; any other program
/// only has to start.
pub fn detect(kind: ToolKind, override_line: Option<&str>) -> Result<ToolCommand, ToolError> {
    let not_found = || ToolError::NotFound {
        tool: kind.label(),
        hint: kind.hint(),
    };

    if let Some(line) = override_line {
        let command = ToolCommand::parse(line).ok_or(ToolError::EmptyCommand(kind.label()))?;
        let known_probe = kind
            .candidates()
            .iter()
            .find(|candidate| ToolCommand::parse(candidate.0).as_ref() == Some(&command))
            .map(|candidate| candidate.1);
        let started = match known_probe {
            Some(probe_arg) => command.probe(probe_arg, kind.accepts_any_exit()),
            None => command.probe(UNKNOWN_TOOL_PROBE_ARG, true),
        };
        if started {
            info!(tool = kind.label(), command = %command, "Using configured tool");
            return Ok(command);
        }
        return Err(not_found());
    }

    for (line, probe_arg) in kind.candidates() {
        let Some(command) = ToolCommand::parse(line) else {
            continue;
        };
        if command.probe(probe_arg, kind.accepts_any_exit()) {
            info!(tool = kind.label(), command = %command, "Detected tool");
            return Ok(command);
        }
    }

    Err(not_found())
}

/// Which optional tools the requested features need
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolRequirements {
    /// Transcode audio to Ogg Vorbis (off with `--aac`)
    pub transcode: bool,
    /// Generate thumbnails (`--thumb`)
    pub thumbnails: bool,
    /// Merge notebook pages (`--notebook`)
    pub merge: bool,
}

/// Services the pipeline delegates to
///
/// Implemented by [`ExternalTools`] in production; tests substitute an
/// in-process fake.
pub trait Collaborators {
    /// Render a page stroke file to a document at `dest`
    fn render_page(&self, source: &Path, dest: &Path, side: PageSide) -> ToolOutcome;

    /// Recording length in whole seconds, `None` when unknown
    fn audio_duration(&self, source: &Path) -> Option<u64>;

    /// Transcode a recording to `dest`
    fn transcode_audio(&self, source: &Path, dest: &Path) -> ToolOutcome;

    /// Concatenate documents into `dest`
    fn merge_documents(&self, inputs: &[PathBuf], dest: &Path) -> ToolOutcome;

    /// Render a thumbnail of `document` no larger than `size` pixels
    fn render_thumbnail(&self, document: &Path, dest: &Path, size: u32) -> ToolOutcome;
}

/// Command-line implementations of [`Collaborators`]
#[derive(Debug, Clone)]
pub struct ExternalTools {
    renderer: ToolCommand,
    encoder: Option<ToolCommand>,
    thumbnailer: Option<ToolCommand>,
    merger: Option<ToolCommand>,
    backgrounds_dir: PathBuf,
}

impl ExternalTools {
    /// Detect every tool the requested features need
    pub fn detect(
        requirements: ToolRequirements,
        overrides: &ToolOverrides,
        backgrounds_dir: PathBuf,
    ) -> Result<Self, ToolError> {
        let encoder = requirements
            .transcode
            .then(|| detect(ToolKind::Encoder, overrides.encoder.as_deref()))
            .transpose()?;
        let thumbnailer = requirements
            .thumbnails
            .then(|| detect(ToolKind::Thumbnailer, overrides.thumbnailer.as_deref()))
            .transpose()?;
        let merger = requirements
            .merge
            .then(|| detect(ToolKind::Merger, overrides.merger.as_deref()))
            .transpose()?;
        let renderer = detect(ToolKind::Renderer, overrides.renderer.as_deref())?;

        Ok(Self {
            renderer,
            encoder,
            thumbnailer,
            merger,
            backgrounds_dir,
        })
    }

    /// Background image for a page side
    pub fn background_for(&self, side: PageSide) -> PathBuf {
        self.backgrounds_dir.join(side.background_file())
    }
}

impl Collaborators for ExternalTools {
    fn render_page(&self, source: &Path, dest: &Path, side: PageSide) -> ToolOutcome {
        let mut cmd = self.renderer.command();
        cmd.arg(source).arg(dest).arg(self.background_for(side));
        run(cmd)
    }

    fn audio_duration(&self, source: &Path) -> Option<u64> {
        let encoder = self.encoder.as_ref()?;
        let output = encoder
            .command()
            .arg("-i")
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| debug!(error = %e, "Duration probe failed to start"))
            .ok()?;

        // ffmpeg prints stream info on stderr and exits non-zero without an output file
        let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        parse_duration(&text)
    }

    fn transcode_audio(&self, source: &Path, dest: &Path) -> ToolOutcome {
        let Some(encoder) = self.encoder.as_ref() else {
            return ToolOutcome::Failed("no audio encoder configured".to_string());
        };
        let mut cmd = encoder.command();
        cmd.arg("-i").arg(source).args(["-acodec", "libvorbis"]).arg(dest);
        run(cmd)
    }

    fn merge_documents(&self, inputs: &[PathBuf], dest: &Path) -> ToolOutcome {
        let Some(merger) = self.merger.as_ref() else {
            return ToolOutcome::Failed("no pdf merger configured".to_string());
        };
        let mut cmd = merger.command();
        cmd.args(inputs).args(["cat", "output"]).arg(dest);
        run(cmd)
    }

    fn render_thumbnail(&self, document: &Path, dest: &Path, size: u32) -> ToolOutcome {
        let Some(thumbnailer) = self.thumbnailer.as_ref() else {
            return ToolOutcome::Failed("no thumbnail generator configured".to_string());
        };
        let mut cmd = thumbnailer.command();
        cmd.arg("-resize").arg(size.to_string()).arg(document).arg(dest);
        run(cmd)
    }
}

/// Run a command with output suppressed
fn run(mut cmd: Command) -> ToolOutcome {
    debug!(command = ?cmd, "Running external tool");
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => ToolOutcome::Succeeded,
        Ok(status) => ToolOutcome::Failed(format!("{:?} exited with {}", cmd.get_program(), status)),
        Err(e) => ToolOutcome::Failed(format!("{:?} failed to start: {}", cmd.get_program(), e)),
    }
}

/// Extract `H:MM:SS` from ffmpeg-style stream info as whole seconds
pub fn parse_duration(text: &str) -> Option<u64> {
    let raw = DURATION_RE.captures(text)?.get(1)?.as_str();
    let mut parts = raw.split(':').map(|p| p.parse::<u64>().ok());
    let hours = parts.next()??;
    let minutes = parts.next()??;
    let seconds = parts.next()??;
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_duration_from_ffmpeg_output() {
        let text = "Input #0, aac, from 'audio-0.aac':\n  Duration: 00:02:05.43, bitrate: 64 kb/s\n";
        assert_eq!(parse_duration(text), Some(125));
    }

    #[test]
    fn test_parse_duration_hours() {
        assert_eq!(parse_duration("Duration: 01:00:01.00"), Some(3601));
    }

    #[test]
    fn test_parse_duration_missing_or_partial() {
        assert_eq!(parse_duration("no stream info"), None);
        assert_eq!(parse_duration("Duration: N/A"), None);
        assert_eq!(parse_duration("Duration: 02:05"), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_unknown() {
        assert_eq!(parse_duration("Duration: 10000000000000000:00:00.00"), None);
        assert_eq!(parse_duration("Duration: 0:0:18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_duration("Duration: 0:1:18446744073709551615"), None);
    }

    #[test]
    fn test_command_parse_splits_prefix() {
        let cmd = ToolCommand::parse("gm convert").unwrap();
        assert_eq!(cmd.to_string(), "gm convert");
        assert_eq!(cmd.command().get_program(), "gm");
        assert_eq!(cmd.command().get_args().collect::<Vec<_>>(), vec!["convert"]);
        assert!(ToolCommand::parse("   ").is_none());
    }

    #[test]
    #[serial]
    fn test_detect_missing_override_is_not_found() {
        let result = detect(ToolKind::Merger, Some("definitely-not-a-real-program-9f3a"));
        match result {
            Err(ToolError::NotFound { tool, hint }) => {
                assert_eq!(tool, "pdf merger");
                assert!(hint.contains("--notebook"));
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_detect_empty_override() {
        assert!(matches!(
            detect(ToolKind::Encoder, Some("")),
            Err(ToolError::EmptyCommand(_))
        ));
    }

    #[test]
    fn test_outcome_success_flag() {
        assert!(ToolOutcome::Succeeded.is_success());
        assert!(!ToolOutcome::Failed("exit 1".to_string()).is_success());
    }

    #[test]
    fn test_unconfigured_tools_report_failure() {
        let tools = ExternalTools {
            renderer: ToolCommand::parse("stf2pdf").unwrap(),
            encoder: None,
            thumbnailer: None,
            merger: None,
            backgrounds_dir: PathBuf::from("backgrounds"),
        };

        assert!(tools.audio_duration(Path::new("a.aac")).is_none());
        assert!(!tools.transcode_audio(Path::new("a.aac"), Path::new("a.ogg")).is_success());
        assert!(!tools.merge_documents(&[], Path::new("all.pdf")).is_success());
        assert_eq!(
            tools.background_for(PageSide::Left),
            PathBuf::from("backgrounds/left.png")
        );
    }

    /// `sh <script>` that writes each argument on its own line to `<name>.argv`
    fn argv_recorder(dir: &Path, name: &str) -> (ToolCommand, PathBuf) {
        let log = dir.join(format!("{}.argv", name));
        let script = dir.join(format!("{}.sh", name));
        std::fs::write(&script, format!("printf '%s\\n' \"$@\" > '{}'\n", log.display()))
            .unwrap();
        let command = ToolCommand {
            program: "sh".to_string(),
            args: vec![script.display().to_string()],
        };
        (command, log)
    }

    fn recorded_args(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn recording_tools(dir: &Path) -> (ExternalTools, [PathBuf; 4]) {
        let (renderer, render_log) = argv_recorder(dir, "renderer");
        let (encoder, encode_log) = argv_recorder(dir, "encoder");
        let (thumbnailer, thumb_log) = argv_recorder(dir, "thumbnailer");
        let (merger, merge_log) = argv_recorder(dir, "merger");
        let tools = ExternalTools {
            renderer,
            encoder: Some(encoder),
            thumbnailer: Some(thumbnailer),
            merger: Some(merger),
            backgrounds_dir: PathBuf::from("bg"),
        };
        (tools, [render_log, encode_log, thumb_log, merge_log])
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_render_page_command_line() {
        let temp = tempfile::tempdir().unwrap();
        let (tools, [render_log, ..]) = recording_tools(temp.path());

        let outcome = tools.render_page(Path::new("s.stf"), Path::new("p.pdf"), PageSide::Right);

        assert!(outcome.is_success());
        assert_eq!(recorded_args(&render_log), vec!["s.stf", "p.pdf", "bg/right.png"]);
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_transcode_command_line() {
        let temp = tempfile::tempdir().unwrap();
        let (tools, [_, encode_log, ..]) = recording_tools(temp.path());

        let outcome = tools.transcode_audio(Path::new("a.aac"), Path::new("a.ogg"));

        assert!(outcome.is_success());
        assert_eq!(
            recorded_args(&encode_log),
            vec!["-i", "a.aac", "-acodec", "libvorbis", "a.ogg"]
        );
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_merge_command_line() {
        let temp = tempfile::tempdir().unwrap();
        let (tools, [.., merge_log]) = recording_tools(temp.path());

        let inputs = [PathBuf::from("1.pdf"), PathBuf::from("2.pdf")];
        let outcome = tools.merge_documents(&inputs, Path::new("all.pdf"));

        assert!(outcome.is_success());
        assert_eq!(
            recorded_args(&merge_log),
            vec!["1.pdf", "2.pdf", "cat", "output", "all.pdf"]
        );
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_thumbnail_command_line() {
        let temp = tempfile::tempdir().unwrap();
        let (tools, [_, _, thumb_log, _]) = recording_tools(temp.path());

        let outcome = tools.render_thumbnail(Path::new("p.pdf"), Path::new("t.png"), 300);

        assert!(outcome.is_success());
        assert_eq!(recorded_args(&thumb_log), vec!["-resize", "300", "p.pdf", "t.png"]);
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_duration_read_from_encoder_stderr() {
        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("encoder.sh");
        std::fs::write(
            &script,
            "echo '  Duration: 00:01:05.43, start: 0.000000' >&2\nexit 1\n",
        )
        .unwrap();

        let tools = ExternalTools {
            renderer: ToolCommand::parse("true").unwrap(),
            encoder: Some(ToolCommand {
                program: "sh".to_string(),
                args: vec![script.display().to_string()],
            }),
            thumbnailer: None,
            merger: None,
            backgrounds_dir: PathBuf::from("bg"),
        };

        assert_eq!(tools.audio_duration(Path::new("a.aac")), Some(65));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_known_override_probed_with_its_own_argument() {
        use std::os::unix::fs::PermissionsExt;

        // GraphicsMagick accepts `convert -help` but rejects `convert --version`
        let temp = tempfile::tempdir().unwrap();
        let gm = temp.path().join("gm");
        std::fs::write(
            &gm,
            "#!/bin/sh\n[ \"$1\" = convert ] && [ \"$2\" = -help ] && exit 0\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&gm, std::fs::Permissions::from_mode(0o755)).unwrap();

        let original_path = std::env::var_os("PATH").unwrap_or_default();
        let mut search = vec![temp.path().to_path_buf()];
        search.extend(std::env::split_paths(&original_path));
        std::env::set_var("PATH", std::env::join_paths(search).unwrap());

        let result = detect(ToolKind::Thumbnailer, Some("gm convert"));

        std::env::set_var("PATH", &original_path);

        let command = result.unwrap();
        assert_eq!(command.to_string(), "gm convert");
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_unknown_override_only_needs_to_start() {
        // `sh --help` exits non-zero on dash; starting is enough for a custom tool
        let command = detect(ToolKind::Encoder, Some("sh")).unwrap();
        assert_eq!(command.to_string(), "sh");
    }
}
