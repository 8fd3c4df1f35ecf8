//! Video I/O through the `ffmpeg` / `ffprobe` command-line tools.
//!
//! Decoding streams packed RGB24 frames out of an `ffmpeg` child over
//! stdout; encoding streams them into another child's stdin. Presentation
//! times come from `ffprobe`'s packet list, sorted and rebased to zero.
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use crate::drivers::buffer::{Frame, Resolution};
use crate::drivers::sink::FrameSink;
use crate::drivers::source::{Admit, FrameSource, Timeline};
use crate::error::{AbortReason, OverlayError, Result, VideoOpenReason};
const STDERR_TAIL_LINES: usize = 50;
/// Where the external tools live; defaults to whatever is on `PATH`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}
impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}
#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    #[serde(default)]
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
    #[serde(default)]
    tags: StreamTags,
}
#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}
#[derive(Debug, Default, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}
impl ProbeStream {
    /// Display rotation in degrees; the display matrix wins over the legacy `rotate` tag.
    fn rotation(&self) -> i64 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .filter(|r| r.is_finite())
            .map_or(0, |r| r.round() as i64)
    }
    /// Size of the frames the decoder hands out; it applies the rotation itself.
    fn display_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.rotation().rem_euclid(180) == 90 {
            (height, width)
        } else {
            (width, height)
        }
    }
}
#[derive(Debug, Deserialize)]
struct ProbePackets {
    #[serde(default)]
    packets: Vec<ProbePacket>,
}
#[derive(Debug, Deserialize)]
struct ProbePacket {
    pts_time: Option<String>,
}
/// Stream facts gathered before decoding starts.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub stream_index: usize,
    pub resolution: Resolution,
    pub frame_rate: f64,
    pub total_frames: Option<u64>,
}
impl ProbeOutput {
    fn select(
        &self,
        stream_index: Option<usize>,
    ) -> std::result::Result<VideoInfo, VideoOpenReason> {
        let stream = match stream_index {
            Some(index) => {
                let stream = self
                    .streams
                    .iter()
                    .find(|s| s.index == index)
                    .ok_or(VideoOpenReason::StreamNotFound(index))?;
                if stream.codec_type != "video" {
                    return Err(VideoOpenReason::NotAVideoStream {
                        index,
                        codec_type: stream.codec_type.clone(),
                    });
                }
                stream
            }
            None => self
                .streams
                .iter()
                .find(|s| s.codec_type == "video")
                .ok_or(VideoOpenReason::NoVideoStream)?,
        };
        let (Some(width), Some(height)) = (stream.width, stream.height) else {
            return Err(VideoOpenReason::NotAVideoFile(format!(
                "stream #{} reports no frame size",
                stream.index
            )));
        };
        let (width, height) = stream.display_size(width, height);
        let frame_rate = [&stream.avg_frame_rate, &stream.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|r| parse_rate(r))
            .unwrap_or(30.0);
        Ok(VideoInfo {
            stream_index: stream.index,
            resolution: Resolution::new(width, height),
            frame_rate,
            total_frames: stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
        })
    }
}
/// Parses `30000/1001` or `25`; zero or malformed rates give `None`.
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
/// Sorted packet times rebased to the first one. `None` when any packet lacks a time.
fn packet_times(packets: &ProbePackets) -> Option<Vec<f64>> {
    let mut times = packets
        .packets
        .iter()
        .map(|p| p.pts_time.as_deref().and_then(|t| t.trim().parse::<f64>().ok()))
        .collect::<Option<Vec<f64>>>()?;
    if times.is_empty() || times.iter().any(|t| !t.is_finite()) {
        return None;
    }
    times.sort_by(|a, b| a.total_cmp(b));
    let first = times[0];
    for t in &mut times {
        *t -= first;
    }
    Some(times)
}
/// Runs a tool to completion and returns its stdout, or the tail of its stderr.
fn run_tool(command: &mut Command) -> io::Result<std::result::Result<Vec<u8>, String>> {
    debug!("Running {:?}", command);
    let output = command.stdin(Stdio::null()).output()?;
    if output.status.success() {
        Ok(Ok(output.stdout))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(Err(tail_of(&stderr, output.status)))
    }
}
fn tail_of(stderr: &str, status: std::process::ExitStatus) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.trim().is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {}", tail.trim())
    }
}
/// Runs `ffprobe` and parses its JSON report.
fn probe_json<T: serde::de::DeserializeOwned>(
    tools: &FfmpegTools,
    path: &Path,
    command: &mut Command,
) -> Result<T> {
    let stdout = run_tool(command)
        .map_err(|e| {
            OverlayError::video_open(
                path,
                VideoOpenReason::ToolUnavailable(format!("{:?}: {e}", tools.ffprobe)),
            )
        })?
        .map_err(|e| OverlayError::video_open(path, VideoOpenReason::NotAVideoFile(e)))?;
    serde_json::from_slice(&stdout).map_err(|e| {
        OverlayError::video_open(path, VideoOpenReason::NotAVideoFile(e.to_string()))
    })
}
/// Probes `path` and picks the requested (or first) video stream.
pub fn probe(tools: &FfmpegTools, path: &Path, stream_index: Option<usize>) -> Result<VideoInfo> {
    if !path.is_file() {
        return Err(OverlayError::video_open(path, VideoOpenReason::InvalidPath));
    }
    let mut command = Command::new(&tools.ffprobe);
    command
        .args(["-v", "error", "-show_streams", "-of", "json"])
        .arg(path);
    let parsed: ProbeOutput = probe_json(tools, path, &mut command)?;
    parsed
        .select(stream_index)
        .map_err(|reason| OverlayError::video_open(path, reason))
}
/// Presentation times of every packet in the stream, or `None` if the container has none.
pub fn presentation_times(
    tools: &FfmpegTools,
    path: &Path,
    stream_index: usize,
) -> Result<Option<Vec<f64>>> {
    let mut command = Command::new(&tools.ffprobe);
    command
        .args(["-v", "error", "-select_streams", &stream_index.to_string()])
        .args(["-show_entries", "packet=pts_time", "-of", "json"])
        .arg(path);
    let packets: ProbePackets = probe_json(tools, path, &mut command)?;
    Ok(packet_times(&packets))
}
/// Re-encodes `input` into `output`, letting `ffmpeg` pick codecs from the extension.
pub fn convert(tools: &FfmpegTools, input: &Path, output: &Path) -> std::result::Result<(), String> {
    info!("Converting {:?} -> {:?}", input, output);
    run_convert(tools, &mut convert_command(tools, input, None, output))
}
/// Re-encodes only the chosen video stream (the first one when unset) into `output`.
pub fn convert_stream(
    tools: &FfmpegTools,
    input: &Path,
    stream_index: Option<usize>,
    output: &Path,
) -> std::result::Result<(), String> {
    let map = match stream_index {
        Some(index) => format!("0:{index}"),
        None => "0:v:0".to_string(),
    };
    info!("Converting {:?} stream {} -> {:?}", input, map, output);
    run_convert(tools, &mut convert_command(tools, input, Some(&map), output))
}
fn convert_command(tools: &FfmpegTools, input: &Path, map: Option<&str>, output: &Path) -> Command {
    let mut command = Command::new(&tools.ffmpeg);
    command
        .args(["-v", "error", "-nostdin", "-y", "-i"])
        .arg(input);
    if let Some(map) = map {
        command.args(["-map", map]);
    }
    command.arg(output);
    command
}
fn run_convert(tools: &FfmpegTools, command: &mut Command) -> std::result::Result<(), String> {
    match run_tool(command) {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(tail)) => Err(tail),
        Err(e) => Err(format!("cannot run {:?}: {e}", tools.ffmpeg)),
    }
}
/// Last lines of a child's stderr, collected on a helper thread.
struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    reader: Option<JoinHandle<()>>,
}
impl StderrTail {
    fn spawn(child: &mut Child) -> Self {
        let lines = Arc::new(Mutex::new(VecDeque::new()));
        let reader = child.stderr.take().map(|stderr| {
            let lines = Arc::clone(&lines);
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { continue };
                    if let Ok(mut tail) = lines.lock() {
                        tail.push_back(line);
                        if tail.len() > STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                    }
                }
            })
        });
        Self { lines, reader }
    }
    fn text(&self) -> String {
        self.lines
            .lock()
            .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
    fn join(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.join().ok();
        }
    }
}
/// Kills and reaps a child that is still running.
fn reap(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            child.kill().ok();
            child.wait().ok();
        }
    }
}
/// Decodes one video stream through an `ffmpeg` child.
pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    pts: Option<Vec<f64>>,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: StderrTail,
    timeline: Timeline,
    next_index: u64,
    finished: bool,
}
impl FfmpegSource {
    pub fn open(tools: &FfmpegTools, path: &Path, stream_index: Option<usize>) -> Result<Self> {
        let info = probe(tools, path, stream_index)?;
        let pts = presentation_times(tools, path, info.stream_index)?;
        info!(
            "Opened {:?} stream #{}: {} @ {:.3} fps, {} packet timestamps",
            path,
            info.stream_index,
            info.resolution,
            info.frame_rate,
            pts.as_ref().map_or(0, |p| p.len())
        );
        let mut child = Command::new(&tools.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", &format!("0:{}", info.stream_index)])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-vsync", "passthrough", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                OverlayError::video_open(
                    path,
                    VideoOpenReason::ToolUnavailable(format!("{:?}: {e}", tools.ffmpeg)),
                )
            })?;
        let stderr = StderrTail::spawn(&mut child);
        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(OverlayError::video_open(
                path,
                VideoOpenReason::ToolUnavailable("decoder has no stdout".into()),
            ));
        };
        Ok(Self {
            path: path.to_path_buf(),
            info,
            pts,
            child,
            stdout: BufReader::new(stdout),
            stderr,
            timeline: Timeline::default(),
            next_index: 0,
            finished: false,
        })
    }
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }
    /// Fills `buf` completely; returns how many bytes arrived before EOF.
    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
    fn end_of_stream(&mut self) {
        self.finished = true;
        match self.child.wait() {
            Ok(status) if status.success() => {
                debug!("{:?}: decoder finished after {} frames", self.path, self.next_index)
            }
            Ok(status) => {
                self.stderr.join();
                warn!(
                    "{:?}: decoder stopped early: {}",
                    self.path,
                    tail_of(&self.stderr.text(), status)
                );
            }
            Err(e) => warn!("{:?}: cannot reap decoder: {e}", self.path),
        }
    }
}
impl FrameSource for FfmpegSource {
    fn resolution(&self) -> Resolution {
        self.info.resolution
    }
    fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }
    fn total_frames(&self) -> Option<u64> {
        self.info
            .total_frames
            .or_else(|| self.pts.as_ref().map(|p| p.len() as u64))
    }
    fn has_timestamps(&self) -> bool {
        self.pts.is_some()
    }
    fn seek(&mut self, offset_seconds: f64) -> Result<()> {
        self.timeline.seek(offset_seconds)
    }
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let size = self.info.resolution.bytes_per_frame();
        loop {
            if self.finished {
                return Ok(None);
            }
            let mut data = vec![0u8; size];
            let got = self.read_full(&mut data).map_err(|e| OverlayError::DecodeFrame {
                index: self.next_index,
                reason: format!("decoder pipe failed: {e}"),
            });
            let got = match got {
                Ok(got) => got,
                Err(err) => {
                    self.end_of_stream();
                    return Err(err);
                }
            };
            if got < size {
                if got > 0 {
                    warn!(
                        "{:?}: truncated trailing frame {} ({} of {} bytes), ending stream",
                        self.path, self.next_index, got, size
                    );
                }
                self.end_of_stream();
                return Ok(None);
            }
            let index = self.next_index;
            self.next_index += 1;
            let video_time = self
                .pts
                .as_ref()
                .and_then(|p| p.get(index as usize).copied());
            match self.timeline.admit(index, video_time)? {
                Admit::Discard => continue,
                Admit::Keep(t) => {
                    let frame = Frame::from_rgb24(index, t, self.info.resolution, data).ok_or(
                        OverlayError::DecodeFrame {
                            index,
                            reason: "buffer does not match the frame size".into(),
                        },
                    )?;
                    return Ok(Some(frame));
                }
            }
        }
    }
}
impl Drop for FfmpegSource {
    fn drop(&mut self) {
        reap(&mut self.child);
        self.stderr.join();
        debug!("{:?}: decoder released", self.path);
    }
}
/// Encodes raw frames into a file through an `ffmpeg` child.
pub struct FfmpegSink {
    path: PathBuf,
    resolution: Resolution,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: StderrTail,
    written: u64,
}
impl FfmpegSink {
    pub fn create(
        tools: &FfmpegTools,
        path: &Path,
        resolution: Resolution,
        frame_rate: f64,
    ) -> Result<Self> {
        let mut child = Command::new(&tools.ffmpeg)
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &resolution.to_string(), "-r", &format!("{frame_rate}")])
            .args(["-i", "pipe:0", "-an", "-c:v", "mpeg4", "-q:v", "2"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                OverlayError::PipelineAborted(AbortReason::OutputSink(format!(
                    "cannot run {:?}: {e}",
                    tools.ffmpeg
                )))
            })?;
        let stderr = StderrTail::spawn(&mut child);
        let stdin = child.stdin.take();
        debug!("Encoder for {:?} started ({} @ {frame_rate})", path, resolution);
        Ok(Self {
            path: path.to_path_buf(),
            resolution,
            child,
            stdin,
            stderr,
            written: 0,
        })
    }
    fn failure(&mut self, detail: String) -> OverlayError {
        reap(&mut self.child);
        self.stderr.join();
        let tail = self.stderr.text();
        let detail = if tail.trim().is_empty() {
            detail
        } else {
            format!("{detail}: {}", tail.trim())
        };
        OverlayError::PipelineAborted(AbortReason::OutputSink(detail))
    }
}
impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.resolution() != self.resolution {
            return Err(OverlayError::PipelineAborted(AbortReason::OutputSink(format!(
                "frame {} is {}, encoder expects {}",
                frame.index,
                frame.resolution(),
                self.resolution
            ))));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(OverlayError::PipelineAborted(AbortReason::OutputSink(
                "encoder already closed".into(),
            )));
        };
        if let Err(e) = stdin.write_all(frame.as_rgb24()) {
            return Err(self.failure(format!("writing frame {}: {e}", frame.index)));
        }
        self.written += 1;
        Ok(())
    }
    fn finish(&mut self) -> Result<()> {
        drop(self.stdin.take());
        let status = self.child.wait()?;
        self.stderr.join();
        if !status.success() {
            return Err(OverlayError::PipelineAborted(AbortReason::OutputSink(
                tail_of(&self.stderr.text(), status),
            )));
        }
        info!("Encoded {} frames into {:?}", self.written, self.path);
        Ok(())
    }
}
impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        reap(&mut self.child);
        self.stderr.join();
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    const PROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "sample_rate": "48000"},
            {"index": 1, "codec_type": "video", "width": 1280, "height": 720,
             "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001", "nb_frames": "300"}
        ]
    }"#;
    fn parsed() -> ProbeOutput {
        serde_json::from_str(PROBE_JSON).unwrap()
    }
    #[test]
    fn first_video_stream_is_picked_by_default() {
        let info = parsed().select(None).unwrap();
        assert_eq!(info.stream_index, 1);
        assert_eq!(info.resolution, Resolution::new(1280, 720));
        assert!((info.frame_rate - 29.97).abs() < 0.01);
        assert_eq!(info.total_frames, Some(300));
    }
    #[test]
    fn stream_selection_reasons_are_distinct() {
        let probe = parsed();
        assert_eq!(
            probe.select(Some(0)).unwrap_err(),
            VideoOpenReason::NotAVideoStream {
                index: 0,
                codec_type: "audio".into()
            }
        );
        assert_eq!(
            probe.select(Some(7)).unwrap_err(),
            VideoOpenReason::StreamNotFound(7)
        );
        let audio_only: ProbeOutput =
            serde_json::from_str(r#"{"streams": [{"index": 0, "codec_type": "audio"}]}"#).unwrap();
        assert_eq!(audio_only.select(None).unwrap_err(), VideoOpenReason::NoVideoStream);
    }
    #[test]
    fn rates_parse_as_fractions() {
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("60/2"), Some(30.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("garbage"), None);
    }
    #[test]
    fn packet_times_are_sorted_and_rebased() {
        let packets: ProbePackets = serde_json::from_str(
            r#"{"packets": [{"pts_time": "1.100"}, {"pts_time": "1.000"}, {"pts_time": "1.050"}]}"#,
        )
        .unwrap();
        let times = packet_times(&packets).unwrap();
        assert_eq!(times.len(), 3);
        assert!(times[0].abs() < 1e-12);
        assert!((times[1] - 0.05).abs() < 1e-9);
        assert!((times[2] - 0.1).abs() < 1e-9);
        let missing: ProbePackets =
            serde_json::from_str(r#"{"packets": [{"pts_time": "0.0"}, {}]}"#).unwrap();
        assert!(packet_times(&missing).is_none());
        let empty: ProbePackets = serde_json::from_str("{}").unwrap();
        assert!(packet_times(&empty).is_none());
    }
    #[test]
    fn missing_file_is_an_invalid_path() {
        let err = probe(&FfmpegTools::default(), Path::new("/no/such/clip.mp4"), None).unwrap_err();
        assert!(matches!(
            err,
            OverlayError::VideoOpen {
                reason: VideoOpenReason::InvalidPath,
                ..
            }
        ));
    }
    #[test]
    fn missing_probe_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"not really a video").unwrap();
        let tools = FfmpegTools {
            ffmpeg: dir.path().join("no-ffmpeg"),
            ffprobe: dir.path().join("no-ffprobe"),
        };
        let err = probe(&tools, &clip, None).unwrap_err();
        assert!(matches!(
            err,
            OverlayError::VideoOpen {
                reason: VideoOpenReason::ToolUnavailable(_),
                ..
            }
        ));
    }
    #[test]
    fn quarter_turns_swap_the_frame_size() {
        let rotated: ProbeOutput = serde_json::from_str(
            r#"{"streams": [{"index": 0, "codec_type": "video", "width": 1920, "height": 1080,
                "avg_frame_rate": "30/1",
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}]}"#,
        )
        .unwrap();
        let info = rotated.select(None).unwrap();
        assert_eq!(info.resolution, Resolution::new(1080, 1920));
        let tagged: ProbeOutput = serde_json::from_str(
            r#"{"streams": [{"index": 0, "codec_type": "video", "width": 640, "height": 480,
                "tags": {"rotate": "270"}}]}"#,
        )
        .unwrap();
        assert_eq!(tagged.select(None).unwrap().resolution, Resolution::new(480, 640));
        let upside_down: ProbeOutput = serde_json::from_str(
            r#"{"streams": [{"index": 0, "codec_type": "video", "width": 640, "height": 480,
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": 180}]}]}"#,
        )
        .unwrap();
        assert_eq!(upside_down.select(None).unwrap().resolution, Resolution::new(640, 480));
    }
    #[test]
    fn stream_conversion_maps_one_stream() {
        let tools = FfmpegTools::default();
        let args = |command: Command| -> Vec<String> {
            command
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect()
        };
        let mapped = convert_command(&tools, Path::new("in.avi"), Some("0:2"), Path::new("out.mkv"));
        assert_eq!(
            args(mapped),
            ["-v", "error", "-nostdin", "-y", "-i", "in.avi", "-map", "0:2", "out.mkv"]
        );
        let plain = convert_command(&tools, Path::new("in.avi"), None, Path::new("out.mp4"));
        assert!(!args(plain).contains(&"-map".to_string()));
    }

    // Shell stand-ins for the tools: 2x2 rgb24 frames are 12 bytes each.
    #[cfg(unix)]
    const STREAMS: &str = r#"{"streams": [{"index": 0, "codec_type": "video", "width": 2, "height": 2, "avg_frame_rate": "10/1"}]}"#;
    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
    #[cfg(unix)]
    fn scripted_tools(dir: &Path, packets: &str, ffmpeg: &str) -> FfmpegTools {
        let ffprobe = script(
            dir,
            "fake-ffprobe",
            &format!(
                "case \"$*\" in\n  *pts_time*) printf '%s\\n' '{packets}' ;;\n  *) printf '%s\\n' '{streams}' ;;\nesac",
                streams = STREAMS
            ),
        );
        FfmpegTools {
            ffmpeg: script(dir, "fake-ffmpeg", ffmpeg),
            ffprobe,
        }
    }
    #[cfg(unix)]
    fn clip(dir: &Path) -> PathBuf {
        let clip = dir.join("clip.mp4");
        std::fs::write(&clip, b"x").unwrap();
        clip
    }
    #[cfg(unix)]
    #[test]
    fn decoded_frames_honour_seek_and_stop_on_a_short_read() {
        let dir = tempfile::tempdir().unwrap();
        let tools = scripted_tools(
            dir.path(),
            r#"{"packets": [{"pts_time": "0.0"}, {"pts_time": "0.1"}, {"pts_time": "0.2"}]}"#,
            "head -c 41 /dev/zero",
        );
        let mut source = FfmpegSource::open(&tools, &clip(dir.path()), None).unwrap();
        assert!(source.has_timestamps());
        assert_eq!(source.resolution(), Resolution::new(2, 2));
        assert_eq!(source.total_frames(), Some(3));
        source.seek(0.1).unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            frames.push((frame.index, frame.pts_seconds));
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], (1, 0.0));
        assert_eq!(frames[1].0, 2);
        assert!((frames[1].1 - 0.1).abs() < 1e-9);
        assert!(source.next_frame().unwrap().is_none());
    }
    #[cfg(unix)]
    #[test]
    fn frame_without_a_packet_time_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let tools = scripted_tools(
            dir.path(),
            r#"{"packets": [{"pts_time": "0.0"}]}"#,
            "head -c 24 /dev/zero",
        );
        let mut source = FfmpegSource::open(&tools, &clip(dir.path()), None).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        match source.next_frame() {
            Err(OverlayError::DecodeFrame { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(source.next_frame().unwrap().is_none());
    }
    #[cfg(unix)]
    #[test]
    fn failing_decoder_ends_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let tools = scripted_tools(
            dir.path(),
            r#"{"packets": [{"pts_time": "0.0"}]}"#,
            "echo 'moov atom not found' >&2\nexit 1",
        );
        let mut source = FfmpegSource::open(&tools, &clip(dir.path()), None).unwrap();
        assert!(source.next_frame().unwrap().is_none());
    }
    #[cfg(unix)]
    #[test]
    fn dropping_the_source_kills_the_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let tools = scripted_tools(
            dir.path(),
            r#"{"packets": [{"pts_time": "0.0"}, {"pts_time": "0.1"}]}"#,
            "head -c 12 /dev/zero\nexec sleep 30",
        );
        let mut source = FfmpegSource::open(&tools, &clip(dir.path()), None).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        let pid = source.child.id();
        let started = std::time::Instant::now();
        drop(source);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        if cfg!(target_os = "linux") {
            assert!(!Path::new(&format!("/proc/{pid}")).exists());
        }
    }
    #[cfg(unix)]
    #[test]
    fn sink_streams_raw_frames_to_the_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let tools = scripted_tools(dir.path(), "{}", "for last; do :; done\ncat > \"$last\"");
        let out = dir.path().join("out.avi");
        let resolution = Resolution::new(2, 2);
        let mut sink = FfmpegSink::create(&tools, &out, resolution, 10.0).unwrap();
        for index in 0..2 {
            let frame = Frame::from_rgb24(index, index as f64 * 0.1, resolution, vec![7; 12]).unwrap();
            sink.write_frame(&frame).unwrap();
        }
        let wrong = Frame::from_rgb24(2, 0.2, Resolution::new(1, 1), vec![0; 3]).unwrap();
        assert!(sink.write_frame(&wrong).is_err());
        sink.finish().unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), vec![7; 24]);
    }
    #[cfg(unix)]
    #[test]
    fn encoder_failure_surfaces_its_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tools = scripted_tools(
            dir.path(),
            "{}",
            "cat > /dev/null\necho 'muxer exploded' >&2\nexit 3",
        );
        let out = dir.path().join("out.avi");
        let resolution = Resolution::new(2, 2);
        let mut sink = FfmpegSink::create(&tools, &out, resolution, 10.0).unwrap();
        let frame = Frame::from_rgb24(0, 0.0, resolution, vec![0; 12]).unwrap();
        sink.write_frame(&frame).unwrap();
        let err = sink.finish().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PipelineAborted);
        assert!(err.to_string().contains("muxer exploded"));
    }
}
