//! End-to-end runs against scripted stand-ins for ffmpeg, ffprobe and
//! flvmeta.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ffkit_av::{
    Category, Engine, Error, Event, InputStream, OutputStream, PipeOptions, ProcessFailure,
    Session, ToolPaths,
};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

const FAKE_FFMPEG: &str = r#"#!/bin/sh
case "$1" in
  -formats)
    printf ' DE avi  AVI\n DE mp4  MP4\n DE flv  FLV\n  E null  Null\n'
    exit 0 ;;
  -encoders)
    printf ' V..... libx264  H.264\n A..... aac  AAC\n A..X.. vorbis  Vorbis\n'
    exit 0 ;;
esac
if [ -n "$ARGS_FILE" ]; then
  printf '%s\n' "$@" > "$ARGS_FILE"
fi
for arg in "$@"; do
  case "$arg" in
    fail.mp4)
      echo "[mp4 @ 0x1] setting up" >&2
      echo "Unknown encoder 'nope'" >&2
      exit 1 ;;
    slow.mp4)
      exec sleep 10 ;;
    chatty.mp4)
      CHATTY=1 ;;
    pipe:0)
      cat > "$STDIN_COPY" ;;
    pipe:1)
      printf 'encoded bytes' ;;
  esac
done
cat >&2 <<'EOF'
ffmpeg version 6.0
Input #0, avi, from 'in.avi':
  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s
    Stream #0:0: Video: mpeg4, yuv420p, 320x240
    Stream #0:1: Audio: mp3, 44100 Hz, stereo
Stream mapping:
frame=   25 fps= 25 q=0.0 size=     100kB time=00:00:05.00 bitrate= 163.8kbits/s
EOF
if [ -n "$CHATTY" ]; then
  i=0
  while [ $i -lt 400 ]; do
    echo "[mp4 @ 0x1] chatter $i" >&2
    i=$((i + 1))
  done
fi
exit 0
"#;

const FAKE_FFPROBE: &str = r#"#!/bin/sh
printf '[FORMAT]\nfilename=in.avi\nduration=10.000000\n[/FORMAT]\n'
"#;

const SILENT_TOOL: &str = "#!/bin/sh\nexit 0\n";

const FAKE_FLVMETA: &str = r#"#!/bin/sh
echo "$@" > "$(dirname "$2")/flvmeta.log"
"#;

const BROKEN_FLVMETA: &str = r#"#!/bin/sh
echo "cannot open file" >&2
exit 3
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct FakeEngine {
    dir: TempDir,
    engine: Arc<Engine>,
}

impl FakeEngine {
    fn new() -> Self {
        Self::with_flvmeta(FAKE_FLVMETA)
    }

    fn with_flvmeta(flvmeta: &str) -> Self {
        Self::with_tools(FAKE_FFMPEG, FAKE_FFPROBE, flvmeta)
    }

    fn with_tools(ffmpeg: &str, ffprobe: &str, flvmeta: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = ToolPaths {
            ffmpeg: Some(write_script(dir.path(), "ffmpeg", ffmpeg)),
            ffprobe: Some(write_script(dir.path(), "ffprobe", ffprobe)),
            flvtool: Some(write_script(dir.path(), "flvmeta", flvmeta)),
        };
        Self {
            dir,
            engine: Arc::new(Engine::new(paths)),
        }
    }

    fn session(&self) -> Session {
        let mut session = Session::with_engine(self.engine.clone());
        session.env("ARGS_FILE", self.args_file().display().to_string());
        session
    }

    fn args_file(&self) -> PathBuf {
        self.dir.path().join("args.txt")
    }

    fn recorded_args(&self) -> Vec<String> {
        fs::read_to_string(self.args_file())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[tokio::test]
async fn run_passes_assembled_arguments() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session
        .input("in.avi")
        .output("out.mp4")
        .video_codec("libx264")
        .audio_codec("aac");

    let captured = session.run().await.unwrap();
    assert!(captured.stderr.contains("Stream mapping:"));
    assert_eq!(
        fake.recorded_args(),
        vec!["-i", "in.avi", "-y", "-acodec", "aac", "-vcodec", "libx264", "out.mp4"]
    );
}

#[tokio::test]
async fn experimental_encoders_are_enabled() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.input("in.avi").output("out.mp4").audio_codec("vorbis");

    session.run().await.unwrap();
    let args = fake.recorded_args().join(" ");
    assert!(args.contains("-acodec vorbis -strict experimental"), "{args}");
}

#[tokio::test]
async fn experimental_encoders_are_enabled_without_validation() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session
        .validate_capabilities(false)
        .input("in.avi")
        .output("out.mp4")
        .audio_codec("vorbis");

    session.run().await.unwrap();
    let args = fake.recorded_args().join(" ");
    assert!(args.contains("-acodec vorbis -strict experimental"), "{args}");
}

#[tokio::test]
async fn missing_encoder_listing_is_tolerated_without_validation() {
    let fake = FakeEngine::with_tools(
        &FAKE_FFMPEG.replace("  -encoders)\n", "  -encoders)\n    exit 1\n"),
        FAKE_FFPROBE,
        FAKE_FLVMETA,
    );
    let mut session = fake.session();
    session
        .validate_capabilities(false)
        .input("in.avi")
        .output("out.mp4")
        .audio_codec("vorbis");

    session.run().await.unwrap();
    assert!(!fake.recorded_args().contains(&"experimental".to_string()));
}

#[tokio::test]
async fn events_are_broadcast() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.input("in.avi").output("out.mp4");
    let mut events = session.subscribe();

    session.run().await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    match &received[0] {
        Event::Start { command_line } => assert!(command_line.contains("-i in.avi")),
        other => panic!("expected start event, got {other:?}"),
    }

    let codec_data = received
        .iter()
        .find_map(|e| match e {
            Event::CodecData(records) => Some(records),
            _ => None,
        })
        .expect("codec data event");
    assert_eq!(codec_data[0].format, "avi");
    assert_eq!(codec_data[0].video, "mpeg4");
    assert_eq!(codec_data[0].audio, "mp3");

    let progress = received
        .iter()
        .find_map(|e| match e {
            Event::Progress(progress) => Some(progress),
            _ => None,
        })
        .expect("progress event");
    assert_eq!(progress.frames, 25);
    assert_eq!(progress.timemark, "00:00:05.00");
    // Duration comes from the probe: 5s of 10s.
    assert_eq!(progress.percent, Some(50.0));

    assert!(received
        .iter()
        .any(|e| matches!(e, Event::Stderr(line) if line == "Stream mapping:")));
}

#[tokio::test]
async fn slow_subscriber_keeps_one_shot_events() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.input("in.avi").output("chatty.mp4");
    let mut events = session.subscribe();

    // Nothing is read until the run has finished.
    session.run().await.unwrap();
    drop(session);

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }

    assert!(matches!(received[0], Event::Start { .. }));
    assert_eq!(
        received
            .iter()
            .filter(|e| matches!(e, Event::CodecData(_)))
            .count(),
        1
    );
    let chatter = received
        .iter()
        .filter(|e| matches!(e, Event::Stderr(line) if line.contains("chatter")))
        .count();
    assert_eq!(chatter, 400);
}

#[tokio::test]
async fn failing_engine_reports_exit_code_and_message() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.input("in.avi").output("fail.mp4");

    let err = session.run().await.unwrap_err();
    match err.failure() {
        Some(ProcessFailure::ExitCode { code, message, .. }) => {
            assert_eq!(*code, 1);
            assert!(message.contains("Unknown encoder 'nope'"), "{message}");
            assert!(!message.contains("setting up"));
        }
        other => panic!("unexpected failure {other:?}"),
    }
    assert!(err.stderr().unwrap().contains("[mp4 @ 0x1]"));
}

#[tokio::test]
async fn unavailable_format_fails_before_spawning() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.input("in.avi").output("out.xyz").format("xyz");

    let err = session.run().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Unavailable {
            category: Category::OutputFormat,
            ..
        }
    ));
    assert!(!fake.args_file().exists());
}

#[tokio::test]
async fn unreadable_format_listing_is_a_parse_error() {
    let fake = FakeEngine::with_tools(SILENT_TOOL, FAKE_FFPROBE, FAKE_FLVMETA);
    let mut session = fake.session();
    session.input("in.avi").output("out.mp4").format("mp4");

    let err = session.run().await.unwrap_err();
    match err {
        Error::ParseError { tool, message } => {
            assert_eq!(tool, "ffmpeg");
            assert!(message.contains("-formats"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!fake.args_file().exists());
}

#[tokio::test]
async fn unavailable_codec_fails_before_spawning() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.input("in.avi").output("out.mp4").video_codec("libnope");

    let err = session.run().await.unwrap_err();
    assert_eq!(err.to_string(), "Video codec libnope is not available");
    assert!(!fake.args_file().exists());
}

#[tokio::test]
async fn validation_can_be_disabled() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session
        .validate_capabilities(false)
        .input("in.avi")
        .output("out.xyz")
        .format("xyz");

    session.run().await.unwrap();
    assert!(fake.recorded_args().contains(&"xyz".to_string()));
}

#[tokio::test]
async fn kill_handle_stops_the_engine() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.validate_capabilities(false).input("in.avi").output("slow.mp4");
    let handle = session.kill_handle();
    assert!(!handle.is_running());
    assert!(!handle.kill());

    let run = tokio::spawn(async move { session.run().await });
    while !handle.is_running() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(handle.kill());

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err.failure(), Some(ProcessFailure::Signal { .. })));
    assert!(!handle.is_running());
}

#[tokio::test]
async fn timeout_stops_the_engine() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session
        .validate_capabilities(false)
        .timeout(Duration::from_millis(200))
        .input("in.avi")
        .output("slow.mp4");

    let err = session.run().await.unwrap_err();
    assert!(matches!(err.failure(), Some(ProcessFailure::Timeout(_))));
}

#[tokio::test]
async fn streams_feed_stdin_and_drain_stdout() {
    let fake = FakeEngine::new();
    let stdin_copy = fake.dir.path().join("stdin.bin");
    let (writer, mut reader) = tokio::io::duplex(64 * 1024);

    let mut session = fake.session();
    session.env("STDIN_COPY", stdin_copy.display().to_string());
    session
        .input_stream(InputStream::new(std::io::Cursor::new(b"raw input".to_vec())))
        .unwrap()
        .output_stream(OutputStream::new(writer), PipeOptions::default())
        .unwrap()
        .format("avi");

    let captured = session.run().await.unwrap();
    assert!(captured.stdout.is_empty());

    let mut produced = String::new();
    reader.read_to_string(&mut produced).await.unwrap();
    assert_eq!(produced, "encoded bytes");
    assert_eq!(fs::read(&stdin_copy).unwrap(), b"raw input");
    assert!(fake.recorded_args().contains(&"pipe:0".to_string()));
}

#[tokio::test]
async fn consumed_stream_is_rejected() {
    let fake = FakeEngine::new();
    let stream = InputStream::new(std::io::Cursor::new(Vec::new()));

    let mut first = fake.session();
    first
        .validate_capabilities(false)
        .input_stream(stream.clone())
        .unwrap()
        .output("out.mp4");
    first.env("STDIN_COPY", fake.dir.path().join("a.bin").display().to_string());
    first.run().await.unwrap();
    assert!(stream.is_consumed());

    let mut second = fake.session();
    second
        .validate_capabilities(false)
        .input_stream(stream)
        .unwrap()
        .output("out.mp4");
    assert!(matches!(
        second.run().await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn flv_outputs_get_metadata_updated() {
    let fake = FakeEngine::new();
    let target = fake.dir.path().join("out.flv");
    let mut session = fake.session();
    session
        .input("in.avi")
        .output(target.display().to_string())
        .update_flv_metadata();

    session.run().await.unwrap();
    let log = fs::read_to_string(fake.dir.path().join("flvmeta.log")).unwrap();
    assert_eq!(log.trim(), format!("-U {}", target.display()));
}

#[tokio::test]
async fn failing_metadata_update_is_a_post_process_error() {
    let fake = FakeEngine::with_flvmeta(BROKEN_FLVMETA);
    let target = fake.dir.path().join("out.flv");
    let mut session = fake.session();
    session
        .input("in.avi")
        .output(target.display().to_string())
        .update_flv_metadata();

    let err = session.run().await.unwrap_err();
    match err.failure() {
        Some(ProcessFailure::PostProcess { target: t, .. }) => {
            assert_eq!(t, &target.display().to_string());
        }
        other => panic!("unexpected failure {other:?}"),
    }
    // The engine's own output is still reported.
    assert!(err.stderr().unwrap().contains("Stream mapping:"));
}

#[tokio::test]
async fn probe_reads_format_duration() {
    let fake = FakeEngine::new();
    let mut session = fake.session();
    session.input("in.avi");

    let data = session.probe(0, &[]).await.unwrap();
    assert_eq!(data.duration(), Some(10.0));
    assert_eq!(data.format.get_str("filename"), Some("in.avi"));
}

#[tokio::test]
async fn empty_ffprobe_output_is_a_parse_error() {
    let fake = FakeEngine::with_tools(FAKE_FFMPEG, SILENT_TOOL, FAKE_FLVMETA);
    let mut session = fake.session();
    session.input("in.avi");

    let err = session.probe(0, &[]).await.unwrap_err();
    assert!(
        matches!(&err, Error::ParseError { tool, .. } if tool == "ffprobe"),
        "{err:?}"
    );
}
