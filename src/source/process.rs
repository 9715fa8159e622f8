use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::landmarks::HandFrame;

use super::{parse_detection, DetectorOptions, LandmarkSource};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    ready: bool,
    width: u32,
    height: u32,
}

/// External hand-landmark detector running as a child process.
///
/// The detector owns the camera. It is started with the detector options and
/// the requested video size as flags, answers with a one-line JSON handshake
/// carrying the negotiated frame size, then replies to each
/// `{"timestampMs": N}` request with one detection result line.
///
/// The child is killed when this value is dropped.
pub struct DetectorProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    options: DetectorOptions,
    frame_size: (u32, u32),
}

impl DetectorProcess {
    pub fn spawn(
        program: &str,
        extra_args: &[String],
        options: DetectorOptions,
        requested_size: (u32, u32),
    ) -> Result<Self> {
        log_info!("Starting hand detector: {program}");

        let mut child = Command::new(program)
            .args(extra_args)
            .args(options.to_args())
            .arg("--width")
            .arg(requested_size.0.to_string())
            .arg("--height")
            .arg(requested_size.1.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start detector '{program}'"))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                bail!("detector pipes unavailable");
            }
        };

        let mut process = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            options,
            frame_size: requested_size,
        };

        // `process` is dropped (and the child killed) if the handshake fails.
        let handshake: Handshake = serde_json::from_str(&process.read_line()?)
            .context("detector handshake was not valid JSON")?;
        if !handshake.ready {
            bail!("detector reported not ready");
        }
        if handshake.width == 0 || handshake.height == 0 {
            bail!(
                "detector negotiated an empty frame {}x{}",
                handshake.width,
                handshake.height
            );
        }
        process.frame_size = (handshake.width, handshake.height);

        log_info!(
            "Hand detector ready ({}x{})",
            handshake.width,
            handshake.height
        );

        Ok(process)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .context("failed to read from detector")?;
        if read == 0 {
            return Err(anyhow!("detector closed its output"));
        }
        Ok(line)
    }
}

impl LandmarkSource for DetectorProcess {
    fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    fn detect(&mut self, timestamp_ms: u64) -> Result<Option<HandFrame>> {
        writeln!(self.stdin, r#"{{"timestampMs":{timestamp_ms}}}"#)
            .context("failed to send frame request")?;
        self.stdin.flush().context("failed to flush frame request")?;

        let line = self.read_line()?;
        parse_detection(&line, &self.options)
    }
}

impl Drop for DetectorProcess {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            log_warn!("failed to stop detector: {err}");
        }
        let _ = self.child.wait();
        log_info!("Hand detector released");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".into(), script.into(), "detector".into()]
    }

    #[test]
    fn handshake_sets_negotiated_size() {
        let script = r#"echo '{"ready":true,"width":1280,"height":720}'; while read req; do echo '{"hands":[]}'; done"#;
        let mut detector =
            DetectorProcess::spawn("sh", &sh(script), DetectorOptions::default(), (640, 480))
                .unwrap();
        assert_eq!(detector.frame_size(), (1280, 720));
        assert_eq!(detector.detect(16).unwrap(), None);
        assert_eq!(detector.detect(33).unwrap(), None);
    }

    #[test]
    fn missing_handshake_fails_to_start() {
        let result = DetectorProcess::spawn("sh", &sh("exit 0"), DetectorOptions::default(), (640, 480));
        assert!(result.is_err());
    }

    #[test]
    fn not_ready_fails_to_start() {
        let script = r#"echo '{"ready":false,"width":640,"height":480}'"#;
        let result = DetectorProcess::spawn("sh", &sh(script), DetectorOptions::default(), (640, 480));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_program_fails_to_start() {
        let result = DetectorProcess::spawn(
            "/nonexistent/palm-detector",
            &[],
            DetectorOptions::default(),
            (640, 480),
        );
        assert!(result.is_err());
    }
}
