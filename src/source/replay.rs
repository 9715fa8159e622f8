use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::landmarks::HandFrame;

use super::{parse_detection, DetectorOptions, LandmarkSource};

/// Replays a recorded detection log, one JSON result per line, one line per
/// frame. Blank lines are treated as frames without a hand.
pub struct ReplaySource {
    lines: Vec<String>,
    cursor: usize,
    options: DetectorOptions,
    frame_size: (u32, u32),
}

impl ReplaySource {
    pub fn open(path: &Path, options: DetectorOptions, frame_size: (u32, u32)) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read detection log {}", path.display()))?;
        Ok(Self::from_lines(
            contents.lines().map(str::to_owned).collect(),
            options,
            frame_size,
        ))
    }

    pub fn from_lines(lines: Vec<String>, options: DetectorOptions, frame_size: (u32, u32)) -> Self {
        Self {
            lines,
            cursor: 0,
            options,
            frame_size,
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len().saturating_sub(self.cursor)
    }
}

impl LandmarkSource for ReplaySource {
    fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    fn detect(&mut self, _timestamp_ms: u64) -> Result<Option<HandFrame>> {
        let Some(line) = self.lines.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        if line.trim().is_empty() {
            return Ok(None);
        }
        parse_detection(line, &self.options)
            .with_context(|| format!("detection log line {}", self.cursor))
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn hand_line(x: f64) -> String {
        let point = format!(r#"{{"x":{x},"y":0.5,"z":0.0}}"#);
        format!(
            r#"{{"hands":[{{"score":0.9,"landmarks":[{}]}}]}}"#,
            vec![point; 21].join(",")
        )
    }

    #[test]
    fn replays_lines_in_order() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", hand_line(0.25)).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"hands":[]}}"#).unwrap();
        writeln!(file, "{}", hand_line(0.75)).unwrap();

        let mut replay =
            ReplaySource::open(file.path(), DetectorOptions::default(), (640, 480)).unwrap();
        assert_eq!(replay.remaining(), 4);

        assert_eq!(replay.detect(0).unwrap().unwrap().wrist().x, 0.25);
        assert_eq!(replay.detect(16).unwrap(), None);
        assert_eq!(replay.detect(33).unwrap(), None);
        assert!(!replay.is_exhausted());
        assert_eq!(replay.detect(50).unwrap().unwrap().wrist().x, 0.75);
        assert!(replay.is_exhausted());
        assert_eq!(replay.detect(66).unwrap(), None);
    }

    #[test]
    fn bad_line_reports_its_position() {
        let mut replay = ReplaySource::from_lines(
            vec![hand_line(0.5), "{oops".into()],
            DetectorOptions::default(),
            (640, 480),
        );
        assert!(replay.detect(0).is_ok());
        let err = replay.detect(16).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn missing_file_fails_to_open() {
        let result = ReplaySource::open(
            Path::new("/nonexistent/detections.jsonl"),
            DetectorOptions::default(),
            (640, 480),
        );
        assert!(result.is_err());
    }
}
