//! Decoded-scan input.
//!
//! The external decoder writes one line per captured frame: an empty line
//! when the frame held no code, the decoded text otherwise. Lines starting
//! with `!` are operator commands.

use std::{fmt, io, path::Path, str::FromStr};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Split};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Reload the roster, then sweep.
    Refresh,
    /// Wipe local state, then reload the roster.
    Reset,
    Stats,
    Online,
    Offline,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refresh" => Ok(Self::Refresh),
            "reset" => Ok(Self::Reset),
            "stats" => Ok(Self::Stats),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// A frame with no code in it.
    NoCode,
    Scan(String),
    Command(OperatorCommand),
    UnknownCommand(String),
}

impl InputLine {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return InputLine::NoCode;
        }
        match trimmed.trim_start().strip_prefix('!') {
            Some(command) => match command.parse() {
                Ok(command) => InputLine::Command(command),
                Err(unknown) => InputLine::UnknownCommand(unknown),
            },
            None => InputLine::Scan(trimmed.to_string()),
        }
    }
}

/// Newline-separated frames from the decoder.
///
/// Byte-mode codes need not be UTF-8. Such a frame is decoded lossily and
/// handed on like any other, so it is rejected as a badge instead of ending
/// the session.
pub struct InputLines {
    frames: Split<Box<dyn AsyncBufRead + Unpin + Send>>,
}

impl InputLines {
    /// Next frame without its trailing newline; `None` at end of input.
    /// Cancel safe.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let Some(frame) = self.frames.next_segment().await? else {
            return Ok(None);
        };

        match String::from_utf8(frame) {
            Ok(line) => Ok(Some(line)),
            Err(err) => {
                debug!(bytes = err.as_bytes().len(), "frame is not valid UTF-8");
                Ok(Some(String::from_utf8_lossy(err.as_bytes()).into_owned()))
            }
        }
    }
}

impl fmt::Debug for InputLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputLines").finish_non_exhaustive()
    }
}

pub fn from_reader<R>(reader: R) -> InputLines
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(BufReader::new(reader));
    InputLines {
        frames: reader.split(b'\n'),
    }
}

pub fn stdin() -> InputLines {
    from_reader(tokio::io::stdin())
}

pub async fn open_file(path: &Path) -> io::Result<InputLines> {
    let file = tokio::fs::File::open(path).await?;
    Ok(from_reader(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frames_carry_no_code() {
        assert_eq!(InputLine::parse(""), InputLine::NoCode);
        assert_eq!(InputLine::parse("   \r"), InputLine::NoCode);
    }

    #[test]
    fn decoded_text_is_passed_through() {
        assert_eq!(
            InputLine::parse("id : 1, status : approved\r"),
            InputLine::Scan("id : 1, status : approved".into())
        );
    }

    #[test]
    fn bang_lines_are_commands() {
        assert_eq!(
            InputLine::parse("!refresh"),
            InputLine::Command(OperatorCommand::Refresh)
        );
        assert_eq!(
            InputLine::parse("  !OFFLINE "),
            InputLine::Command(OperatorCommand::Offline)
        );
        assert_eq!(
            InputLine::parse("!dance"),
            InputLine::UnknownCommand("dance".into())
        );
    }

    #[tokio::test]
    async fn reads_lines_from_any_reader() {
        let mut lines = from_reader(&b"id : 1\n\n!quit\n"[..]);
        let mut parsed = Vec::new();
        while let Some(line) = lines.next_line().await.expect("read") {
            parsed.push(InputLine::parse(&line));
        }
        assert_eq!(
            parsed,
            vec![
                InputLine::Scan("id : 1".into()),
                InputLine::NoCode,
                InputLine::Command(OperatorCommand::Quit),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_frame_does_not_end_input() {
        let mut lines = from_reader(&b"\xff\xfe garbage\r\nid : 1\n"[..]);

        let garbled = lines.next_line().await.expect("read").expect("frame");
        assert!(matches!(InputLine::parse(&garbled), InputLine::Scan(text) if text.ends_with(" garbage")));

        let next = lines.next_line().await.expect("read").expect("frame");
        assert_eq!(InputLine::parse(&next), InputLine::Scan("id : 1".into()));
        assert!(lines.next_line().await.expect("read").is_none());
    }
}
