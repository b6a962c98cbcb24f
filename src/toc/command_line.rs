use std::fmt::{Debug, Formatter};

use crate::flap::frame::Frame;


/// A colon delimited server command, e.g. `IM_IN2:bob:F:F:hello: world`. Free text is always the
///  last field, and since it may contain colons itself, it is reassembled with [CommandLine::tail].
#[derive(Clone, Eq, PartialEq)]
pub struct CommandLine {
    fields: Vec<String>,
}
impl Debug for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommandLine{{{:?}}}", self.fields.join(":"))
    }
}

impl CommandLine {
    pub fn parse(text: &str) -> CommandLine {
        CommandLine {
            fields: text.split(':').map(|s| s.to_string()).collect(),
        }
    }

    /// Data frame payloads are text, possibly NUL terminated
    pub fn from_frame(frame: &Frame) -> CommandLine {
        let text = String::from_utf8_lossy(&frame.payload);
        Self::parse(text.trim_end_matches('\0'))
    }

    pub fn name(&self) -> &str {
        &self.fields[0]
    }

    /// Positional arguments, i.e. fields after the command name, starting at 0
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.fields.get(index + 1).map(|s| s.as_str())
    }

    pub fn args(&self) -> Vec<&str> {
        self.fields[1..].iter().map(|s| s.as_str()).collect()
    }

    pub fn num_args(&self) -> usize {
        self.fields.len() - 1
    }

    /// All arguments from `index` on, joined with `:` again. Empty if there are no such arguments.
    pub fn tail(&self, index: usize) -> String {
        self.fields.get(index + 1..)
            .map(|rest| rest.join(":"))
            .unwrap_or_default()
    }

    pub fn text(&self) -> String {
        self.fields.join(":")
    }
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::flap::frame::FrameKind;

    use super::*;

    #[test]
    fn test_parse() {
        let line = CommandLine::parse("IM_IN2:Bob:F:F:see you at 10:30: ok?");
        assert_eq!(line.name(), "IM_IN2");
        assert_eq!(line.arg(0), Some("Bob"));
        assert_eq!(line.arg(2), Some("F"));
        assert_eq!(line.tail(3), "see you at 10:30: ok?");
        assert_eq!(line.num_args(), 6);
        assert_eq!(line.text(), "IM_IN2:Bob:F:F:see you at 10:30: ok?");
    }

    #[rstest]
    #[case::name_only("PAUSE", 0, "")]
    #[case::beyond_end("NICK:Bob", 5, "")]
    #[case::empty_fields("X:::", 1, ":")]
    fn test_tail(#[case] text: &str, #[case] index: usize, #[case] expected: &str) {
        assert_eq!(CommandLine::parse(text).tail(index), expected);
    }

    #[test]
    fn test_from_frame_strips_nul() {
        let line = CommandLine::from_frame(&Frame::new(FrameKind::Data, 1, &b"SIGN_ON:TOC2.0\0"[..]));
        assert_eq!(line.args(), vec!["TOC2.0"]);
        assert_eq!(CommandLine::parse("").name(), "");
    }
}
