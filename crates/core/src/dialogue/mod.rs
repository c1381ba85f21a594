//! Dialogue script parsing.
//!
//! A script is plain text where every spoken line starts with `Host1:` or
//! `Host2:`. Anything else is formatting noise from the script generator and
//! is dropped.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Speaker {
    Host1,
    Host2,
}

impl Speaker {
    pub const ALL: [Speaker; 2] = [Speaker::Host1, Speaker::Host2];

    pub fn as_str(self) -> &'static str {
        match self {
            Speaker::Host1 => "Host1",
            Speaker::Host2 => "Host2",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Speaker::Host1 => "Host1:",
            Speaker::Host2 => "Host2:",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One spoken line. `index` is 1-based and strictly increasing in source order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogueTurn {
    pub index: usize,
    pub speaker: Speaker,
    pub text: String,
}

pub fn parse(script: &str) -> Vec<DialogueTurn> {
    let mut turns = Vec::new();
    let mut skipped = 0usize;

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_line(trimmed) {
            Some((speaker, text)) => turns.push(DialogueTurn {
                index: turns.len() + 1,
                speaker,
                text: text.to_owned(),
            }),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, turns = turns.len(), "dropped lines without a speaker tag");
    }

    turns
}

fn parse_line(line: &str) -> Option<(Speaker, &str)> {
    let speaker = Speaker::ALL
        .into_iter()
        .find(|s| line.starts_with(s.prefix()))?;
    let text = line[speaker.prefix().len()..].trim();
    if text.is_empty() {
        return None;
    }
    Some((speaker, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_untagged_and_empty_lines() {
        let turns = parse("Host1:\nRandom line\nHost2: hi");
        assert_eq!(
            turns,
            vec![DialogueTurn {
                index: 1,
                speaker: Speaker::Host2,
                text: "hi".to_owned(),
            }]
        );
    }

    #[test]
    fn preserves_source_order_and_numbers_from_one() {
        let script = "Host1: Hello there\n\n  \nHost2: Indeed it is\n[laughs]\nHost1: Right";
        let turns = parse(script);
        let summary: Vec<_> = turns
            .iter()
            .map(|t| (t.index, t.speaker, t.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, Speaker::Host1, "Hello there"),
                (2, Speaker::Host2, "Indeed it is"),
                (3, Speaker::Host1, "Right"),
            ]
        );
    }

    #[test]
    fn prefix_is_case_sensitive_and_needs_colon() {
        assert!(parse("host1: nope\nHOST2: nope\nHost1 nope\nHost3: nope").is_empty());
    }

    #[test]
    fn text_keeps_later_colons() {
        let turns = parse("Host2: Note: this matters\r\n");
        assert_eq!(turns[0].text, "Note: this matters");
    }

    #[test]
    fn leading_whitespace_before_tag_is_tolerated() {
        let turns = parse("   Host1:   padded   ");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "padded");
    }

    #[test]
    fn empty_script_yields_no_turns() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n**Podcast Script**\n").is_empty());
    }
}
