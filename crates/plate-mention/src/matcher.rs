use std::ops::Range;

use plate_core::{LEAF_SENTINEL, clamp_to_char_boundary};

use crate::config::{DEFAULT_LOOKBACK, DEFAULT_TRIGGER, MentionConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    /// Byte range of the run, trigger char included.
    pub range: Range<usize>,
    /// Run text without the trigger char.
    pub query: String,
}

/// Finds the trigger run covering a cursor in a block's leaf text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatcher {
    trigger: char,
    allow_spaces: bool,
    lookback: usize,
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER)
    }
}

pub(crate) fn is_boundary(ch: char) -> bool {
    ch.is_whitespace() || ch == '\0' || ch == LEAF_SENTINEL
}

impl TriggerMatcher {
    pub fn new(trigger: char) -> Self {
        Self {
            trigger,
            allow_spaces: true,
            lookback: DEFAULT_LOOKBACK,
        }
    }

    pub fn from_config(config: &MentionConfig) -> Self {
        Self::new(config.trigger)
            .allow_spaces(config.allow_spaces)
            .lookback(config.lookback)
    }

    pub fn allow_spaces(mut self, allow_spaces: bool) -> Self {
        self.allow_spaces = allow_spaces;
        self
    }

    pub fn lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn trigger(&self) -> char {
        self.trigger
    }

    /// Scans `text` from `lookback` bytes before `cursor` and returns the
    /// first qualifying run with `from < cursor <= to`.
    ///
    /// Runs never overlap: one that fails to qualify still consumes its span
    /// before scanning resumes.
    pub fn find(&self, text: &str, cursor: usize) -> Option<TriggerMatch> {
        if text.is_empty() {
            return None;
        }
        let cursor = clamp_to_char_boundary(text, cursor);
        let start = clamp_to_char_boundary(text, cursor.saturating_sub(self.lookback));
        let window = &text[start..];
        let chars: Vec<(usize, char)> = window.char_indices().collect();

        let mut ix = 0;
        while ix < chars.len() {
            let (offset, ch) = chars[ix];
            if ch != self.trigger {
                ix += 1;
                continue;
            }

            let qualifies = ix == 0 || is_boundary(chars[ix - 1].1);
            let end_ix = self.run_end(&chars, ix);
            let end = chars.get(end_ix).map_or(window.len(), |(o, _)| *o);

            let from = start + offset;
            let to = start + end;
            if qualifies && from < cursor && cursor <= to {
                return Some(TriggerMatch {
                    range: from..to,
                    query: text[from + ch.len_utf8()..to].to_string(),
                });
            }
            if from >= cursor {
                return None;
            }
            ix = end_ix;
        }
        None
    }

    /// Index of the first char after the run starting at `start`.
    fn run_end(&self, chars: &[(usize, char)], start: usize) -> usize {
        let mut ix = start + 1;
        while let Some(&(_, ch)) = chars.get(ix) {
            if self.allow_spaces {
                if ch == '\n' || ch == '\0' || ch == LEAF_SENTINEL {
                    break;
                }
                // A single space right before the next trigger stays with this run.
                if ch.is_whitespace() && chars.get(ix + 1).is_some_and(|&(_, n)| n == self.trigger)
                {
                    return ix + 1;
                }
            } else if ch.is_whitespace() || ch == self.trigger {
                break;
            }
            ix += 1;
        }
        ix
    }
}
