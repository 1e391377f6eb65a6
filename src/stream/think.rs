//! `<think>` marker injection around reasoning text.

use super::sse::Fragment;

pub const THINK_START: &str = "<think>";
pub const THINK_END: &str = "</think>";

/// Where the stream is relative to the reasoning segment.
///
/// Transitions only move forward: `NotStarted -> InReasoning -> Finished`,
/// or straight `NotStarted -> Finished` when no reasoning is ever sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkState {
    #[default]
    NotStarted,
    InReasoning,
    Finished,
}

impl ThinkState {
    /// Reasoning fields are only looked at until final content begins.
    #[must_use]
    pub fn inspects_reasoning(self) -> bool {
        self != ThinkState::Finished
    }

    /// Advance the state for `fragment` and return the text to emit, with a
    /// `<think>` or `</think>` marker prepended on the transitions that need one.
    ///
    /// A reasoning fragment arriving after `Finished` yields an empty string.
    pub fn apply(&mut self, fragment: Fragment) -> String {
        let Fragment { text, reasoning } = fragment;
        match (*self, reasoning) {
            (ThinkState::NotStarted, true) => {
                *self = ThinkState::InReasoning;
                prefixed(THINK_START, &text)
            }
            (ThinkState::InReasoning, true) => text,
            (ThinkState::Finished, true) => String::new(),
            (ThinkState::InReasoning, false) => {
                *self = ThinkState::Finished;
                prefixed(THINK_END, &text)
            }
            (ThinkState::NotStarted | ThinkState::Finished, false) => {
                *self = ThinkState::Finished;
                text
            }
        }
    }
}

fn prefixed(marker: &str, text: &str) -> String {
    let mut out = String::with_capacity(marker.len() + text.len());
    out.push_str(marker);
    out.push_str(text);
    out
}
