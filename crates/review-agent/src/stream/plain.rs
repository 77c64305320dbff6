//! Unstructured stdout: every non-blank line is assistant text.

use super::{text_event, LineContext, LineParser};
use crate::types::NormalizedStreamEvent;

pub struct PlainLineParser;

impl LineParser for PlainLineParser {
    fn parse_line(&mut self, line: &str, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        text_event(line, ctx)
    }
}
