//! `CombatSplitter` — consumes a reverse-chronological stream of `LogLine`s
//! and `byte_position` markers from the `BackwardReader`, emitting `Combat`
//! boundaries on inactivity gaps (spec.md §4.3).

use crate::line::LogLine;
use chrono::NaiveDateTime;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub inactivity_gap: f64,
    pub combat_min_lines: usize,
    pub banned_event_names: Vec<String>,
    pub max_combats: Option<usize>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        SplitterConfig {
            inactivity_gap: 100.0,
            combat_min_lines: 20,
            banned_event_names: vec!["Electrical Overload".to_string()],
            max_combats: None,
        }
    }
}

/// One fully bounded span, still in reverse-chronological line order; the
/// Orchestrator reverses `lines` before handing them to the `Analyzer`.
#[derive(Debug)]
pub struct RawCombatSpan {
    pub lines: VecDeque<LogLine>,
    /// Byte offset (from file start) of the first byte of the earliest line.
    pub start_byte: u64,
    /// Byte offset one past the last byte of the latest line.
    pub end_byte: u64,
}

enum State {
    Empty,
    Pending {
        lines: VecDeque<LogLine>,
        start_byte: u64,
        end_byte: u64,
        last_line_time: NaiveDateTime,
    },
}

/// Consumes lines in reverse-chronological order (as yielded by
/// `BackwardReader`) along with the reader's running byte-position at the
/// moment each line was produced.
pub struct CombatSplitter {
    config: SplitterConfig,
    state: State,
    emitted: usize,
}

impl CombatSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        CombatSplitter { config, state: State::Empty, emitted: 0 }
    }

    /// Feeds one line (most-recent-first) plus the byte position of its
    /// first byte in the source file. Returns a completed span when the gap
    /// to the previous (more recent) line exceeds `inactivity_gap` and the
    /// pending buffer already meets `combat_min_lines`; short pending spans
    /// are silently discarded (spec.md §4.3 state machine).
    pub fn push(&mut self, line: LogLine, line_start_byte: u64) -> Option<RawCombatSpan> {
        if self.config.banned_event_names.iter().any(|n| n == &line.event_name) {
            return None;
        }
        if self.at_capacity() {
            return None;
        }

        match std::mem::replace(&mut self.state, State::Empty) {
            State::Empty => {
                self.state = State::Pending {
                    last_line_time: line.timestamp,
                    end_byte: line_start_byte + 1,
                    start_byte: line_start_byte,
                    lines: VecDeque::from([line]),
                };
                None
            }
            State::Pending { mut lines, start_byte, end_byte, last_line_time } => {
                let gap = (last_line_time - line.timestamp).num_milliseconds() as f64 / 1000.0;
                if gap > self.config.inactivity_gap {
                    if lines.len() >= self.config.combat_min_lines {
                        let span = RawCombatSpan { lines, start_byte, end_byte };
                        self.state = State::Pending {
                            last_line_time: line.timestamp,
                            end_byte: line_start_byte + 1,
                            start_byte: line_start_byte,
                            lines: VecDeque::from([line]),
                        };
                        self.emitted += 1;
                        Some(span)
                    } else {
                        self.state = State::Pending {
                            last_line_time: line.timestamp,
                            end_byte: line_start_byte + 1,
                            start_byte: line_start_byte,
                            lines: VecDeque::from([line]),
                        };
                        None
                    }
                } else {
                    lines.push_back(line);
                    self.state = State::Pending { lines, start_byte: line_start_byte, end_byte, last_line_time };
                    None
                }
            }
        }
    }

    /// Flushes the pending span at end-of-stream, if it meets the minimum
    /// line count (spec.md §4.3 "Terminal condition").
    pub fn finish(mut self) -> Option<RawCombatSpan> {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Empty => None,
            State::Pending { lines, start_byte, end_byte, .. } => {
                if lines.len() >= self.config.combat_min_lines {
                    Some(RawCombatSpan { lines, start_byte, end_byte })
                } else {
                    None
                }
            }
        }
    }

    fn at_capacity(&self) -> bool {
        matches!(self.config.max_combats, Some(max) if self.emitted >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LogLineCodec;
    use chrono::{NaiveDate, NaiveDateTime};

    fn line_at(secs: i64) -> LogLine {
        let base: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let mut line = LogLineCodec::parse(
            "24:03:15:12:00:00.0::Me,P[1@2@@Kirk],,,Borg,C[1 Borg],Torpedo,Pn0,HitPoints,,100.0,90.0",
        )
        .unwrap();
        line.timestamp = base + chrono::Duration::seconds(secs);
        line
    }

    #[test]
    fn emits_combat_when_gap_exceeds_threshold_and_min_lines_met() {
        let mut splitter = CombatSplitter::new(SplitterConfig {
            inactivity_gap: 10.0,
            combat_min_lines: 3,
            ..Default::default()
        });

        // Reverse-chronological: later lines pushed first.
        assert!(splitter.push(line_at(100), 400).is_none());
        assert!(splitter.push(line_at(99), 300).is_none());
        assert!(splitter.push(line_at(98), 200).is_none());
        // Gap > 10s to the next (earlier) line triggers emission.
        let span = splitter.push(line_at(10), 100).unwrap();
        assert_eq!(span.lines.len(), 3);
        assert_eq!(span.start_byte, 200);
        // end_byte is one past the last byte of the span's newest line
        // (line_at(100) starts at 400, so its end_byte binding is 401),
        // not the byte offset of the next (older, out-of-span) line.
        assert_eq!(span.end_byte, 401);
    }

    #[test]
    fn short_pending_span_is_discarded_not_emitted() {
        let mut splitter = CombatSplitter::new(SplitterConfig {
            inactivity_gap: 10.0,
            combat_min_lines: 5,
            ..Default::default()
        });
        assert!(splitter.push(line_at(100), 400).is_none());
        assert!(splitter.push(line_at(99), 300).is_none());
        // Only 2 lines buffered, below min of 5: discarded, not emitted.
        assert!(splitter.push(line_at(10), 100).is_none());
    }

    #[test]
    fn banned_events_are_skipped_entirely() {
        let mut splitter = CombatSplitter::new(SplitterConfig {
            banned_event_names: vec!["Electrical Overload".to_string()],
            ..Default::default()
        });
        let mut banned = line_at(100);
        banned.event_name = "Electrical Overload".to_string();
        assert!(splitter.push(banned, 400).is_none());
        assert!(matches!(splitter.state, State::Empty));
    }

    #[test]
    fn finish_flushes_pending_span_meeting_minimum() {
        let mut splitter = CombatSplitter::new(SplitterConfig { combat_min_lines: 2, ..Default::default() });
        splitter.push(line_at(10), 100);
        splitter.push(line_at(9), 50);
        let span = splitter.finish().unwrap();
        assert_eq!(span.lines.len(), 2);
    }
}
