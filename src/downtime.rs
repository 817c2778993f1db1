//! Downtime analysis over a window of heartbeats.
//!
//! Walks an ascending stream of heartbeats and pairs each monitor's first
//! DOWN with the next UP, producing closed downtime intervals and a running
//! total per monitor. A monitor still down when the window ends yields no
//! interval and adds nothing to its total.

use crate::db::{Heartbeat, Status};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Malformed input to the analyzer.
#[derive(Error, Debug, PartialEq)]
pub enum AnalyzeError {
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error("heartbeat {id} at {time} is earlier than the preceding heartbeat at {previous}")]
    OutOfOrder {
        id: i64,
        time: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
    #[error("heartbeat {id} at {time} lies outside the requested range")]
    OutsideRange { id: i64, time: DateTime<Utc> },
}

/// Inclusive time window `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AnalyzeError> {
        if start > end {
            return Err(AnalyzeError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// One closed DOWN..UP span of a monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DowntimeInterval {
    pub monitor_id: i64,
    pub down_start: DateTime<Utc>,
    pub up_end: DateTime<Utc>,
    /// `HH:MM:SS`
    pub duration: String,
}

/// Sum of a monitor's closed intervals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateDowntime {
    pub monitor_id: i64,
    /// `HH:MM:SS`
    pub duration: String,
    pub seconds: i64,
}

/// Result of one analysis, keyed by monitor id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DowntimeReport {
    pub downtime_stats: BTreeMap<i64, Vec<DowntimeInterval>>,
    pub total_downtime: BTreeMap<i64, AggregateDowntime>,
}

#[derive(Debug, Default)]
struct MonitorState {
    down_since: Option<DateTime<Utc>>,
}

/// Stateless downtime analyzer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DowntimeAnalyzer;

impl DowntimeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Reconstruct downtime intervals from heartbeats sorted ascending by time.
    ///
    /// Fails without a partial result if a heartbeat falls outside `range` or
    /// arrives earlier than its predecessor. Pending and maintenance beats
    /// leave a monitor's state untouched.
    pub fn analyze(
        &self,
        range: TimeRange,
        beats: &[Heartbeat],
    ) -> Result<DowntimeReport, AnalyzeError> {
        let mut states: HashMap<i64, MonitorState> = HashMap::new();
        let mut intervals: BTreeMap<i64, Vec<DowntimeInterval>> = BTreeMap::new();
        let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
        let mut previous: Option<DateTime<Utc>> = None;

        for beat in beats {
            if !range.contains(beat.time) {
                return Err(AnalyzeError::OutsideRange {
                    id: beat.id,
                    time: beat.time,
                });
            }
            if let Some(prev) = previous {
                if beat.time < prev {
                    return Err(AnalyzeError::OutOfOrder {
                        id: beat.id,
                        time: beat.time,
                        previous: prev,
                    });
                }
            }
            previous = Some(beat.time);

            let state = states.entry(beat.monitor_id).or_default();
            match (beat.status, state.down_since) {
                (Status::Down, None) => state.down_since = Some(beat.time),
                (Status::Up, Some(down_start)) => {
                    let seconds = (beat.time - down_start).num_seconds();
                    intervals.entry(beat.monitor_id).or_default().push(DowntimeInterval {
                        monitor_id: beat.monitor_id,
                        down_start,
                        up_end: beat.time,
                        duration: format_duration(seconds),
                    });
                    *totals.entry(beat.monitor_id).or_insert(0) += seconds;
                    state.down_since = None;
                }
                _ => {}
            }
        }

        let open = states.values().filter(|s| s.down_since.is_some()).count();
        if open > 0 {
            tracing::debug!("{} monitor(s) still down at window end, excluded from totals", open);
        }

        let total_downtime = totals
            .into_iter()
            .map(|(monitor_id, seconds)| {
                (
                    monitor_id,
                    AggregateDowntime {
                        monitor_id,
                        duration: format_duration(seconds),
                        seconds,
                    },
                )
            })
            .collect();

        Ok(DowntimeReport {
            downtime_stats: intervals,
            total_downtime,
        })
    }
}

/// Format whole seconds as `HH:MM:SS`. Hours are at least two digits and never wrap.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn beat(id: i64, monitor_id: i64, status: Status, offset_secs: i64) -> Heartbeat {
        Heartbeat {
            id,
            monitor_id,
            status,
            important: false,
            msg: String::new(),
            ping: None,
            time: t0() + Duration::seconds(offset_secs),
        }
    }

    fn window() -> TimeRange {
        TimeRange::new(t0() - Duration::seconds(10), t0() + Duration::seconds(10_000)).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(90), "00:01:30");
        assert_eq!(format_duration(3661), "01:01:01");
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(360_000), "100:00:00");
        assert_eq!(format_duration(86_400), "24:00:00");
    }

    #[test]
    fn test_single_interval() {
        let range =
            TimeRange::new(t0() - Duration::seconds(10), t0() + Duration::seconds(100)).unwrap();
        let beats = vec![beat(1, 7, Status::Down, 0), beat(2, 7, Status::Up, 65)];

        let report = DowntimeAnalyzer::new().analyze(range, &beats).unwrap();

        assert_eq!(
            report.downtime_stats[&7],
            vec![DowntimeInterval {
                monitor_id: 7,
                down_start: t0(),
                up_end: t0() + Duration::seconds(65),
                duration: "00:01:05".to_string(),
            }]
        );
        assert_eq!(report.total_downtime[&7].duration, "00:01:05");
        assert_eq!(report.total_downtime[&7].seconds, 65);
    }

    #[test]
    fn test_open_downtime_is_excluded() {
        let beats = vec![
            beat(1, 1, Status::Up, 0),
            beat(2, 1, Status::Down, 30),
            beat(3, 1, Status::Down, 60),
        ];

        let report = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap();

        assert!(report.downtime_stats.get(&1).is_none());
        assert!(report.total_downtime.get(&1).is_none());
    }

    #[test]
    fn test_redundant_samples_do_not_split_intervals() {
        let beats = vec![
            beat(1, 1, Status::Up, 0),
            beat(2, 1, Status::Down, 10),
            beat(3, 1, Status::Down, 20),
            beat(4, 1, Status::Down, 30),
            beat(5, 1, Status::Up, 40),
            beat(6, 1, Status::Up, 50),
        ];

        let report = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap();

        let intervals = &report.downtime_stats[&1];
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].down_start, t0() + Duration::seconds(10));
        assert_eq!(intervals[0].duration, "00:00:30");
    }

    #[test]
    fn test_monitors_are_independent() {
        let beats = vec![
            beat(1, 1, Status::Down, 0),
            beat(2, 2, Status::Down, 5),
            beat(3, 1, Status::Up, 10),
            beat(4, 2, Status::Up, 125),
            beat(5, 1, Status::Down, 200),
            beat(6, 1, Status::Up, 260),
            beat(7, 3, Status::Down, 300),
        ];

        let report = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap();

        assert_eq!(report.downtime_stats[&1].len(), 2);
        assert_eq!(report.downtime_stats[&2].len(), 1);
        assert_eq!(report.downtime_stats[&2][0].duration, "00:02:00");
        assert!(!report.downtime_stats.contains_key(&3));

        assert_eq!(report.total_downtime[&1].seconds, 70);
        assert_eq!(report.total_downtime[&1].duration, "00:01:10");
    }

    #[test]
    fn test_total_equals_sum_of_intervals() {
        let mut beats = Vec::new();
        let mut offset = 0;
        for i in 0..20 {
            beats.push(beat(i * 2, 9, Status::Down, offset));
            offset += 17 * (i + 1);
            beats.push(beat(i * 2 + 1, 9, Status::Up, offset));
            offset += 3;
        }

        let report = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap();

        let sum: i64 = report.downtime_stats[&9]
            .iter()
            .map(|i| (i.up_end - i.down_start).num_seconds())
            .sum();
        assert_eq!(report.downtime_stats[&9].len(), 20);
        assert_eq!(report.total_downtime[&9].seconds, sum);
        assert_eq!(report.total_downtime[&9].duration, format_duration(sum));
    }

    #[test]
    fn test_pending_and_maintenance_do_not_change_state() {
        let beats = vec![
            beat(1, 1, Status::Pending, 0),
            beat(2, 1, Status::Down, 10),
            beat(3, 1, Status::Maintenance, 20),
            beat(4, 1, Status::Pending, 30),
            beat(5, 1, Status::Up, 40),
        ];

        let report = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap();
        assert_eq!(report.downtime_stats[&1].len(), 1);
        assert_eq!(report.total_downtime[&1].seconds, 30);
    }

    #[test]
    fn test_sub_second_durations_truncate() {
        let mut up = beat(2, 1, Status::Up, 5);
        up.time += Duration::milliseconds(999);
        let beats = vec![beat(1, 1, Status::Down, 0), up];

        let report = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap();
        assert_eq!(report.total_downtime[&1].seconds, 5);
    }

    #[test]
    fn test_repeated_analysis_is_identical() {
        let beats = vec![beat(1, 1, Status::Down, 0), beat(2, 1, Status::Up, 42)];
        let analyzer = DowntimeAnalyzer::new();
        let first = analyzer.analyze(window(), &beats).unwrap();
        let second = analyzer.analyze(window(), &beats).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_range() {
        let err = TimeRange::new(t0(), t0() - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, AnalyzeError::InvalidRange { .. }));
        assert!(TimeRange::new(t0(), t0()).is_ok());
    }

    #[test]
    fn test_out_of_order_fails_fast() {
        let beats = vec![beat(1, 1, Status::Down, 50), beat(2, 1, Status::Up, 10)];
        let err = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap_err();
        assert!(matches!(err, AnalyzeError::OutOfOrder { id: 2, .. }));
    }

    #[test]
    fn test_outside_range_fails_fast() {
        let range = TimeRange::new(t0(), t0() + Duration::seconds(60)).unwrap();
        let beats = vec![beat(1, 1, Status::Down, 0), beat(2, 1, Status::Up, 61)];
        let err = DowntimeAnalyzer::new().analyze(range, &beats).unwrap_err();
        assert_eq!(
            err,
            AnalyzeError::OutsideRange {
                id: 2,
                time: t0() + Duration::seconds(61)
            }
        );
    }

    #[test]
    fn test_report_serialization() {
        let beats = vec![beat(1, 4, Status::Down, 0), beat(2, 4, Status::Up, 90)];
        let report = DowntimeAnalyzer::new().analyze(window(), &beats).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["downtimeStats"]["4"][0]["duration"], "00:01:30");
        assert_eq!(json["downtimeStats"]["4"][0]["monitorId"], 4);
        assert_eq!(json["totalDowntime"]["4"]["duration"], "00:01:30");
        assert_eq!(json["totalDowntime"]["4"]["seconds"], 90);
    }
}
