//! End-to-end scenarios for leak detection, pressure classification and
//! alert throttling

mod common;

use chrono::Duration;
use common::{epoch, minute_ramp, scripted_monitor, snapshot_at};
use memsentinel::config::{AlertConfig, PatternConfig};
use memsentinel::monitoring::{
    AlertDispatcher, AlertKind, AlertRequest, PatternDetector, PatternType, PressureLevel,
    PressureThresholds, Severity,
};
use memsentinel::{Config, MonitorEvent};

fn leak_patterns(detector: &mut PatternDetector, history: &[memsentinel::Snapshot]) -> Vec<Severity> {
    let now = history.last().unwrap().timestamp;
    detector
        .detect(history, now)
        .unwrap()
        .patterns
        .into_iter()
        .filter(|p| p.pattern_type == PatternType::Leak)
        .map(|p| p.severity)
        .collect()
}

#[test]
fn test_scenario_a_steady_leak_is_reported_once_per_pass() {
    let mut detector = PatternDetector::new(PatternConfig::default());
    let mut history = minute_ramp(epoch() + Duration::minutes(1), 10, 10.0, 10.0);

    // 10 -> 100MB over the first pass, then one more sample per 60s pass
    for pass in 0..5 {
        let found = leak_patterns(&mut detector, &history);
        assert_eq!(found.len(), 1, "pass {} should report one leak", pass);
        assert_eq!(found[0], Severity::High);

        let next = history.len();
        history.push(snapshot_at(
            epoch() + Duration::minutes(next as i64 + 1),
            10.0 * (next as f64 + 1.0),
        ));
    }
}

#[test]
fn test_scenario_a_fast_leak_is_critical() {
    let mut detector = PatternDetector::new(PatternConfig::default());
    let history = minute_ramp(epoch(), 10, 0.0, 15.0);

    assert_eq!(leak_patterns(&mut detector, &history), vec![Severity::Critical]);
}

#[test]
fn test_scenario_a_slow_growth_is_not_a_leak() {
    let mut detector = PatternDetector::new(PatternConfig::default());
    let history = minute_ramp(epoch(), 10, 100.0, 2.0);

    assert!(leak_patterns(&mut detector, &history).is_empty());
}

#[tokio::test]
async fn test_scenario_b_pressure_levels_follow_smoothed_metric() {
    let mut config = Config::default();
    config.pressure.smoothing_window = 1;
    config.pressure.thresholds = PressureThresholds::new(50.0, 80.0, 120.0, 150.0).unwrap();
    let monitor = scripted_monitor(config, 40.0);
    let mut events = monitor.subscribe();

    let mut levels = Vec::new();
    for (i, total) in [40.0, 45.0, 160.0, 165.0, 170.0].into_iter().enumerate() {
        let at = epoch() + Duration::seconds(5 * i as i64);
        monitor.ingest_snapshot(snapshot_at(at, total));
        let summary = monitor.run_pressure_pass(at).await.unwrap().completed().unwrap();
        levels.push(summary.level);
    }

    assert_eq!(
        levels,
        vec![
            PressureLevel::Normal,
            PressureLevel::Normal,
            PressureLevel::Critical,
            PressureLevel::Critical,
            PressureLevel::Critical,
        ]
    );

    let mut level_changes = 0;
    let mut critical_alerts = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            MonitorEvent::PressureLevelChanged(change) => {
                assert_eq!(change.from, PressureLevel::Normal);
                assert_eq!(change.to, PressureLevel::Critical);
                level_changes += 1;
            }
            MonitorEvent::AlertIssued(alert) if alert.kind == AlertKind::CriticalPressure => {
                critical_alerts += 1;
            }
            _ => {}
        }
    }
    assert_eq!(level_changes, 1);
    assert_eq!(critical_alerts, 1);
}

#[test]
fn test_scenario_c_cooldown_blocks_under_the_cap() {
    let config = AlertConfig {
        cooldown: std::time::Duration::from_secs(60),
        max_per_minute: 3,
        ..AlertConfig::default()
    };
    let mut dispatcher = AlertDispatcher::new(&config);

    let issued = (0..4)
        .filter_map(|i| {
            dispatcher.issue(
                AlertRequest::new(AlertKind::LeakConfirmed, Severity::High, "leak"),
                epoch() + Duration::seconds(i * 10),
            )
        })
        .count();

    assert_eq!(issued, 1);
    assert_eq!(dispatcher.stats().suppressed_by_cooldown, 3);
    assert_eq!(dispatcher.stats().suppressed_by_rate, 0);
}
