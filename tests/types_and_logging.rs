// tests/types_and_logging.rs

use std::time::Duration;

use nodeflow::logging::init_logging;
use nodeflow::types::{parse_duration, LogLevel, NodeId, NodeKind, ValueId};
use nodeflow::work::WorkItem;

#[test]
fn log_levels_parse_case_insensitively() {
    assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
    assert_eq!(" warning ".parse::<LogLevel>(), Ok(LogLevel::Warn));
    assert_eq!("trace".parse::<LogLevel>(), Ok(LogLevel::Trace));
    assert!("loud".parse::<LogLevel>().is_err());
}

#[test]
fn durations_parse_with_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));

    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
    assert!(parse_duration("ms").is_err());
}

#[test]
fn oversized_durations_are_errors() {
    let max = u64::MAX;
    assert_eq!(parse_duration(&format!("{max}s")), Ok(Duration::from_secs(max)));

    let err = parse_duration(&format!("{max}h")).unwrap_err();
    assert!(err.contains("too large"), "{err}");
    assert!(parse_duration(&format!("{}m", max / 60 + 1)).is_err());
}

#[test]
fn identities_display_compactly() {
    assert_eq!(NodeId(4).to_string(), "n4");
    assert_eq!(ValueId(12).to_string(), "v12");
    assert_eq!(NodeKind::from("split").to_string(), "split");

    let item = WorkItem::new(NodeId(1), [ValueId(2), ValueId(0)]);
    assert_eq!(item.to_string(), "n1[v0,v2]");
    assert_eq!(item.next_attempt().to_string(), "n1[v0,v2]#1");
    assert_eq!(WorkItem::global(NodeId(5)).to_string(), "n5[]");
}

#[test]
fn logging_installs_once() {
    assert!(init_logging(Some(LogLevel::Debug)).is_ok());
    assert!(init_logging(None).is_err(), "second global subscriber is refused");
}
