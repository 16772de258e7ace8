use std::time::Duration;

use super::*;

#[test]
fn applies_defaults_when_unset() {
    let registry = StreamRegistry::new();
    registry
        .register(StreamSettings::new("go_memstats", "go_statistics"))
        .unwrap();

    let descriptor = registry.find_by_name("go_memstats").unwrap();
    assert_eq!(
        *descriptor,
        StreamDescriptor {
            name: "go_memstats".into(),
            database: "go_statistics".into(),
            retention_policy: None,
            precision: Precision::Nanoseconds,
            capacity: DEFAULT_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    );
}

#[test]
fn keeps_explicit_settings() {
    let registry = StreamRegistry::new();
    registry
        .register(
            StreamSettings::new("cpu", "telegraf")
                .retention_policy(SHORT_TERM_RP)
                .precision(Precision::Seconds)
                .capacity(2)
                .flush_interval(Duration::from_millis(250)),
        )
        .unwrap();

    let descriptor = registry.find_by_name("cpu").unwrap();
    assert_eq!(descriptor.retention_policy.as_deref(), Some("shortterm"));
    assert_eq!(descriptor.precision, Precision::Seconds);
    assert_eq!(descriptor.capacity, 2);
    assert_eq!(descriptor.flush_interval, Duration::from_millis(250));
}

#[test]
fn find_by_name_misses_unknown_stream() {
    let registry = StreamRegistry::new();
    registry.register(StreamSettings::new("cpu", "db")).unwrap();
    assert!(registry.find_by_name("test").is_none());
    assert!(registry.stream("test").is_none());
}

#[test]
fn rejects_duplicate_name_and_keeps_first() {
    let registry = StreamRegistry::new();
    let first = registry
        .register(StreamSettings::new("cpu", "db").capacity(2))
        .unwrap();

    let err = registry
        .register(StreamSettings::new("cpu", "other").capacity(9))
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateStream("cpu".into()));

    assert_eq!(registry.len(), 1);
    let current = registry.stream("cpu").unwrap();
    assert!(Arc::ptr_eq(&first, &current), "first registration must win");
    assert_eq!(current.descriptor().capacity, 2);
}

#[test]
fn rejects_invalid_settings() {
    let registry = StreamRegistry::new();
    assert_eq!(
        registry.register(StreamSettings::new("", "db")).unwrap_err(),
        RegistryError::EmptyName
    );
    assert_eq!(
        registry
            .register(StreamSettings::new("cpu", "db").capacity(0))
            .unwrap_err(),
        RegistryError::InvalidCapacity("cpu".into())
    );
    assert_eq!(
        registry
            .register(StreamSettings::new("cpu", "db").flush_interval(Duration::ZERO))
            .unwrap_err(),
        RegistryError::InvalidFlushInterval("cpu".into())
    );
    assert!(registry.is_empty());
}

#[test]
fn buffer_uses_descriptor_capacity() {
    let registry = StreamRegistry::new();
    let stream = registry
        .register(StreamSettings::new("cpu", "db").capacity(3))
        .unwrap();
    assert_eq!(stream.buffer().capacity(), 3);
    assert_eq!(stream.buffer().stream(), "cpu");
}

#[test]
fn streams_are_listed_by_name() {
    let registry = StreamRegistry::new();
    for name in ["mem", "cpu", "disk"] {
        registry.register(StreamSettings::new(name, "db")).unwrap();
    }
    let names: Vec<_> = registry
        .streams()
        .iter()
        .map(|s| s.descriptor().name.clone())
        .collect();
    assert_eq!(names, vec!["cpu", "disk", "mem"]);
}

#[test]
fn cycle_can_only_begin_once() {
    let registry = StreamRegistry::new();
    let stream = registry.register(StreamSettings::new("cpu", "db")).unwrap();

    assert_eq!(stream.cycle_state(), CycleState::Idle);
    assert!(stream.begin_cycle());
    assert!(!stream.begin_cycle());
    assert_eq!(stream.cycle_state(), CycleState::Running);
}

#[test]
fn parses_precision() {
    assert_eq!(Precision::parse("").unwrap(), Precision::Nanoseconds);
    assert_eq!(Precision::parse("ns").unwrap(), Precision::Nanoseconds);
    assert_eq!(Precision::parse("u").unwrap(), Precision::Microseconds);
    assert_eq!(Precision::parse("ms").unwrap(), Precision::Milliseconds);
    assert_eq!(Precision::parse("s").unwrap(), Precision::Seconds);
    assert_eq!(Precision::parse("m").unwrap(), Precision::Minutes);
    assert_eq!(Precision::parse("h").unwrap(), Precision::Hours);
    assert_eq!(
        Precision::parse("weeks").unwrap_err(),
        UnknownPrecision("weeks".into())
    );
}

#[test]
fn precision_round_trips_through_query_value() {
    for p in [
        Precision::Nanoseconds,
        Precision::Microseconds,
        Precision::Milliseconds,
        Precision::Seconds,
        Precision::Minutes,
        Precision::Hours,
    ] {
        assert_eq!(Precision::parse(p.as_str()).unwrap(), p);
    }
}
