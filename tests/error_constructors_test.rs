use glowdcc::error::GlowError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(GlowError::config("x"), GlowError::Config { .. }));
    assert!(matches!(GlowError::auth("x"), GlowError::Auth { .. }));
    assert!(matches!(
        GlowError::discovery("x"),
        GlowError::Discovery { .. }
    ));
    assert!(matches!(GlowError::network("x"), GlowError::Network { .. }));
}

#[test]
fn error_constructors_group_2() {
    let ser = GlowError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, GlowError::Serialization { .. }));
    assert!(matches!(GlowError::io("x"), GlowError::Io { .. }));
    assert!(matches!(
        GlowError::rate_limited("x"),
        GlowError::RateLimit { .. }
    ));
    assert!(matches!(
        GlowError::api(502, "x"),
        GlowError::Api { status: 502, .. }
    ));
    assert!(matches!(GlowError::no_data("x"), GlowError::NoData { .. }));
}

#[test]
fn error_constructors_group_3() {
    assert!(matches!(
        GlowError::validation("f", "m"),
        GlowError::Validation { .. }
    ));
    assert!(matches!(GlowError::timeout("x"), GlowError::Timeout { .. }));
    assert!(matches!(
        GlowError::incomplete("gas daily cost", "m"),
        GlowError::IncompleteData { .. }
    ));
}

#[test]
fn display_messages() {
    let e = GlowError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));

    let e = GlowError::rate_limited("too many requests");
    assert_eq!(e.to_string(), "Rate limited: too many requests");
}

#[test]
fn io_and_json_conversions() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    assert!(matches!(GlowError::from(io), GlowError::Io { .. }));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(
        GlowError::from(json),
        GlowError::Serialization { .. }
    ));
}
