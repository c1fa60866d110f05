use geocoder_engine::{ClientSettings, FailureKind, DEFAULT_BASE_URL};

#[test]
fn default_endpoints_point_at_local_service() {
    let settings = ClientSettings::default();
    assert_eq!(settings.base_url, DEFAULT_BASE_URL);
    assert_eq!(
        settings.endpoint(&settings.stream_path).unwrap().as_str(),
        "http://localhost:8000/api/process-stream"
    );
    assert_eq!(
        settings.endpoint("/api/process").unwrap().as_str(),
        "http://localhost:8000/api/process"
    );
}

#[test]
fn unparseable_base_url_is_reported_not_panicked() {
    let settings = ClientSettings {
        base_url: "not a url".to_string(),
        ..ClientSettings::default()
    };
    let err = settings.endpoint("api/process").unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
    assert!(err.message.starts_with("not a url: "), "{}", err.message);
}
