use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn legacy_top_level_port_is_honoured() {
    let raw = RawSettings {
        port: Some(9090),
        ..Default::default()
    };
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.server.addr.port(), 9090);
}

#[test]
fn sectioned_port_wins_over_legacy_port() {
    let mut raw = RawSettings {
        port: Some(9090),
        ..Default::default()
    };
    raw.server.port = Some(7070);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.server.addr.port(), 7070);
}

#[test]
fn legacy_json_file_deserializes() {
    let raw: RawSettings = Config::builder()
        .add_source(File::from_str(r#"{"port": 8181}"#, config::FileFormat::Json))
        .build()
        .expect("config builds")
        .try_deserialize()
        .expect("raw settings deserialize");
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.server.addr.port(), 8181);
}

#[test]
fn defaults_match_reference_deployment() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.wrong_method_status, WrongMethodStatus::NotFound);
    assert_eq!(settings.capture.viewport_width.get(), DEFAULT_VIEWPORT_WIDTH);
    assert_eq!(settings.capture.viewport_height.get(), DEFAULT_VIEWPORT_HEIGHT);
    assert_eq!(settings.publish.base_url, "http://localhost");
    assert_eq!(settings.upstream.endpoint.as_str(), DEFAULT_UPSTREAM_ENDPOINT);
    assert!(settings.publish.serve_images);
    assert!(settings.capture.browser_executable.is_none());
}

#[test]
fn wrong_method_status_accepts_405_only_as_alternative() {
    let mut raw = RawSettings::default();
    raw.server.wrong_method_status = Some(405);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.server.wrong_method_status,
        WrongMethodStatus::MethodNotAllowed
    );

    let mut raw = RawSettings::default();
    raw.server.wrong_method_status = Some(418);
    let err = Settings::from_raw(raw).expect_err("418 is rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "server.wrong_method_status",
            ..
        }
    ));
}

#[test]
fn base_url_trailing_slash_is_trimmed() {
    let mut raw = RawSettings::default();
    raw.publish.base_url = Some("https://cdn.example.com/".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.publish.base_url, "https://cdn.example.com");
}

#[test]
fn zero_capture_concurrency_is_rejected() {
    let mut raw = RawSettings::default();
    raw.capture.max_concurrent = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero concurrency rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "capture.max_concurrent",
            ..
        }
    ));
}

#[test]
fn invalid_upstream_endpoint_is_rejected() {
    let mut raw = RawSettings::default();
    raw.upstream.endpoint = Some("ftp://example.com/chat".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["promptshot"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "promptshot",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--server-port",
        "9000",
        "--capture-max-concurrent",
        "4",
        "--publish-base-url",
        "https://img.example.com",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.server_port, Some(9000));
            assert_eq!(serve.overrides.capture.max_concurrent, Some(4));
            assert_eq!(
                serve.overrides.capture.publish_base_url.as_deref(),
                Some("https://img.example.com")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_capture_arguments() {
    let args = CliArgs::parse_from([
        "promptshot",
        "capture",
        "--input",
        "/tmp/answer.md",
        "--name",
        "hello",
        "--publish-directory",
        "/tmp/images",
    ]);

    match args.command.expect("capture command") {
        Command::Capture(capture) => {
            assert_eq!(capture.input, std::path::Path::new("/tmp/answer.md"));
            assert_eq!(capture.name.as_deref(), Some("hello"));
            assert_eq!(
                capture.overrides.publish_directory.as_deref(),
                Some(std::path::Path::new("/tmp/images"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn capture_overrides_apply_to_settings() {
    let mut raw = RawSettings::default();
    raw.apply_capture_overrides(&CaptureOverrides {
        viewport_width: Some(1024),
        no_sandbox: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.capture.viewport_width.get(), 1024);
    assert!(settings.capture.no_sandbox);
}

fn workspace_with_shipped_defaults() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("config")).expect("config dir");
    std::fs::write(
        dir.path().join("config/default.toml"),
        include_str!("../../config/default.toml"),
    )
    .expect("write default.toml");
    dir
}

#[test]
fn legacy_config_json_port_applies_over_shipped_defaults() {
    let dir = workspace_with_shipped_defaults();
    std::fs::write(dir.path().join("config.json"), r#"{"port": 9000}"#).expect("config.json");

    let settings =
        load_from(dir.path(), &CliArgs::parse_from(["promptshot"])).expect("settings load");

    assert_eq!(settings.server.addr.port(), 9000);
    assert_eq!(settings.capture.viewport_width.get(), DEFAULT_VIEWPORT_WIDTH);
}

#[test]
fn shipped_defaults_alone_listen_on_default_port() {
    let dir = workspace_with_shipped_defaults();

    let settings =
        load_from(dir.path(), &CliArgs::parse_from(["promptshot"])).expect("settings load");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.wrong_method_status, WrongMethodStatus::NotFound);
}

#[test]
fn cli_port_overrides_legacy_config_json() {
    let dir = workspace_with_shipped_defaults();
    std::fs::write(dir.path().join("config.json"), r#"{"port": 9000}"#).expect("config.json");

    let cli = CliArgs::parse_from(["promptshot", "serve", "--server-port", "9100"]);
    let settings = load_from(dir.path(), &cli).expect("settings load");

    assert_eq!(settings.server.addr.port(), 9100);
}
