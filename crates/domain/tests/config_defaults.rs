use sa_domain::config::Config;

#[test]
fn default_logging_level_is_info() {
    let config = Config::default();
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.json);
}

#[test]
fn explicit_logging_overrides_parse() {
    let toml_str = r#"
[logging]
level = "debug"
json = true
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}
