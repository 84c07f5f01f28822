use peek_config::PeekConfig;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::{breakpoint, location, stack};

#[test]
fn capture_limits_come_from_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peek.toml");
    std::fs::write(
        &path,
        r#"
[capture]
max_frames = 1
max_string_length = 4

[agent]
max_condition_errors = 1
"#,
    )
    .unwrap();

    let config = PeekConfig::load_from_path(&path).unwrap();
    assert_eq!(config.capture.max_frames, 1);

    let mut bp = breakpoint(
        json!({ "id": "b", "location": location(), "expressions": ["\"abcdef\""] }),
        &config,
    );
    assert!(bp.evaluate(&stack()));
    assert_eq!(bp.evaluated_expressions()[0].value.as_deref(), Some("\"abc..."));
    assert!(bp.stack_frames()[1].locals.is_empty());

    let mut failing = breakpoint(
        json!({ "id": "c", "location": location(), "condition": "nosuch(" }),
        &config,
    );
    assert!(!failing.evaluate(&stack()));
    assert!(failing.is_complete());
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peek.toml");
    std::fs::write(&path, "[capture]\nmax_deph = 2\n").unwrap();
    assert!(PeekConfig::load_from_path(&path).is_err());
}
