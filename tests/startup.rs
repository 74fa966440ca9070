//! Startup behavior of the compiled binary.

use std::process::Command;

const VARS: &[&str] = &[
    "TELEGRAM_BOT_TOKEN",
    "ADMIN_IDS",
    "CHATGPT_API_URL",
    "EXAM_DATE",
    "TIMEZONE",
    "LOG_CHAT_ID",
];

fn fridaybot(env: &[(&str, &str)]) -> std::process::Output {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fridaybot"));
    cmd.current_dir(dir.path());
    for var in VARS {
        cmd.env_remove(var);
    }
    cmd.envs(env.iter().copied());
    cmd.output().unwrap()
}

#[test]
fn test_missing_config_is_logged_and_fatal() {
    let output = fridaybot(&[]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR"), "not logged as an error: {stderr}");
    assert!(stderr.contains("Invalid configuration: missing required environment variable TELEGRAM_BOT_TOKEN"));
}

#[test]
fn test_invalid_exam_date_is_fatal() {
    let output = fridaybot(&[
        ("TELEGRAM_BOT_TOKEN", "123:secret"),
        ("ADMIN_IDS", "10"),
        ("CHATGPT_API_URL", "http://127.0.0.1:9/"),
        ("EXAM_DATE", "next spring"),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid exam date 'next spring'"), "{stderr}");
}
