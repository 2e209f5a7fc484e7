use std::path::Path;
use std::process::{Command, Output};

fn make_home() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

fn run(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tvision"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env("NO_COLOR", "1")
        .env_remove("TVISION_SERVER_URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("run tvision")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn config_defaults_then_set_server_persists() {
    let home = make_home();

    let out = run(home.path(), &["config"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("url          = http://localhost:8000"));

    let out = run(home.path(), &["config", "--set-server", "http://10.1.2.3:9000/"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let out = run(home.path(), &["config"]);
    assert!(stdout(&out).contains("url          = http://10.1.2.3:9000"));
}

#[test]
fn env_and_flag_override_server_url() {
    let home = make_home();
    let out = Command::new(env!("CARGO_BIN_EXE_tvision"))
        .args(["config"])
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("TVISION_SERVER_URL", "http://from-env:8000")
        .output()
        .expect("run tvision");
    assert!(stdout(&out).contains("http://from-env:8000"));

    let out = run(home.path(), &["--server", "http://from-flag:8000", "config"]);
    assert!(stdout(&out).contains("http://from-flag:8000"));
}

#[test]
fn whoami_without_login() {
    let home = make_home();
    let out = run(home.path(), &["whoami"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out).trim(), "Not logged in");
}

#[test]
fn history_requires_login() {
    let home = make_home();
    let out = run(home.path(), &["history"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Not logged in"));
}

#[test]
fn theme_toggle_is_remembered() {
    let home = make_home();
    let out = run(home.path(), &["theme", "--toggle"]);
    assert_eq!(stdout(&out).trim(), "Theme: dark");
    let out = run(home.path(), &["theme"]);
    assert_eq!(stdout(&out).trim(), "Theme: dark");
}

#[test]
fn unreachable_backend_is_reported() {
    let home = make_home();
    let out = run(home.path(), &["--server", "http://127.0.0.1:9", "status"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("Error: Backend unreachable at http://127.0.0.1:9"), "{err}");
}
