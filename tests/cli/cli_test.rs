//! CLI contract tests.

use assert_cmd::Command;

fn genpipe(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("genpipe").expect("binary should build");
    cmd.current_dir(dir)
        .env_remove("GENPIPE_CONFIG_PATH")
        .env_remove("GENPIPE_DATABASE_PATH")
        .env("RUST_LOG", "error");
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_subcommands() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let output = genpipe(tmp.path()).arg("--help").output().expect("run");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("migrate"));
    assert!(stdout.contains("run"));
}

#[test]
fn migrate_creates_database_file() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let db = tmp.path().join("messages.db");
    let output = genpipe(tmp.path())
        .args(["migrate", "--database"])
        .arg(&db)
        .output()
        .expect("run");
    assert!(output.status.success());
    assert!(db.exists());
    assert!(stdout_of(&output).contains("schema applied"));
}

#[test]
fn run_streams_message_end() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let input = tmp.path().join("input.txt");
    std::fs::write(&input, "hello from genpipe").expect("write input");

    let output = genpipe(tmp.path())
        .arg("run")
        .arg("--input")
        .arg(&input)
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.starts_with("data: "));
    assert!(stdout.contains("\"event\":\"message_end\""));
    assert!(stdout.contains("hello from genpipe"));
}

#[test]
fn run_with_injected_quota_failure_streams_error() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let output = genpipe(tmp.path())
        .args(["run", "--fail", "quota"])
        .write_stdin("partial answer")
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("\"event\":\"error\""));
    assert!(stdout.contains("\"code\":\"provider_quota_exceeded\""));
    assert!(!stdout.contains("message_end"));
}

#[test]
fn run_with_blank_unclassified_failure_streams_internal_error() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let output = genpipe(tmp.path())
        .args(["run", "--fail", "other"])
        .write_stdin("partial answer")
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("\"code\":\"internal_server_error\""));
    assert!(stdout.contains("\"status\":500"));
    assert!(stdout.contains("Internal Server Error, please contact support."));
}

#[test]
fn run_applies_keyword_moderation_from_config() {
    let tmp = tempfile::tempdir().expect("temp dir");
    std::fs::write(
        tmp.path().join("genpipe.toml"),
        r#"
[app.sensitive_word_avoidance]
type = "keywords"

[app.sensitive_word_avoidance.config]
keywords = "secret"

[app.sensitive_word_avoidance.config.outputs_config]
enabled = true
preset_response = "Filtered."
"#,
    )
    .expect("write config");

    let output = genpipe(tmp.path())
        .arg("run")
        .write_stdin("the secret plan")
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("\"answer\":\"Filtered.\""));
    assert!(!stdout.contains("secret plan"));
}
