use std::time::Duration;

use expect_test::expect;
use rstest::rstest;
use testsuite::cli::{assert_stderr_eq, find_unused_port, puppet_freshness_assert_cmd};
use testsuite::freshness_config::FreshnessConfig;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn no_args_is_a_usage_error() {
    let output = puppet_freshness_assert_cmd().assert().code(1);

    assert_stderr_eq(
        &output,
        expect![[r#"
            error: <IP> is missing
            Usage: puppet-freshness [OPTIONS] <IP>
        "#]],
    );
}

#[test]
fn flags_without_ip_is_a_usage_error() {
    let output = puppet_freshness_assert_cmd().args(["--dry-run"]).assert().code(1);

    assert_stderr_eq(
        &output,
        expect![[r#"
            error: <IP> is missing
            Usage: puppet-freshness [OPTIONS] <IP>
        "#]],
    );
}

#[test]
fn invalid_ip_is_a_usage_error() {
    let output = puppet_freshness_assert_cmd().args(["not-an-ip"]).assert().code(1);

    assert_stderr_eq(
        &output,
        expect![[r#"
            error: Bad <IP>: `not-an-ip`: invalid IP address syntax
            Usage: puppet-freshness [OPTIONS] <IP>
        "#]],
    );
}

#[test]
fn args_from_environment() {
    let output = puppet_freshness_assert_cmd()
        .env("PUPPET_FRESHNESS_ARGS", "--dry-run 'not an ip'")
        .assert()
        .code(1);

    let stderr = std::str::from_utf8(&output.get_output().stderr).unwrap();
    assert!(stderr.contains("Bad <IP>: `not an ip`"), "{stderr}");
}

#[test]
fn help_shows_usage() {
    let output = puppet_freshness_assert_cmd().args(["--help"]).assert().success();
    let stdout = std::str::from_utf8(&output.get_output().stdout).unwrap();
    assert!(stdout.contains("puppet-freshness [OPTIONS] <IP>"), "{stdout}");
    assert!(stdout.contains("--command-file"), "{stdout}");
}

#[test]
fn missing_configuration_is_a_directory_error() {
    let tempdir = tempfile::tempdir().unwrap();
    let command_file = tempdir.path().join("nagios.cmd");

    let output = puppet_freshness_assert_cmd()
        .args(["--config", "/nonexistent/puppet-freshness.conf", "--command-file"])
        .arg(&command_file)
        .arg("10.68.16.4")
        .timeout(COMMAND_TIMEOUT)
        .assert()
        .code(2);

    let stderr = std::str::from_utf8(&output.get_output().stderr).unwrap();
    assert!(stderr.contains("Couldn't load configuration"), "{stderr}");
    assert!(!command_file.exists());
}

#[test]
fn configuration_path_from_environment() {
    let output = puppet_freshness_assert_cmd()
        .env("PUPPET_FRESHNESS_CONFIG", "/nonexistent/from-env.conf")
        .args(["--dry-run", "10.68.16.4"])
        .timeout(COMMAND_TIMEOUT)
        .assert()
        .code(2);

    let stderr = std::str::from_utf8(&output.get_output().stderr).unwrap();
    assert!(stderr.contains("/nonexistent/from-env.conf"), "{stderr}");
}

#[rstest]
#[case::start_tls("start_tls")]
#[case::plain("off")]
fn unreachable_directory_is_a_directory_error(#[case] ssl: &str) {
    let port = find_unused_port();
    let config = FreshnessConfig::builder()
        .uri(format!("ldap://127.0.0.1:{port}"))
        .ssl(ssl.to_owned())
        .timeout("2s".to_owned())
        .build()
        .init()
        .unwrap();

    let output = puppet_freshness_assert_cmd()
        .arg("--config")
        .arg(config.config_path())
        .arg("--command-file")
        .arg(config.command_file_path())
        .arg("10.68.16.4")
        .timeout(COMMAND_TIMEOUT)
        .assert()
        .code(2);

    let stderr = std::str::from_utf8(&output.get_output().stderr).unwrap();
    assert!(stderr.contains("Freshness submission failed"), "{stderr}");
    assert!(!config.command_file_path().exists());
}

#[test]
fn silent_directory_times_out() {
    // Connections are queued by the kernel but never answered.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = FreshnessConfig::builder()
        .uri(format!("ldap://127.0.0.1:{port}"))
        .timeout("300ms".to_owned())
        .build()
        .init()
        .unwrap();

    puppet_freshness_assert_cmd()
        .arg("--config")
        .arg(config.config_path())
        .args(["--dry-run", "--log-filter", "debug", "10.68.16.4"])
        .timeout(COMMAND_TIMEOUT)
        .assert()
        .code(2)
        .stdout("");

    drop(listener);
}

#[test]
fn logs_into_file() {
    let config = FreshnessConfig::builder()
        .uri(format!("ldap://127.0.0.1:{}", find_unused_port()))
        .timeout("1s".to_owned())
        .build()
        .init()
        .unwrap();
    let tempdir = tempfile::tempdir().unwrap();
    let log_file_path = tempdir.path().join("puppet-freshness.log");

    puppet_freshness_assert_cmd()
        .arg("--config")
        .arg(config.config_path())
        .arg("--log-file")
        .arg(&log_file_path)
        .args(["--dry-run", "10.68.16.4"])
        .timeout(COMMAND_TIMEOUT)
        .assert()
        .code(2)
        .stderr("");

    let logs = std::fs::read_to_string(log_file_path).unwrap();
    assert!(logs.contains("Start freshness submission"), "{logs}");
    assert!(logs.contains("Freshness submission failed"), "{logs}");
}

#[test]
fn unwritable_log_file_is_a_set_up_error() {
    let tempdir = tempfile::tempdir().unwrap();
    let not_a_dir = tempdir.path().join("afile");
    std::fs::write(&not_a_dir, "").unwrap();

    let output = puppet_freshness_assert_cmd()
        .args(["--config", "/nonexistent/puppet-freshness.conf", "--log-file"])
        .arg(not_a_dir.join("puppet-freshness.log"))
        .args(["--dry-run", "10.68.16.4"])
        .timeout(COMMAND_TIMEOUT)
        .assert()
        .code(2)
        .stdout("");

    let stderr = std::str::from_utf8(&output.get_output().stderr).unwrap();
    assert!(stderr.starts_with("error: couldn't create log file"), "{stderr}");
    assert!(!stderr.contains("panicked"), "{stderr}");
}
