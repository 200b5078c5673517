#![allow(clippy::unwrap_used, reason = "test infrastructure can panic on errors")]

use std::sync::LazyLock;

static PUPPET_FRESHNESS_BIN_PATH: LazyLock<std::path::PathBuf> = LazyLock::new(|| {
    escargot::CargoBuild::new()
        .manifest_path("../puppet-freshness/Cargo.toml")
        .bin("puppet-freshness")
        .current_release()
        .current_target()
        .run()
        .expect("build puppet-freshness")
        .path()
        .to_path_buf()
});

pub fn puppet_freshness_assert_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(&*PUPPET_FRESHNESS_BIN_PATH);
    cmd.env("RUST_BACKTRACE", "0")
        .env_remove("RUST_LOG")
        .env_remove("PUPPET_FRESHNESS_ARGS")
        .env_remove("PUPPET_FRESHNESS_CONFIG");
    cmd
}

pub fn assert_stderr_eq(output: &assert_cmd::assert::Assert, expected: expect_test::Expect) {
    let stderr = std::str::from_utf8(&output.get_output().stderr).unwrap();
    expected.assert_eq(stderr);
}

pub fn find_unused_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
