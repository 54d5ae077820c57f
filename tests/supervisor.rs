use std::{
    path::Path,
    time::{Duration, Instant},
};

use ladder_manager::prelude::*;
use ladder_manager::process_supervisor::{
    file_checksum, BotProcess, LaunchError, ProcessHandle, Supervisor,
};
use ladder_manager::runtime_adapter::{LadderArgs, RuntimeAdapterRegistry, RuntimePaths};

mod common;
use common::{crashing_bot, init_test_logger, script, sleeping_bot, supervisor};

fn ladder_args() -> LadderArgs {
    LadderArgs {
        game_port: 5677,
        start_port: 5690,
        server: "127.0.0.1".into(),
        opponent_id: None,
    }
}

fn start(bot: &BotConfig, checksum: Option<&str>) -> Result<ProcessHandle, LaunchError> {
    let registry = RuntimeAdapterRegistry::with_defaults(&RuntimePaths {
        python: "sh".into(),
        ..RuntimePaths::default()
    });
    let command = registry.resolve(bot.kind)?.command_for(bot, &ladder_args());
    supervisor().start(bot, command.as_ref(), checksum)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn start_and_kill() {
    init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let bot = sleeping_bot(dir.path(), "sleeper");

    let mut process = start(&bot, None).unwrap();
    assert!(process.pid().is_some());
    assert!(process.is_alive());

    process.kill().unwrap();
    assert!(!process.is_alive());
    // idempotent
    process.kill().unwrap();
}

#[test]
fn exit_is_noticed() {
    init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let bot = crashing_bot(dir.path(), "crasher");

    let mut process = start(&bot, None).unwrap();
    assert!(wait_until(Duration::from_secs(5), || !process.is_alive()));
    assert_eq!(process.exit_status().and_then(|s| s.code()), Some(3));
    // killing an exited process is fine
    process.kill().unwrap();
}

#[test]
fn scripted_bot_goes_through_its_host() {
    init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    script(dir.path(), "bot.py", "exec sleep 30");
    let bot = BotConfig::new(RuntimeKind::Python, "pybot", Race::Protoss, dir.path(), "bot.py");

    let mut process = start(&bot, None).unwrap();
    assert!(process.is_alive());
    process.kill().unwrap();
}

#[test]
fn bad_paths_are_launch_errors() {
    init_test_logger();
    let dir = tempfile::tempdir().unwrap();

    let missing = BotConfig::new(RuntimeKind::BinaryCpp, "ghost", Race::Terran, dir.path(), "nope");
    assert!(matches!(
        start(&missing, None),
        Err(LaunchError::ExecutableNotFound(_))
    ));

    let no_dir = BotConfig::new(
        RuntimeKind::BinaryCpp,
        "lost",
        Race::Terran,
        dir.path().join("not_a_dir"),
        "bot",
    );
    assert!(matches!(
        start(&no_dir, None),
        Err(LaunchError::InvalidWorkingDirectory(_))
    ));
}

#[test]
fn checksums_are_verified_before_start() {
    init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let bot = sleeping_bot(dir.path(), "sleeper");
    let actual = file_checksum(&bot.entry_path()).unwrap();

    match start(&bot, Some("0000")) {
        Err(LaunchError::ChecksumMismatch { expected, .. }) => assert_eq!(expected, "0000"),
        other => panic!("expected a checksum mismatch, got {:?}", other.map(|_| ())),
    }

    let mut process = start(&bot, Some(&actual.to_uppercase())).unwrap();
    assert!(process.is_alive());
    process.kill().unwrap();
}

#[test]
fn in_process_bots_have_a_sentinel() {
    let computer = BotConfig::computer("ai", Race::Zerg, Difficulty::Hard);
    let mut handle = start(&computer, None).unwrap();
    assert_eq!(handle.pid(), None);
    assert!(handle.is_alive());
    handle.kill().unwrap();
    assert!(!handle.is_alive());

    assert!(matches!(
        start(&computer, Some("abc")),
        Err(LaunchError::ChecksumWithoutArtifact(_))
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn dropping_a_handle_kills_the_process() {
    init_test_logger();
    let dir = tempfile::tempdir().unwrap();
    let bot = sleeping_bot(dir.path(), "sleeper");

    let process = start(&bot, None).unwrap();
    let pid = process.pid().unwrap();
    let proc_entry = format!("/proc/{pid}");
    assert!(Path::new(&proc_entry).exists());

    drop(process);
    assert!(wait_until(Duration::from_secs(5), || !Path::new(&proc_entry).exists()));
}
