//! Write path integration tests.
//!
//! Covers:
//! - Length limits checked before any remote call
//! - Blank payloads and trailing newlines
//! - Failed flushes keep the buffer for a retry
//! - Leftovers dropped at close are never sent again
//! - Permission checks and read-only mounts
//! - Truncation and sparse writes

use std::sync::Arc;

use twfs_fs::{FsError, MountConfig, OpenMode};
use twfs_proto::FetchError;
use twfs_tests::{MockApi, Op, TestMount};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("twfs_tests=debug,twfs_fs=debug")
        .with_test_writer()
        .try_init();
}

fn mount() -> TestMount {
    let api = Arc::new(MockApi::new("alice"));
    api.add_post("alice", "mine");
    api.add_mention("bob", "@alice hi");
    TestMount::new(api).unwrap()
}

fn denied<T>(result: Result<T, FsError>) -> bool {
    matches!(result, Err(FsError::PermissionDenied(_)))
}

#[test]
fn test_oversize_status_rejected_without_remote_call() {
    init_tracing();
    let mount = mount();

    let err = mount.echo("/compose/long", &"a".repeat(281)).unwrap_err();
    assert!(matches!(err, FsError::InvalidArgument(_)));
    assert_eq!(err.errno(), libc::EINVAL);
    assert_eq!(mount.api.mutation_calls(), 0);

    // The buffer survives; shortening it and closing again posts
    mount.fs().truncate("/compose/long", 280).unwrap();
    mount.fs().release("/compose/long").unwrap();
    assert_eq!(mount.api.calls(Op::UpdateStatus), 1);
}

#[test]
fn test_limit_counts_characters_not_bytes() {
    init_tracing();
    let mount = mount();

    let text = "é".repeat(280);
    mount.echo("/compose/accents", &text).unwrap();
    assert_eq!(mount.api.latest_own_status().unwrap().text, text);
}

#[test]
fn test_blank_payload_is_a_no_op() {
    init_tracing();
    let mount = mount();

    mount.touch("/compose/empty").unwrap();
    mount.echo("/compose/blank", "  \n").unwrap();
    assert_eq!(mount.api.mutation_calls(), 0);
}

#[test]
fn test_trailing_newline_trimmed() {
    init_tracing();
    let mount = mount();

    mount.echo("/compose/new", "hello world\r\n").unwrap();
    assert_eq!(mount.api.latest_own_status().unwrap().text, "hello world");
}

#[test]
fn test_discard_after_failed_commit_never_resends() {
    init_tracing();
    let mount = mount();
    mount.api.fail(Op::UpdateStatus, FetchError::Timeout);

    mount.fs().create("/compose/once").unwrap();
    mount.fs().write("/compose/once", 0, b"maybe stored").unwrap();
    let err = mount.fs().release("/compose/once").unwrap_err();
    assert_eq!(err.errno(), libc::ETIMEDOUT);
    assert_eq!(mount.api.calls(Op::UpdateStatus), 1);

    // The last writer closing drops the leftovers without another send
    mount.api.clear_failure(Op::UpdateStatus);
    mount.fs().discard("/compose/once").unwrap();
    mount.fs().release("/compose/once").unwrap();
    assert_eq!(mount.api.calls(Op::UpdateStatus), 1);
    assert!(mount.fs().stat("/compose/once").unwrap_err().is_not_found());
    assert!(mount.ls("/compose").unwrap().is_empty());
}

#[test]
fn test_discard_keeps_committed_files() {
    init_tracing();
    let mount = mount();
    mount.echo("/compose/sent", "posted once").unwrap();
    mount.fs().discard("/compose/sent").unwrap();
    mount.fs().discard("/compose/never-created").unwrap();

    assert_eq!(mount.api.calls(Op::UpdateStatus), 1);
    assert_eq!(mount.cat_string("/compose/sent").unwrap(), "posted once");
}

#[test]
fn test_failed_flush_keeps_buffer() {
    init_tracing();
    let mount = mount();
    mount.api.fail(
        Op::UpdateStatus,
        FetchError::TransportFailure("connection reset".to_string()),
    );

    let err = mount.echo("/compose/retry", "try again").unwrap_err();
    assert_eq!(err.errno(), libc::EIO);

    // The unsent text is still readable from the draft
    assert_eq!(mount.cat_string("/compose/retry").unwrap(), "try again");

    mount.api.clear_failure(Op::UpdateStatus);
    mount.fs().release("/compose/retry").unwrap();
    assert_eq!(mount.api.calls(Op::UpdateStatus), 2);
    assert_eq!(mount.api.latest_own_status().unwrap().text, "try again");
}

#[test]
fn test_sparse_and_appending_writes() {
    init_tracing();
    let mount = mount();

    mount.fs().create("/compose/parts").unwrap();
    mount.fs().write("/compose/parts", 0, b"abc").unwrap();
    mount.fs().write("/compose/parts", 3, b"def").unwrap();
    assert_eq!(mount.cat("/compose/parts").unwrap(), b"abcdef");

    mount.fs().write("/compose/parts", 8, b"!").unwrap();
    assert_eq!(mount.cat("/compose/parts").unwrap(), b"abcdef\0\0!");

    // Reopening with truncate starts over
    mount.fs().open("/compose/parts", OpenMode::WRITE).unwrap();
    mount.fs().write("/compose/parts", 0, b"final").unwrap();
    mount.fs().release("/compose/parts").unwrap();
    assert_eq!(mount.api.latest_own_status().unwrap().text, "final");
}

#[test]
fn test_oversized_buffer_rejected() {
    init_tracing();
    let mount = mount();

    mount.fs().create("/compose/huge").unwrap();
    let err = mount
        .fs()
        .write("/compose/huge", twfs_fs::tree::MAX_PENDING_BYTES as u64, b"x")
        .unwrap_err();
    assert!(matches!(err, FsError::InvalidArgument(_)));
}

#[test]
fn test_write_permissions() {
    init_tracing();
    let mount = mount();
    mount.ls("/timeline").unwrap();
    mount.ls("/mentions").unwrap();
    mount.api.reset_calls();

    assert!(denied(mount.fs().open("/timeline/1001", OpenMode::WRITE)));
    assert!(denied(mount.fs().create("/timeline/9")));
    assert!(denied(mount.fs().create("/mentions/9")));
    assert!(denied(mount.fs().create("/followers/carol")));
    assert!(denied(mount.fs().create("/users/bob/friends/carol")));
    assert!(denied(mount.fs().write("/timeline/1001", 0, b"x")));
    assert!(denied(mount.fs().truncate("/timeline/1001", 0)));

    // Mentions are never removable, even when the listing has them
    let mention = mount.ls("/mentions").unwrap().remove(0);
    assert!(denied(mount.rm(&format!("/mentions/{}", mention))));
    assert!(denied(mount.rm("/users/bob/timeline/1002")));
    assert!(denied(mount.rm("/followers/bob")));

    assert_eq!(mount.api.total_calls(), 0);
    assert_eq!(
        FsError::PermissionDenied(String::new()).errno(),
        libc::EACCES
    );
}

#[test]
fn test_remote_refusal_leaves_node() {
    init_tracing();
    let mount = mount();
    mount.ls("/timeline").unwrap();
    mount.api.fail(
        Op::DestroyStatus,
        FetchError::RemoteRejected {
            status: 403,
            reason: "nope".to_string(),
        },
    );

    let err = mount.rm("/timeline/1001").unwrap_err();
    assert_eq!(err.errno(), libc::EACCES);
    assert_eq!(mount.ls("/timeline").unwrap(), vec!["1001"]);
}

#[test]
fn test_read_only_mount() {
    init_tracing();
    let api = Arc::new(MockApi::new("alice"));
    api.add_post("alice", "mine");
    let config = MountConfig {
        read_only: true,
        ..MountConfig::default()
    };
    let mount = TestMount::with_config(api, config).unwrap();

    assert!(matches!(
        mount.fs().create("/compose/new"),
        Err(FsError::PermissionDenied(_))
    ));
    mount.ls("/timeline").unwrap();
    assert!(matches!(mount.rm("/timeline/1001"), Err(FsError::PermissionDenied(_))));

    assert_eq!(mount.fs().stat("/compose").unwrap().perm, 0o555);
    assert_eq!(mount.api.mutation_calls(), 0);
}
