use std::ffi::OsString;
use std::time::Duration;

use installer_session::{ProcessSession, SessionError};

fn sh_argv(script: &str) -> Vec<OsString> {
    vec![
        OsString::from("/bin/sh"),
        OsString::from("-c"),
        OsString::from(script),
    ]
}

#[tokio::test]
async fn empty_argv_is_rejected() {
    let err = ProcessSession::new(None, vec![], false).unwrap_err();
    assert!(matches!(err, SessionError::InvalidArguments));
}

#[tokio::test]
async fn argv_with_empty_binary_is_rejected() {
    let err = ProcessSession::new(None, vec![OsString::new()], false).unwrap_err();
    assert!(matches!(err, SessionError::InvalidArguments));
}

#[tokio::test]
async fn starting_twice_reports_already_started() {
    let session = ProcessSession::new(None, sh_argv("sleep 0.3"), false).unwrap();

    let running = session.clone();
    let handle = tokio::spawn(async move { running.start().await });

    // Give the first start() a moment to move past Idle before racing it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = session.start().await.unwrap_err();
    assert!(matches!(second, SessionError::AlreadyStarted));

    let first = handle.await.unwrap().unwrap();
    assert!(first.success());
}

#[tokio::test]
async fn output_chunks_are_observed_in_emission_order() {
    let session = ProcessSession::new(None, sh_argv("printf 'a\\nb\\nc\\n'"), false).unwrap();
    let status = session.start().await.unwrap();

    assert!(status.success());
    assert_eq!(session.get_output(), b"a\nb\nc\n");
    assert_eq!(session.decoded_text().await, "a\nb\nc\n");
}

#[tokio::test]
async fn send_input_before_start_is_a_silent_no_op() {
    let session = ProcessSession::new(None, sh_argv("true"), false).unwrap();
    // Not started yet: no producer exists, so this must not panic.
    session.send_input(b"hello\n");
    assert!(!session.is_started());
}

#[tokio::test]
async fn input_written_before_stdin_closes_is_echoed_back_in_order() {
    let session = ProcessSession::new(None, sh_argv("cat"), false).unwrap();
    let running = session.clone();
    let handle = tokio::spawn(async move { running.start().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    session.send_input(b"first\n");
    session.send_input(b"second\n");
    session.kill().await.ok();

    let _ = handle.await.unwrap();
    assert!(!session.is_running());
}

#[tokio::test]
async fn terminated_event_carries_exit_status() {
    let session = ProcessSession::new(None, sh_argv("exit 0"), false).unwrap();
    let mut events = session.subscribe();

    let running = session.clone();
    let handle = tokio::spawn(async move { running.start().await });

    let mut saw_started = false;
    let mut saw_terminated = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline && !saw_terminated {
        if let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(200), events.recv()).await
        {
            match event {
                installer_session::SessionEvent::Started => saw_started = true,
                installer_session::SessionEvent::Terminated(status) => {
                    assert!(status.success());
                    saw_terminated = true;
                }
                installer_session::SessionEvent::Output(_) => {}
            }
        }
    }
    assert!(saw_started);
    assert!(saw_terminated);

    let status = handle.await.unwrap().unwrap();
    assert!(status.success());
}
