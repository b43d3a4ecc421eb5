use std::time::Duration;

use installer_app::{classify, Controller, CliMode};
use installer_ipc::IpcServerBuilder;
use installer_probe::gate::AllowList;

fn empty_allow_list() -> AllowList {
    AllowList::parse("[]").unwrap()
}

/// S6 over the wire: a second instance's `REQ_EXEC` is declined while the
/// first instance's Process Session is Running, and no second session
/// starts.
#[tokio::test]
async fn running_instance_declines_a_handed_off_exec() {
    let controller = Controller::new(std::path::PathBuf::from("/bin/sh"), empty_allow_list(), false);
    controller
        .clone()
        .start_session(
            None,
            vec![
                "/bin/sh".into(),
                "-c".into(),
                "sleep 0.3".into(),
            ],
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.is_session_running());

    let server = IpcServerBuilder::new()
        .base_port(51301)
        .port_span(10)
        .try_start(controller.clone())
        .await
        .unwrap();

    let client = installer_ipc::IpcClient::new().base_port(server.local_port()).port_span(0);
    let accepted = client
        .execute(vec!["setup-othermod.tp2".to_string()])
        .await
        .unwrap();
    assert_eq!(accepted, Some(false));

    server.shutdown();
}

#[tokio::test]
async fn idle_instance_accepts_a_handed_off_exec_and_starts_a_session() {
    let controller = Controller::new(std::path::PathBuf::from("/bin/sh"), empty_allow_list(), false);
    let server = IpcServerBuilder::new()
        .base_port(51311)
        .port_span(10)
        .try_start(controller.clone())
        .await
        .unwrap();

    let client = installer_ipc::IpcClient::new().base_port(server.local_port()).port_span(0);
    let accepted = client
        .execute(vec!["-c".to_string(), "true".to_string()])
        .await
        .unwrap();
    assert_eq!(accepted, Some(true));

    tokio::time::sleep(Duration::from_millis(100)).await;

    server.shutdown();
}

#[test]
fn mode_classification_feeds_directly_into_session_argv_shape() {
    assert_eq!(
        classify(&["setup-ascension.tp2".to_string()]),
        CliMode::Guided {
            tp2: std::path::PathBuf::from("setup-ascension.tp2")
        }
    );
}
