use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use installer_ipc::IpcHandler;
use installer_probe::gate::{hash_file, locate_candidate, validate_candidate, AllowList, CandidateSearch};
use installer_probe::InstallerProbe;
use installer_session::ProcessSession;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::mode::{classify, CliMode};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Work the controller schedules for the UI collaborator rather than
/// performing itself ("raise window" / "start new Process Session" dispatch
/// targets).
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    RaiseWindow,
    SessionStarted,
    SessionTerminated(ExitStatus),
    SessionFailed,
}

/// Resolves a usable installer binary via the search order and runs the
/// `--version` identity check. Does not consult the allow-list; see
/// [`Controller::check_allow_list`] for that half.
pub async fn validate_binary(search: &CandidateSearch<'_>) -> Result<PathBuf, AppError> {
    let candidate = locate_candidate(search).ok_or(AppError::BinaryNotFound)?;
    validate_candidate(&candidate)
        .await
        .map_err(|_| AppError::BinaryNotFound)?;
    Ok(candidate)
}

/// The single owned object a front end constructs once at startup: one
/// Process Session slot, the Installer Metadata Probe, and the
/// [`installer_ipc::IpcHandler`] glue the IPC server dispatches into.
pub struct Controller {
    binary: PathBuf,
    probe: InstallerProbe,
    allow_list: AllowList,
    strict_mode: bool,
    session: StdMutex<Option<Arc<ProcessSession>>>,
    events: broadcast::Sender<ControllerEvent>,
    self_handle: Weak<Controller>,
}

impl Controller {
    pub fn new(binary: PathBuf, allow_list: AllowList, strict_mode: bool) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|weak| Self {
            probe: InstallerProbe::new(binary.clone()),
            binary,
            allow_list,
            strict_mode,
            session: StdMutex::new(None),
            events,
            self_handle: weak.clone(),
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn probe(&self) -> &InstallerProbe {
        &self.probe
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Checks the configured binary's hash against the allow-list.
    /// Advisory unless `strict_mode` was set at construction, in which case
    /// an unlisted hash is `AppError::BinaryNotAllowed`.
    pub fn check_allow_list(&self) -> Result<(), AppError> {
        let fingerprint = hash_file(&self.binary)?;
        if self.allow_list.lookup(&fingerprint).is_none() && self.strict_mode {
            return Err(AppError::BinaryNotAllowed);
        }
        Ok(())
    }

    fn current_session(&self) -> Option<Arc<ProcessSession>> {
        self.session
            .lock()
            .expect("controller session mutex poisoned")
            .clone()
    }

    pub fn is_session_running(&self) -> bool {
        self.current_session()
            .map(|session| session.is_running())
            .unwrap_or(false)
    }

    /// Classifies `argv` per original §6 and, for `Guided`/`Custom` modes,
    /// starts a new Process Session running the configured binary with the
    /// resulting arguments. Returns `Ok(None)` for `Help`/`FileChooser`
    /// modes, which carry no session to start at this layer.
    pub async fn start_for_argv(
        self: &Arc<Self>,
        argv: &[String],
    ) -> Result<Option<Arc<ProcessSession>>, AppError> {
        match classify(argv) {
            CliMode::Help => Ok(None),
            CliMode::FileChooser => Ok(None),
            CliMode::Guided { tp2 } => {
                let working_dir = InstallerProbe::working_dir_for(&tp2);
                let session_argv = vec![self.binary.clone().into_os_string(), tp2.into_os_string()];
                self.start_session(Some(working_dir), session_argv)
                    .await
                    .map(Some)
            }
            CliMode::Custom { argv } => {
                let mut session_argv = vec![self.binary.clone().into_os_string()];
                session_argv.extend(argv.into_iter().map(OsString::from));
                self.start_session(None, session_argv).await.map(Some)
            }
        }
    }

    /// Starts a new Process Session for `argv` (whose first element must be
    /// the installer binary). Fails with `SessionAlreadyRunning` if one is
    /// already `Running` in this instance, matching the `REQ_EXEC` dispatch
    /// rule in original §4.8.
    pub async fn start_session(
        self: &Arc<Self>,
        working_dir: Option<PathBuf>,
        argv: Vec<OsString>,
    ) -> Result<Arc<ProcessSession>, AppError> {
        if self.is_session_running() {
            return Err(AppError::SessionAlreadyRunning);
        }
        let session = ProcessSession::new(working_dir, argv, false)?;
        *self
            .session
            .lock()
            .expect("controller session mutex poisoned") = Some(session.clone());

        let controller = self.clone();
        let run_session = session.clone();
        tokio::spawn(async move {
            match run_session.start().await {
                Ok(status) => {
                    let _ = controller
                        .events
                        .send(ControllerEvent::SessionTerminated(status));
                }
                Err(err) => {
                    warn!(?err, "process session ended with an error");
                    let _ = controller.events.send(ControllerEvent::SessionFailed);
                }
            }
        });

        let _ = self.events.send(ControllerEvent::SessionStarted);
        Ok(session)
    }
}

impl IpcHandler for Controller {
    fn is_session_running(&self) -> bool {
        Controller::is_session_running(self)
    }

    fn on_ping(&self, bring_to_front: bool) {
        debug!(bring_to_front, "received ping over the singleton IPC channel");
        if bring_to_front {
            let _ = self.events.send(ControllerEvent::RaiseWindow);
        }
    }

    fn on_exec(&self, argv: Vec<String>) {
        info!(?argv, "accepted argv handed off from a second instance");
        let Some(controller) = self.self_handle.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = controller.start_for_argv(&argv).await {
                warn!(?err, "failed to start a process session for handed-off argv");
            }
        });
    }

    fn on_terminate(&self) {
        info!("received terminate request over the singleton IPC channel");
        if let Some(session) = self.current_session() {
            tokio::spawn(async move {
                let _ = session.kill().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_allow_list() -> AllowList {
        AllowList::parse("[]").unwrap()
    }

    #[test]
    fn controller_reports_idle_until_a_session_is_started() {
        let controller = Controller::new(PathBuf::from("/bin/true"), empty_allow_list(), false);
        assert!(!controller.is_session_running());
    }

    #[tokio::test]
    async fn starting_a_second_session_while_one_is_running_is_rejected() {
        let controller = Controller::new(PathBuf::from("/bin/sh"), empty_allow_list(), false);
        let argv = vec![
            OsString::from("/bin/sh"),
            OsString::from("-c"),
            OsString::from("sleep 0.2"),
        ];
        controller
            .clone()
            .start_session(None, argv.clone())
            .await
            .unwrap();
        // Give the spawned session a moment to reach Running.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let err = controller
            .clone()
            .start_session(None, argv)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionAlreadyRunning));
    }
}
