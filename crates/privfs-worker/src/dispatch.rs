//! The dispatch table: validate, pick an identity, run the operation under
//! it, and keep the upload tracker in step.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use privfs_core::prelude::*;
use privfs_core::{validate_entry_name, validate_upload_id};
use privfs_identity::{ExecError, Identity, PrivilegeExecutor, resolve};
use privfs_ops::{
    UploadTracker, is_staging_dir, perform, remove_staging, staging_dir, upload_id_of,
};
use tracing::{debug, error, warn};

/// Runs decoded requests. Shared by the sync handlers, the task loop and the
/// local `exec` command.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    executor: PrivilegeExecutor,
    tracker: Arc<UploadTracker>,
}

/// Tracker bookkeeping owed once the operation has run.
enum UploadStep {
    None,
    Chunk {
        upload_id: String,
        dest_dir: PathBuf,
        staging: PathBuf,
        index: u32,
    },
    Assemble {
        upload_id: Option<String>,
        staging: Option<PathBuf>,
    },
    Discard {
        upload_id: String,
    },
}

impl UploadStep {
    fn of(operation: &Operation) -> FsResult<Self> {
        let step = match operation {
            Operation::WriteChunk { meta, .. } => {
                let dest_dir = PathBuf::from(&meta.dest_dir);
                Self::Chunk {
                    staging: staging_dir(&dest_dir, &meta.upload_id)?,
                    upload_id: meta.upload_id.clone(),
                    dest_dir,
                    index: meta.chunk_index,
                }
            },
            Operation::Assemble(r) if r.staging_dir.is_empty() => Self::Assemble {
                upload_id: None,
                staging: None,
            },
            Operation::Assemble(r) => {
                let staging = PathBuf::from(&r.staging_dir);
                Self::Assemble {
                    upload_id: upload_id_of(&staging).map(str::to_owned),
                    staging: Some(staging),
                }
            },
            Operation::Delete(r) => match upload_id_of(Path::new(&r.path)) {
                Some(id) => Self::Discard {
                    upload_id: id.to_owned(),
                },
                None => Self::None,
            },
            _ => Self::None,
        };
        Ok(step)
    }
}

impl Dispatcher {
    /// Dispatcher recording uploads in `tracker`.
    #[must_use]
    pub fn new(tracker: Arc<UploadTracker>) -> Self {
        Self {
            executor: PrivilegeExecutor::new(),
            tracker,
        }
    }

    /// The upload tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<UploadTracker> {
        &self.tracker
    }

    /// The privilege executor.
    #[must_use]
    pub fn executor(&self) -> PrivilegeExecutor {
        self.executor
    }

    /// Run one request to completion.
    ///
    /// Arguments are validated and the account resolved before any work is
    /// handed to the executor, so a rejected request never drops privilege.
    ///
    /// # Errors
    ///
    /// The operation's [`FsError`]. Validation, account lookup and executor
    /// failures are all [`FsError::Generic`].
    pub async fn dispatch(&self, envelope: Envelope) -> FsResult<OperationOutput> {
        let Envelope {
            account, operation, ..
        } = envelope;
        let verb = operation.verb();

        check_arguments(&operation)?;
        let step = UploadStep::of(&operation)?;

        let identity = if verb.impersonates() {
            resolve(account.as_deref()).map_err(|e| FsError::generic(e.to_string()))?
        } else {
            Identity::service()
        };
        debug!(%verb, uid = identity.uid(), "dispatching");

        if let UploadStep::Assemble {
            upload_id: Some(id),
            ..
        } = &step
            && let Err(e) = self.tracker.begin_assembly(id)
        {
            debug!(upload_id = %id, error = %e, "assembling an upload the tracker has not seen");
        }

        let outcome = self.run_as(&identity, move || perform(operation)).await;
        self.follow_up(step, outcome).await
    }

    async fn run_as<F>(&self, identity: &Identity, work: F) -> FsResult<OperationOutput>
    where
        F: FnOnce() -> FsResult<OperationOutput> + Send + 'static,
    {
        match self.executor.run_async(identity, work).await {
            Ok(outcome) => outcome,
            Err(e) => Err(exec_failure(identity, &e)),
        }
    }

    async fn follow_up(
        &self,
        step: UploadStep,
        outcome: FsResult<OperationOutput>,
    ) -> FsResult<OperationOutput> {
        match step {
            UploadStep::None => outcome,
            UploadStep::Chunk {
                upload_id,
                dest_dir,
                staging,
                index,
            } => {
                if outcome.is_ok()
                    && let Err(e) = self
                        .tracker
                        .record_chunk(&upload_id, dest_dir, staging, index)
                {
                    warn!(%upload_id, chunk = index, error = %e, "chunk written for an upload past receiving");
                }
                outcome
            },
            UploadStep::Assemble { upload_id, staging } => {
                // Once assembled, the job succeeds even if staging stays behind.
                if outcome.is_ok()
                    && let Some(staging) = staging
                    && let Err(e) = self.discard_staging(&staging).await
                {
                    warn!(
                        staging = %staging.display(),
                        error = %e,
                        "assembled, but staging directory not removed"
                    );
                }
                if let Some(id) = upload_id {
                    let tracked = if outcome.is_ok() {
                        self.tracker.complete(&id).map(drop)
                    } else {
                        self.tracker.reopen(&id)
                    };
                    if let Err(e) = tracked {
                        debug!(upload_id = %id, error = %e, "tracker not updated");
                    }
                }
                outcome
            },
            UploadStep::Discard { upload_id } => {
                if outcome.is_ok()
                    && let Err(e) = self.tracker.cancel(&upload_id)
                {
                    debug!(%upload_id, error = %e, "deleted staging of an untracked upload");
                }
                outcome
            },
        }
    }

    /// Staging is owned by the uploading account but removed as the service
    /// identity, after the assembled file is written.
    async fn discard_staging(&self, staging: &Path) -> FsResult<()> {
        let identity = Identity::service();
        let staging = staging.to_path_buf();
        match self
            .executor
            .run_async(&identity, move || remove_staging(&staging))
            .await
        {
            Ok(removed) => removed,
            Err(e) => Err(exec_failure(&identity, &e)),
        }
    }
}

fn exec_failure(identity: &Identity, err: &ExecError) -> FsError {
    error!(uid = identity.uid(), error = %err, "privileged execution failed");
    FsError::generic(err.to_string())
}

/// Lexical checks on every argument.
fn check_arguments(operation: &Operation) -> FsResult<()> {
    validate_paths(operation.paths())?;
    match operation {
        Operation::Mkdir(r) if !r.name.is_empty() => validate_entry_name(&r.name),
        Operation::Rename(r) => validate_entry_name(&r.new_name),
        Operation::WriteChunk { meta, .. } => validate_upload_id(&meta.upload_id),
        Operation::Assemble(r)
            if !r.staging_dir.is_empty() && !is_staging_dir(Path::new(&r.staging_dir)) =>
        {
            Err(FsError::generic(format!(
                "refusing staging directory {}: not an upload staging directory",
                r.staging_dir
            )))
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use privfs_core::{AssembleRequest, ChunkMeta, MkdirRequest, PathRequest, RenameRequest};
    use privfs_ops::UploadState;

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(UploadTracker::new(Duration::from_secs(60))))
    }

    fn as_service(operation: Operation) -> Envelope {
        Envelope::new(None, None, operation)
    }

    fn chunk(dest_dir: &Path, upload_id: &str, index: u32, data: &[u8]) -> Envelope {
        as_service(Operation::WriteChunk {
            meta: ChunkMeta {
                upload_id: upload_id.to_owned(),
                chunk_index: index,
                dest_dir: dest_dir.to_string_lossy().into_owned(),
                linux_username: String::new(),
            },
            data: data.to_vec(),
        })
    }

    #[tokio::test]
    async fn relative_paths_are_rejected_before_running() {
        let err = dispatcher()
            .dispatch(as_service(Operation::List(PathRequest::new("srv/share"))))
            .await
            .unwrap_err();
        assert_eq!(err, FsError::generic("invalid path: must be absolute"));
    }

    #[tokio::test]
    async fn bad_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let d = dispatcher();

        let mkdir = d
            .dispatch(as_service(Operation::Mkdir(MkdirRequest {
                parent_path: root.clone(),
                name: "a/b".to_owned(),
            })))
            .await;
        assert!(matches!(mkdir, Err(FsError::Generic(_))));

        let rename = d
            .dispatch(as_service(Operation::Rename(RenameRequest {
                path: format!("{root}/x"),
                new_name: "..".to_owned(),
            })))
            .await;
        assert!(matches!(rename, Err(FsError::Generic(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unknown_account_is_generic() {
        let envelope = Envelope::new(
            None,
            Some("privfs-no-such-account".to_owned()),
            Operation::Stat(PathRequest::new("/")),
        );
        let err = dispatcher().dispatch(envelope).await.unwrap_err();
        assert_eq!(err.code(), "ERR");
        assert!(err.to_string().contains("unknown user"), "{err}");
    }

    #[tokio::test]
    async fn chunks_then_assemble_complete_the_upload() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher();

        d.dispatch(chunk(dir.path(), "up-1", 0, b"hello ")).await.unwrap();
        d.dispatch(chunk(dir.path(), "up-1", 1, b"world")).await.unwrap();
        let session = d.tracker().get("up-1").unwrap();
        assert_eq!(session.state, UploadState::Receiving);
        assert_eq!(session.chunks.len(), 2);

        let staging = staging_dir(dir.path(), "up-1").unwrap();
        let dest = dir.path().join("greeting.txt");
        let out = d
            .dispatch(as_service(Operation::Assemble(AssembleRequest {
                dest_file: dest.to_string_lossy().into_owned(),
                chunks: vec![
                    staging.join("0.part").to_string_lossy().into_owned(),
                    staging.join("1.part").to_string_lossy().into_owned(),
                ],
                staging_dir: staging.to_string_lossy().into_owned(),
            })))
            .await
            .unwrap();

        assert_eq!(out, OperationOutput::Done);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!staging.exists());
        assert!(d.tracker().is_empty());
    }

    #[tokio::test]
    async fn leftover_staging_does_not_fail_the_assembly() {
        use std::os::unix::fs::PermissionsExt;

        // Root removes read-only directories regardless of mode.
        if privfs_identity::current_euid() == 0 {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher();
        let parts: [&[u8]; 3] = [b"one-", b"two-", b"three"];
        for (index, data) in (0_u32..).zip(parts) {
            d.dispatch(chunk(dir.path(), "up-4", index, data)).await.unwrap();
        }

        let staging = staging_dir(dir.path(), "up-4").unwrap();
        let locked = staging.join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("keep"), b"").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        let dest = dir.path().join("report.txt");
        let result = d
            .dispatch(as_service(Operation::Assemble(AssembleRequest {
                dest_file: dest.to_string_lossy().into_owned(),
                chunks: (0..3)
                    .map(|i| staging.join(format!("{i}.part")).to_string_lossy().into_owned())
                    .collect(),
                staging_dir: staging.to_string_lossy().into_owned(),
            })))
            .await;

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(result, Ok(OperationOutput::Done));
        assert_eq!(std::fs::read(&dest).unwrap(), b"one-two-three");
        assert!(locked.join("keep").exists());
        assert!(d.tracker().get("up-4").is_none());
    }

    #[tokio::test]
    async fn failed_assembly_reopens_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher();
        d.dispatch(chunk(dir.path(), "up-2", 0, b"x")).await.unwrap();

        let staging = staging_dir(dir.path(), "up-2").unwrap();
        let result = d
            .dispatch(as_service(Operation::Assemble(AssembleRequest {
                dest_file: dir.path().join("out").to_string_lossy().into_owned(),
                chunks: vec![staging.join("9.part").to_string_lossy().into_owned()],
                staging_dir: staging.to_string_lossy().into_owned(),
            })))
            .await;

        assert_eq!(result, Err(FsError::NotFound));
        assert!(staging.exists());
        assert_eq!(d.tracker().get("up-2").unwrap().state, UploadState::Receiving);
    }

    #[tokio::test]
    async fn assemble_refuses_foreign_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = dispatcher()
            .dispatch(as_service(Operation::Assemble(AssembleRequest {
                dest_file: dir.path().join("out").to_string_lossy().into_owned(),
                chunks: vec![],
                staging_dir: dir.path().to_string_lossy().into_owned(),
            })))
            .await;
        assert!(matches!(result, Err(FsError::Generic(_))));
        assert!(dir.path().exists());
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn deleting_staging_cancels_the_upload() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher();
        d.dispatch(chunk(dir.path(), "up-3", 0, b"x")).await.unwrap();

        let staging = staging_dir(dir.path(), "up-3").unwrap();
        d.dispatch(as_service(Operation::Delete(PathRequest::new(
            staging.to_string_lossy(),
        ))))
        .await
        .unwrap();

        assert!(!staging.exists());
        assert!(d.tracker().get("up-3").is_none());
    }
}
