use std::path::Path;

use privfs_core::{FsResult, Operation, OperationOutput};

use crate::{inspect, mutate, upload};

/// Execute one operation on the calling thread and shape its output.
///
/// Paths are assumed to be validated already. Assemble only concatenates;
/// removing the staging directory is left to the caller because it runs under
/// a different identity.
///
/// # Errors
///
/// Whatever the underlying operation returns.
pub fn perform(operation: Operation) -> FsResult<OperationOutput> {
    let output = match operation {
        Operation::List(r) => OperationOutput::Entries(inspect::list(Path::new(&r.path))?),
        Operation::Stat(r) => OperationOutput::Stat(inspect::stat(Path::new(&r.path))?),
        Operation::Read(r) => OperationOutput::Bytes(inspect::read(Path::new(&r.path))?),
        Operation::WriteChunk { meta, data } => {
            upload::write_chunk(
                Path::new(&meta.dest_dir),
                &meta.upload_id,
                meta.chunk_index,
                &data,
            )?;
            OperationOutput::Done
        },
        Operation::Mkdir(r) => {
            OperationOutput::Created(mutate::mkdir(Path::new(&r.parent_path), &r.name)?)
        },
        Operation::Copy(r) => OperationOutput::Relocated(mutate::copy(
            Path::new(&r.src),
            Path::new(&r.dst_dir),
        )?),
        Operation::Move(r) => OperationOutput::Relocated(mutate::move_entry(
            Path::new(&r.src),
            Path::new(&r.dst_dir),
        )?),
        Operation::Rename(r) => {
            OperationOutput::Relocated(mutate::rename(Path::new(&r.path), &r.new_name)?)
        },
        Operation::Delete(r) => {
            mutate::delete(Path::new(&r.path))?;
            OperationOutput::Done
        },
        Operation::Assemble(r) => {
            upload::assemble(Path::new(&r.dest_file), &r.chunks)?;
            OperationOutput::Done
        },
        Operation::Chmod(r) => {
            mutate::chmod(Path::new(&r.path), &r.mode)?;
            OperationOutput::Done
        },
        Operation::Chown(r) => {
            mutate::chown(Path::new(&r.path), &r.owner, &r.group)?;
            OperationOutput::Done
        },
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use privfs_core::{MkdirRequest, PathRequest, RenameRequest};

    use super::*;

    #[test]
    fn mkdir_then_list_then_rename() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();

        let created = perform(Operation::Mkdir(MkdirRequest {
            parent_path: root.clone(),
            name: String::new(),
        }))
        .unwrap();
        let OperationOutput::Created(created) = created else {
            panic!("expected Created, got {created:?}");
        };
        assert_eq!(created.name, "New Folder");

        let renamed = perform(Operation::Rename(RenameRequest {
            path: created.path,
            new_name: "Docs".to_owned(),
        }))
        .unwrap();
        assert_eq!(
            renamed.to_json().unwrap()["dst"],
            format!("{root}/Docs").as_str()
        );

        let listed = perform(Operation::List(PathRequest { path: root })).unwrap();
        let OperationOutput::Entries(entries) = listed else {
            panic!("expected Entries");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Docs");
    }

    #[test]
    fn delete_reports_done() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();

        let out = perform(Operation::Delete(PathRequest {
            path: file.to_string_lossy().into_owned(),
        }))
        .unwrap();
        assert_eq!(out, OperationOutput::Done);
        assert_eq!(out.to_json().unwrap(), serde_json::json!({ "ok": true }));
    }
}
