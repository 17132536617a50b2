//! Process, file and shell command handlers.
//!
//! [`UtilsManager`] is a stateless plugin: each endpoint validates its own
//! arguments, then runs the blocking work on the blocking pool so the RPC
//! connection tasks are never stalled by filesystem or `/proc` I/O.
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A panicking blocking task is reported as `EXCEPTION_THROWN`

pub mod command;
pub mod files;
pub mod process;

pub use command::execute_command;
pub use files::{
    file_backup, file_delete, file_exists, file_restore, file_update, folder_create,
    folder_delete, folder_exists, read_chunk, FOLDER_MODE,
};
pub use process::{check_app_status, find_app_processes, start_app, stop_app, AppProcess};

use std::path::{Path, PathBuf};

use tracing::error;

use rta_core::param::{take, ParamError};
use rta_core::{ErrorCode, Parameter, Response};
use rta_protocol::endpoints;

use crate::dispatch::EndpointTable;
use crate::plugin::AdapterPlugin;

/// Runs `work` on the blocking pool.
async fn blocking<F>(endpoint: &'static str, work: F) -> Response
where
    F: FnOnce() -> Response + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(response) => response,
        Err(e) => {
            error!(endpoint, error = %e, "Handler task failed");
            Response::with_code(e.to_string(), ErrorCode::ExceptionThrown)
        }
    }
}

fn strings<const N: usize>(params: Vec<Parameter>) -> Result<[String; N], ParamError> {
    let taken = take::<N>(params)?;
    let mut out: [String; N] = std::array::from_fn(|_| String::new());
    for (slot, param) in out.iter_mut().zip(taken) {
        *slot = param.into_string()?;
    }
    Ok(out)
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_app_start(params: Vec<Parameter>) -> Response {
    let [path, name] = match strings::<2>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    Response::status(start_app(&PathBuf::from(path), &name))
}

async fn handle_app_stop(params: Vec<Parameter>) -> Response {
    let [name] = match strings::<1>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    blocking(endpoints::APP_STOP, move || Response::status(stop_app(&name))).await
}

async fn handle_app_check_status(params: Vec<Parameter>) -> Response {
    let [name] = match strings::<1>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    blocking(endpoints::APP_CHECK_STATUS, move || {
        Response::success(check_app_status(&name).to_string())
    })
    .await
}

/// Binds a `(path, name)` file operation.
fn bind_file_op(
    table: &mut EndpointTable,
    endpoint: &'static str,
    op: fn(&Path, &str) -> ErrorCode,
) {
    table.bind(endpoint, move |params| async move {
        let [path, name] = match strings::<2>(params) {
            Ok(args) => args,
            Err(e) => return e.into_response(),
        };
        blocking(endpoint, move || Response::status(op(&PathBuf::from(path), &name))).await
    });
}

/// Binds a single-path folder operation.
fn bind_folder_op(table: &mut EndpointTable, endpoint: &'static str, op: fn(&Path) -> ErrorCode) {
    table.bind(endpoint, move |params| async move {
        let [path] = match strings::<1>(params) {
            Ok(args) => args,
            Err(e) => return e.into_response(),
        };
        blocking(endpoint, move || Response::status(op(&PathBuf::from(path)))).await
    });
}

async fn handle_file_update(params: Vec<Parameter>) -> Response {
    let [path, name, content] = match strings::<3>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    blocking(endpoints::FILE_UPDATE, move || {
        Response::status(file_update(&PathBuf::from(path), &name, &content))
    })
    .await
}

async fn handle_file_content(params: Vec<Parameter>) -> Response {
    let [path, name, offset, max_size] = match take::<4>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    let parsed = (|| {
        Ok::<_, ParamError>((
            path.into_string()?,
            name.into_string()?,
            offset.as_int()?,
            max_size.as_int()?,
        ))
    })();
    let (path, name, offset, max_size) = match parsed {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };

    blocking(endpoints::FILE_CONTENT, move || {
        let (chunk, status) = read_chunk(&PathBuf::from(path), &name, offset, max_size);
        Response::new(chunk, status.to_code())
    })
    .await
}

async fn handle_command_execute(params: Vec<Parameter>) -> Response {
    let [command] = match strings::<1>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    execute_command(&command).await
}

// ============================================================================
// Plugin
// ============================================================================

/// Plugin binding the application, file, folder and command endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct UtilsManager;

impl UtilsManager {
    pub const NAME: &'static str = "RemoteUtilsManager";

    pub fn new() -> Self {
        Self
    }
}

impl AdapterPlugin for UtilsManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn bind(&self, table: &mut EndpointTable) {
        table.bind(endpoints::APP_START, handle_app_start);
        table.bind(endpoints::APP_STOP, handle_app_stop);
        table.bind(endpoints::APP_CHECK_STATUS, handle_app_check_status);

        bind_file_op(table, endpoints::FILE_BACKUP, file_backup);
        bind_file_op(table, endpoints::FILE_RESTORE, file_restore);
        bind_file_op(table, endpoints::FILE_EXISTS, file_exists);
        bind_file_op(table, endpoints::FILE_DELETE, file_delete);
        table.bind(endpoints::FILE_UPDATE, handle_file_update);
        table.bind(endpoints::FILE_CONTENT, handle_file_content);

        bind_folder_op(table, endpoints::FOLDER_EXISTS, folder_exists);
        bind_folder_op(table, endpoints::FOLDER_CREATE, folder_create);
        bind_folder_op(table, endpoints::FOLDER_DELETE, folder_delete);

        table.bind(endpoints::COMMAND_EXECUTE, handle_command_execute);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rta_core::{BAD_VALUE_TYPE, INCORRECT_PARAM_COUNT};

    fn table() -> EndpointTable {
        let mut table = EndpointTable::new();
        UtilsManager::new().bind(&mut table);
        table
    }

    async fn call(table: &EndpointTable, name: &str, params: Vec<Parameter>) -> Response {
        table.dispatch(name, params).unwrap().await
    }

    fn s(value: &str) -> Parameter {
        Parameter::string(value)
    }

    #[test]
    fn test_binds_every_utils_endpoint() {
        let table = table();
        for name in [
            endpoints::APP_START,
            endpoints::APP_STOP,
            endpoints::APP_CHECK_STATUS,
            endpoints::FILE_BACKUP,
            endpoints::FILE_RESTORE,
            endpoints::FILE_UPDATE,
            endpoints::FILE_EXISTS,
            endpoints::FILE_CONTENT,
            endpoints::FILE_DELETE,
            endpoints::FOLDER_EXISTS,
            endpoints::FOLDER_CREATE,
            endpoints::FOLDER_DELETE,
            endpoints::COMMAND_EXECUTE,
        ] {
            assert!(table.contains(name), "{name} not bound");
        }
        assert_eq!(table.len(), 13);
    }

    #[tokio::test]
    async fn test_check_status_of_unknown_app() {
        let table = table();
        let response = call(&table, endpoints::APP_CHECK_STATUS, vec![s("nonexistent")]).await;
        assert_eq!(response, Response::success("0"));
    }

    #[tokio::test]
    async fn test_wrong_param_count() {
        let table = table();
        let response = call(&table, endpoints::FILE_BACKUP, vec![s("/tmp")]).await;
        assert_eq!(response, Response::failed(INCORRECT_PARAM_COUNT));

        let response = call(&table, endpoints::APP_STOP, vec![]).await;
        assert_eq!(response, Response::failed(INCORRECT_PARAM_COUNT));
    }

    #[tokio::test]
    async fn test_wrong_param_kind() {
        let table = table();
        let response = call(&table, endpoints::APP_STOP, vec![Parameter::int(3)]).await;
        assert_eq!(response, Response::failed(BAD_VALUE_TYPE));

        let response = call(
            &table,
            endpoints::FILE_CONTENT,
            vec![s("/tmp"), s("f"), s("zero"), Parameter::int(4)],
        )
        .await;
        assert_eq!(response, Response::failed(BAD_VALUE_TYPE));
    }

    #[tokio::test]
    async fn test_file_endpoints_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let table = table();

        let response = call(&table, endpoints::FILE_UPDATE, vec![s(path), s("x"), s("hello")]).await;
        assert!(response.is_success());

        for endpoint in [
            endpoints::FILE_BACKUP,
            endpoints::FILE_DELETE,
            endpoints::FILE_RESTORE,
            endpoints::FILE_EXISTS,
        ] {
            let response = call(&table, endpoint, vec![s(path), s("x")]).await;
            assert!(response.is_success(), "{endpoint} failed: {response}");
        }

        let response = call(
            &table,
            endpoints::FILE_CONTENT,
            vec![s(path), s("x"), Parameter::int(0), Parameter::int(3)],
        )
        .await;
        assert_eq!(response, Response::new("hel", 3));

        let response = call(
            &table,
            endpoints::FILE_CONTENT,
            vec![s(path), s("x"), Parameter::int(3), Parameter::int(3)],
        )
        .await;
        assert_eq!(response, Response::new("lo", 0));
    }

    #[tokio::test]
    async fn test_folder_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("sub");
        let folder = folder.to_str().unwrap();
        let table = table();

        let exists = call(&table, endpoints::FOLDER_EXISTS, vec![s(folder)]).await;
        assert_eq!(exists.code, ErrorCode::Failed.code());

        assert!(call(&table, endpoints::FOLDER_CREATE, vec![s(folder)]).await.is_success());
        assert!(call(&table, endpoints::FOLDER_EXISTS, vec![s(folder)]).await.is_success());
        assert!(call(&table, endpoints::FOLDER_DELETE, vec![s(folder)]).await.is_success());
    }

    #[tokio::test]
    async fn test_command_execute() {
        let table = table();
        let response = call(&table, endpoints::COMMAND_EXECUTE, vec![s("printf rta")]).await;
        assert_eq!(response, Response::success("rta"));
    }
}
