//! Typed facade over every server endpoint.

use std::sync::Arc;

use rta_core::{AppStatus, Parameter, Response};
use rta_protocol::endpoints;

use crate::remote::RemoteClient;

/// One method per server endpoint, each building the typed parameters it
/// needs.
#[derive(Clone)]
pub struct AdapterClient {
    client: Arc<RemoteClient>,
}

impl AdapterClient {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        Self { client }
    }

    pub fn remote(&self) -> &Arc<RemoteClient> {
        &self.client
    }

    async fn call(&self, endpoint: &str, params: Vec<Parameter>) -> Response {
        self.client.content_call(endpoint, params).await
    }

    fn endpoint(address: &str, port: u16) -> Vec<Parameter> {
        vec![Parameter::string(address), Parameter::int(i64::from(port))]
    }

    fn path_name(path: &str, name: &str) -> Vec<Parameter> {
        vec![Parameter::string(path), Parameter::string(name)]
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    pub async fn open(&self, address: &str, port: u16) -> Response {
        self.call(endpoints::OPEN, Self::endpoint(address, port)).await
    }

    pub async fn close(&self, address: &str, port: u16) -> Response {
        self.call(endpoints::CLOSE, Self::endpoint(address, port)).await
    }

    pub async fn send(&self, address: &str, port: u16, data: &str) -> Response {
        let mut params = Self::endpoint(address, port);
        params.push(Parameter::string(data));
        self.call(endpoints::SEND, params).await
    }

    pub async fn receive(&self, address: &str, port: u16) -> Response {
        self.call(endpoints::RECEIVE, Self::endpoint(address, port)).await
    }

    // ------------------------------------------------------------------------
    // Processes
    // ------------------------------------------------------------------------

    pub async fn app_start(&self, path: &str, name: &str) -> Response {
        self.call(endpoints::APP_START, Self::path_name(path, name)).await
    }

    pub async fn app_stop(&self, name: &str) -> Response {
        self.call(endpoints::APP_STOP, vec![Parameter::string(name)]).await
    }

    pub async fn app_check_status(&self, name: &str) -> Response {
        self.call(endpoints::APP_CHECK_STATUS, vec![Parameter::string(name)])
            .await
    }

    /// Decoded form of [`AdapterClient::app_check_status`].
    ///
    /// `None` when the call failed or the payload is not a status code.
    pub async fn app_status(&self, name: &str) -> Option<AppStatus> {
        let response = self.app_check_status(name).await;
        if !response.is_success() {
            return None;
        }
        response
            .payload
            .trim()
            .parse()
            .ok()
            .and_then(AppStatus::from_code)
    }

    // ------------------------------------------------------------------------
    // Files and folders
    // ------------------------------------------------------------------------

    pub async fn file_exists(&self, path: &str, name: &str) -> Response {
        self.call(endpoints::FILE_EXISTS, Self::path_name(path, name)).await
    }

    pub async fn file_update(&self, path: &str, name: &str, content: &str) -> Response {
        let mut params = Self::path_name(path, name);
        params.push(Parameter::string(content));
        self.call(endpoints::FILE_UPDATE, params).await
    }

    /// Downloads `path/name` and returns the local copy's path as payload.
    pub async fn file_content(&self, path: &str, name: &str) -> Response {
        self.client
            .file_call(endpoints::FILE_CONTENT, Self::path_name(path, name))
            .await
    }

    pub async fn file_delete(&self, path: &str, name: &str) -> Response {
        self.call(endpoints::FILE_DELETE, Self::path_name(path, name)).await
    }

    pub async fn file_backup(&self, path: &str, name: &str) -> Response {
        self.call(endpoints::FILE_BACKUP, Self::path_name(path, name)).await
    }

    pub async fn file_restore(&self, path: &str, name: &str) -> Response {
        self.call(endpoints::FILE_RESTORE, Self::path_name(path, name)).await
    }

    pub async fn folder_exists(&self, path: &str) -> Response {
        self.call(endpoints::FOLDER_EXISTS, vec![Parameter::string(path)])
            .await
    }

    pub async fn folder_create(&self, path: &str) -> Response {
        self.call(endpoints::FOLDER_CREATE, vec![Parameter::string(path)])
            .await
    }

    pub async fn folder_delete(&self, path: &str) -> Response {
        self.call(endpoints::FOLDER_DELETE, vec![Parameter::string(path)])
            .await
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub async fn command_execute(&self, command: &str) -> Response {
        self.call(endpoints::COMMAND_EXECUTE, vec![Parameter::string(command)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;
    use rta_core::ErrorCode;

    async fn adapter(connection: Arc<MockConnection>) -> AdapterClient {
        AdapterClient::new(Arc::new(RemoteClient::new(connection).await))
    }

    #[tokio::test]
    async fn test_methods_build_typed_params() {
        let connection = MockConnection::succeeding();
        let adapter = adapter(connection.clone()).await;

        adapter.send("10.0.0.1", 8080, "frame").await;
        adapter.file_update("/srv", "conf", "x=1").await;
        adapter.folder_create("/srv/new").await;

        let calls = connection.calls();
        assert_eq!(calls[1].0, "send");
        assert_eq!(
            calls[1].1,
            vec![
                Parameter::string("10.0.0.1"),
                Parameter::int(8080),
                Parameter::string("frame"),
            ]
        );
        assert_eq!(calls[2].0, "file_update");
        assert_eq!(calls[2].1.len(), 3);
        assert_eq!(calls[3].1, vec![Parameter::string("/srv/new")]);
    }

    #[tokio::test]
    async fn test_app_status_decodes_payload() {
        let connection = MockConnection::new(|method, _| match method {
            endpoints::APP_CHECK_STATUS => Response::success("1"),
            _ => Response::success(""),
        });
        let adapter = adapter(connection).await;
        assert_eq!(adapter.app_status("server").await, Some(AppStatus::Running));
    }

    #[tokio::test]
    async fn test_app_status_none_on_failure() {
        let connection = MockConnection::new(|method, _| match method {
            endpoints::APP_CHECK_STATUS => Response::status(ErrorCode::Failed),
            _ => Response::success(""),
        });
        let adapter = adapter(connection).await;
        assert_eq!(adapter.app_status("server").await, None);
    }
}
