//! Names of the RPC endpoints bound by the server.

pub const CLIENT_CONNECTED: &str = "client_connected";

// Transport broker
pub const OPEN: &str = "open";
pub const CLOSE: &str = "close";
pub const SEND: &str = "send";
pub const RECEIVE: &str = "receive";

// Application lifecycle
pub const APP_START: &str = "app_start";
pub const APP_STOP: &str = "app_stop";
pub const APP_CHECK_STATUS: &str = "app_check_status";

// Files
pub const FILE_BACKUP: &str = "file_backup";
pub const FILE_RESTORE: &str = "file_restore";
pub const FILE_UPDATE: &str = "file_update";
pub const FILE_EXISTS: &str = "file_exists";
pub const FILE_CONTENT: &str = "file_content";
pub const FILE_DELETE: &str = "file_delete";

// Folders
pub const FOLDER_EXISTS: &str = "folder_exists";
pub const FOLDER_CREATE: &str = "folder_create";
pub const FOLDER_DELETE: &str = "folder_delete";

pub const COMMAND_EXECUTE: &str = "command_execute";
