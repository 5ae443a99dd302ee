mod bootstrap;
mod instance;
mod layout;
mod operations;
mod replace;
mod restart;
mod server;

pub use bootstrap::{
    bootstrap_payload, load_payload, locate_payload, maintenance_tool_file_name,
    write_maintenance_tool, PayloadLocation, PAYLOAD_ENV,
};
pub use instance::{
    InstanceLock, InstanceProbe, InstanceSignal, LockfileGuard, ProcessEntry, ProcessLister,
    SystemProcessLister, LOCKFILE_NAME,
};
pub use layout::{default_state_root, InstallerLayout};
pub use operations::{
    perform_operation, undo_operation, OperationDirection, OperationKind, OperationRequest,
    OperationRunner,
};
pub use replace::{replace_maintenance_tool_binary, BaseReplacement, UPDATE_BASE_FLAG};
pub use restart::SelfRestarter;
pub use server::{parse_server_port, FsServer};
