mod repository_list;
mod repository_store;
mod update_check;
mod update_index;

pub use repository_list::parse_repository_list;
pub use repository_store::RepositoryStore;
pub use update_check::{AvailableUpdate, UpdateChecker};
pub use update_index::{
    IndexFetcher, IndexedPackage, RepositoryLocation, UpdateIndex, UPDATE_INDEX_FILE_NAME,
};
