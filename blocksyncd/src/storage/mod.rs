mod state_store;

pub use state_store::{StateStore, StoreError, default_db_path};
