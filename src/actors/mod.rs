pub mod messages;
pub mod store_actor;

pub use store_actor::ChatStoreHandle;
