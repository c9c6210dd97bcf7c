pub mod candidate;
pub mod confirm;
pub mod context;
pub mod core_api;
pub mod detector;
pub mod identity;
pub mod index;
pub mod known;
pub mod layout;
pub mod patch;
pub mod plugin;
pub mod providers;
pub mod reader;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod store;
