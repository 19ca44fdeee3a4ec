pub mod app_config;
pub mod database;
pub mod events;
pub mod live;
pub mod memory;
pub mod redis_repo;

pub use database::PgStore;
pub use events::EventProducer;
pub use live::{ChangeFeed, Collection, StoreChange};
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
