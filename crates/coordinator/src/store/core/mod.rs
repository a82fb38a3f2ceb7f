pub mod context;
pub mod redis;

pub use self::context::StoreContext;
pub use self::redis::RedisStore;
