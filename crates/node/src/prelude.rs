//! A prelude is provided which imports all the important data types and traits of ringkv.
/// Use this when you want to quickly bootstrap a new project.
pub use ringkv_core;

pub use self::ringkv_core::config::RingConfig;
pub use self::ringkv_core::dht::ItemKey;
pub use self::ringkv_core::dht::NodeAddr;
pub use self::ringkv_core::dht::NodeKey;
pub use self::ringkv_core::inspect::NodeInspect;
pub use self::ringkv_core::message::Message;
pub use self::ringkv_core::message::MessagePayload;
pub use self::ringkv_core::message::NodeMode;
pub use self::ringkv_core::message::OpResult;
pub use self::ringkv_core::storage::Item;
pub use self::ringkv_core::swarm::Swarm;
pub use self::ringkv_core::swarm::SwarmBuilder;
pub use self::ringkv_core::transport::LatencyConfig;
pub use self::ringkv_core::transport::MemoryTransport;
pub use self::ringkv_core::transport::SwarmTransport;
