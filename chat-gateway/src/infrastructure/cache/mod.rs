pub mod redis_participants;

pub use redis_participants::RedisParticipantCache;
