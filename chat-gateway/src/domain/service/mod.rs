//! 领域服务

mod connection_registry;
mod delivery_service;
mod participant_resolver;

pub use connection_registry::ConnectionRegistry;
pub use delivery_service::{DeliveryDomainService, DeliveryTopics};
pub use participant_resolver::ParticipantResolver;
