pub mod postgres_participants;

pub use postgres_participants::PostgresParticipantDirectory;
