pub mod clock;
pub mod config;
pub mod curriculum;
pub mod generator;
pub mod logging;
pub mod mastery;
pub mod persistence;
pub mod scheduler;
pub mod scoring;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use curriculum::{CatalogError, KnowledgeGraph};
pub use mastery::{MasteryError, MasteryStore};
pub use persistence::{FileProfileStore, InMemoryProfileStore, PersistenceError, ProfileStore};
pub use scheduler::{NextTopic, Scheduler};
pub use session::{Reply, SessionEngine};
