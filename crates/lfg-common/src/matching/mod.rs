pub mod availability;
pub mod decision;
pub mod game_scoped;
pub mod index;
pub mod pipeline;
pub mod predicates;

pub use availability::{HourToken, local_hour, matches_availability, to_local_tokens};
pub use decision::{FilterDecision, FilterOutcome};
pub use game_scoped::run_game_scoped_checks;
pub use index::{CandidateIndex, PopulationSnapshot};
pub use pipeline::{DiscoveryConfig, DiscoveryEngine, DiscoveryError};
pub use predicates::run_all_predicates;
