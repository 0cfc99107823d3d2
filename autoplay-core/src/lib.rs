pub mod emulator;
pub mod error;
pub mod input;
pub mod integrate;
pub mod motifs;
pub mod movie;
pub mod objectives;
pub mod pfstate;
pub mod rng;
pub mod sim;

pub use emulator::{Emulator, EmulatorFactory};
pub use error::{MotifsError, MovieError, ObjectivesError, SnapshotError};
pub use integrate::score_integral;
pub use motifs::{Motif, MotifStore};
pub use objectives::WeightedObjectives;
pub use pfstate::{Checkpoint, PersistentState};
pub use rng::ArcFour;
