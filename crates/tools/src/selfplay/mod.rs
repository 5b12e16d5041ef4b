pub mod board;
pub mod engine;
pub mod game;
pub mod position;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use board::GameBoard;
pub use engine::{
    EngineConfig, EngineIo, EngineLauncher, EngineOptions, EngineProcess, ProcessLauncher,
    UciEngine,
};
pub use game::{AdjudicationConfig, Adjudicator, GameConfig, GameReport, play_game};
pub use position::{StartPositionConfig, chess960_position, load_start_positions, setup_board};
pub use types::{InfoSnapshot, MATE_SCORE, Score, SearchLimit, SearchOutcome, Termination};
