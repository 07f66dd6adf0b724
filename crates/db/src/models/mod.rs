mod knowledge;
mod solution;
mod view_state;

pub use knowledge::{KnowledgeEntry, KnowledgeRow};
pub use solution::{SolutionEntry, SolutionRow};
pub use view_state::{ViewStateRow, ViewStateSnapshot};
