mod problem;
mod run;
mod solution;
mod trace;
mod view_state;

pub use problem::{Modality, ProblemInput};
pub use run::{Run, RunStatus};
pub use solution::{HitlReason, SolutionResult, SourceRef, SourceType};
pub use trace::TraceEntry;
pub use view_state::ViewState;
