mod feedback;
mod health;
mod ingest;
mod knowledge;
mod runs;
mod session;
mod solve;
pub mod sse;

pub use feedback::*;
pub use health::*;
pub use ingest::*;
pub use knowledge::*;
pub use runs::*;
pub use session::*;
pub use solve::*;
