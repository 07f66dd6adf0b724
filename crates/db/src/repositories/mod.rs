mod knowledge_repository;
mod solution_repository;
mod view_state_repository;

pub use knowledge_repository::KnowledgeRepository;
pub use solution_repository::SolutionRepository;
pub use view_state_repository::ViewStateRepository;
