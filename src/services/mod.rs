pub mod database; // Relational and warehouse drivers
pub mod executor;
pub mod explainer;
pub mod introspector;
pub mod llm_service;
pub mod pipeline;
pub mod qualifier; // Heuristic SQL repair
pub mod ranker;
pub mod schema_context;
pub mod summarizer;
pub mod translator;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::*;
pub use explainer::*;
pub use introspector::*;
pub use llm_service::*;
pub use pipeline::*;
pub use qualifier::*;
pub use ranker::*;
pub use schema_context::*;
pub use summarizer::*;
pub use translator::*;
