pub mod complexity;
pub mod definition;
pub mod scope;

pub use complexity::{ComplexityAnalyzer, analyze};
pub use definition::{Classification, DefinitionResolver, LocatedDefinition, extract_package_name};
pub use scope::OutOfScopeAnalyzer;
