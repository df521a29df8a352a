//! Router trees: declarations, their registrations, and the flattened route table.

pub mod extractor;
pub mod graph;
pub mod listing;

pub use extractor::{RouteExtraction, RouteTreeExtractor};
pub use graph::ResourceGraph;
pub use listing::{ListedRoute, RouteListing, RouteMatch, VisitStep};
