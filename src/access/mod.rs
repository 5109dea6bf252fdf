pub mod hierarchy;
pub mod resolver;

pub use hierarchy::{expand_hierarchy, HierarchyExpansion};
pub use resolver::{AccessResolver, AccessScope, PracticeAccess, ProviderAccess};
