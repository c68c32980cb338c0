//! Typesense implementation of the search index provider.

mod provider;

pub use provider::TypesenseProvider;
