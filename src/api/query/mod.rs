//! OData Query Builder Module
//!
//! Typed filters over property handles, a fluent builder producing reusable
//! [`FindRequest`] snapshots, the compiler that renders them into query
//! strings, and the cursor that walks paged results.

pub mod builder;
pub mod compiler;
pub mod expression;
pub mod filters;
pub mod orderby;
pub mod pages;
pub mod request;
pub mod result;

pub use builder::QueryBuilder;
pub use compiler::{DefaultValueFormatter, Encoding, QueryCompiler, ValueFormatter};
pub use expression::Expr;
pub use filters::Filter;
pub use orderby::{SortDirection, SortKey};
pub use pages::{DocumentStream, PageFetcher, PaginationCursor};
pub use request::FindRequest;
pub use result::Page;
