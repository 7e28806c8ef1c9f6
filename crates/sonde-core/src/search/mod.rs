//! Search parameter building and search execution

pub mod params;
pub mod protocol;

pub use params::{
    SearchParameterSpec, SearchParams, Unresolved, ValueOrigin, ValueTransform, build,
};
pub use protocol::{SearchProtocol, UNDOCUMENTED_SEARCH_WARNING};
