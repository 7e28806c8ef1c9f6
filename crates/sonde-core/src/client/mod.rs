//! Interaction client adapter
//!
//! Thin seam between the engine and the server under test.

mod interaction;
mod transport;

pub use interaction::{Auth, FhirResponse, InteractionClient};
pub use transport::{DEFAULT_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, Method, Transport};
