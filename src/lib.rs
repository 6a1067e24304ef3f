//! Small building blocks for HTTP services: a path-prefix request mux, a
//! shared/exclusive trigger lock, a serial write accumulator, and the
//! middleware and error helpers around them.

pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod sync;
pub mod text;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::Mux;
pub use sync::Trigger;
pub use text::SequenceWriter;
