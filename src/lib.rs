pub mod config;
pub mod exception;
pub mod filter;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod util;

pub use config::Config;
pub use exception::{Exception, GlobalExceptionHandler};
pub use filter::{Filter, FilterChain, LoggingFilter, RequestContext};
pub use param::HttpRequestMethod;
pub use request::Request;
pub use response::Response;
pub use router::{Handler, Router};
pub use server::WebServer;
pub use util::HtmlBuilder;
