pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod session;

pub use routes::create_router;
