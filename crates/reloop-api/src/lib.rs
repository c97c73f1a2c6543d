pub mod auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod geo;
pub mod media;
pub mod middleware;
pub mod orders;
pub mod pagination;
pub mod policy;
pub mod products;
pub mod render;
pub mod response;
pub mod rewrite;
pub mod routes;
pub mod state;
pub mod tokens;
pub mod users;

#[cfg(test)]
pub(crate) mod testutil;
