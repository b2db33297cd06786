pub mod operations;
pub mod routes;
pub mod view;
