// HTTP inference surface

pub mod health;
pub mod predictions;
pub mod routes;
