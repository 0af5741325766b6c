// Domain layer: archive models, query builders and ports.

pub mod model;
pub mod ports;
pub mod query;
