// Domain layer: the pool and instance models plus the ports the coordinator is written against.

pub mod model;
pub mod ports;
