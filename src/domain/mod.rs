// Domain layer: records, audit events and the ports the pipeline talks through.

pub mod model;
pub mod ports;
