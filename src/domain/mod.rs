// Domain layer: platform handles, the workload and the ports the synth engine talks through.

pub mod model;
pub mod ports;
