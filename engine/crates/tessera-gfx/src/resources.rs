pub mod resource_desc;
pub mod sampler_state;
