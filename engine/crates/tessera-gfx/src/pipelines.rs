pub mod pipeline_desc;
pub mod render_state;
