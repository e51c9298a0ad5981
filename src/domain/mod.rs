pub mod canvas_state;
pub mod connection;
pub mod dependency;
pub mod geometry;
pub mod section;
pub mod selection;
pub mod task;
pub mod validation;
pub mod viewport;
