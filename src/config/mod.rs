mod canvas_config;

pub use canvas_config::CanvasConfig;
