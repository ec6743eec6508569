// Module audio - Renderer, output stream and real-time helpers

pub mod dsp_utils;
pub mod engine;
pub mod format_conversion;
pub mod load_monitor;
pub mod parameters;
pub mod renderer;
