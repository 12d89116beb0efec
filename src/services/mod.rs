pub mod camera; // ffmpeg-backed camera snapshots
pub mod nutrition;
pub mod prediction; // `/predict` HTTP client
pub mod view;

pub use camera::FfmpegCamera;
pub use prediction::{PredictClient, PredictionService};
pub use view::{FanoutView, HtmlView, ResultView, TerminalView};
