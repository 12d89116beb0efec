//! Camera snapshots through an `ffmpeg` capture process.
//!
//! Opening the camera starts `ffmpeg` reading a V4L2 device and streaming raw
//! RGB frames to stdout. A background task keeps only the newest frame; taking
//! the snapshot grabs it and kills the process.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::ImagePayload;

/// File name given to camera snapshots
pub const SNAPSHOT_FILE_NAME: &str = "camera.jpg";

/// How long opening may take before the device counts as unavailable
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera {device:?}")]
    Open {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("camera {device:?} produced no frame")]
    NoFrame { device: String },
    #[error("failed to encode snapshot")]
    Encode(#[from] image::ImageError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Raw RGB8 frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[async_trait::async_trait]
pub trait Camera: Send + Sync {
    /// Start streaming; resolves once the device delivers its first frame
    async fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError>;
}

#[async_trait::async_trait]
pub trait CameraStream: Send {
    fn device(&self) -> &str;

    /// Take the most recent frame and release the device
    async fn capture(self: Box<Self>) -> Result<Frame, CaptureError>;
}

pub struct FfmpegCamera {
    device: String,
    width: u32,
    height: u32,
}

impl FfmpegCamera {
    pub fn new(device: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            device: device.into(),
            width,
            height,
        }
    }

    fn capture_args(&self) -> Vec<String> {
        let size = format!("{}x{}", self.width, self.height);
        let scale = format!("scale={}:{}", self.width, self.height);

        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "video4linux2",
            "-video_size",
            size.as_str(),
            "-i",
            self.device.as_str(),
            "-vf",
            scale.as_str(),
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait::async_trait]
impl Camera for FfmpegCamera {
    async fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
        log::info!("📷 Opening camera {} ({}x{})", self.device, self.width, self.height);

        let mut child = Command::new("ffmpeg")
            .args(self.capture_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Open {
                device: self.device.clone(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

        let (tx, mut rx) = watch::channel(None::<Arc<Frame>>);
        let (width, height) = (self.width, self.height);
        let frame_len = width as usize * height as usize * 3;

        let reader = tokio::spawn(async move {
            loop {
                let mut data = vec![0u8; frame_len];
                if let Err(e) = stdout.read_exact(&mut data).await {
                    log::debug!("Camera stream ended: {}", e);
                    break;
                }
                if tx.send(Some(Arc::new(Frame { data, width, height }))).is_err() {
                    break;
                }
            }
        });

        match tokio::time::timeout(FIRST_FRAME_TIMEOUT, rx.changed()).await {
            Ok(Ok(())) => {}
            _ => {
                reader.abort();
                let _ = child.kill().await;
                return Err(CaptureError::NoFrame {
                    device: self.device.clone(),
                });
            }
        }

        log::info!("✅ Camera {} streaming", self.device);
        Ok(Box::new(FfmpegStream {
            device: self.device.clone(),
            child,
            reader,
            latest: rx,
        }))
    }
}

struct FfmpegStream {
    device: String,
    child: Child,
    reader: JoinHandle<()>,
    latest: watch::Receiver<Option<Arc<Frame>>>,
}

#[async_trait::async_trait]
impl CameraStream for FfmpegStream {
    fn device(&self) -> &str {
        &self.device
    }

    async fn capture(mut self: Box<Self>) -> Result<Frame, CaptureError> {
        let frame = self.latest.borrow().clone();

        self.reader.abort();
        if let Err(e) = self.child.kill().await {
            log::warn!("⚠️ Failed to stop camera process: {}", e);
        }
        log::info!("🛑 Camera {} released", self.device);

        let frame = frame.ok_or_else(|| CaptureError::NoFrame {
            device: self.device.clone(),
        })?;
        Ok(Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone()))
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
        CaptureError::Other(anyhow!(
            "frame buffer of {} bytes does not match {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&image)?;
    Ok(buffer)
}

/// Encode a frame into the same kind of payload a picked file produces
pub fn snapshot_payload(frame: &Frame, quality: u8) -> Result<ImagePayload, CaptureError> {
    let jpeg = encode_jpeg(frame, quality)?;
    log::debug!("📊 Snapshot encoded: {}x{} -> {} bytes", frame.width, frame.height, jpeg.len());
    Ok(ImagePayload::new(SNAPSHOT_FILE_NAME, "image/jpeg", jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> Frame {
        Frame {
            data: vec![128; (width * height * 3) as usize],
            width,
            height,
        }
    }

    #[test]
    fn test_capture_args() {
        let camera = FfmpegCamera::new("/dev/video2", 640, 480);
        let args = camera.capture_args();

        assert!(args.windows(2).any(|w| w == ["-i", "/dev/video2"]));
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x480"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgb24"]));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_snapshot_is_jpeg() {
        let payload = snapshot_payload(&gray_frame(8, 4), 90).unwrap();

        assert_eq!(payload.file_name, "camera.jpg");
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(&payload.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_short_frame_buffer_is_rejected() {
        let frame = Frame {
            data: vec![0; 10],
            width: 8,
            height: 4,
        };
        assert!(matches!(encode_jpeg(&frame, 90), Err(CaptureError::Other(_))));
    }
}
