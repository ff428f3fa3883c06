//! Live camera as a detection frame source.

use watchlist_core::{Frame, FrameSource};
use watchlist_hw::{Camera, CameraError};

/// Opens a fresh frame source for each detection session.
pub trait SourceOpener {
    type Source: FrameSource;

    fn open(&mut self) -> Result<Self::Source, CameraError>;

    /// Human-readable name of the device, for status output.
    fn describe(&self) -> String;
}

pub struct CameraOpener {
    device: String,
}

impl CameraOpener {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl SourceOpener for CameraOpener {
    type Source = CameraSource;

    fn open(&mut self) -> Result<CameraSource, CameraError> {
        let camera = Camera::open(&self.device).map_err(|e| {
            if matches!(e, CameraError::DeviceNotFound(_)) {
                let available: Vec<String> = Camera::list_devices()
                    .into_iter()
                    .map(|d| format!("{} ({}, {}, {})", d.path, d.name, d.driver, d.bus))
                    .collect();
                tracing::warn!(device = %self.device, ?available, "capture device not found");
            }
            e
        })?;
        tracing::info!(
            device = %self.device,
            width = camera.width,
            height = camera.height,
            fourcc = ?camera.fourcc,
            "camera opened"
        );
        Ok(CameraSource(camera))
    }

    fn describe(&self) -> String {
        self.device.clone()
    }
}

pub struct CameraSource(Camera);

impl FrameSource for CameraSource {
    type Error = CameraError;

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let captured = self.0.capture_frame()?;
        tracing::trace!(sequence = captured.sequence, "frame captured");
        Ok(Frame::rgb(captured.data, captured.width, captured.height))
    }
}
