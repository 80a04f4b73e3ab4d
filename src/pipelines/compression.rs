// SPDX-License-Identifier: GPL-3.0-only

//! JPEG persistence of the newest frame
//!
//! Each activation keeps only the most recent queued frame, converts it to
//! RGB and writes `image_<sec>.<nsec>.jpg` into the output directory.
//! Failures are logged; the stage keeps running.

use crate::errors::EncodeError;
use crate::media::to_rgb24;
use crate::sched::monotonic_now;
use crate::transport::{ReceivedFrame, Subscription};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Periodic stage writing compressed frames to disk
pub struct CompressionStage {
    subscription: Subscription,
    output_dir: PathBuf,
    quality: u8,
    written: u64,
}

impl CompressionStage {
    /// Create the stage, creating `output_dir` if needed
    pub fn new(subscription: Subscription, output_dir: PathBuf, quality: u8) -> std::io::Result<Self> {
        std::fs::create_dir_all(&output_dir)?;
        debug!(dir = %output_dir.display(), quality, "Compression stage ready");
        Ok(Self {
            subscription,
            output_dir,
            quality: quality.clamp(1, 100),
            written: 0,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Images written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn run_once(&mut self) {
        let Some(frame) = self.subscription.latest_frame() else {
            return;
        };

        let jpeg = match encode_frame(&frame, self.quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!(error = %e, "Failed to compress frame");
                return;
            }
        };

        let path = self.output_dir.join(image_file_name(monotonic_now()));
        match std::fs::write(&path, &jpeg) {
            Ok(()) => {
                self.written += 1;
                debug!(path = %path.display(), bytes = jpeg.len(), "Frame saved");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write image"),
        }
    }
}

/// `image_<seconds>.<nanoseconds>.jpg` for a monotonic timestamp
pub fn image_file_name(at: Duration) -> String {
    format!("image_{}.{:09}.jpg", at.as_secs(), at.subsec_nanos())
}

/// Encode a received frame as JPEG
pub fn encode_frame(frame: &ReceivedFrame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let format = frame
        .header
        .stream_format()
        .ok_or(EncodeError::PixelFormat(frame.header.pixel_format))?;

    let rgb = frame
        .payload
        .with_bytes(|data| to_rgb24(data, &format))?
        .ok_or(EncodeError::ShortPayload(format))?;

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder.encode(&rgb, format.width, format.height, image::ExtendedColorType::Rgb8)?;

    Ok(buffer)
}
