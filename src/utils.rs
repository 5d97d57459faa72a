use std::path::Path;

use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::capture::frame::PixelFormat;
use crate::error::{Error, Result};

/// Highest `/dev/videoN` index probed.
const MAX_VIDEO_NODES: u32 = 10;

/// Find the first capture device offering `format`.
pub fn auto_detect_device(format: PixelFormat) -> Result<String> {
    info!(?format, "Auto-detecting capture devices...");
    let wanted = FourCC::new(&format.fourcc());

    for i in 0..MAX_VIDEO_NODES {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            debug!("{path} ({}) cannot capture", caps.card);
            continue;
        }

        match dev.enum_formats() {
            Ok(formats) if formats.iter().any(|f| f.fourcc == wanted) => {
                info!("Found {format:?} device: {path} - {}", caps.card);
                return Ok(path);
            }
            Ok(_) => debug!("{path} ({}) does not offer {format:?}", caps.card),
            Err(e) => debug!("{path}: enumerating formats failed: {e}"),
        }
    }

    Err(Error::config(format!("no capture device offers {format:?}")))
}
