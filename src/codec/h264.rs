//! H.264 encoder/decoder pair backed by OpenH264

use bytes::Bytes;
use openh264::decoder::{Decoder, DecoderConfig};
use openh264::encoder::{
    BitRate, Encoder, EncoderConfig, FrameRate, FrameType, IntraFramePeriod, QpRange,
    RateControlMode, UsageType,
};
use openh264::formats::{YUVSlices, YUVSource};
use openh264::{OpenH264API, Timestamp};
use openh264_sys2::{SEncParamExt, ENCODER_OPTION_SVC_ENCODE_PARAM_EXT};
use tracing::{debug, info, trace};

use super::{VideoDecoder, VideoEncoder};
use crate::capture::frame::Frame;
use crate::error::{Error, Result};
use crate::CodecConfig;

/// Highest quantizer H.264 allows.
pub const MAX_QUANTIZER: u8 = 51;

/// Constant-quality, intra-only, zero-latency H.264 encoder.
pub struct H264Encoder {
    inner: Encoder,
    width: u32,
    height: u32,
    fps: u32,
}

impl H264Encoder {
    pub fn new(width: u32, height: u32, fps: u32, codec: &CodecConfig) -> Result<Self> {
        if codec.quantizer > MAX_QUANTIZER {
            return Err(Error::config(format!(
                "quantizer {} outside 0..={MAX_QUANTIZER}",
                codec.quantizer
            )));
        }
        info!(
            width,
            height,
            fps,
            quantizer = codec.quantizer,
            "opening H.264 encoder"
        );

        // Rate control off encodes every slice at the layer QP, which the
        // builder cannot reach; it is pinned below once the encoder exists.
        let config = EncoderConfig::new()
            .usage_type(UsageType::CameraVideoRealTime)
            .rate_control_mode(RateControlMode::Off)
            .skip_frames(false)
            .adaptive_quantization(false)
            .background_detection(false)
            .scene_change_detect(false)
            .bitrate(BitRate::from_bps(codec.bitrate))
            .max_frame_rate(FrameRate::from_hz(fps as f32))
            .qp(QpRange::new(codec.quantizer, codec.quantizer))
            .intra_frame_period(IntraFramePeriod::from_num_frames(1))
            .num_threads(1);

        let mut inner = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| Error::config(format!("failed to open H.264 encoder: {e}")))?;

        // The context is only built on the first frame, so push a throwaway
        // one through at the working geometry before changing its layer.
        let blank = Frame::placeholder(width, height)?;
        let (w, h) = (width as usize, height as usize);
        let source = YUVSlices::new((blank.y(), blank.u(), blank.v()), (w, h), (w, w / 2, w / 2));
        inner
            .encode(&source)
            .map_err(|e| Error::config(format!("failed to start H.264 encoder: {e}")))?;
        pin_layer_qp(&mut inner, codec.quantizer)?;
        inner.force_intra_frame();

        Ok(Self {
            inner,
            width,
            height,
            fps,
        })
    }
}

/// Set the spatial layer QP of an initialised encoder and read it back.
fn pin_layer_qp(encoder: &mut Encoder, quantizer: u8) -> Result<()> {
    let qp = i32::from(quantizer);
    let mut params = SEncParamExt::default();

    // SAFETY: the encoder was initialised by its first encode, and both
    // options copy exactly one `SEncParamExt` through the pointer.
    let (status, applied) = unsafe {
        let api = encoder.raw_api();
        let option = ENCODER_OPTION_SVC_ENCODE_PARAM_EXT;
        let mut status = api.get_option(option, std::ptr::addr_of_mut!(params).cast());
        if status == 0 {
            let layers = params.iSpatialLayerNum.clamp(1, params.sSpatialLayers.len() as i32);
            for layer in &mut params.sSpatialLayers[..layers as usize] {
                layer.iDLayerQp = qp;
            }
            status = api.set_option(option, std::ptr::addr_of_mut!(params).cast());
        }
        if status == 0 {
            params = SEncParamExt::default();
            status = api.get_option(option, std::ptr::addr_of_mut!(params).cast());
        }
        (status, params.sSpatialLayers[0].iDLayerQp)
    };

    if status != 0 {
        return Err(Error::config(format!(
            "H.264 encoder refused layer QP {quantizer} (status {status})"
        )));
    }
    if applied != qp {
        return Err(Error::config(format!(
            "H.264 encoder runs at QP {applied}, wanted {quantizer}"
        )));
    }
    debug!(qp, "layer QP pinned");
    Ok(())
}

impl VideoEncoder for H264Encoder {
    fn encode(&mut self, frame: &Frame, pts: u64) -> Result<Vec<Bytes>> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(Error::codec(format!(
                "encoder opened for {}x{}, got {}x{}",
                self.width,
                self.height,
                frame.width(),
                frame.height()
            )));
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let source = YUVSlices::new((frame.y(), frame.u(), frame.v()), (w, h), (w, w / 2, w / 2));
        let timestamp = Timestamp::from_millis(pts * 1000 / self.fps.max(1) as u64);

        let bitstream = self
            .inner
            .encode_at(&source, timestamp)
            .map_err(|e| Error::codec(format!("encoder rejected frame {pts}: {e}")))?;

        match bitstream.frame_type() {
            FrameType::Skip => {
                trace!(pts, "encoder produced no output");
                Ok(Vec::new())
            }
            FrameType::Invalid => Err(Error::codec(format!("encoder returned invalid frame {pts}"))),
            frame_type => {
                let unit = Bytes::from(bitstream.to_vec());
                trace!(pts, ?frame_type, bytes = unit.len(), "encoded frame");
                Ok(vec![unit])
            }
        }
    }
}

/// H.264 decoder writing straight into canonical frames.
pub struct H264Decoder {
    inner: Decoder,
}

impl H264Decoder {
    pub fn new() -> Result<Self> {
        let inner = Decoder::with_api_config(OpenH264API::from_source(), DecoderConfig::new())
            .map_err(|e| Error::config(format!("failed to open H.264 decoder: {e}")))?;
        Ok(Self { inner })
    }
}

impl VideoDecoder for H264Decoder {
    fn decode(&mut self, packet: &[u8], out: &mut Frame) -> Result<bool> {
        let decoded = self
            .inner
            .decode(packet)
            .map_err(|e| Error::codec(format!("decoder rejected packet: {e}")))?;

        let Some(yuv) = decoded else {
            return Ok(false);
        };

        let (width, height) = yuv.dimensions();
        if width != out.width() as usize || height != out.height() as usize {
            return Err(Error::codec(format!(
                "decoded {width}x{height} frame into {}x{} buffer",
                out.width(),
                out.height()
            )));
        }
        out.copy_from_strided((yuv.y(), yuv.u(), yuv.v()), yuv.strides())?;
        Ok(true)
    }
}
