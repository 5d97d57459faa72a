use avdegrade::capture::frame::{Frame, PLACEHOLDER_CHROMA, PLACEHOLDER_LUMA};
use avdegrade::codec::{DegradeEngine, H264Decoder, H264Encoder, Outcome, VideoEncoder};
use avdegrade::{CodecConfig, Result};
use bytes::Bytes;

fn engine(quantizer: u8) -> DegradeEngine {
    let codec = CodecConfig {
        quantizer,
        ..CodecConfig::default()
    };
    DegradeEngine::h264(64, 64, 30, &codec).unwrap()
}

#[test]
fn static_input_converges_to_a_fixed_output() {
    let engine = engine(30);
    let input = Frame::solid(64, 64, 200, 128, 128).unwrap();
    let mut output = Frame::new(64, 64).unwrap();

    let mut previous: Option<Frame> = None;
    let mut stable_at = None;
    for call in 0..10 {
        let outcome = engine.degrade(&input, &mut output).unwrap();
        if outcome == Outcome::Decoded {
            if previous.as_ref() == Some(&output) {
                stable_at = Some(call);
                break;
            }
            previous = Some(output.clone());
        }
    }

    assert!(stable_at.is_some(), "output never settled within 10 calls");
    // a flat grey frame survives intra coding almost untouched
    let mean = output.y().iter().map(|&p| p as u32).sum::<u32>() / output.y().len() as u32;
    assert!((195..=205).contains(&mean), "luma mean {mean}");
    assert!(output.u().iter().all(|&c| c.abs_diff(128) <= 4));
}

#[test]
fn every_call_counts_as_one_tick() {
    let engine = engine(26);
    let input = Frame::solid(64, 64, 16, 128, 128).unwrap();
    let mut output = Frame::new(64, 64).unwrap();
    for _ in 0..3 {
        engine.degrade(&input, &mut output).unwrap();
    }
    assert_eq!(engine.frames_processed().unwrap(), 3);
}

/// Real H.264 encoder that withholds its first unit, like a codec with one
/// frame of start-up latency.
struct LateStart {
    inner: H264Encoder,
    started: bool,
}

impl VideoEncoder for LateStart {
    fn encode(&mut self, frame: &Frame, pts: u64) -> Result<Vec<Bytes>> {
        let units = self.inner.encode(frame, pts)?;
        if !self.started {
            self.started = true;
            return Ok(Vec::new());
        }
        Ok(units)
    }
}

#[test]
fn missing_output_is_masked_with_the_exact_placeholder() {
    let encoder = LateStart {
        inner: H264Encoder::new(64, 64, 30, &CodecConfig::default()).unwrap(),
        started: false,
    };
    let engine = DegradeEngine::with_codecs(64, 64, encoder, H264Decoder::new().unwrap());
    let input = Frame::solid(64, 64, 60, 100, 150).unwrap();
    let mut output = Frame::solid(64, 64, 1, 2, 3).unwrap();

    assert_eq!(engine.degrade(&input, &mut output).unwrap(), Outcome::Placeholder);
    assert!(output.y().iter().all(|&p| p == PLACEHOLDER_LUMA));
    assert!(output
        .u()
        .iter()
        .chain(output.v())
        .all(|&c| c == PLACEHOLDER_CHROMA));

    assert_eq!(engine.degrade(&input, &mut output).unwrap(), Outcome::Decoded);
    assert!(!output.is_placeholder());
    assert_eq!(engine.frames_processed().unwrap(), 2);
}

/// Pseudo-random luma and chroma so every macroblock carries detail.
fn noise_frame(width: u32, height: u32) -> Frame {
    let mut frame = Frame::new(width, height).unwrap();
    let mut state = 0x2545_f491_u32;
    let (y, u, v) = frame.planes_mut();
    for px in y.iter_mut().chain(u.iter_mut()).chain(v.iter_mut()) {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        *px = (state >> 24) as u8;
    }
    frame
}

/// Summed absolute luma error after a few round trips at `quantizer`.
fn luma_error(quantizer: u8, input: &Frame) -> u64 {
    let engine = engine(quantizer);
    let mut output = Frame::new(64, 64).unwrap();
    for _ in 0..3 {
        assert_eq!(engine.degrade(input, &mut output).unwrap(), Outcome::Decoded);
    }
    input
        .y()
        .iter()
        .zip(output.y())
        .map(|(&a, &b)| u64::from(a.abs_diff(b)))
        .sum()
}

#[test]
fn coarser_quantizer_loses_more_detail() {
    let input = noise_frame(64, 64);
    let fine = luma_error(5, &input);
    let default = luma_error(26, &input);
    let coarse = luma_error(51, &input);
    assert!(fine < default, "qp5={fine} qp26={default}");
    assert!(default < coarse, "qp26={default} qp51={coarse}");
}

#[test]
fn wrong_geometry_is_a_round_trip_error() {
    let engine = engine(26);
    let input = Frame::new(32, 32).unwrap();
    let mut output = Frame::new(64, 64).unwrap();
    assert!(matches!(
        engine.degrade(&input, &mut output),
        Err(avdegrade::Error::CodecRoundTrip(_))
    ));
}
