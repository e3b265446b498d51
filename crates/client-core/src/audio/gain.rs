//! Post-processing gain stage
//!
//! Applied by whatever plays the remote audio stream back, using the
//! multiplier the enhancer installed on the stream
//! ([`AggregateStream::gain`](crate::media::AggregateStream::gain)).

use super::{AudioPlatformError, AudioPlatformResult};

#[inline]
fn scale_i16(sample: i16, gain: f32) -> i16 {
    let scaled = (sample as f32 * gain).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[inline]
fn scale_f32(sample: f32, gain: f32) -> f32 {
    (sample * gain).clamp(-1.0, 1.0)
}

/// Fixed multiplier applied to PCM frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainProcessor {
    gain: f32,
}

impl GainProcessor {
    pub fn new(gain: f32) -> AudioPlatformResult<Self> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(AudioPlatformError::failed(format!("invalid gain {}", gain)));
        }
        Ok(Self { gain })
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Scale 16-bit samples into `output`, saturating at the sample range
    pub fn process_i16(&self, input: &[i16], output: &mut [i16]) -> AudioPlatformResult<()> {
        if input.len() != output.len() {
            return Err(AudioPlatformError::failed(format!(
                "frame length mismatch: {} in, {} out",
                input.len(),
                output.len()
            )));
        }

        // Four at a time; the tail falls through to the zip below
        let mut in_chunks = input.chunks_exact(4);
        let mut out_chunks = output.chunks_exact_mut(4);
        for (src, dst) in (&mut in_chunks).zip(&mut out_chunks) {
            dst[0] = scale_i16(src[0], self.gain);
            dst[1] = scale_i16(src[1], self.gain);
            dst[2] = scale_i16(src[2], self.gain);
            dst[3] = scale_i16(src[3], self.gain);
        }
        for (src, dst) in in_chunks.remainder().iter().zip(out_chunks.into_remainder()) {
            *dst = scale_i16(*src, self.gain);
        }
        Ok(())
    }

    pub fn process_i16_in_place(&self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            *sample = scale_i16(*sample, self.gain);
        }
    }

    /// Scale normalized float samples in place, clamping to [-1.0, 1.0]
    pub fn process_f32_in_place(&self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = scale_f32(*sample, self.gain);
        }
    }
}
