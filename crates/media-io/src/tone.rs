//! Synthetic tone generation, used to backfill the output WAV when a
//! receiver stops without ever having seen real RTP audio.

use sipline_codec_core::ulaw_compress;

const SAMPLE_RATE_HZ: u32 = 8000;
const TONE_HZ: f64 = 1000.0;
const AMPLITUDE: f64 = 8000.0;

/// One second of 1kHz sine wave, μ-law encoded at 8kHz (8000 bytes).
pub fn one_second_tone() -> Vec<u8> {
    (0..SAMPLE_RATE_HZ)
        .map(|n| {
            let t = n as f64 / SAMPLE_RATE_HZ as f64;
            let sample = (AMPLITUDE * (2.0 * std::f64::consts::PI * TONE_HZ * t).sin()) as i16;
            ulaw_compress(sample)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_is_one_second_at_8khz() {
        assert_eq!(one_second_tone().len(), 8000);
    }

    #[test]
    fn tone_is_not_constant() {
        let tone = one_second_tone();
        assert!(tone.iter().any(|&b| b != tone[0]));
    }
}
