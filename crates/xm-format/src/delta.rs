//! Delta coding for 8-bit and 16-bit PCM sample data.
//!
//! The `.xm` format stores every sample's waveform as a running delta
//! rather than absolute values; `libxm` may optionally re-apply the
//! same coding to shrink its own dump. Both directions live here so
//! the loader and the serializer share one implementation.

pub(crate) fn decode_delta_8(raw: &[u8]) -> Vec<i8> {
    let mut acc: i8 = 0;
    raw.iter()
        .map(|&b| {
            acc = acc.wrapping_add(b as i8);
            acc
        })
        .collect()
}

pub(crate) fn encode_delta_8(samples: &[i8]) -> Vec<u8> {
    let mut prev: i8 = 0;
    samples
        .iter()
        .map(|&s| {
            let delta = s.wrapping_sub(prev) as u8;
            prev = s;
            delta
        })
        .collect()
}

pub(crate) fn decode_delta_16(raw: &[u8]) -> Vec<i16> {
    let mut acc: i16 = 0;
    raw.chunks_exact(2)
        .map(|c| {
            let delta = i16::from_le_bytes([c[0], c[1]]);
            acc = acc.wrapping_add(delta);
            acc
        })
        .collect()
}

pub(crate) fn encode_delta_16(samples: &[i16]) -> Vec<u8> {
    let mut prev: i16 = 0;
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let delta = s.wrapping_sub(prev);
        out.extend_from_slice(&delta.to_le_bytes());
        prev = s;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_8_round_trips() {
        let samples: Vec<i8> = vec![0, 5, -10, 127, -128, 3];
        let encoded = encode_delta_8(&samples);
        assert_eq!(decode_delta_8(&encoded), samples);
    }

    #[test]
    fn delta_16_round_trips() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN, 42];
        let encoded = encode_delta_16(&samples);
        assert_eq!(decode_delta_16(&encoded), samples);
    }

    #[test]
    fn delta_8_handles_wraparound() {
        let samples: Vec<i8> = vec![120, -120, 120, -120];
        let encoded = encode_delta_8(&samples);
        assert_eq!(decode_delta_8(&encoded), samples);
    }
}
