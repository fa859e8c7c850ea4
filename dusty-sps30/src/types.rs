/// Particle mass concentration in µg/m³, binned by upper particle size.
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MassConcentration {
    /// Mass concentration PM1.0 [µg/m³]
    pub mc_1p0: f32,
    /// Mass concentration PM2.5 [µg/m³]
    pub mc_2p5: f32,
    /// Mass concentration PM4.0 [µg/m³]
    pub mc_4p0: f32,
    /// Mass concentration PM10.0 [µg/m³]
    pub mc_10p0: f32,
}

/// Particle number concentration in #/cm³, binned by upper particle size.
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NumberConcentration {
    /// Number concentration PM0.5 [#/cm³]
    pub nc_0p5: f32,
    /// Number concentration PM1.0 [#/cm³]
    pub nc_1p0: f32,
    /// Number concentration PM2.5 [#/cm³]
    pub nc_2p5: f32,
    /// Number concentration PM4.0 [#/cm³]
    pub nc_4p0: f32,
    /// Number concentration PM10.0 [#/cm³]
    pub nc_10p0: f32,
}

/// A full decoded measurement block.
///
/// The sensor sends ten IEEE-754 floats; values are passed through
/// unvalidated, so NaN or negative readings reach the caller as sent.
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Measurement {
    pub mass_concentration: MassConcentration,
    pub number_concentration: NumberConcentration,
    pub typical_particle_size: f32,
}

impl Measurement {
    /// Reassemble the 20 checksum-validated words of a measurement reply.
    ///
    /// Each consecutive pair of words holds one float in big-endian wire
    /// order; the bits are shifted into a host-order `u32` and
    /// reinterpreted with [`f32::from_bits`], never read through
    /// overlapping storage.
    pub(crate) fn from_words(words: &[u16; 20]) -> Self {
        let mut values = [0.0f32; 10];
        for (value, pair) in values.iter_mut().zip(words.chunks_exact(2)) {
            *value = f32::from_bits(((pair[0] as u32) << 16) | pair[1] as u32);
        }

        Self {
            mass_concentration: MassConcentration {
                mc_1p0: values[0],
                mc_2p5: values[1],
                mc_4p0: values[2],
                mc_10p0: values[3],
            },
            number_concentration: NumberConcentration {
                nc_0p5: values[4],
                nc_1p0: values[5],
                nc_2p5: values[6],
                nc_4p0: values[7],
                nc_10p0: values[8],
            },
            typical_particle_size: values[9],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_for(values: &[f32; 10]) -> [u16; 20] {
        let mut words = [0u16; 20];
        for (pair, value) in words.chunks_exact_mut(2).zip(values) {
            let bits = value.to_bits();
            pair[0] = (bits >> 16) as u16;
            pair[1] = bits as u16;
        }
        words
    }

    #[test]
    fn all_zero_words_decode_to_zero() {
        let m = Measurement::from_words(&[0u16; 20]);

        assert_eq!(m, Measurement::default());
    }

    /// Fields land in the documented wire order: four mass bins, five
    /// number bins, then the typical particle size.
    #[test]
    fn field_order() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let m = Measurement::from_words(&words_for(&values));

        assert_eq!(
            m.mass_concentration,
            MassConcentration {
                mc_1p0: 1.0,
                mc_2p5: 2.0,
                mc_4p0: 3.0,
                mc_10p0: 4.0,
            }
        );
        assert_eq!(
            m.number_concentration,
            NumberConcentration {
                nc_0p5: 5.0,
                nc_1p0: 6.0,
                nc_2p5: 7.0,
                nc_4p0: 8.0,
                nc_10p0: 9.0,
            }
        );
        assert_eq!(m.typical_particle_size, 10.0);
    }

    /// A known bit pattern survives the word split bit-exactly.
    #[test]
    fn bit_exact_reassembly() {
        let mut words = [0u16; 20];
        words[0] = 0x3F80; // 1.0f32 == 0x3F80_0000
        words[1] = 0x0000;

        assert_eq!(Measurement::from_words(&words).mass_concentration.mc_1p0, 1.0);
    }

    /// Out-of-range sensor values are passed through, not sanitized.
    #[test]
    fn nan_and_negative_pass_through() {
        let mut values = [0.0f32; 10];
        values[0] = -2.5;
        values[9] = f32::NAN;

        let m = Measurement::from_words(&words_for(&values));

        assert_eq!(m.mass_concentration.mc_1p0, -2.5);
        assert!(m.typical_particle_size.is_nan());
    }
}
