use crate::envelope::singers_formant_center;
use crate::types::SynthesisParameters;

/// Singer's-formant boost used by the audio graph, in dB.
pub const SINGERS_FORMANT_GAIN_DB: f64 = 8.0;
pub const MASTER_SCALE: f64 = 6.0;
pub const MIN_TILT_CUTOFF_HZ: f64 = 800.0;
pub const BREATH_SCALE: f64 = 0.2;

/// A bandpass section's settings. `None` leaves the live value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandTarget {
    pub freq: Option<f64>,
    pub q: Option<f64>,
}

/// A peaking section's settings. `None` leaves the live value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakTarget {
    pub freq: Option<f64>,
    pub gain_db: Option<f64>,
    pub q: Option<f64>,
}

/// Control-rate values for every live parameter of the voice graph.
///
/// Only finite values make it in; anything unusable is left as `None` so the
/// graph keeps gliding toward whatever it had before.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceTargets {
    pub pitch: Option<f64>,
    pub sub_pitch: Option<f64>,
    pub master_gain: Option<f64>,
    pub tilt_cutoff: Option<f64>,
    pub formants: [BandTarget; 3],
    pub singers: PeakTarget,
    pub boost: PeakTarget,
    pub breath_gain: Option<f64>,
}

impl VoiceTargets {
    pub fn from_params(params: &SynthesisParameters) -> Self {
        let physics = &params.physics;
        let thickness = clamp_thickness(physics.fold_thickness);

        let pitch = positive(params.pitch);
        let volume = if params.volume.is_finite() {
            params.volume.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let centers = params.formants.scaled_centers(physics);
        let formants = [0, 1, 2].map(|i| {
            let freq = positive(centers[i]);
            BandTarget {
                freq,
                q: freq.and_then(|f| positive(f / params.formants.bandwidth(i))),
            }
        });

        let singers = PeakTarget {
            freq: positive(singers_formant_center(physics)),
            gain_db: Some(if params.singers_formant {
                SINGERS_FORMANT_GAIN_DB
            } else {
                0.0
            }),
            q: None,
        };

        let boost_params = &params.harmonic_boost;
        let boost = if boost_params.active {
            PeakTarget {
                freq: positive(boost_params.freq),
                gain_db: finite(boost_params.gain),
                q: positive(boost_params.q),
            }
        } else {
            PeakTarget {
                gain_db: Some(0.0),
                ..PeakTarget::default()
            }
        };

        Self {
            pitch,
            sub_pitch: pitch.map(|p| p / 2.0),
            master_gain: finite(volume * MASTER_SCALE * thickness_boost(thickness)),
            tilt_cutoff: finite(tilt_cutoff(thickness)),
            formants,
            singers,
            boost,
            breath_gain: finite(breath_gain(physics.closed_quotient)),
        }
    }
}

/// Loudness gain from thicker folds: 1.0 at 0, 3.0 at 100.
pub fn thickness_boost(fold_thickness: f64) -> f64 {
    1.0 + 2.0 * (clamp_thickness(fold_thickness) / 100.0)
}

pub fn tilt_cutoff(fold_thickness: f64) -> f64 {
    (12_000.0 - 112.0 * clamp_thickness(fold_thickness)).max(MIN_TILT_CUTOFF_HZ)
}

/// Level of the breath noise; breathier phonation lets more air through.
pub fn breath_gain(closed_quotient: f64) -> f64 {
    ((1.0 - closed_quotient) * BREATH_SCALE).max(0.0)
}

fn clamp_thickness(fold_thickness: f64) -> f64 {
    if fold_thickness.is_finite() {
        fold_thickness.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FormantTriple, HarmonicBoost, VocalPhysics};
    use approx::assert_relative_eq;

    #[test]
    fn default_voice() {
        let targets = VoiceTargets::from_params(&SynthesisParameters::default());
        assert_eq!(targets.pitch, Some(120.0));
        assert_eq!(targets.sub_pitch, Some(60.0));
        // volume 0.5, thickness 50
        assert_relative_eq!(targets.master_gain.unwrap(), 0.5 * 6.0 * 2.0);
        assert_relative_eq!(targets.tilt_cutoff.unwrap(), 12_000.0 - 5_600.0);
        assert_relative_eq!(targets.breath_gain.unwrap(), 0.1);
        assert_eq!(targets.formants[0].freq, Some(500.0));
        assert_relative_eq!(targets.formants[0].q.unwrap(), 500.0 / 80.0);
        assert_relative_eq!(targets.formants[2].q.unwrap(), 2500.0 / 120.0);
        assert_eq!(targets.singers.gain_db, Some(0.0));
        assert_eq!(targets.boost.gain_db, Some(0.0));
        assert_eq!(targets.boost.freq, None);
    }

    #[test]
    fn tract_length_scales_formants() {
        let params = SynthesisParameters {
            physics: VocalPhysics::new(14.0, 50.0, 0.5),
            ..SynthesisParameters::default()
        };
        let targets = VoiceTargets::from_params(&params);
        let scale = 17.5 / 14.0;
        assert_relative_eq!(targets.formants[1].freq.unwrap(), 1500.0 * scale);
        assert_relative_eq!(targets.singers.freq.unwrap(), 3000.0 * scale.sqrt());
    }

    #[test]
    fn thick_folds_are_louder_and_darker() {
        assert_relative_eq!(thickness_boost(0.0), 1.0);
        assert_relative_eq!(thickness_boost(100.0), 3.0);
        assert_relative_eq!(tilt_cutoff(0.0), 12_000.0);
        assert_relative_eq!(tilt_cutoff(100.0), 800.0);
        assert_relative_eq!(tilt_cutoff(f64::NAN), 12_000.0);
    }

    #[test]
    fn singers_formant_and_boost() {
        let params = SynthesisParameters {
            singers_formant: true,
            harmonic_boost: HarmonicBoost {
                active: true,
                freq: 2000.0,
                gain: 12.0,
                q: 2.0,
            },
            ..SynthesisParameters::default()
        };
        let targets = VoiceTargets::from_params(&params);
        assert_eq!(targets.singers.gain_db, Some(8.0));
        assert_eq!(
            targets.boost,
            PeakTarget {
                freq: Some(2000.0),
                gain_db: Some(12.0),
                q: Some(2.0),
            }
        );
    }

    #[test]
    fn unusable_values_never_become_targets() {
        let params = SynthesisParameters {
            pitch: f64::NAN,
            volume: f64::INFINITY,
            formants: FormantTriple::new(-200.0, f64::NAN, 2500.0, [80.0, 100.0, 120.0]),
            harmonic_boost: HarmonicBoost {
                active: true,
                freq: 0.0,
                gain: f64::NAN,
                q: -1.0,
            },
            ..SynthesisParameters::default()
        };
        let targets = VoiceTargets::from_params(&params);
        assert_eq!(targets.pitch, None);
        assert_eq!(targets.sub_pitch, None);
        assert_eq!(targets.master_gain, Some(0.0));
        assert_eq!(targets.formants[0], BandTarget::default());
        assert_eq!(targets.formants[1], BandTarget::default());
        assert!(targets.formants[2].freq.is_some());
        assert_eq!(targets.boost, PeakTarget::default());
    }

    #[test]
    fn pressed_voice_has_no_breath() {
        assert_relative_eq!(breath_gain(1.0), 0.0);
        assert_relative_eq!(breath_gain(1.5), 0.0);
        assert_relative_eq!(breath_gain(0.0), 0.2);
    }
}
