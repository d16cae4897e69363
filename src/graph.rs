//! Graph results and signal-to-noise extraction
//!
//! The legacy calculator answers a graph request with per-CCD scalars and
//! groups of typed series. The extractor below is the only consumer of the
//! series inside this crate: it pulls the final (or single-exposure) S/N
//! curve, and answers either the peak value or a linearly interpolated value
//! at a requested wavelength.
//!
//! Samples are concatenated across every series of the requested type (one
//! per CCD) and sorted by wavelength with a **stable** sort, so samples with
//! equal wavelengths keep their series order and interpolation sees the first
//! of a tied pair as the left neighbour. The extractor never reads outside
//! the sampled domain: a wavelength off either end is reported as a
//! below/above-range outcome, not clamped.

use async_graphql::{Enum, SimpleObject};
use serde::{Deserialize, Serialize};

use crate::units::Wavelength;
use crate::ItcError;

// ============================================================================
// Result model
// ============================================================================

/// Per-CCD scalars reported with every graph result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct ItcCcd {
    /// S/N of a single exposure at the reference pixel.
    pub single_sn_ratio: f64,
    /// Best single-exposure S/N across the CCD.
    pub max_single_sn_ratio: f64,
    /// Total S/N at the reference pixel.
    pub total_sn_ratio: f64,
    /// Best total S/N across the CCD.
    pub max_total_sn_ratio: f64,
    /// Rate of the brightest pixel, electrons per second.
    pub peak_pixel_flux: f64,
    /// Full-well capacity, electrons.
    pub well_depth: f64,
    /// Amplifier gain, electrons per ADU.
    pub amp_gain: f64,
    /// Kernel warnings attached to this CCD.
    pub warnings: Vec<String>,
}

/// What a series plots against wavelength.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum SeriesDataType {
    /// Source signal, e⁻ per exposure.
    #[serde(rename = "SignalData")]
    SignalData,
    /// Background, e⁻ per exposure.
    #[serde(rename = "BackgroundData")]
    BackgroundData,
    /// S/N of a single exposure.
    #[serde(rename = "SingleS2NData")]
    SingleS2NData,
    /// S/N accumulated over all exposures.
    #[serde(rename = "FinalS2NData")]
    FinalS2NData,
}

/// One plotted curve. `data_x` holds wavelengths in nm, `data_y` the values;
/// the two run in parallel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct ItcSeries {
    /// Legend label as produced by the kernel.
    pub title: String,
    /// What `data_y` contains.
    pub series_type: SeriesDataType,
    /// Wavelengths, nm.
    pub data_x: Vec<f64>,
    /// Values, parallel to `data_x`.
    pub data_y: Vec<f64>,
}

/// A group of series plotted together (one group per chart).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct SeriesGroup {
    /// The curves of this chart.
    pub series: Vec<ItcSeries>,
}

/// The complete graph answer from the kernel: CCD scalars plus chart groups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphsPayload {
    /// One entry per detector CCD, never empty on success.
    pub ccds: Vec<ItcCcd>,
    /// Chart groups, never empty on success.
    pub groups: Vec<SeriesGroup>,
}

// ============================================================================
// Extraction
// ============================================================================

/// Outcome of an S/N extraction.
#[derive(Clone, Debug, PartialEq)]
pub enum SnOutcome {
    /// The extracted (or interpolated) S/N.
    Success(f64),
    /// Requested wavelength is below the first sample.
    BelowRange(Wavelength),
    /// Requested wavelength is above the last sample.
    AboveRange(Wavelength),
    /// No series of the requested type, or the series is empty.
    NoData,
    /// The series contained a value that is not a non-negative finite number.
    Error(String),
}

impl SnOutcome {
    /// Collapse into the crate-wide error type; used by the solver and the
    /// orchestrator, which treat anything but `Success` as a surfaced failure.
    pub fn into_result(self) -> Result<f64, ItcError> {
        match self {
            SnOutcome::Success(sn) => Ok(sn),
            SnOutcome::BelowRange(wavelength) => Err(ItcError::WavelengthBelowRange { wavelength }),
            SnOutcome::AboveRange(wavelength) => Err(ItcError::WavelengthAboveRange { wavelength }),
            SnOutcome::NoData => Err(ItcError::Calculation("no signal-to-noise data".into())),
            SnOutcome::Error(message) => Err(ItcError::Calculation(message)),
        }
    }
}

fn sorted_samples(groups: &[SeriesGroup], data_type: SeriesDataType) -> Vec<(f64, f64)> {
    let mut samples: Vec<(f64, f64)> = groups
        .iter()
        .flat_map(|g| g.series.iter())
        .filter(|s| s.series_type == data_type)
        .flat_map(|s| s.data_x.iter().copied().zip(s.data_y.iter().copied()))
        .collect();
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    samples
}

fn checked(sn: f64) -> SnOutcome {
    if sn.is_finite() && sn >= 0.0 {
        SnOutcome::Success(sn)
    } else {
        SnOutcome::Error(format!("S/N value {sn} is not a non-negative number"))
    }
}

/// The greatest value of the requested series type.
pub fn peak_sn(groups: &[SeriesGroup], data_type: SeriesDataType) -> SnOutcome {
    let samples = sorted_samples(groups, data_type);
    match samples
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
    {
        Some(&(_, sn)) => checked(sn),
        None => SnOutcome::NoData,
    }
}

/// The series value at `wavelength`, linearly interpolated between the two
/// bracketing samples. Exact sample hits are returned untouched.
pub fn sn_at(groups: &[SeriesGroup], data_type: SeriesDataType, wavelength: Wavelength) -> SnOutcome {
    let samples = sorted_samples(groups, data_type);
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return SnOutcome::NoData,
    };

    let at = wavelength.as_nanometers();
    if at < first.0 {
        return SnOutcome::BelowRange(wavelength);
    }
    if at > last.0 {
        return SnOutcome::AboveRange(wavelength);
    }

    // Smallest index with samples[i].λ ≥ λ*; in range, so it exists.
    let i = samples.partition_point(|&(x, _)| x < at);
    let (x2, s2) = samples[i];
    if x2 == at {
        return checked(s2);
    }
    let (x1, s1) = samples[i - 1];
    checked((s1 * (x2 - at) + s2 * (at - x1)) / (x2 - x1))
}

// ============================================================================
// Significant-figures trimming
// ============================================================================

/// Optional per-axis/per-CCD rounding applied to graph responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificantFigures {
    /// Digits kept on wavelength axes; `None` leaves the axis untouched.
    pub x_axis: Option<u32>,
    /// Digits kept on value axes and extracted S/N numbers.
    pub y_axis: Option<u32>,
    /// Digits kept on CCD scalar attributes.
    pub ccd: Option<u32>,
}

/// Round to `digits` significant figures. Zero and non-finite values pass
/// through unchanged.
pub fn round_sig_figs(x: f64, digits: u32) -> f64 {
    if digits == 0 || x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits as i32 - 1 - magnitude);
    (x * factor).round() / factor
}

/// Apply the configured trimming in place: series data per axis, CCD scalars
/// when `ccd` digits are set.
pub fn trim_significant_figures(payload: &mut GraphsPayload, figures: SignificantFigures) {
    if let Some(digits) = figures.x_axis {
        for series in payload.groups.iter_mut().flat_map(|g| g.series.iter_mut()) {
            for x in series.data_x.iter_mut() {
                *x = round_sig_figs(*x, digits);
            }
        }
    }
    if let Some(digits) = figures.y_axis {
        for series in payload.groups.iter_mut().flat_map(|g| g.series.iter_mut()) {
            for y in series.data_y.iter_mut() {
                *y = round_sig_figs(*y, digits);
            }
        }
    }
    if let Some(digits) = figures.ccd {
        for ccd in payload.ccds.iter_mut() {
            ccd.single_sn_ratio = round_sig_figs(ccd.single_sn_ratio, digits);
            ccd.max_single_sn_ratio = round_sig_figs(ccd.max_single_sn_ratio, digits);
            ccd.total_sn_ratio = round_sig_figs(ccd.total_sn_ratio, digits);
            ccd.max_total_sn_ratio = round_sig_figs(ccd.max_total_sn_ratio, digits);
            ccd.peak_pixel_flux = round_sig_figs(ccd.peak_pixel_flux, digits);
            ccd.well_depth = round_sig_figs(ccd.well_depth, digits);
            ccd.amp_gain = round_sig_figs(ccd.amp_gain, digits);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn final_series(points: &[(f64, f64)]) -> Vec<SeriesGroup> {
        vec![SeriesGroup {
            series: vec![ItcSeries {
                title: "Final S/N".into(),
                series_type: SeriesDataType::FinalS2NData,
                data_x: points.iter().map(|p| p.0).collect(),
                data_y: points.iter().map(|p| p.1).collect(),
            }],
        }]
    }

    #[test]
    fn peak_takes_the_greatest_value() {
        let groups = final_series(&[(1.0, 1000.0), (2.0, 1001.0)]);
        assert_eq!(peak_sn(&groups, SeriesDataType::FinalS2NData), SnOutcome::Success(1001.0));
    }

    #[test]
    fn interpolates_between_bracketing_samples() {
        let groups = final_series(&[(1.0, 1000.0), (2.0, 1001.0)]);
        let out = sn_at(&groups, SeriesDataType::FinalS2NData, Wavelength::from_nanometers(1.5));
        assert_eq!(out, SnOutcome::Success(1000.5));
    }

    #[test]
    fn interpolated_value_lies_between_neighbours() {
        let groups = final_series(&[(1.0, 3.0), (4.0, 9.0)]);
        for at in [1.1, 2.0, 3.3, 3.9] {
            match sn_at(&groups, SeriesDataType::FinalS2NData, Wavelength::from_nanometers(at)) {
                SnOutcome::Success(sn) => assert!((3.0..=9.0).contains(&sn), "sn = {sn}"),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn exact_sample_is_returned_without_interpolation() {
        let groups = final_series(&[(1.0, 1000.0), (2.0, 1001.0)]);
        let out = sn_at(&groups, SeriesDataType::FinalS2NData, Wavelength::from_nanometers(2.0));
        assert_eq!(out, SnOutcome::Success(1001.0));
    }

    #[test]
    fn out_of_range_is_reported_not_clamped() {
        let groups = final_series(&[(1.0, 1000.0), (2.0, 1001.0)]);
        let below = Wavelength::from_nanometers(0.1);
        let above = Wavelength::from_nanometers(5.1);
        assert_eq!(
            sn_at(&groups, SeriesDataType::FinalS2NData, below),
            SnOutcome::BelowRange(below)
        );
        assert_eq!(
            sn_at(&groups, SeriesDataType::FinalS2NData, above),
            SnOutcome::AboveRange(above)
        );
    }

    #[test]
    fn missing_or_empty_series_is_no_data() {
        let empty = final_series(&[]);
        assert_eq!(peak_sn(&empty, SeriesDataType::FinalS2NData), SnOutcome::NoData);
        assert_eq!(
            sn_at(&empty, SeriesDataType::FinalS2NData, Wavelength::from_nanometers(1.0)),
            SnOutcome::NoData
        );
        // A signal series does not satisfy a final-S/N request.
        let groups = vec![SeriesGroup {
            series: vec![ItcSeries {
                title: "Signal".into(),
                series_type: SeriesDataType::SignalData,
                data_x: vec![1.0],
                data_y: vec![10.0],
            }],
        }];
        assert_eq!(peak_sn(&groups, SeriesDataType::FinalS2NData), SnOutcome::NoData);
    }

    #[test]
    fn samples_from_several_ccds_are_merged_and_sorted() {
        let mut groups = final_series(&[(3.0, 30.0), (1.0, 10.0)]);
        groups.push(final_series(&[(2.0, 20.0)]).remove(0));
        let out = sn_at(&groups, SeriesDataType::FinalS2NData, Wavelength::from_nanometers(1.5));
        assert_eq!(out, SnOutcome::Success(15.0));
        assert_eq!(peak_sn(&groups, SeriesDataType::FinalS2NData), SnOutcome::Success(30.0));
    }

    #[test]
    fn non_representable_values_are_errors() {
        let nan = final_series(&[(1.0, f64::NAN)]);
        assert!(matches!(peak_sn(&nan, SeriesDataType::FinalS2NData), SnOutcome::Error(_)));
        let negative = final_series(&[(1.0, -4.0), (2.0, -8.0)]);
        assert!(matches!(
            sn_at(&negative, SeriesDataType::FinalS2NData, Wavelength::from_nanometers(1.5)),
            SnOutcome::Error(_)
        ));
    }

    #[test]
    fn sig_fig_rounding() {
        assert_eq!(round_sig_figs(1234.5, 3), 1230.0);
        assert_eq!(round_sig_figs(0.0012345, 3), 0.00123);
        assert_eq!(round_sig_figs(-987.6, 2), -990.0);
        assert_eq!(round_sig_figs(0.0, 4), 0.0);
        assert_eq!(round_sig_figs(1.0, 0), 1.0);
    }

    #[test]
    fn trimming_is_per_axis_and_per_ccd() {
        let mut payload = GraphsPayload {
            ccds: vec![ItcCcd {
                single_sn_ratio: 12.345,
                max_single_sn_ratio: 12.345,
                total_sn_ratio: 123.45,
                max_total_sn_ratio: 123.45,
                peak_pixel_flux: 98765.0,
                well_depth: 150000.0,
                amp_gain: 1.234,
                warnings: vec![],
            }],
            groups: final_series(&[(123.456, 1000.55)]),
        };
        trim_significant_figures(
            &mut payload,
            SignificantFigures { x_axis: Some(4), y_axis: Some(3), ccd: None },
        );
        assert_eq!(payload.groups[0].series[0].data_x[0], 123.5);
        assert_eq!(payload.groups[0].series[0].data_y[0], 1000.0);
        // Absent ccd digits: CCD attributes untouched.
        assert_eq!(payload.ccds[0].single_sn_ratio, 12.345);

        trim_significant_figures(
            &mut payload,
            SignificantFigures { x_axis: None, y_axis: None, ccd: Some(2) },
        );
        assert_eq!(payload.ccds[0].single_sn_ratio, 12.0);
        assert_eq!(payload.ccds[0].well_depth, 150000.0);
        assert_eq!(payload.ccds[0].amp_gain, 1.2);
    }
}
