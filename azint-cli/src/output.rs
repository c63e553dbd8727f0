//! CSV rendering of profiles.

use std::io::{self, Write};

use azint_core::Profile;

/// Writes the CSV header matching `profile`.
pub fn write_header(out: &mut impl Write, profile: &Profile) -> io::Result<()> {
    if profile.is_2d() {
        writeln!(
            out,
            "frame,{},chi_deg,intensity,sigma,sum_weight,count",
            profile.unit
        )
    } else {
        writeln!(out, "frame,{},intensity,sigma,sum_weight,count", profile.unit)
    }
}

/// Writes one row per bin of `profile`.
pub fn write_rows(out: &mut impl Write, frame: usize, profile: &Profile) -> io::Result<()> {
    let n_rad = profile.radial.len().max(1);
    for (i, record) in profile.records().enumerate() {
        let sigma = record.sigma.map(|s| s.to_string()).unwrap_or_default();
        if profile.is_2d() {
            writeln!(
                out,
                "{},{},{},{},{},{},{}",
                frame,
                record.position,
                profile.azimuthal[i / n_rad],
                record.intensity,
                sigma,
                record.sum_weight,
                profile.count[i]
            )?;
        } else {
            writeln!(
                out,
                "{},{},{},{},{},{}",
                frame, record.position, record.intensity, sigma, record.sum_weight, profile.count[i]
            )?;
        }
    }
    Ok(())
}
