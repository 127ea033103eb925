use serde::{de, Deserialize, Deserializer};
use std::{fs, io, path::Path};

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Normalize a column header to lower snake case.
///
/// `CancerSiteICD10Code` becomes `cancer_site_icd10_code`, `Incidences All Ages` becomes
/// `incidences_all_ages`. A leading byte order mark is dropped.
pub fn normalize_column_name(raw: &str) -> String {
    let chars: Vec<char> = raw.trim().trim_start_matches('\u{feff}').chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (idx, &ch) in chars.iter().enumerate() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && idx > 0 {
                let prev = chars[idx - 1];
                let next_lower = chars.get(idx + 1).map_or(false, |c| c.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
                {
                    out.push('_');
                }
            }
            out.extend(ch.to_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

// Helpers for serde to parse fields with quirks.

/// Parse a non-negative rate or ratio.
pub fn rate<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f64::deserialize(d)?;
    if !v.is_finite() || v < 0. {
        return Err(de::Error::custom(format!(
            "expected a finite non-negative number, found {}",
            v
        )));
    }
    Ok(v)
}

/// Parse a case count. Some extracts write whole numbers as `12.0`, which we accept.
pub fn count<'de, D>(d: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f64::deserialize(d)?;
    if !v.is_finite() || v < 0. || v != v.floor() || v > f64::from(u32::MAX) {
        return Err(de::Error::custom(format!(
            "expected a non-negative whole number, found {}",
            v
        )));
    }
    Ok(v as u32)
}

pub fn header(header: &str) {
    let len = header.len();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}
