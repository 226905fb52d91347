// src/transform/mod.rs

use crate::table::{Cell, CrimeTable};
use anyhow::{Context, Result};

/// Canonical names for the headers the source reports spell differently.
const RENAMES: &[(&str, &str)] = &[
    ("size (acres)", "acres"),
    ("felony assault", "felony_assault"),
    ("grand larceny", "grand_larceny"),
    ("grand larceny of motor vehicle", "grand_larceny_motor_vehicle"),
];

/// Columns forced to 64-bit integers; the remaining count columns keep
/// whatever numeric type the sheet carried.
const INT_COLUMNS: &[&str] = &["murder", "burglary"];

/// Normalize an extracted table: canonical column names, trimmed and
/// title-cased text values, integer-coerced murder/burglary counts.
/// Idempotent — running it twice yields the same table as once.
pub fn transform(mut table: CrimeTable) -> Result<CrimeTable> {
    for header in &mut table.headers {
        if let Some((_, canonical)) = RENAMES.iter().find(|(from, _)| *from == header.as_str()) {
            *header = canonical.to_string();
        }
    }

    for row in &mut table.rows {
        for cell in row {
            if let Cell::Text(s) = cell {
                *s = title_case(s.trim());
            }
        }
    }

    for &name in INT_COLUMNS {
        let idx = table
            .column(name)
            .with_context(|| format!("missing column {:?}", name))?;
        for (rowno, row) in table.rows.iter_mut().enumerate() {
            let coerced = row[idx]
                .to_i64()
                .with_context(|| format!("row {}, column {:?}", rowno, name))?;
            row[idx] = match coerced {
                Some(v) => Cell::Int(v),
                None => {
                    // an absent count cannot become an integer
                    anyhow::bail!("row {}, column {:?}: empty value", rowno, name);
                }
            };
        }
    }

    Ok(table)
}

/// Title-case the way the source data has always been cleaned: first letter
/// of every alphabetic run upper-cased, the rest lowered, everything else
/// passed through.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}
