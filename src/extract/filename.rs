use anyhow::{bail, Context, Result};

/// Reporting quarter carried by a source filename.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
    /// Tokens outside q1..q4 are tagged rather than rejected.
    Unknown,
}

impl Quarter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quarter::Q1 => "qtr1",
            Quarter::Q2 => "qtr2",
            Quarter::Q3 => "qtr3",
            Quarter::Q4 => "qtr4",
            Quarter::Unknown => "unknown",
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "q1" => Quarter::Q1,
            "q2" => Quarter::Q2,
            "q3" => Quarter::Q3,
            "q4" => Quarter::Q4,
            _ => Quarter::Unknown,
        }
    }
}

/// Year and quarter parsed out of a filename like
/// `nyc-park-crime-stats-q3-2021.xlsx`: the year is the integer after the
/// last hyphen before the extension, the quarter the token before that.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileTag {
    pub year: i32,
    pub quarter: Quarter,
}

impl FileTag {
    pub fn from_name(name: &str) -> Result<Self> {
        let stem = match name.rfind('.') {
            Some(i) => &name[..i],
            None => name,
        };

        let mut tokens = stem.rsplit('-');
        let year_token = tokens.next().unwrap_or_default();
        let year: i32 = year_token
            .parse()
            .with_context(|| format!("no year token in filename {:?}", name))?;

        let quarter = match tokens.next() {
            Some(token) => Quarter::from_token(token),
            None => bail!("no quarter token in filename {:?}", name),
        };

        Ok(Self { year, quarter })
    }
}
