//! Output frame size derivation.
//!
//! Size, aspect and padding are stored raw on each output and turned into
//! `scale`/`pad` filters at assembly time, so the order in which they were set
//! does not matter.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::filter::{make_filter_strings, Filter, FilterSpec, FilterValue};

static FIXED_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)x([0-9]+)").unwrap());
static FIXED_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)x\?").unwrap());
static FIXED_HEIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?x([0-9]+)").unwrap());
static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([0-9]{1,3})%").unwrap());
static RATIO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d+)$").unwrap());

/// Raw size settings of one output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizeData {
    pub size: Option<String>,
    pub aspect: Option<String>,
    /// Pad color; `Some` enables letterboxing.
    pub pad: Option<String>,
}

/// Parse an aspect ratio given as a decimal (`1.777`) or `N:M`.
pub fn parse_aspect(aspect: &str) -> Result<f64> {
    let trimmed = aspect.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        if value.is_finite() && value > 0.0 {
            return Ok(value);
        }
        return Err(Error::InvalidAspect(aspect.to_string()));
    }

    let caps = RATIO
        .captures(trimmed)
        .ok_or_else(|| Error::InvalidAspect(aspect.to_string()))?;
    let num: f64 = caps[1].parse().map_err(|_| Error::InvalidAspect(aspect.to_string()))?;
    let den: f64 = caps[2].parse().map_err(|_| Error::InvalidAspect(aspect.to_string()))?;
    if num == 0.0 || den == 0.0 {
        return Err(Error::InvalidAspect(aspect.to_string()));
    }
    Ok(num / den)
}

fn round_even(value: f64) -> i64 {
    ((value / 2.0).round() * 2.0) as i64
}

fn number(text: &str, size: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|_| Error::InvalidSize(size.to_string()))
}

fn scale(w: impl Into<FilterValue>, h: impl Into<FilterValue>) -> Vec<FilterSpec> {
    vec![Filter::new("scale").option("w", w).option("h", h).into()]
}

/// Scale into a `width`x`height` box keeping the source ratio, then pad the
/// remainder with `color`.
fn scale_pad(width: i64, height: i64, aspect: f64, color: &str) -> Vec<FilterSpec> {
    vec![
        Filter::new("scale")
            .option(
                "w",
                format!("if(gt(a,{aspect}),{width},trunc({height}*a/2)*2)"),
            )
            .option(
                "h",
                format!("if(lt(a,{aspect}),{height},trunc({width}/a/2)*2)"),
            )
            .into(),
        Filter::new("pad")
            .option("w", width)
            .option("h", height)
            .option("x", format!("if(gt(a,{aspect}),0,({width}-iw)/2)"))
            .option("y", format!("if(lt(a,{aspect}),0,({height}-ih)/2)"))
            .option("color", color)
            .into(),
    ]
}

fn boxed(width: i64, height: i64, aspect: f64, pad: Option<&str>) -> Vec<FilterSpec> {
    match pad {
        Some(color) => scale_pad(width, height, aspect, color),
        None => scale(width, height),
    }
}

/// Derive the size filters for an output.
pub(crate) fn size_filters(data: &SizeData) -> Result<Vec<String>> {
    let Some(size) = data.size.as_deref() else {
        return Ok(Vec::new());
    };
    let pad = data.pad.as_deref();
    let aspect = data.aspect.as_deref().map(parse_aspect).transpose()?;

    let specs = if let Some(caps) = PERCENT.captures(size) {
        let ratio = number(&caps[1], size)? / 100.0;
        scale(
            format!("trunc(iw*{ratio}/2)*2"),
            format!("trunc(ih*{ratio}/2)*2"),
        )
    } else if let Some(caps) = FIXED_SIZE.captures(size) {
        let width = round_even(number(&caps[1], size)?);
        let height = round_even(number(&caps[2], size)?);
        if height == 0 {
            return Err(Error::InvalidSize(size.to_string()));
        }
        boxed(width, height, width as f64 / height as f64, pad)
    } else {
        let fixed_width = FIXED_WIDTH.captures(size).map(|c| c[1].to_string());
        let fixed_height = FIXED_HEIGHT.captures(size).map(|c| c[1].to_string());

        match (fixed_width, fixed_height, aspect) {
            (Some(w), _, Some(aspect)) => {
                let w = number(&w, size)?;
                let h = (w / aspect).round();
                boxed(round_even(w), round_even(h), aspect, pad)
            }
            (None, Some(h), Some(aspect)) => {
                let h = number(&h, size)?;
                let w = (h * aspect).round();
                boxed(round_even(w), round_even(h), aspect, pad)
            }
            (Some(w), _, None) => scale(round_even(number(&w, size)?), "trunc(ow/a/2)*2"),
            (None, Some(h), None) => scale("trunc(oh*a/2)*2", round_even(number(&h, size)?)),
            (None, None, _) => return Err(Error::InvalidSize(size.to_string())),
        }
    };

    Ok(make_filter_strings(&specs))
}
