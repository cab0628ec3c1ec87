//! Threshold grammar parser using nom
//!
//! Grammar:
//! ```text
//! list      := thresh (',' thresh)*
//! thresh    := 'NA' | interval | op operand
//! interval  := '[' number ',' number ')'
//! op        := '>=' | '>' | '<=' | '<' | '==' | '!=' | 'ge' | 'gt' | 'le' | 'lt' | 'eq' | 'ne'
//! operand   := 'SFP' number | 'SOP' number | 'CDP' number | number
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, multispace0},
    combinator::{map, value},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded, separated_pair},
    IResult,
};
use std::str::FromStr;

use super::{CompareOp, SampleSource, Threshold};
use crate::error::{ConfigError, VerifyError, VerifyResult};

/// Parse a single threshold from a string
pub fn parse_threshold(input: &str) -> VerifyResult<Threshold> {
    let trimmed = input.trim();
    let raw = match threshold(trimmed) {
        Ok(("", raw)) => raw,
        Ok((remaining, _)) => {
            return Err(parse_error(
                input,
                format!("unexpected characters at end: '{remaining}'"),
            ))
        }
        Err(e) => return Err(parse_error(input, format!("{e:?}"))),
    };
    build(input, raw)
}

/// Parse a comma-separated list of thresholds
pub fn parse_threshold_list(input: &str) -> VerifyResult<Vec<Threshold>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match separated_list1(ws(char(',')), threshold)(trimmed) {
        Ok(("", raws)) => raws.into_iter().map(|raw| build(input, raw)).collect(),
        Ok((remaining, _)) => Err(parse_error(
            input,
            format!("unexpected characters at end: '{remaining}'"),
        )),
        Err(e) => Err(parse_error(input, format!("{e:?}"))),
    }
}

impl FromStr for Threshold {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_threshold(s)
    }
}

fn parse_error(input: &str, message: String) -> VerifyError {
    ConfigError::ThresholdParse {
        input: input.to_string(),
        message,
    }
    .into()
}

/// Syntactic form before range validation
#[derive(Debug, Clone, Copy)]
enum RawThreshold {
    Na,
    Interval(f64, f64),
    Compare(CompareOp, Operand),
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Value(f64),
    Sample(SampleSource, f64),
    Climo(f64),
}

fn build(input: &str, raw: RawThreshold) -> VerifyResult<Threshold> {
    let result = match raw {
        RawThreshold::Na => Ok(Threshold::Na),
        RawThreshold::Interval(lo, hi) => Threshold::between(lo, hi),
        RawThreshold::Compare(op, Operand::Value(value)) => Ok(Threshold::Compare { op, value }),
        RawThreshold::Compare(op, Operand::Sample(source, p)) => {
            Threshold::sample_percentile(op, source, p)
        }
        RawThreshold::Compare(op, Operand::Climo(p)) => Threshold::climo_percentile(op, p),
    };
    result.map_err(|e| parse_error(input, e.to_string()))
}

/// Parse whitespace
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn threshold(input: &str) -> IResult<&str, RawThreshold> {
    ws(alt((
        value(RawThreshold::Na, tag_no_case("NA")),
        map(interval, |(lo, hi)| RawThreshold::Interval(lo, hi)),
        map(
            nom::sequence::pair(ws(compare_op), operand),
            |(op, operand)| RawThreshold::Compare(op, operand),
        ),
    )))(input)
}

fn interval(input: &str) -> IResult<&str, (f64, f64)> {
    delimited(
        ws(char('[')),
        separated_pair(ws(double), char(','), ws(double)),
        ws(char(')')),
    )(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Eq, tag("==")),
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Ge, tag_no_case("ge")),
        value(CompareOp::Gt, tag_no_case("gt")),
        value(CompareOp::Le, tag_no_case("le")),
        value(CompareOp::Lt, tag_no_case("lt")),
        value(CompareOp::Eq, tag_no_case("eq")),
        value(CompareOp::Ne, tag_no_case("ne")),
    ))(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(preceded(tag_no_case("SFP"), double), |p| {
            Operand::Sample(SampleSource::Forecast, p)
        }),
        map(preceded(tag_no_case("SOP"), double), |p| {
            Operand::Sample(SampleSource::Observation, p)
        }),
        map(preceded(tag_no_case("CDP"), double), Operand::Climo),
        map(double, Operand::Value),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(">=0.5", Threshold::ge(0.5))]
    #[case("gt 5", Threshold::gt(5.0))]
    #[case("<= -2.5", Threshold::le(-2.5))]
    #[case("lt1e-3", Threshold::lt(0.001))]
    #[case("==1", Threshold::equal(1.0))]
    #[case("ne 0", Threshold::not_equal(0.0))]
    #[case("NA", Threshold::Na)]
    fn test_parse_fixed(#[case] input: &str, #[case] expected: Threshold) {
        assert_eq!(parse_threshold(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_interval() {
        let t: Threshold = "[0, 5)".parse().unwrap();
        assert_eq!(t, Threshold::Between { lower: 0.0, upper: 5.0 });
        assert!(parse_threshold("[5,0)").is_err());
    }

    #[test]
    fn test_parse_percentiles() {
        let t = parse_threshold(">=SFP90").unwrap();
        assert_eq!(
            t,
            Threshold::PercentileOfSample {
                op: CompareOp::Ge,
                source: SampleSource::Forecast,
                percentile: 90.0
            }
        );
        let t = parse_threshold("<SOP25").unwrap();
        assert!(t.needs_sample());
        let t = parse_threshold(">CDP75").unwrap();
        assert!(t.needs_climo());
        assert!(parse_threshold(">CDP100").is_err());
    }

    #[test]
    fn test_parse_list() {
        let list = parse_threshold_list(">=0.254, >=2.54,>=6.35").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1], Threshold::ge(2.54));
        assert!(parse_threshold_list("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_threshold(">=").is_err());
        assert!(parse_threshold("abc").is_err());
        assert!(parse_threshold(">=5 junk").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for s in [">=0.5", "<SOP25", ">CDP75", "[0,5)", "NA"] {
            let t = parse_threshold(s).unwrap();
            assert_eq!(parse_threshold(&t.to_string()).unwrap(), t);
        }
    }
}
