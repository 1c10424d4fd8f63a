//! Marlin position report parsing
//!
//! `M114` answers with a line such as
//! `X:103.00 Y:150.00 Z:10.00 E:0.00 Count X:8240 Y:12000 Z:4000`.
//! Only the first `X:.. Y:.. Z:..` group is used; the extruder and step
//! counter fields are ignored.

use micro3d_core::{ParseError, Position};
use regex::Regex;
use std::sync::OnceLock;

fn position_regex() -> &'static Regex {
    static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
    POSITION_REGEX.get_or_init(|| {
        Regex::new(r"X:(-?[0-9.]+) Y:(-?[0-9.]+) Z:(-?[0-9.]+)").expect("invalid regex pattern")
    })
}

fn parse_field(field: &str, value: &str) -> Result<f64, ParseError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// Parse one line
///
/// `Ok(None)` when the line carries no position report.
pub fn parse_position_line(line: &str) -> Result<Option<Position>, ParseError> {
    let Some(caps) = position_regex().captures(line) else {
        return Ok(None);
    };
    let x = parse_field("X", &caps[1])?;
    let y = parse_field("Y", &caps[2])?;
    let z = parse_field("Z", &caps[3])?;
    Ok(Some(Position::new(x, y, z)))
}

/// First usable position report among the reply lines of `M114`
///
/// Lines whose numbers do not parse are skipped. The first such failure is
/// returned only when no later line carries a valid report.
pub fn find_position_report(lines: &[String]) -> Result<Position, ParseError> {
    let mut malformed = None;
    for line in lines {
        match parse_position_line(line) {
            Ok(Some(position)) => return Ok(position),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("Skipping malformed position line `{}`: {}", line, err);
                malformed.get_or_insert(err);
            }
        }
    }
    Err(malformed.unwrap_or_else(|| ParseError::PositionReportNotFound {
        lines: lines.to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_with_count_fields() {
        let line = "X:10.00 Y:20.00 Z:5.00 Count X:800 Y:1600 Z:500";
        assert_eq!(
            parse_position_line(line).unwrap(),
            Some(Position::new(10.0, 20.0, 5.0))
        );
    }

    #[test]
    fn test_negative_coordinates() {
        let line = "X:-1.50 Y:0.00 Z:-0.04 E:0.00 Count X:-120 Y:0 Z:-4";
        assert_eq!(
            parse_position_line(line).unwrap(),
            Some(Position::new(-1.5, 0.0, -0.04))
        );
    }

    #[test]
    fn test_first_matching_line_wins() {
        let lines = vec![
            "echo:busy: processing".to_string(),
            "X:0.90 Y:0.00 Z:0.45 E:0.00 Count X:72 Y:0 Z:180".to_string(),
            "X:9.00 Y:9.00 Z:9.00".to_string(),
        ];
        assert_eq!(
            find_position_report(&lines).unwrap(),
            Position::new(0.9, 0.0, 0.45)
        );
    }

    #[test]
    fn test_missing_report() {
        let lines = vec!["echo:busy: processing".to_string()];
        assert!(matches!(
            find_position_report(&lines),
            Err(ParseError::PositionReportNotFound { .. })
        ));
        assert!(matches!(
            find_position_report(&[]),
            Err(ParseError::PositionReportNotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_line_does_not_hide_later_report() {
        let lines = vec![
            "X:. Y:. Z:.".to_string(),
            "X:4.00 Y:5.00 Z:6.00 E:0.00".to_string(),
        ];
        assert_eq!(
            find_position_report(&lines).unwrap(),
            Position::new(4.0, 5.0, 6.0)
        );

        let only_bad = vec!["echo:busy".to_string(), "X:. Y:. Z:.".to_string()];
        assert!(matches!(
            find_position_report(&only_bad),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_malformed_number() {
        assert!(matches!(
            parse_position_line("X:1.2.3 Y:0 Z:0"),
            Err(ParseError::InvalidNumber { .. })
        ));
    }
}
