//! The subset of the rotator daemon's line protocol used for pointing.
//!
//! | Command        | Meaning                     |
//! |----------------|-----------------------------|
//! | `w A<value>\n` | set azimuth (two decimals)  |
//! | `w E<value>\n` | set elevation               |
//! | `w S\n`        | stop motion                 |
//! | `w CAL\n`      | begin calibration           |
//! | `w A\n`        | query azimuth, `A=<f> ...`  |
//! | `w E\n`        | query elevation, `E=<f> ...`|

use crate::{AxisType, error::RotctlError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetPosition(f64),
    QueryPosition,
    Stop,
    Calibrate,
}

impl Command {
    /// Renders the command line for `axis`, including the trailing newline.
    pub fn line(&self, axis: AxisType) -> Result<String, RotctlError> {
        let prefix = axis.prefix().ok_or(RotctlError::InvalidAxis(axis))?;

        Ok(match self {
            Command::SetPosition(value) if !value.is_finite() => {
                return Err(RotctlError::InvalidPosition(*value));
            }
            Command::SetPosition(value) => format!("w {prefix}{value:.2}\n"),
            Command::QueryPosition => format!("w {prefix}\n"),
            Command::Stop => "w S\n".to_string(),
            Command::Calibrate => "w CAL\n".to_string(),
        })
    }
}

/// Extracts the degrees from a position reply such as `A=270.50 RPRT 0`.
///
/// The value follows the first `=`, leading blanks skipped, and runs to the
/// next whitespace.
pub fn parse_position_reply(reply: &str) -> Result<f64, RotctlError> {
    let malformed = || RotctlError::Parse {
        reply: reply.trim_end().to_string(),
    };

    let (_, rest) = reply.split_once('=').ok_or_else(malformed)?;
    let field = rest
        .trim_start()
        .split(char::is_whitespace)
        .next()
        .unwrap_or_default();

    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_position_uses_two_decimals() {
        assert_eq!(
            Command::SetPosition(180.0).line(AxisType::Azimuth).unwrap(),
            "w A180.00\n"
        );
        assert_eq!(
            Command::SetPosition(45.456).line(AxisType::Elevation).unwrap(),
            "w E45.46\n"
        );
        assert_eq!(
            Command::SetPosition(-3.1).line(AxisType::Azimuth).unwrap(),
            "w A-3.10\n"
        );
    }

    #[test]
    fn axis_independent_commands() {
        for axis in [AxisType::Azimuth, AxisType::Elevation] {
            assert_eq!(Command::Stop.line(axis).unwrap(), "w S\n");
            assert_eq!(Command::Calibrate.line(axis).unwrap(), "w CAL\n");
        }
        assert_eq!(
            Command::QueryPosition.line(AxisType::Elevation).unwrap(),
            "w E\n"
        );
    }

    #[test]
    fn non_finite_positions_are_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                Command::SetPosition(value).line(AxisType::Azimuth),
                Err(RotctlError::InvalidPosition(_))
            ));
        }
    }

    #[test]
    fn no_axis_is_rejected() {
        assert!(matches!(
            Command::Stop.line(AxisType::None),
            Err(RotctlError::InvalidAxis(AxisType::None))
        ));
    }

    #[test]
    fn parses_reply_value() {
        assert_eq!(parse_position_reply("A=270.50 RPRT 0").unwrap(), 270.5);
        assert_eq!(parse_position_reply("E=45.00 RPRT 0\n").unwrap(), 45.0);
        assert_eq!(parse_position_reply("A=12.25\n").unwrap(), 12.25);
        assert_eq!(parse_position_reply("A= 10 RPRT 0").unwrap(), 10.0);
    }

    #[test]
    fn malformed_replies_are_errors_not_zero() {
        for reply in ["garbage", "A=abc RPRT 0", "A=", "A=   \n", "A=nan RPRT 0"] {
            match parse_position_reply(reply) {
                Err(RotctlError::Parse { reply: got }) => assert_eq!(got, reply.trim_end()),
                other => panic!("{reply:?} parsed as {other:?}"),
            }
        }
    }
}
