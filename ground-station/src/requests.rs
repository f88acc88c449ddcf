use serde::{Deserialize, Serialize};

/// One JSON request line, tagged by `command`.
///
/// ```json
/// {"command": "move", "azimuth": 180.0, "elevation": 45.0}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Open,
    Close,
    Move { azimuth: f64, elevation: f64 },
    SetAzimuth { value: f64 },
    SetElevation { value: f64 },
    GetPosition,
    Status,
    Stop,
    Calibrate {
        #[serde(default = "both_axes")]
        azimuth: bool,
        #[serde(default = "both_axes")]
        elevation: bool,
    },
    StartCapture { name: String, frequency: u64 },
    StopCapture,
    SetFrequency { frequency: u64 },
}

fn both_axes() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Response {
    fn with_status(status: Outcome, message: Option<String>) -> Self {
        Self {
            status,
            message,
            azimuth: None,
            elevation: None,
            observation_open: None,
            capture_pid: None,
            output: None,
        }
    }

    pub fn ok() -> Self {
        Self::with_status(Outcome::Ok, None)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_status(Outcome::Timeout, Some(message.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(Outcome::Error, Some(message.into()))
    }

    pub fn with_position(mut self, azimuth: f64, elevation: f64) -> Self {
        self.azimuth = Some(azimuth);
        self.elevation = Some(elevation);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_requests() {
        let request: Request =
            serde_json::from_str(r#"{"command":"move","azimuth":180.0,"elevation":45.0}"#).unwrap();
        assert_eq!(
            request,
            Request::Move {
                azimuth: 180.0,
                elevation: 45.0
            }
        );

        let request: Request = serde_json::from_str(r#"{"command":"calibrate","elevation":false}"#).unwrap();
        assert_eq!(
            request,
            Request::Calibrate {
                azimuth: true,
                elevation: false
            }
        );

        let request: Request =
            serde_json::from_str(r#"{"command":"start_capture","name":"NOAA 19","frequency":137100000}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::StartCapture {
                name: "NOAA 19".to_string(),
                frequency: 137_100_000
            }
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(serde_json::from_str::<Request>(r#"{"command":"self_destruct"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"command":"move","azimuth":1}"#).is_err());
    }

    #[test]
    fn omits_empty_fields() {
        let ok = serde_json::to_value(Response::ok().with_position(10.0, 20.0)).unwrap();
        assert_eq!(ok, json!({"status": "ok", "azimuth": 10.0, "elevation": 20.0}));

        let timeout = serde_json::to_value(Response::timeout("slow")).unwrap();
        assert_eq!(timeout, json!({"status": "timeout", "message": "slow"}));
    }
}
