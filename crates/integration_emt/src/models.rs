//! EMT data models
//!
//! Input types (stop ids, locations, directions), the `ReturnCode`
//! classification of the response envelope, and the typed rows returned by
//! the four EMT endpoints. Upstream fields that are not modelled explicitly
//! are kept in `extra` so nothing from the response is lost; line details are
//! kept whole.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EmtError;

/// A physical bus stop identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopId(u32);

impl StopId {
    /// Create a stop id from an already validated number
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Numeric value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StopId {
    type Err = EmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| EmtError::InvalidInput(format!("stop id {s:?} is not a number")))?;
        Self::try_from(value)
    }
}

impl TryFrom<i64> for StopId {
    type Error = EmtError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map(Self)
            .map_err(|_| EmtError::InvalidInput(format!("stop id {value} is out of range")))
    }
}

/// A stop id exactly as supplied by the caller, validated when an operation runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopArg(String);

impl StopArg {
    /// Validate into a [`StopId`]
    ///
    /// # Errors
    ///
    /// Returns [`EmtError::InvalidInput`] for non-numeric or negative ids.
    pub fn parse(&self) -> Result<StopId, EmtError> {
        self.0.parse()
    }

    /// The raw text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StopArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One or many stop ids, as accepted by the node/line lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopIds(Vec<StopArg>);

impl StopIds {
    /// No filter: the API returns every node
    #[must_use]
    pub const fn all() -> Self {
        Self(Vec::new())
    }

    /// Number of ids requested
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no filter is applied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every id
    ///
    /// # Errors
    ///
    /// Returns the first [`EmtError::InvalidInput`] encountered.
    pub fn parse(&self) -> Result<Vec<StopId>, EmtError> {
        self.0.iter().map(StopArg::parse).collect()
    }
}

impl From<StopArg> for StopIds {
    fn from(stop: StopArg) -> Self {
        Self(vec![stop])
    }
}

macro_rules! stop_arg_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for StopArg {
                fn from(value: $t) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<$t> for StopIds {
                fn from(value: $t) -> Self {
                    Self(vec![StopArg::from(value)])
                }
            }

            impl From<Vec<$t>> for StopIds {
                fn from(values: Vec<$t>) -> Self {
                    Self(values.into_iter().map(StopArg::from).collect())
                }
            }

            impl<const N: usize> From<[$t; N]> for StopIds {
                fn from(values: [$t; N]) -> Self {
                    Self(values.into_iter().map(StopArg::from).collect())
                }
            }
        )*
    };
}

stop_arg_from!(i32, i64, u32, StopId, String, &str);

/// A geographic position in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude
    pub latitude: f64,
    /// Longitude
    pub longitude: f64,
}

impl Location {
    /// Create a new location
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The (0, 0) placeholder used by callers without a position fix
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_origin(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// Travel direction along a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards the line's header
    Outbound,
    /// Back from the header
    Inbound,
}

/// `ReturnCode` embedded in every EMT response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// 0: passkey valid and authorized for the period
    Authorized,
    /// 1: no passkey necessary
    NoPasskeyRequired,
    /// 2: passkey differs from the current one
    PasskeyMismatch,
    /// 3: passkey expired
    PasskeyExpired,
    /// 4: client unauthorized
    ClientUnauthorized,
    /// 5: client deactivated
    ClientDeactivated,
    /// 6: client locked
    ClientLocked,
    /// 9: authentication attempt failed
    AuthFailed,
    /// Any other code
    Unknown(i64),
}

impl ReturnCode {
    /// Classify a numeric code
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Authorized,
            1 => Self::NoPasskeyRequired,
            2 => Self::PasskeyMismatch,
            3 => Self::PasskeyExpired,
            4 => Self::ClientUnauthorized,
            5 => Self::ClientDeactivated,
            6 => Self::ClientLocked,
            9 => Self::AuthFailed,
            other => Self::Unknown(other),
        }
    }

    /// Numeric value as sent on the wire
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Authorized => 0,
            Self::NoPasskeyRequired => 1,
            Self::PasskeyMismatch => 2,
            Self::PasskeyExpired => 3,
            Self::ClientUnauthorized => 4,
            Self::ClientDeactivated => 5,
            Self::ClientLocked => 6,
            Self::AuthFailed => 9,
            Self::Unknown(code) => code,
        }
    }

    /// Only 0 and 1 let the call through
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Authorized | Self::NoPasskeyRequired)
    }

    /// Read the code from a response envelope.
    ///
    /// Returns `Ok(None)` when the field is absent.
    pub(crate) fn from_envelope(body: &Value) -> Result<Option<Self>, EmtError> {
        let Some(raw) = body.get("ReturnCode") else {
            return Ok(None);
        };
        let code = match raw {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        code.map(|c| Some(Self::from_code(c)))
            .ok_or_else(|| EmtError::ParseError(format!("invalid ReturnCode: {raw}")))
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A bus approaching a stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrival {
    /// Stop the bus is heading to
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub stop_id: Option<i64>,
    /// Line label
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub line_id: Option<String>,
    /// Destination shown on the bus
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub destination: Option<String>,
    /// Vehicle identifier
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub bus_id: Option<String>,
    /// Estimated seconds until arrival
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub bus_time_left: Option<i64>,
    /// Distance to the stop in meters
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub bus_distance: Option<i64>,
    /// Remaining upstream fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Arrival {
    /// The API reports "more than 20 minutes" with this value
    pub const FAR_AWAY_SECS: i64 = 999_999;

    /// Minutes until arrival, `None` when unknown or far away
    #[must_use]
    pub fn minutes_left(&self) -> Option<i64> {
        self.bus_time_left
            .filter(|secs| *secs != Self::FAR_AWAY_SECS)
            .map(|secs| secs / 60)
    }
}

/// A stop returned by the nearby search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyStop {
    /// Stop identifier
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub stop_id: Option<i64>,
    /// Stop name
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    /// Street address
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub postal_address: Option<String>,
    /// Remaining upstream fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Line details with its stops, exactly as returned for a line/direction query
///
/// The body is stored and serialized untouched; the accessors read the common
/// fields leniently without rewriting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineStops {
    /// Upstream response body
    pub body: Map<String, Value>,
}

impl LineStops {
    /// Line code as text, whether upstream sent a string or a number
    #[must_use]
    pub fn line(&self) -> Option<String> {
        self.body.get("line").and_then(lenient::scalar_string)
    }

    /// Public label of the line
    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.body.get("label").and_then(lenient::scalar_string)
    }

    /// Raw upstream field
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }
}

/// Metadata for one node (stop) and the lines serving it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLines {
    /// Stop identifier
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub node: Option<i64>,
    /// Stop name
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    /// Lines serving the stop, e.g. `"21/1/1"`
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub lines: Vec<String>,
    /// Remaining upstream fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Turn an optional field that may hold a single row or an array of rows into a vector
pub(crate) fn rows<T: DeserializeOwned>(field: Option<&Value>) -> Result<Vec<T>, EmtError> {
    let parse = |v: &Value| {
        T::deserialize(v).map_err(|e| EmtError::ParseError(e.to_string()))
    };
    match field {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(parse).collect(),
        Some(single) => parse(single).map(|row| vec![row]),
    }
}

/// The EMT API is inconsistent about numbers vs. strings
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn scalar_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub(super) fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_string(&Value::deserialize(d)?))
    }

    pub(super) fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub(super) fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
            other => scalar_string(&other).into_iter().collect(),
        })
    }
}
