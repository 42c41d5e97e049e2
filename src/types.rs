use std::fmt;

/// Temperature stored as Celsius internally.
/// The gateway speaks integer tenths of a degree Celsius on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    /// Construct from the wire representation (tenths of a degree Celsius).
    pub fn from_tenths(tenths: i32) -> Self {
        Self(f64::from(tenths) / 10.0)
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }

    /// Round to wire precision (nearest tenth of a degree Celsius).
    pub fn to_tenths(&self) -> i32 {
        (self.0 * 10.0).round() as i32
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// An HVAC attribute addressed by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Function {
    OnOff,
    Mode,
    Setpoint,
    FanSpeed,
    VaneUpDown,
    VaneLeftRight,
    AmbientTemperature,
    ErrorStatus,
    ErrorCode,
}

impl Function {
    pub const ALL: [Function; 9] = [
        Function::OnOff,
        Function::Mode,
        Function::Setpoint,
        Function::FanSpeed,
        Function::VaneUpDown,
        Function::VaneLeftRight,
        Function::AmbientTemperature,
        Function::ErrorStatus,
        Function::ErrorCode,
    ];

    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Function::OnOff => "ONOFF",
            Function::Mode => "MODE",
            Function::Setpoint => "SETPTEMP",
            Function::FanSpeed => "FANSP",
            Function::VaneUpDown => "VANEUD",
            Function::VaneLeftRight => "VANELR",
            Function::AmbientTemperature => "AMBTEMP",
            Function::ErrorStatus => "ERRSTATUS",
            Function::ErrorCode => "ERRCODE",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "ONOFF" => Some(Function::OnOff),
            "MODE" => Some(Function::Mode),
            "SETPTEMP" => Some(Function::Setpoint),
            "FANSP" => Some(Function::FanSpeed),
            "VANEUD" => Some(Function::VaneUpDown),
            "VANELR" => Some(Function::VaneLeftRight),
            "AMBTEMP" => Some(Function::AmbientTemperature),
            "ERRSTATUS" => Some(Function::ErrorStatus),
            "ERRCODE" => Some(Function::ErrorCode),
            _ => None,
        }
    }

    /// Functions the gateway reports but never accepts a SET for.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Function::AmbientTemperature | Function::ErrorStatus | Function::ErrorCode
        )
    }

    /// Functions whose SET values are checked against the device's LIMITS list.
    pub fn is_enumerated(&self) -> bool {
        matches!(
            self,
            Function::Mode | Function::FanSpeed | Function::VaneUpDown | Function::VaneLeftRight
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

/// Typed value of a function, independent of the wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// ONOFF
    Power(bool),
    /// SETPTEMP, AMBTEMP
    Temperature(Temperature),
    /// MODE, FANSP, VANEUD, VANELR, ERRSTATUS, ERRCODE
    Text(String),
}

impl AttributeValue {
    pub fn text(s: impl Into<String>) -> Self {
        AttributeValue::Text(s.into())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Power(true) => f.write_str("ON"),
            AttributeValue::Power(false) => f.write_str("OFF"),
            AttributeValue::Temperature(t) => write!(f, "{t}"),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications delivered to `on_event` callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AttributeChanged { function: Function, value: AttributeValue },
    ConnectivityChanged { online: bool },
}

/// Why a host command was not sent to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No active connection; commands are never queued.
    Offline,
    /// Value missing from the device's LIMITS list, or no list received yet.
    NotAllowed,
    /// AMBTEMP, ERRSTATUS and ERRCODE cannot be set.
    ReadOnly,
    /// The value type does not match the function, or has no wire form.
    InvalidValue,
}

/// Outcome of a host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The line written to the gateway, without terminator.
    Sent(String),
    Dropped(DropReason),
}

impl Dispatch {
    pub fn is_sent(&self) -> bool {
        matches!(self, Dispatch::Sent(_))
    }
}
