// ABOUTME: SGIP 1.2 result codes shared by every response PDU
// ABOUTME: One table covers bind, submit, deliver and report outcomes

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    /// Bad login name or password
    IllegalLogin = 1,
    RepeatedLogin = 2,
    TooManyConnections = 3,
    InvalidLoginType = 4,
    InvalidParameter = 5,
    IllegalPhoneNumber = 6,
    InvalidMessageId = 7,
    InvalidMessageLength = 8,
    InvalidSequence = 9,
    IllegalGnsOperation = 10,
    NodeBusy = 11,
    DestinationUnreachable = 21,
    RouteError = 22,
    NoRoute = 23,
    InvalidChargeNumber = 24,
    UserUnreachable = 25,
    HandsetMemoryFull = 26,
    HandsetNoSms = 27,
    HandsetError = 28,
    UnknownUser = 29,
    NotSupported = 30,
    IllegalDevice = 31,
    SystemFailure = 32,
    /// SMSC queue full, also answered for flow control
    QueueFull = 33,
}

impl Status {
    pub fn description(&self) -> &'static str {
        match self {
            Status::Ok => "success",
            Status::IllegalLogin => "illegal login",
            Status::RepeatedLogin => "repeated login on one connection",
            Status::TooManyConnections => "too many connections",
            Status::InvalidLoginType => "invalid login type",
            Status::InvalidParameter => "invalid parameter format",
            Status::IllegalPhoneNumber => "illegal phone number",
            Status::InvalidMessageId => "invalid message id",
            Status::InvalidMessageLength => "invalid message length",
            Status::InvalidSequence => "invalid sequence number",
            Status::IllegalGnsOperation => "illegal GNS operation",
            Status::NodeBusy => "node busy",
            Status::DestinationUnreachable => "destination unreachable",
            Status::RouteError => "routing error",
            Status::NoRoute => "route does not exist",
            Status::InvalidChargeNumber => "invalid charge number",
            Status::UserUnreachable => "user cannot be reached",
            Status::HandsetMemoryFull => "handset memory full",
            Status::HandsetNoSms => "handset does not support SMS",
            Status::HandsetError => "handset error receiving SMS",
            Status::UnknownUser => "unknown user",
            Status::NotSupported => "function not supported",
            Status::IllegalDevice => "illegal device",
            Status::SystemFailure => "system failure",
            Status::QueueFull => "SMSC queue full",
        }
    }
}

pub fn description(code: u32) -> &'static str {
    u8::try_from(code)
        .ok()
        .and_then(|code| Status::try_from(code).ok())
        .map(|status| status.description())
        .unwrap_or("unknown status")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_gap_between_11_and_21() {
        assert!(Status::try_from(12u8).is_err());
        assert_eq!(Status::try_from(33u8).unwrap(), Status::QueueFull);
        assert_eq!(description(1), "illegal login");
        assert_eq!(description(500), "unknown status");
    }
}
