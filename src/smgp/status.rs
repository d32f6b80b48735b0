// ABOUTME: SMGP status codes carried in login, submit and deliver responses
// ABOUTME: A single table covers every response; 75 doubles as the flow-control signal

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    SystemBusy = 1,
    TooManyConnections = 2,
    InvalidStructure = 10,
    InvalidCommand = 11,
    DuplicateSequence = 12,
    InvalidIpAddress = 20,
    AuthFailed = 21,
    VersionTooHigh = 22,
    InvalidMsgType = 30,
    InvalidPriority = 31,
    InvalidFeeType = 32,
    InvalidFeeCode = 33,
    InvalidMsgFormat = 34,
    InvalidTimeFormat = 35,
    InvalidMsgLength = 36,
    Expired = 37,
    InvalidQueryType = 38,
    RoutingError = 39,
    InvalidFixedFee = 40,
    InvalidUpdateType = 41,
    InvalidRouteId = 42,
    InvalidServiceId = 43,
    InvalidValidTime = 44,
    InvalidAtTime = 45,
    InvalidSrcTermId = 46,
    InvalidDestTermId = 47,
    InvalidChargeTermId = 48,
    InvalidSpCode = 49,
    InvalidSrcGatewayId = 56,
    InvalidQueryTermId = 57,
    NoMatchingRoute = 58,
    InvalidSpType = 59,
    InvalidLastRouteId = 60,
    InvalidRouteType = 61,
    InvalidDestGatewayId = 62,
    InvalidDestGatewayIp = 63,
    InvalidDestGatewayPort = 64,
    InvalidTermRangeId = 65,
    InvalidProvinceCode = 66,
    InvalidUserType = 67,
    RouteUpdateUnsupported = 68,
    InvalidSpId = 69,
    InvalidSpAccessType = 70,
    RouteUpdateFailed = 71,
    InvalidTimestamp = 72,
    InvalidMServiceId = 73,
    SpBlackoutPeriod = 74,
    /// SP exceeded its daily flow; also answered when the window is full
    DailyFlowExceeded = 75,
    SpAccountExpired = 76,
}

impl Status {
    pub fn description(&self) -> &'static str {
        match self {
            Status::Ok => "success",
            Status::SystemBusy => "system busy",
            Status::TooManyConnections => "too many connections",
            Status::InvalidStructure => "invalid message structure",
            Status::InvalidCommand => "invalid command id",
            Status::DuplicateSequence => "duplicate sequence id",
            Status::InvalidIpAddress => "invalid ip address",
            Status::AuthFailed => "authentication failed",
            Status::VersionTooHigh => "version too high",
            Status::InvalidMsgType => "invalid MsgType",
            Status::InvalidPriority => "invalid Priority",
            Status::InvalidFeeType => "invalid FeeType",
            Status::InvalidFeeCode => "invalid FeeCode",
            Status::InvalidMsgFormat => "invalid MsgFormat",
            Status::InvalidTimeFormat => "invalid time format",
            Status::InvalidMsgLength => "invalid MsgLength",
            Status::Expired => "validity period expired",
            Status::InvalidQueryType => "invalid QueryType",
            Status::RoutingError => "routing error",
            Status::InvalidFixedFee => "invalid FixedFee",
            Status::InvalidUpdateType => "invalid UpdateType",
            Status::InvalidRouteId => "invalid RouteId",
            Status::InvalidServiceId => "invalid ServiceId",
            Status::InvalidValidTime => "invalid ValidTime",
            Status::InvalidAtTime => "invalid AtTime",
            Status::InvalidSrcTermId => "invalid SrcTermId",
            Status::InvalidDestTermId => "invalid DestTermId",
            Status::InvalidChargeTermId => "invalid ChargeTermId",
            Status::InvalidSpCode => "invalid SPCode",
            Status::InvalidSrcGatewayId => "invalid SrcGatewayID",
            Status::InvalidQueryTermId => "invalid QueryTermID",
            Status::NoMatchingRoute => "no matching route",
            Status::InvalidSpType => "invalid SPType",
            Status::InvalidLastRouteId => "invalid LastRouteID",
            Status::InvalidRouteType => "invalid RouteType",
            Status::InvalidDestGatewayId => "invalid DestGatewayID",
            Status::InvalidDestGatewayIp => "invalid DestGatewayIP",
            Status::InvalidDestGatewayPort => "invalid DestGatewayPort",
            Status::InvalidTermRangeId => "invalid TermRangeID",
            Status::InvalidProvinceCode => "invalid ProvinceCode",
            Status::InvalidUserType => "invalid UserType",
            Status::RouteUpdateUnsupported => "route update not supported by this node",
            Status::InvalidSpId => "invalid SPID",
            Status::InvalidSpAccessType => "invalid SPAccessType",
            Status::RouteUpdateFailed => "route update failed",
            Status::InvalidTimestamp => "invalid Time",
            Status::InvalidMServiceId => "invalid MServiceID",
            Status::SpBlackoutPeriod => "SP may not send at this time",
            Status::DailyFlowExceeded => "SP exceeded daily flow",
            Status::SpAccountExpired => "SP account expired",
        }
    }
}

pub fn description(code: u32) -> &'static str {
    Status::try_from(code)
        .map(|s| s.description())
        .unwrap_or("unknown status")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_control_code_is_75() {
        assert_eq!(u32::from(Status::DailyFlowExceeded), 75);
        assert_eq!(description(21), "authentication failed");
        assert_eq!(description(5), "unknown status");
    }
}
